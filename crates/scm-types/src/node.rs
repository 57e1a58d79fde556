use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::{ContainerId, NodeId, PipelineId};

/// Health state of a storage node, driven by the heartbeat sweeper (§4.4).
///
/// Rank order matters for the sweeper's monotone bookkeeping: a node only
/// ever moves forward through `HEALTHY -> STALE -> DEAD`, except for the
/// operator-initiated decommission path which can be entered from either
/// of the first two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeHealth {
    Healthy,
    Stale,
    Dead,
    Decommissioning,
    Decommissioned,
}

impl NodeHealth {
    pub fn is_usable_for_pipeline_membership(self) -> bool {
        matches!(self, NodeHealth::Healthy)
    }

    /// OPEN pipelines may keep a member that is merely `Stale` (§8
    /// invariant: "all members are HEALTHY or STALE"); only `Dead` forces
    /// the owning pipelines closed.
    pub fn keeps_pipeline_open(self) -> bool {
        matches!(self, NodeHealth::Healthy | NodeHealth::Stale)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeType {
    Disk,
    Ssd,
}

/// One storage volume's capacity report, as carried in a `NodeReport`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageVolumeReport {
    pub capacity_bytes: u64,
    pub used_bytes: u64,
    pub remaining_bytes: u64,
    pub volume_type: VolumeType,
}

/// One pipeline membership the node reports it still believes it is part
/// of, carried inside a heartbeat's `PipelineReport` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReportEntry {
    pub pipeline_id: PipelineId,
}

/// Identity/addressing fields a datanode presents on every RPC (§6
/// `NodeDetails`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDetails {
    pub node_id: Option<NodeId>,
    pub hostname: String,
    pub ip_address: String,
    pub ports: Vec<u16>,
}

/// Storage-report payload attached to `Register` and `process_node_report`
/// (§4.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeReport {
    pub volumes: Vec<StorageVolumeReport>,
    pub metadata_volume_count: u32,
    pub healthy_volume_count: u32,
}

/// Full node record owned exclusively by the Node Manager (§3 `NodeInfo`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: NodeId,
    pub hostname: String,
    pub ip_address: String,
    pub ports: Vec<u16>,
    pub topology_location: String,
    /// Milliseconds since the Unix epoch, supplied by the HA gateway's
    /// apply-time clock (§4.3) — never read from a local clock inside a
    /// write method.
    pub last_heartbeat_millis: u64,
    pub health: NodeHealth,
    pub volumes: Vec<StorageVolumeReport>,
    pub metadata_volume_count: u32,
    pub healthy_volume_count: u32,
    pub pipelines: BTreeSet<PipelineId>,
    pub containers: BTreeSet<ContainerId>,
}

impl NodeInfo {
    pub fn new(
        node_id: NodeId,
        details: &NodeDetails,
        topology_location: String,
        now_millis: u64,
    ) -> Self {
        Self {
            node_id,
            hostname: details.hostname.clone(),
            ip_address: details.ip_address.clone(),
            ports: details.ports.clone(),
            topology_location,
            last_heartbeat_millis: now_millis,
            health: NodeHealth::Healthy,
            volumes: Vec::new(),
            metadata_volume_count: 0,
            healthy_volume_count: 0,
            pipelines: BTreeSet::new(),
            containers: BTreeSet::new(),
        }
    }

    pub fn apply_report(&mut self, report: &NodeReport) {
        self.volumes = report.volumes.clone();
        self.metadata_volume_count = report.metadata_volume_count;
        self.healthy_volume_count = report.healthy_volume_count;
    }

    pub fn has_healthy_data_volume(&self) -> bool {
        self.volumes.iter().any(|v| v.remaining_bytes > 0)
    }

    /// `pipeline_limit` per §4.4: either a cluster-wide override (applied
    /// by the caller) or `pipelines_per_metadata_volume * metadata_volume_count`
    /// when at least one data volume is healthy, else zero.
    pub fn pipeline_limit(&self, pipelines_per_metadata_volume: u32) -> u32 {
        if !self.has_healthy_data_volume() {
            return 0;
        }
        pipelines_per_metadata_volume.saturating_mul(self.metadata_volume_count)
    }
}

/// `min_healthy_volume_num` (§4.4): the smallest healthy-volume count
/// across a set of nodes, used as a placement-feasibility input.
pub fn min_healthy_volume_num<'a>(nodes: impl IntoIterator<Item = &'a NodeInfo>) -> u32 {
    nodes
        .into_iter()
        .map(|n| n.healthy_volume_count)
        .min()
        .unwrap_or(0)
}

/// `min_pipeline_limit` (§4.4): the smallest per-node pipeline capacity
/// across a set of nodes.
pub fn min_pipeline_limit<'a>(
    nodes: impl IntoIterator<Item = &'a NodeInfo>,
    pipelines_per_metadata_volume: u32,
) -> u32 {
    nodes
        .into_iter()
        .map(|n| n.pipeline_limit(pipelines_per_metadata_volume))
        .min()
        .unwrap_or(0)
}
