use scm_types::{ContainerId, ContainerEvent, NodeDetails, NodeId, NodeReport, PipelineId, ReplicationConfig};
use serde::{Deserialize, Serialize};

/// Write methods exposed by the Node Manager (§4.4), addressed under
/// `CommandTag::Node`. Read methods (`get_version`) never appear here —
/// the HA gateway only routes `WRITE`-tagged calls through the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeWriteMethod {
    Register { node_id: NodeId, details: NodeDetails, report: NodeReport },
    ProcessNodeReport { node_id: NodeId, report: NodeReport },
    AddDatanodeCommand { node_id: NodeId, command: scm_types::DatanodeCommand },
    SweepHealth { stale_after_millis: u64, dead_after_millis: u64 },
    ReapDeadNodes { grace_period_millis: u64 },
}

impl NodeWriteMethod {
    pub fn name(&self) -> &'static str {
        match self {
            NodeWriteMethod::Register { .. } => "Register",
            NodeWriteMethod::ProcessNodeReport { .. } => "ProcessNodeReport",
            NodeWriteMethod::AddDatanodeCommand { .. } => "AddDatanodeCommand",
            NodeWriteMethod::SweepHealth { .. } => "SweepHealth",
            NodeWriteMethod::ReapDeadNodes { .. } => "ReapDeadNodes",
        }
    }
}

/// Write methods exposed by the Pipeline Manager (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineWriteMethod {
    Create { pipeline_id: PipelineId, config: ReplicationConfig, candidates: Vec<NodeId> },
    Open { pipeline_id: PipelineId, acked_members: Vec<NodeId> },
    Close { pipeline_id: PipelineId },
    Deactivate { pipeline_id: PipelineId },
    Activate { pipeline_id: PipelineId },
}

impl PipelineWriteMethod {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineWriteMethod::Create { .. } => "Create",
            PipelineWriteMethod::Open { .. } => "Open",
            PipelineWriteMethod::Close { .. } => "Close",
            PipelineWriteMethod::Deactivate { .. } => "Deactivate",
            PipelineWriteMethod::Activate { .. } => "Activate",
        }
    }
}

/// Write methods exposed by the Container Manager (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ContainerWriteMethod {
    Allocate { pipeline_id: PipelineId, owner: String, replication: ReplicationConfig },
    ApplyEvent { container_id: ContainerId, event: ContainerEvent },
    UpdateReplica { replica: scm_types::ContainerReplica },
    RemoveReplica { container_id: ContainerId, node_id: NodeId },
}

impl ContainerWriteMethod {
    pub fn name(&self) -> &'static str {
        match self {
            ContainerWriteMethod::Allocate { .. } => "Allocate",
            ContainerWriteMethod::ApplyEvent { .. } => "ApplyEvent",
            ContainerWriteMethod::UpdateReplica { .. } => "UpdateReplica",
            ContainerWriteMethod::RemoveReplica { .. } => "RemoveReplica",
        }
    }
}

/// Typed reply carried back to the submitting client through the leader's
/// `submit` future (§4.2 "returns a serialized reply used only on the
/// leader"). Followers compute the same value during apply but discard it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Reply {
    NodeRegistered { node_id: NodeId, already_registered: bool },
    Ack,
    PipelineCreated(scm_types::Pipeline),
    ContainerAllocated(scm_types::ContainerInfo),
    ContainerState(scm_types::ContainerState),
}
