use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use scm_types::{
    ContainerId, ContainerInfo, ContainerReplica, NodeId, NodeInfo, Pipeline, PipelineId,
    SafeModeStatus,
};

/// Node Manager's table (§3 "NodeManager exclusively owns the NodeInfo map
/// and dnsToNodes index").
#[derive(Debug, Default)]
pub struct NodeTable {
    pub by_id: BTreeMap<NodeId, NodeInfo>,
    pub by_hostname: HashMap<String, NodeId>,
    pub by_ip: HashMap<String, NodeId>,
    /// Per-node outbound command mailbox, drained on heartbeat (§4.4,
    /// §5 "bounded mailbox with configurable depth").
    pub command_queues: HashMap<NodeId, std::collections::VecDeque<scm_types::DatanodeCommand>>,
}

/// Pipeline Manager's table (§3 "PipelineManager owns the Pipeline map and
/// persists it").
#[derive(Debug, Default)]
pub struct PipelineTable {
    pub by_id: BTreeMap<PipelineId, Pipeline>,
}

/// Container Manager's table plus the transient, never-replicated replica
/// index (§3 "ContainerReplica sets are owned transiently by
/// ContainerManager and rebuilt from reports").
#[derive(Debug, Default)]
pub struct ContainerTable {
    pub by_id: BTreeMap<ContainerId, ContainerInfo>,
    pub next_container_id: u64,
    pub replicas: HashMap<(ContainerId, NodeId), ContainerReplica>,
}

/// The three manager tables behind the lock order §5 mandates: `NODE <
/// PIPELINE < CONTAINER`. Every code path that needs more than one lock
/// acquires them as fields of this struct in declared order, so the order
/// is enforced by the borrow checker rather than by convention.
#[derive(Default)]
pub struct KernelState {
    pub nodes: RwLock<NodeTable>,
    pub pipelines: RwLock<PipelineTable>,
    pub containers: RwLock<ContainerTable>,
    pub safe_mode: RwLock<SafeModeStatus>,
}

impl KernelState {
    pub fn new() -> Self {
        Self {
            safe_mode: RwLock::new(SafeModeStatus::new()),
            ..Default::default()
        }
    }
}
