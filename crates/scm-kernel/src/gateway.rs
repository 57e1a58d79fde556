use std::sync::Arc;

use scm_types::{
    ClusterId, Command, CommandTag, ContainerId, ContainerInfo, NodeDetails, NodeId, NodeInfo,
    NodeReport, Pipeline, PipelineId, Result, ScmError, ScmId,
};

use crate::command::{ContainerWriteMethod, NodeWriteMethod, PipelineWriteMethod, Reply};
use crate::container_manager::ContainerManager;
use crate::node_manager::NodeManager;
use crate::pipeline_manager::PipelineManager;
use crate::runtime::Runtime;

/// What a replica believes its own consensus role to be, as observed by
/// the gateway at call time (§4.3). Distinct from any internal VSR
/// view-state enum so `scm-kernel` never needs to know what a "view" is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

/// Dependency-inversion seam (§4.3): `scm-kernel` defines what it needs
/// from the replicated log without depending on `scm-consensus`, which
/// implements this trait over its VSR replica.
pub trait ReplicatedLogHandle: Send + Sync {
    fn role(&self) -> Role;
    /// Blocks until the command has committed and applied on a majority,
    /// returning the serialized reply `apply_committed` produced.
    /// Implementations surface `ScmError::Timeout`/`ScmError::NotLeader`
    /// per §4.2's failure model rather than panicking.
    fn submit(&self, command: Command) -> Result<Vec<u8>>;
    fn leader_hint(&self) -> Option<String>;
}

/// HA Invocation Gateway (§4.3): every state-manager write funnels
/// through here. READ methods bypass the log entirely; WRITE methods
/// serialize and `submit` on the leader, or refuse with `NotLeader` on a
/// follower.
pub struct HaGateway<L> {
    /// Shared with the `Replica` driving `log`, so a read issued right
    /// after a write's `submit` returns observes that write (§4.3): both
    /// sides apply through the same `Runtime::apply_committed`, just one
    /// of them (the replicated log) decides when.
    pub runtime: Arc<Runtime>,
    pub log: L,
    pub cluster_id: ClusterId,
    pub scm_id: ScmId,
    pub software_version: String,
}

impl<L: ReplicatedLogHandle> HaGateway<L> {
    pub fn new(runtime: Arc<Runtime>, log: L, cluster_id: ClusterId, scm_id: ScmId, software_version: String) -> Self {
        Self { runtime, log, cluster_id, scm_id, software_version }
    }

    fn submit_write(
        &self,
        tag: CommandTag,
        method_name: &'static str,
        argument: Vec<u8>,
        client_id: scm_types::ClientId,
        sequence: scm_types::SequenceNumber,
    ) -> Result<Reply> {
        if self.log.role() != Role::Leader {
            return Err(ScmError::NotLeader { leader_hint: self.log.leader_hint() });
        }
        let command = Command { tag, method: method_name.to_string(), argument, client_id, sequence };
        let reply_bytes = self.log.submit(command)?;
        postcard::from_bytes(&reply_bytes).map_err(|e| ScmError::Internal(format!("reply decode failed: {e}")))
    }

    // --- READ methods: local, no log traffic (§4.3) -----------------

    /// `get_version` (§4.4): cluster-id, scm-id, software version.
    pub fn get_version(&self) -> (ClusterId, ScmId, String) {
        (self.cluster_id.clone(), self.scm_id, self.software_version.clone())
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<NodeInfo> {
        NodeManager::new(&self.runtime.state).get(node_id)
    }

    pub fn get_pipeline(&self, pipeline_id: PipelineId) -> Option<Pipeline> {
        PipelineManager::new(&self.runtime.state).get(pipeline_id)
    }

    pub fn get_container(&self, container_id: ContainerId) -> Option<ContainerInfo> {
        ContainerManager::new(&self.runtime.state).get(container_id)
    }

    pub fn safe_mode_status(&self) -> scm_types::SafeModeStatus {
        *self.runtime.state.safe_mode.read().expect("safe-mode lock poisoned")
    }

    /// `process_heartbeat` (§4.4): deliberately bypasses the gateway's
    /// write path (see `node_manager::process_heartbeat`'s doc comment)
    /// and runs directly against local state on whichever replica
    /// received the RPC.
    pub fn process_heartbeat(&self, node_id: NodeId) -> Result<Vec<scm_types::DatanodeCommand>> {
        NodeManager::new(&self.runtime.state).process_heartbeat(node_id, self.now_millis_for_local_ops())
    }

    fn now_millis_for_local_ops(&self) -> u64 {
        // Local-only operations are explicitly exempt from the
        // apply-time-clock determinism contract (§4.3) because they
        // never flow through `submit`; reading the wall clock here is
        // safe precisely because this value is never part of replicated
        // state.
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    // --- WRITE methods: submit on leader, refuse on follower --------

    pub fn register(
        &self,
        node_id: NodeId,
        details: NodeDetails,
        report: NodeReport,
        client_id: scm_types::ClientId,
        sequence: scm_types::SequenceNumber,
    ) -> Result<(NodeId, bool)> {
        let method = NodeWriteMethod::Register { node_id, details, report };
        let argument = postcard::to_allocvec(&method).map_err(|e| ScmError::Internal(e.to_string()))?;
        match self.submit_write(CommandTag::Node, method.name(), argument, client_id, sequence)? {
            Reply::NodeRegistered { node_id, already_registered } => Ok((node_id, already_registered)),
            other => Err(ScmError::Internal(format!("unexpected reply to Register: {other:?}"))),
        }
    }

    pub fn create_pipeline(
        &self,
        pipeline_id: PipelineId,
        config: scm_types::ReplicationConfig,
        candidates: Vec<NodeId>,
        client_id: scm_types::ClientId,
        sequence: scm_types::SequenceNumber,
    ) -> Result<Pipeline> {
        let method = PipelineWriteMethod::Create { pipeline_id, config, candidates };
        let argument = postcard::to_allocvec(&method).map_err(|e| ScmError::Internal(e.to_string()))?;
        match self.submit_write(CommandTag::Pipeline, method.name(), argument, client_id, sequence)? {
            Reply::PipelineCreated(pipeline) => Ok(pipeline),
            other => Err(ScmError::Internal(format!("unexpected reply to Create: {other:?}"))),
        }
    }

    pub fn close_pipeline(
        &self,
        pipeline_id: PipelineId,
        client_id: scm_types::ClientId,
        sequence: scm_types::SequenceNumber,
    ) -> Result<()> {
        let method = PipelineWriteMethod::Close { pipeline_id };
        let argument = postcard::to_allocvec(&method).map_err(|e| ScmError::Internal(e.to_string()))?;
        self.submit_write(CommandTag::Pipeline, method.name(), argument, client_id, sequence)?;
        Ok(())
    }

    pub fn allocate_container(
        &self,
        pipeline_id: PipelineId,
        owner: String,
        replication: scm_types::ReplicationConfig,
        client_id: scm_types::ClientId,
        sequence: scm_types::SequenceNumber,
    ) -> Result<ContainerInfo> {
        let method = ContainerWriteMethod::Allocate { pipeline_id, owner, replication };
        let argument = postcard::to_allocvec(&method).map_err(|e| ScmError::Internal(e.to_string()))?;
        match self.submit_write(CommandTag::Container, method.name(), argument, client_id, sequence)? {
            Reply::ContainerAllocated(info) => Ok(info),
            other => Err(ScmError::Internal(format!("unexpected reply to Allocate: {other:?}"))),
        }
    }

    pub fn apply_container_event(
        &self,
        container_id: ContainerId,
        event: scm_types::ContainerEvent,
        client_id: scm_types::ClientId,
        sequence: scm_types::SequenceNumber,
    ) -> Result<scm_types::ContainerState> {
        let method = ContainerWriteMethod::ApplyEvent { container_id, event };
        let argument = postcard::to_allocvec(&method).map_err(|e| ScmError::Internal(e.to_string()))?;
        match self.submit_write(CommandTag::Container, method.name(), argument, client_id, sequence)? {
            Reply::ContainerState(state) => Ok(state),
            other => Err(ScmError::Internal(format!("unexpected reply to ApplyEvent: {other:?}"))),
        }
    }

    fn ack_write(
        &self,
        tag: CommandTag,
        method_name: &'static str,
        argument: Vec<u8>,
        client_id: scm_types::ClientId,
        sequence: scm_types::SequenceNumber,
    ) -> Result<()> {
        match self.submit_write(tag, method_name, argument, client_id, sequence)? {
            Reply::Ack => Ok(()),
            other => Err(ScmError::Internal(format!("unexpected reply to {method_name}: {other:?}"))),
        }
    }

    pub fn process_node_report(
        &self,
        node_id: NodeId,
        report: NodeReport,
        client_id: scm_types::ClientId,
        sequence: scm_types::SequenceNumber,
    ) -> Result<()> {
        let method = NodeWriteMethod::ProcessNodeReport { node_id, report };
        let argument = postcard::to_allocvec(&method).map_err(|e| ScmError::Internal(e.to_string()))?;
        self.ack_write(CommandTag::Node, method.name(), argument, client_id, sequence)
    }

    pub fn add_datanode_command(
        &self,
        node_id: NodeId,
        command: scm_types::DatanodeCommand,
        client_id: scm_types::ClientId,
        sequence: scm_types::SequenceNumber,
    ) -> Result<()> {
        let method = NodeWriteMethod::AddDatanodeCommand { node_id, command };
        let argument = postcard::to_allocvec(&method).map_err(|e| ScmError::Internal(e.to_string()))?;
        self.ack_write(CommandTag::Node, method.name(), argument, client_id, sequence)
    }

    pub fn sweep_health(
        &self,
        stale_after_millis: u64,
        dead_after_millis: u64,
        client_id: scm_types::ClientId,
        sequence: scm_types::SequenceNumber,
    ) -> Result<()> {
        let method = NodeWriteMethod::SweepHealth { stale_after_millis, dead_after_millis };
        let argument = postcard::to_allocvec(&method).map_err(|e| ScmError::Internal(e.to_string()))?;
        self.ack_write(CommandTag::Node, method.name(), argument, client_id, sequence)
    }

    pub fn reap_dead_nodes(
        &self,
        grace_period_millis: u64,
        client_id: scm_types::ClientId,
        sequence: scm_types::SequenceNumber,
    ) -> Result<()> {
        let method = NodeWriteMethod::ReapDeadNodes { grace_period_millis };
        let argument = postcard::to_allocvec(&method).map_err(|e| ScmError::Internal(e.to_string()))?;
        self.ack_write(CommandTag::Node, method.name(), argument, client_id, sequence)
    }

    pub fn open_pipeline(
        &self,
        pipeline_id: PipelineId,
        acked_members: Vec<NodeId>,
        client_id: scm_types::ClientId,
        sequence: scm_types::SequenceNumber,
    ) -> Result<()> {
        let method = PipelineWriteMethod::Open { pipeline_id, acked_members };
        let argument = postcard::to_allocvec(&method).map_err(|e| ScmError::Internal(e.to_string()))?;
        self.ack_write(CommandTag::Pipeline, method.name(), argument, client_id, sequence)
    }

    pub fn deactivate_pipeline(
        &self,
        pipeline_id: PipelineId,
        client_id: scm_types::ClientId,
        sequence: scm_types::SequenceNumber,
    ) -> Result<()> {
        let method = PipelineWriteMethod::Deactivate { pipeline_id };
        let argument = postcard::to_allocvec(&method).map_err(|e| ScmError::Internal(e.to_string()))?;
        self.ack_write(CommandTag::Pipeline, method.name(), argument, client_id, sequence)
    }

    pub fn activate_pipeline(
        &self,
        pipeline_id: PipelineId,
        client_id: scm_types::ClientId,
        sequence: scm_types::SequenceNumber,
    ) -> Result<()> {
        let method = PipelineWriteMethod::Activate { pipeline_id };
        let argument = postcard::to_allocvec(&method).map_err(|e| ScmError::Internal(e.to_string()))?;
        self.ack_write(CommandTag::Pipeline, method.name(), argument, client_id, sequence)
    }

    pub fn update_replica(
        &self,
        replica: scm_types::ContainerReplica,
        client_id: scm_types::ClientId,
        sequence: scm_types::SequenceNumber,
    ) -> Result<()> {
        let method = ContainerWriteMethod::UpdateReplica { replica };
        let argument = postcard::to_allocvec(&method).map_err(|e| ScmError::Internal(e.to_string()))?;
        self.ack_write(CommandTag::Container, method.name(), argument, client_id, sequence)
    }

    pub fn remove_replica(
        &self,
        container_id: ContainerId,
        node_id: NodeId,
        client_id: scm_types::ClientId,
        sequence: scm_types::SequenceNumber,
    ) -> Result<()> {
        let method = ContainerWriteMethod::RemoveReplica { container_id, node_id };
        let argument = postcard::to_allocvec(&method).map_err(|e| ScmError::Internal(e.to_string()))?;
        self.ack_write(CommandTag::Container, method.name(), argument, client_id, sequence)
    }

    pub fn list_nodes(&self) -> Vec<NodeInfo> {
        NodeManager::new(&self.runtime.state).list()
    }

    pub fn list_pipelines(&self) -> Vec<Pipeline> {
        PipelineManager::new(&self.runtime.state).list()
    }

    pub fn list_containers(&self) -> Vec<ContainerInfo> {
        ContainerManager::new(&self.runtime.state).list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scm_directory_ref::RandomPlacementPolicy;
    use scm_types::{ClientId, SequenceNumber, StorageVolumeReport, VolumeType};

    /// A stand-in log that never accepts writes, used to exercise the
    /// gateway's role check without driving a real VSR replica.
    struct AlwaysFollower;

    impl ReplicatedLogHandle for AlwaysFollower {
        fn role(&self) -> Role {
            Role::Follower
        }

        fn submit(&self, _command: Command) -> Result<Vec<u8>> {
            unreachable!("submit must not be called when role() is Follower")
        }

        fn leader_hint(&self) -> Option<String> {
            Some("replica-2".to_string())
        }
    }

    fn runtime_config() -> crate::runtime::RuntimeConfig {
        crate::runtime::RuntimeConfig {
            queue_depth_limit: 16,
            pipelines_per_metadata_volume: 10,
            max_container_size_bytes: 5_000_000_000,
            preallocate_threshold_bytes: 100_000_000,
            min_datanodes: 1,
            container_replica_threshold: 0.99,
            pipeline_availability_check: false,
            pipeline_threshold: 0.9,
        }
    }

    #[test]
    fn follower_refuses_write_with_not_leader() {
        let gateway = HaGateway::new(
            Arc::new(Runtime::new(runtime_config(), Box::new(RandomPlacementPolicy))),
            AlwaysFollower,
            ClusterId::generate(),
            ScmId::random(),
            "1.0.0".to_string(),
        );

        let result = gateway.register(
            NodeId::random(),
            NodeDetails { node_id: None, hostname: "dn1".into(), ip_address: "10.0.0.1".into(), ports: vec![9860] },
            NodeReport {
                volumes: vec![StorageVolumeReport { capacity_bytes: 1, used_bytes: 0, remaining_bytes: 1, volume_type: VolumeType::Disk }],
                metadata_volume_count: 1,
                healthy_volume_count: 1,
            },
            ClientId(1),
            SequenceNumber(1),
        );
        assert!(matches!(result, Err(ScmError::NotLeader { .. })));
    }
}
