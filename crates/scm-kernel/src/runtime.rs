use std::sync::Mutex;

use scm_directory_ref::{CachedDnsToSwitchResolver, PlacementPolicy, StaticDnsToSwitchResolver};
use scm_types::{Command, CommandTag, Result, ScmError};

use crate::command::{ContainerWriteMethod, NodeWriteMethod, PipelineWriteMethod, Reply};
use crate::container_manager::ContainerManager;
use crate::effects::Effect;
use crate::node_manager::NodeManager;
use crate::pipeline_manager::PipelineManager;
use crate::safe_mode::{ContainerReplicaRule, HealthyPipelineRule, MinDatanodesRule, OneReplicaPipelineRule, SafeModeController};
use crate::state::KernelState;

/// Tunables the apply path needs but that don't belong in the persisted
/// state itself (§6 configuration surface).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub queue_depth_limit: usize,
    pub pipelines_per_metadata_volume: u32,
    pub max_container_size_bytes: u64,
    pub preallocate_threshold_bytes: u64,
    pub min_datanodes: usize,
    pub container_replica_threshold: f64,
    pub pipeline_availability_check: bool,
    pub pipeline_threshold: f64,
}

impl RuntimeConfig {
    fn build_safe_mode_rules(&self) -> Vec<Box<dyn crate::safe_mode::SafeModeRule>> {
        let mut rules: Vec<Box<dyn crate::safe_mode::SafeModeRule>> = vec![
            Box::new(MinDatanodesRule::new(self.min_datanodes)),
            Box::new(ContainerReplicaRule::new(self.container_replica_threshold)),
        ];
        if self.pipeline_availability_check {
            rules.push(Box::new(HealthyPipelineRule::new(self.pipeline_threshold)));
            rules.push(Box::new(OneReplicaPipelineRule::default()));
        }
        rules
    }
}

/// The single apply-dispatch function's home (§9 "replace the
/// method-level interceptor pattern with an enum of write-methods per
/// manager and a single apply-dispatch function"). Owns the tables, the
/// (pure, deterministic) topology resolver, the placement policy, and the
/// safe-mode controller; every write command funnels through
/// [`Runtime::apply_committed`].
pub struct Runtime {
    pub state: KernelState,
    config: RuntimeConfig,
    resolver: CachedDnsToSwitchResolver<StaticDnsToSwitchResolver>,
    placement_policy: Box<dyn PlacementPolicy>,
    safe_mode: Mutex<SafeModeController>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig, placement_policy: Box<dyn PlacementPolicy>) -> Self {
        Self::with_state(config, placement_policy, KernelState::new())
    }

    /// Builds a `Runtime` over state recovered from a checkpoint (§4.2
    /// `install_snapshot`, see `persistence::load`) instead of an empty
    /// one. `safe_mode`'s rule-evaluation state is re-derived from
    /// `state` on the first `apply_committed` call rather than restored
    /// directly, since the controller itself holds no state beyond what
    /// `state.safe_mode` already carries.
    pub fn with_state(config: RuntimeConfig, placement_policy: Box<dyn PlacementPolicy>, state: KernelState) -> Self {
        let safe_mode = SafeModeController::new(config.build_safe_mode_rules());
        Self {
            state,
            resolver: CachedDnsToSwitchResolver::new(StaticDnsToSwitchResolver::new()),
            placement_policy,
            safe_mode: Mutex::new(safe_mode),
            config,
        }
    }

    /// Invoked by the replicated log's `apply` callback, in strict
    /// index order, on every replica (§4.2). `now_millis` is the
    /// gateway-supplied apply-time clock — the only source of "now" any
    /// write method is allowed to observe.
    pub fn apply_committed(
        &self,
        command: &Command,
        now_millis: u64,
        is_leader: bool,
        current_term: u64,
    ) -> Result<(Vec<u8>, Vec<Effect>)> {
        let mut effects = Vec::new();
        let reply = match command.tag {
            CommandTag::Node => self.apply_node(command, now_millis, is_leader, current_term, &mut effects)?,
            CommandTag::Pipeline => self.apply_pipeline(command, now_millis, &mut effects)?,
            CommandTag::Container => self.apply_container(command, now_millis, &mut effects)?,
        };

        if let Some(status) = self.safe_mode.lock().expect("safe-mode lock poisoned").refresh(&self.state) {
            effects.push(Effect::SafeModeStatusChanged(status));
        }

        let encoded = postcard::to_allocvec(&reply)
            .map_err(|e| ScmError::Internal(format!("reply encode failed: {e}")))?;
        Ok((encoded, effects))
    }

    fn apply_node(
        &self,
        command: &Command,
        now_millis: u64,
        is_leader: bool,
        current_term: u64,
        effects: &mut Vec<Effect>,
    ) -> Result<Reply> {
        let method: NodeWriteMethod = postcard::from_bytes(&command.argument)
            .map_err(|e| ScmError::Internal(format!("node command decode failed: {e}")))?;
        let manager = NodeManager::new(&self.state);

        match method {
            NodeWriteMethod::Register { node_id, details, report } => {
                let outcome = manager.register(node_id, &details, &report, &self.resolver, now_millis)?;
                Ok(Reply::NodeRegistered { node_id: outcome.node_id, already_registered: outcome.already_registered })
            }
            NodeWriteMethod::ProcessNodeReport { node_id, report } => {
                manager.process_node_report(node_id, &report);
                Ok(Reply::Ack)
            }
            NodeWriteMethod::AddDatanodeCommand { node_id, command: datanode_command } => {
                manager.add_datanode_command(node_id, datanode_command.clone(), is_leader, current_term, self.config.queue_depth_limit);
                effects.push(Effect::EnqueueDatanodeCommand { node: node_id, command: datanode_command });
                Ok(Reply::Ack)
            }
            NodeWriteMethod::SweepHealth { stale_after_millis, dead_after_millis } => {
                let newly_dead = manager.sweep_health(now_millis, stale_after_millis, dead_after_millis);
                let pipeline_manager = PipelineManager::new(&self.state);
                let container_manager = ContainerManager::new(&self.state);
                for dead_node in newly_dead {
                    effects.push(Effect::NodeDeclaredDead { node: dead_node });
                    for (_, containers) in pipeline_manager.close_pipelines_with_dead_member(dead_node) {
                        let ids: Vec<_> = containers.into_iter().collect();
                        container_manager.cascade_pipeline_close(&ids, now_millis);
                    }
                }
                Ok(Reply::Ack)
            }
            NodeWriteMethod::ReapDeadNodes { grace_period_millis } => {
                manager.reap_dead_nodes(now_millis, grace_period_millis);
                Ok(Reply::Ack)
            }
        }
    }

    fn apply_pipeline(&self, command: &Command, now_millis: u64, effects: &mut Vec<Effect>) -> Result<Reply> {
        let method: PipelineWriteMethod = postcard::from_bytes(&command.argument)
            .map_err(|e| ScmError::Internal(format!("pipeline command decode failed: {e}")))?;
        let manager = PipelineManager::new(&self.state);
        let node_manager = NodeManager::new(&self.state);

        match method {
            PipelineWriteMethod::Create { pipeline_id, config, candidates } => {
                let pipeline = manager.create(pipeline_id, config, &candidates, self.placement_policy.as_ref(), now_millis)?;
                for member in &pipeline.members {
                    let datanode_command = scm_types::DatanodeCommand::CreatePipeline {
                        pipeline_id: pipeline.pipeline_id,
                        members: pipeline.members.clone(),
                        term: 0,
                    };
                    effects.push(Effect::EnqueueDatanodeCommand { node: *member, command: datanode_command.clone() });
                    node_manager.add_datanode_command(*member, datanode_command, true, 0, self.config.queue_depth_limit);
                }
                Ok(Reply::PipelineCreated(pipeline))
            }
            PipelineWriteMethod::Open { pipeline_id, acked_members } => {
                manager.open(pipeline_id, &acked_members.into_iter().collect())?;
                Ok(Reply::Ack)
            }
            PipelineWriteMethod::Close { pipeline_id } => {
                let containers = manager.close(pipeline_id)?;
                let container_manager = ContainerManager::new(&self.state);
                let ids: Vec<_> = containers.into_iter().collect();
                container_manager.cascade_pipeline_close(&ids, now_millis);
                for member in manager.get(pipeline_id).map(|p| p.members).unwrap_or_default() {
                    let datanode_command = scm_types::DatanodeCommand::ClosePipeline { pipeline_id, term: 0 };
                    effects.push(Effect::EnqueueDatanodeCommand { node: member, command: datanode_command.clone() });
                    node_manager.add_datanode_command(member, datanode_command, true, 0, self.config.queue_depth_limit);
                }
                Ok(Reply::Ack)
            }
            PipelineWriteMethod::Deactivate { pipeline_id } => {
                manager.deactivate(pipeline_id)?;
                Ok(Reply::Ack)
            }
            PipelineWriteMethod::Activate { pipeline_id } => {
                manager.activate(pipeline_id)?;
                Ok(Reply::Ack)
            }
        }
    }

    fn apply_container(&self, command: &Command, now_millis: u64, _effects: &mut Vec<Effect>) -> Result<Reply> {
        let method: ContainerWriteMethod = postcard::from_bytes(&command.argument)
            .map_err(|e| ScmError::Internal(format!("container command decode failed: {e}")))?;
        let manager = ContainerManager::new(&self.state);
        let pipeline_manager = PipelineManager::new(&self.state);

        match method {
            ContainerWriteMethod::Allocate { pipeline_id, owner, replication } => {
                let info = manager.allocate(pipeline_id, owner, replication, now_millis);
                pipeline_manager.register_container(pipeline_id, info.container_id);
                Ok(Reply::ContainerAllocated(info))
            }
            ContainerWriteMethod::ApplyEvent { container_id, event } => {
                let state = manager.apply_event(container_id, event, now_millis)?;
                Ok(Reply::ContainerState(state))
            }
            ContainerWriteMethod::UpdateReplica { replica } => {
                manager.update_replica(replica);
                Ok(Reply::Ack)
            }
            ContainerWriteMethod::RemoveReplica { container_id, node_id } => {
                manager.remove_replica(container_id, node_id);
                Ok(Reply::Ack)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scm_directory_ref::RandomPlacementPolicy;
    use scm_types::{ClientId, NodeDetails, NodeId, NodeReport, SequenceNumber, StorageVolumeReport, VolumeType};

    fn config() -> RuntimeConfig {
        RuntimeConfig {
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

    fn register_command(node_id: NodeId, hostname: &str) -> Command {
        let method = NodeWriteMethod::Register {
            node_id,
            details: NodeDetails { node_id: None, hostname: hostname.into(), ip_address: "10.0.0.1".into(), ports: vec![9860] },
            report: NodeReport {
                volumes: vec![StorageVolumeReport { capacity_bytes: 100, used_bytes: 0, remaining_bytes: 100, volume_type: VolumeType::Disk }],
                metadata_volume_count: 1,
                healthy_volume_count: 1,
            },
        };
        Command {
            tag: CommandTag::Node,
            method: method.name().to_string(),
            argument: postcard::to_allocvec(&method).unwrap(),
            client_id: ClientId(1),
            sequence: SequenceNumber(1),
        }
    }

    #[test]
    fn apply_committed_registers_a_node_and_flips_safe_mode() {
        let runtime = Runtime::new(config(), Box::new(RandomPlacementPolicy));
        let node_id = NodeId::random();
        let (reply_bytes, effects) = runtime.apply_committed(&register_command(node_id, "dn1"), 0, true, 0).unwrap();
        let reply: Reply = postcard::from_bytes(&reply_bytes).unwrap();
        assert!(matches!(reply, Reply::NodeRegistered { already_registered: false, .. }));
        assert!(effects.iter().any(|e| matches!(e, Effect::SafeModeStatusChanged(_))));
    }

    #[test]
    fn pipeline_create_then_allocate_round_trips_through_apply() {
        let runtime = Runtime::new(config(), Box::new(RandomPlacementPolicy));
        let mut nodes = Vec::new();
        for i in 0..3 {
            let node_id = NodeId::random();
            runtime.apply_committed(&register_command(node_id, &format!("dn{i}")), 0, true, 0).unwrap();
            nodes.push(node_id);
        }

        let pipeline_id = scm_types::PipelineId::random();
        let create_method = PipelineWriteMethod::Create {
            pipeline_id,
            config: scm_types::ReplicationConfig::replicated(3),
            candidates: nodes.clone(),
        };
        let create_command = Command {
            tag: CommandTag::Pipeline,
            method: create_method.name().to_string(),
            argument: postcard::to_allocvec(&create_method).unwrap(),
            client_id: ClientId(1),
            sequence: SequenceNumber(2),
        };
        runtime.apply_committed(&create_command, 0, true, 0).unwrap();

        let allocate_method = ContainerWriteMethod::Allocate {
            pipeline_id,
            owner: "vol1".into(),
            replication: scm_types::ReplicationConfig::replicated(3),
        };
        let allocate_command = Command {
            tag: CommandTag::Container,
            method: allocate_method.name().to_string(),
            argument: postcard::to_allocvec(&allocate_method).unwrap(),
            client_id: ClientId(1),
            sequence: SequenceNumber(3),
        };
        let (reply_bytes, _) = runtime.apply_committed(&allocate_command, 0, true, 0).unwrap();
        let reply: Reply = postcard::from_bytes(&reply_bytes).unwrap();
        assert!(matches!(reply, Reply::ContainerAllocated(_)));
    }
}
