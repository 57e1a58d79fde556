use scm_types::{
    transition, ContainerEvent, ContainerId, ContainerInfo, ContainerReplica, ContainerState, NodeId,
    PipelineId, ReplicaReportedState, ReplicationConfig, Result, ScmError,
};
use tracing::{debug, warn};

use crate::state::KernelState;

/// Container Manager (§4.6). Owns the container table and the transient,
/// never-replicated replica index.
pub struct ContainerManager<'a> {
    pub state: &'a KernelState,
}

impl<'a> ContainerManager<'a> {
    pub fn new(state: &'a KernelState) -> Self {
        Self { state }
    }

    /// §4.6 `allocate`: advances the shared `next_container_id` counter
    /// and opens a new container on `pipeline_id`. Per §9 Open Question 2,
    /// the counter only moves on genuine first-apply — callers dedup
    /// replayed commands before reaching this method (the HA gateway's
    /// client-session table), so every call here does advance the
    /// counter exactly once.
    pub fn allocate(
        &self,
        pipeline_id: PipelineId,
        owner: String,
        replication: ReplicationConfig,
        now_millis: u64,
    ) -> ContainerInfo {
        let mut containers = self.state.containers.write().expect("container table lock poisoned");
        containers.next_container_id += 1;
        let id = ContainerId::from_raw(containers.next_container_id);
        let info = ContainerInfo::new(id, pipeline_id, owner, replication, now_millis);
        containers.by_id.insert(id, info.clone());
        debug!(container = %id, pipeline = %pipeline_id, "allocated container");
        info
    }

    /// §4.6 `get_matching`: returns an existing OPEN container under
    /// `size` threshold for `(owner, replication)` if one exists, so the
    /// caller can reuse it instead of allocating a new one. Pre-allocation
    /// threshold logic (request a fresh container once free headroom on
    /// every matching container drops below `preallocate_threshold_bytes`)
    /// is left to the caller, which has visibility across the whole match
    /// set; this method just answers "does one fit".
    pub fn get_matching(
        &self,
        owner: &str,
        replication: ReplicationConfig,
        size: u64,
        max_container_size: u64,
    ) -> Option<ContainerInfo> {
        let containers = self.state.containers.read().expect("container table lock poisoned");
        containers
            .by_id
            .values()
            .find(|c| c.owner == owner && c.replication == replication && c.has_free_capacity(size, max_container_size))
            .cloned()
    }

    /// Counts containers matching `(owner, replication)` that are OPEN and
    /// within `preallocate_threshold_bytes` of `max_container_size`,
    /// letting the caller decide whether to pre-allocate ahead of demand.
    pub fn count_near_full(
        &self,
        owner: &str,
        replication: ReplicationConfig,
        max_container_size: u64,
        preallocate_threshold_bytes: u64,
    ) -> usize {
        let containers = self.state.containers.read().expect("container table lock poisoned");
        containers
            .by_id
            .values()
            .filter(|c| {
                c.owner == owner
                    && c.replication == replication
                    && c.state == ContainerState::Open
                    && max_container_size.saturating_sub(c.used_bytes) <= preallocate_threshold_bytes
            })
            .count()
    }

    /// Drives the FSM forward by one `event` for a single container (§4.6
    /// close/delete/cleanup operations all funnel through this).
    pub fn apply_event(&self, container_id: ContainerId, event: ContainerEvent, now_millis: u64) -> Result<ContainerState> {
        let mut containers = self.state.containers.write().expect("container table lock poisoned");
        let info = containers
            .by_id
            .get_mut(&container_id)
            .ok_or_else(|| ScmError::NotFound(format!("container {container_id}")))?;
        info.apply_event(event, now_millis)?;
        Ok(info.state)
    }

    /// Cascades every still-open container on a pipeline through
    /// `Finalize` when the owning pipeline closes (§4.5/§4.6 cascade).
    /// Stops at CLOSING — QUASI_CLOSE/CLOSE arrive later from datanode
    /// `ReportContainer` events, not from the pipeline closure itself.
    /// Containers already past `Closing` are left as-is — `transition`'s
    /// self-loop rule makes the fold idempotent regardless.
    pub fn cascade_pipeline_close(&self, container_ids: &[ContainerId], now_millis: u64) {
        let mut containers = self.state.containers.write().expect("container table lock poisoned");
        for id in container_ids {
            let Some(info) = containers.by_id.get_mut(id) else { continue };
            if info.state.is_terminal() {
                continue;
            }
            if let Ok(next) = transition(info.state, ContainerEvent::Finalize) {
                if next != info.state {
                    info.state = next;
                    info.state_entered_at_millis = now_millis;
                }
            }
        }
    }

    /// `update_replica` (§4.6): local-only, transient bookkeeping rebuilt
    /// from datanode `ReportContainer` RPCs. Idempotent — replacing an
    /// existing entry for the same `(container, node)` pair is a plain
    /// overwrite, never an error.
    pub fn update_replica(&self, replica: ContainerReplica) {
        let mut containers = self.state.containers.write().expect("container table lock poisoned");
        containers.replicas.insert((replica.container_id, replica.node_id), replica);
    }

    /// `remove_replica` (§4.6): drops a replica entry, e.g. when its
    /// hosting node is reaped. A no-op if the entry is already gone.
    pub fn remove_replica(&self, container_id: ContainerId, node_id: NodeId) {
        let mut containers = self.state.containers.write().expect("container table lock poisoned");
        containers.replicas.remove(&(container_id, node_id));
    }

    pub fn replicas_of(&self, container_id: ContainerId) -> Vec<ContainerReplica> {
        let containers = self.state.containers.read().expect("container table lock poisoned");
        containers
            .replicas
            .values()
            .filter(|r| r.container_id == container_id)
            .copied()
            .collect()
    }

    /// Reports one or more replicas in a state that is `Unhealthy` or has
    /// regressed relative to the container's own FSM state, a signal the
    /// close-monitoring loop (§4.6) uses to trigger `force_close`.
    pub fn has_unhealthy_replica(&self, container_id: ContainerId) -> bool {
        self.replicas_of(container_id)
            .iter()
            .any(|r| r.reported_state == ReplicaReportedState::Unhealthy)
    }

    pub fn get(&self, container_id: ContainerId) -> Option<ContainerInfo> {
        self.state.containers.read().expect("container table lock poisoned").by_id.get(&container_id).cloned()
    }

    pub fn list(&self) -> Vec<ContainerInfo> {
        self.state.containers.read().expect("container table lock poisoned").by_id.values().cloned().collect()
    }

    pub fn warn_if_missing(&self, container_id: ContainerId) {
        if self.get(container_id).is_none() {
            warn!(container = %container_id, "operation referenced a container that does not exist");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline_id() -> PipelineId {
        PipelineId::random()
    }

    #[test]
    fn allocate_advances_the_counter_monotonically() {
        let state = KernelState::new();
        let manager = ContainerManager::new(&state);
        let first = manager.allocate(pipeline_id(), "vol1".into(), ReplicationConfig::replicated(3), 0);
        let second = manager.allocate(pipeline_id(), "vol1".into(), ReplicationConfig::replicated(3), 0);
        assert!(second.container_id.as_u64() > first.container_id.as_u64());
    }

    #[test]
    fn get_matching_only_returns_containers_with_free_capacity() {
        let state = KernelState::new();
        let manager = ContainerManager::new(&state);
        let info = manager.allocate(pipeline_id(), "vol1".into(), ReplicationConfig::replicated(3), 0);
        manager.apply_event(info.container_id, ContainerEvent::Finalize, 10).unwrap();

        let found = manager.get_matching("vol1", ReplicationConfig::replicated(3), 10, 1000);
        assert!(found.is_none(), "a CLOSING container must not be matched");
    }

    #[test]
    fn cascade_pipeline_close_drives_open_containers_to_closing() {
        let state = KernelState::new();
        let manager = ContainerManager::new(&state);
        let info = manager.allocate(pipeline_id(), "vol1".into(), ReplicationConfig::replicated(3), 0);

        manager.cascade_pipeline_close(&[info.container_id], 50);
        assert_eq!(manager.get(info.container_id).unwrap().state, ContainerState::Closing);
    }

    #[test]
    fn cascade_is_idempotent_on_already_closing_containers() {
        let state = KernelState::new();
        let manager = ContainerManager::new(&state);
        let info = manager.allocate(pipeline_id(), "vol1".into(), ReplicationConfig::replicated(3), 0);
        manager.cascade_pipeline_close(&[info.container_id], 10);
        manager.cascade_pipeline_close(&[info.container_id], 20);
        assert_eq!(manager.get(info.container_id).unwrap().state, ContainerState::Closing);
    }

    #[test]
    fn update_and_remove_replica_round_trip() {
        let state = KernelState::new();
        let manager = ContainerManager::new(&state);
        let info = manager.allocate(pipeline_id(), "vol1".into(), ReplicationConfig::replicated(3), 0);
        let node = NodeId::random();
        manager.update_replica(ContainerReplica {
            container_id: info.container_id,
            node_id: node,
            reported_state: ReplicaReportedState::Open,
            bytes_used: 0,
            key_count: 0,
            last_seen_millis: 0,
        });
        assert_eq!(manager.replicas_of(info.container_id).len(), 1);
        manager.remove_replica(info.container_id, node);
        assert!(manager.replicas_of(info.container_id).is_empty());
    }
}
