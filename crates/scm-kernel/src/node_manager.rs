use std::collections::VecDeque;

use scm_directory_ref::CachedDnsToSwitchResolver;
use scm_directory_ref::DnsToSwitchResolver;
use scm_types::{
    min_healthy_volume_num as min_healthy_volume_num_fn, min_pipeline_limit as min_pipeline_limit_fn,
    NodeDetails, NodeHealth, NodeId, NodeInfo, NodeReport, Result, ScmError,
};
use tracing::{info, warn};

use crate::state::{KernelState, NodeTable};

/// Result of `register` (§4.4): `{success, assigned_cluster_id}` collapsed
/// into just the assigned id, since `success` is implied by `Ok`.
pub struct RegisterOutcome {
    pub node_id: NodeId,
    pub already_registered: bool,
}

/// Node Manager (§4.4). Holds no state of its own — every method takes
/// `&KernelState` so the same struct can run on the apply path (through
/// the HA gateway) or be constructed fresh per call; the important
/// invariant is that write methods never read a local clock or RNG, only
/// the `now_millis` the gateway hands them.
pub struct NodeManager<'a> {
    pub state: &'a KernelState,
}

impl<'a> NodeManager<'a> {
    pub fn new(state: &'a KernelState) -> Self {
        Self { state }
    }

    /// §4.4 `register`: idempotent on re-registration, resolves topology
    /// via the pluggable (cached) DNS-to-switch resolver, and seeds the
    /// ip/host indexes.
    pub fn register<R: DnsToSwitchResolver>(
        &self,
        node_id: NodeId,
        details: &NodeDetails,
        report: &NodeReport,
        resolver: &CachedDnsToSwitchResolver<R>,
        now_millis: u64,
    ) -> Result<RegisterOutcome> {
        let mut nodes = self.state.nodes.write().expect("node table lock poisoned");

        if let Some(existing) = nodes.by_id.get(&node_id) {
            let _ = existing;
            info!(node = %node_id, "re-registration of an already-known node, no-op");
            return Ok(RegisterOutcome { node_id, already_registered: true });
        }

        let topology_location = resolver.resolve_or_default(&details.hostname, &details.ip_address);
        let mut info = NodeInfo::new(node_id, details, topology_location, now_millis);
        info.apply_report(report);

        nodes.by_hostname.insert(details.hostname.clone(), node_id);
        nodes.by_ip.insert(details.ip_address.clone(), node_id);
        nodes.command_queues.insert(node_id, VecDeque::new());
        nodes.by_id.insert(node_id, info);

        info!(node = %node_id, hostname = %details.hostname, "registered new node");
        Ok(RegisterOutcome { node_id, already_registered: false })
    }

    /// §4.4 `process_heartbeat`: touches `last_heartbeat_millis` and
    /// drains the pending command queue. Deliberately **not** routed
    /// through the HA invocation gateway — §8 explicitly excludes
    /// heartbeat timestamps from the cross-replica byte-identity
    /// property ("modulo last-seen timestamps, which are not
    /// replicated"), so this runs as a direct, per-replica-local
    /// mutation rather than a consensus write.
    pub fn process_heartbeat(
        &self,
        node_id: NodeId,
        now_millis: u64,
    ) -> Result<Vec<scm_types::DatanodeCommand>> {
        let mut nodes = self.state.nodes.write().expect("node table lock poisoned");
        if !nodes.by_id.contains_key(&node_id) {
            warn!(node = %node_id, "heartbeat from unknown node, rejected");
            return Err(ScmError::NotFound(format!("node {node_id}")));
        }

        if let Some(info) = nodes.by_id.get_mut(&node_id) {
            info.last_heartbeat_millis = now_millis;
            if info.health == NodeHealth::Stale {
                info.health = NodeHealth::Healthy;
            }
        }

        let drained = nodes
            .command_queues
            .get_mut(&node_id)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default();
        Ok(drained)
    }

    /// §4.4 `process_node_report`: discards reports from unknown nodes
    /// with a warning rather than an error, matching "Failure handling:
    /// ... logged and skipped".
    pub fn process_node_report(&self, node_id: NodeId, report: &NodeReport) {
        let mut nodes = self.state.nodes.write().expect("node table lock poisoned");
        match nodes.by_id.get_mut(&node_id) {
            Some(info) => info.apply_report(report),
            None => warn!(node = %node_id, "node report for unknown node, discarded"),
        }
    }

    /// §4.4 `add_datanode_command`: only the leader may enqueue, and a
    /// stale-term command is dropped. `is_leader`/`current_term` are
    /// supplied by the caller (the HA gateway already knows the
    /// consensus role); this method itself stays a pure function of its
    /// arguments.
    pub fn add_datanode_command(
        &self,
        node_id: NodeId,
        command: scm_types::DatanodeCommand,
        is_leader: bool,
        current_term: u64,
        queue_depth_limit: usize,
    ) {
        if !is_leader {
            warn!(node = %node_id, "dropped datanode command: local replica is not leader");
            return;
        }
        if command.term() < current_term {
            warn!(node = %node_id, term = command.term(), current_term, "dropped stale-term datanode command");
            return;
        }

        let mut nodes = self.state.nodes.write().expect("node table lock poisoned");
        let queue = nodes.command_queues.entry(node_id).or_default();
        queue.push_back(command);
        // §5: bounded mailbox, drop the oldest non-critical command on
        // overflow rather than growing unbounded.
        while queue.len() > queue_depth_limit {
            queue.pop_front();
        }
    }

    /// §4.4 sweeper: compares `now - last_heartbeat` against the two
    /// thresholds and advances health state. Returns the set of nodes that
    /// transitioned to DEAD this tick, so the caller (pipeline manager)
    /// can close every pipeline containing them.
    pub fn sweep_health(
        &self,
        now_millis: u64,
        stale_after_millis: u64,
        dead_after_millis: u64,
    ) -> Vec<NodeId> {
        let mut nodes = self.state.nodes.write().expect("node table lock poisoned");
        let mut newly_dead = Vec::new();
        for (id, info) in nodes.by_id.iter_mut() {
            if matches!(info.health, NodeHealth::Decommissioning | NodeHealth::Decommissioned) {
                continue;
            }
            let age = now_millis.saturating_sub(info.last_heartbeat_millis);
            let previous = info.health;
            info.health = if age > dead_after_millis {
                NodeHealth::Dead
            } else if age > stale_after_millis {
                NodeHealth::Stale
            } else {
                NodeHealth::Healthy
            };
            if previous != NodeHealth::Dead && info.health == NodeHealth::Dead {
                newly_dead.push(*id);
            }
        }
        newly_dead
    }

    /// Removes a node after it has spent `grace_period_millis` in DEAD
    /// (§3 "removed only after passing through DEAD and a configurable
    /// grace period").
    pub fn reap_dead_nodes(&self, now_millis: u64, grace_period_millis: u64) -> Vec<NodeId> {
        let mut nodes = self.state.nodes.write().expect("node table lock poisoned");
        let to_remove: Vec<NodeId> = nodes
            .by_id
            .iter()
            .filter(|(_, info)| {
                info.health == NodeHealth::Dead
                    && now_millis.saturating_sub(info.last_heartbeat_millis) > grace_period_millis
            })
            .map(|(id, _)| *id)
            .collect();

        for id in &to_remove {
            if let Some(info) = nodes.by_id.remove(id) {
                nodes.by_hostname.remove(&info.hostname);
                nodes.by_ip.remove(&info.ip_address);
            }
            nodes.command_queues.remove(id);
        }
        to_remove
    }

    pub fn healthy_nodes(&self) -> Vec<NodeId> {
        self.state
            .nodes
            .read()
            .expect("node table lock poisoned")
            .by_id
            .values()
            .filter(|n| n.health.is_usable_for_pipeline_membership())
            .map(|n| n.node_id)
            .collect()
    }

    pub fn get(&self, node_id: NodeId) -> Option<NodeInfo> {
        self.state.nodes.read().expect("node table lock poisoned").by_id.get(&node_id).cloned()
    }

    pub fn list(&self) -> Vec<NodeInfo> {
        self.state.nodes.read().expect("node table lock poisoned").by_id.values().cloned().collect()
    }
}

pub fn min_healthy_volume_num(table: &NodeTable) -> u32 {
    min_healthy_volume_num_fn(table.by_id.values())
}

pub fn min_pipeline_limit(table: &NodeTable, pipelines_per_metadata_volume: u32) -> u32 {
    min_pipeline_limit_fn(table.by_id.values(), pipelines_per_metadata_volume)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scm_directory_ref::StaticDnsToSwitchResolver;
    use scm_types::VolumeType;

    fn details(hostname: &str, ip: &str) -> NodeDetails {
        NodeDetails { node_id: None, hostname: hostname.to_string(), ip_address: ip.to_string(), ports: vec![9860] }
    }

    fn report() -> NodeReport {
        NodeReport {
            volumes: vec![scm_types::StorageVolumeReport {
                capacity_bytes: 100,
                used_bytes: 0,
                remaining_bytes: 100,
                volume_type: VolumeType::Disk,
            }],
            metadata_volume_count: 1,
            healthy_volume_count: 1,
        }
    }

    #[test]
    fn register_is_idempotent_on_the_same_node_id() {
        let state = KernelState::new();
        let manager = NodeManager::new(&state);
        let resolver = CachedDnsToSwitchResolver::new(StaticDnsToSwitchResolver::new());
        let id = NodeId::random();
        let d = details("dn1", "10.0.0.1");

        let first = manager.register(id, &d, &report(), &resolver, 1000).unwrap();
        assert!(!first.already_registered);
        let second = manager.register(id, &d, &report(), &resolver, 2000).unwrap();
        assert!(second.already_registered);

        let info = manager.get(id).unwrap();
        // Second call must not have mutated the heartbeat timestamp —
        // re-registration is a pure no-op (§4.4).
        assert_eq!(info.last_heartbeat_millis, 1000);
    }

    #[test]
    fn heartbeat_from_unknown_node_is_rejected() {
        let state = KernelState::new();
        let manager = NodeManager::new(&state);
        let result = manager.process_heartbeat(NodeId::random(), 1000);
        assert!(matches!(result, Err(ScmError::NotFound(_))));
    }

    #[test]
    fn heartbeat_exactly_at_stale_after_stays_healthy_one_millisecond_past_goes_stale() {
        let state = KernelState::new();
        let manager = NodeManager::new(&state);
        let resolver = CachedDnsToSwitchResolver::new(StaticDnsToSwitchResolver::new());
        let id = NodeId::random();
        manager.register(id, &details("dn1", "10.0.0.1"), &report(), &resolver, 0).unwrap();

        let dead = manager.sweep_health(30_000, 30_000, 120_000);
        assert!(dead.is_empty());
        assert_eq!(manager.get(id).unwrap().health, NodeHealth::Healthy);

        let dead = manager.sweep_health(30_001, 30_000, 120_000);
        assert!(dead.is_empty());
        assert_eq!(manager.get(id).unwrap().health, NodeHealth::Stale);
    }

    #[test]
    fn sweeper_declares_dead_past_the_dead_after_threshold() {
        let state = KernelState::new();
        let manager = NodeManager::new(&state);
        let resolver = CachedDnsToSwitchResolver::new(StaticDnsToSwitchResolver::new());
        let id = NodeId::random();
        manager.register(id, &details("dn1", "10.0.0.1"), &report(), &resolver, 0).unwrap();

        let dead = manager.sweep_health(121_000, 30_000, 120_000);
        assert_eq!(dead, vec![id]);
    }

    #[test]
    fn stale_term_datanode_command_is_dropped() {
        let state = KernelState::new();
        let manager = NodeManager::new(&state);
        let resolver = CachedDnsToSwitchResolver::new(StaticDnsToSwitchResolver::new());
        let id = NodeId::random();
        manager.register(id, &details("dn1", "10.0.0.1"), &report(), &resolver, 0).unwrap();

        manager.add_datanode_command(
            id,
            scm_types::DatanodeCommand::Reregister { term: 1 },
            true,
            5,
            16,
        );
        let drained = manager.process_heartbeat(id, 1).unwrap();
        assert!(drained.is_empty());
    }
}
