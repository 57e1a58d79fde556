use scm_types::{ContainerState, PipelineState, ReplicationType, SafeModeStatus};
use tracing::info;

use crate::node_manager::NodeManager;
use crate::state::KernelState;

/// One safe-mode admission rule (§4.7): `refresh` recomputes whatever the
/// rule tracks against the current state, `validate` reports whether the
/// rule is currently satisfied, `status_text` renders a one-line operator
/// message. Split so the controller can hold a heterogeneous set of rules
/// behind a trait object.
pub trait SafeModeRule: Send + Sync {
    fn refresh(&mut self, state: &KernelState);
    fn validate(&self) -> bool;
    fn status_text(&self) -> String;
    /// Pre-check rules gate `pre_check_complete`; non-pre-check rules only
    /// gate the final `in_safe_mode = false` flip.
    fn is_pre_check(&self) -> bool;
}

/// At least `min_dn` nodes have registered. Pre-check.
pub struct MinDatanodesRule {
    min_dn: usize,
    registered: usize,
}

impl MinDatanodesRule {
    pub fn new(min_dn: usize) -> Self {
        Self { min_dn, registered: 0 }
    }
}

impl SafeModeRule for MinDatanodesRule {
    fn refresh(&mut self, state: &KernelState) {
        // Registration count, not health: a node counts toward min_dn the
        // moment it registers, before its first heartbeat.
        self.registered = state.nodes.read().expect("node table lock poisoned").by_id.len();
    }

    fn validate(&self) -> bool {
        self.registered >= self.min_dn
    }

    fn status_text(&self) -> String {
        format!("MinDatanodesRule: {}/{} datanodes registered", self.registered, self.min_dn)
    }

    fn is_pre_check(&self) -> bool {
        true
    }
}

/// At least `container_threshold` (e.g. 0.99) of known containers have at
/// least one reported replica. Vacuously true with zero containers (§8
/// scenario: a fresh cluster with no containers flips out of safe mode on
/// the container rule alone).
pub struct ContainerReplicaRule {
    threshold: f64,
    satisfied_fraction: f64,
}

impl ContainerReplicaRule {
    pub fn new(threshold: f64) -> Self {
        Self { threshold, satisfied_fraction: 1.0 }
    }
}

impl SafeModeRule for ContainerReplicaRule {
    fn refresh(&mut self, state: &KernelState) {
        let containers = state.containers.read().expect("container table lock poisoned");
        let total = containers.by_id.len();
        if total == 0 {
            self.satisfied_fraction = 1.0;
            return;
        }
        let with_replica = containers
            .by_id
            .keys()
            .filter(|id| containers.replicas.keys().any(|(c, _)| c == *id))
            .count();
        self.satisfied_fraction = with_replica as f64 / total as f64;
    }

    fn validate(&self) -> bool {
        self.satisfied_fraction >= self.threshold
    }

    fn status_text(&self) -> String {
        format!(
            "ContainerReplicaRule: {:.2}% of containers reported (threshold {:.2}%)",
            self.satisfied_fraction * 100.0,
            self.threshold * 100.0
        )
    }

    fn is_pre_check(&self) -> bool {
        false
    }
}

/// ≥ `pipeline_threshold` of replicated pipelines are OPEN with a full
/// member set. Optional (§4.7), so the controller only registers it when
/// `safe_mode.pipeline_availability_check` is enabled.
pub struct HealthyPipelineRule {
    threshold: f64,
    satisfied_fraction: f64,
}

impl HealthyPipelineRule {
    pub fn new(threshold: f64) -> Self {
        Self { threshold, satisfied_fraction: 1.0 }
    }
}

impl SafeModeRule for HealthyPipelineRule {
    fn refresh(&mut self, state: &KernelState) {
        let pipelines = state.pipelines.read().expect("pipeline table lock poisoned");
        let replicated: Vec<_> = pipelines
            .by_id
            .values()
            .filter(|p| p.config.replication_type == ReplicationType::Replicated)
            .collect();
        if replicated.is_empty() {
            self.satisfied_fraction = 1.0;
            return;
        }
        let healthy = replicated
            .iter()
            .filter(|p| p.state == PipelineState::Open && p.members.len() == p.config.factor as usize)
            .count();
        self.satisfied_fraction = healthy as f64 / replicated.len() as f64;
    }

    fn validate(&self) -> bool {
        self.satisfied_fraction >= self.threshold
    }

    fn status_text(&self) -> String {
        format!(
            "HealthyPipelineRule: {:.2}% of replicated pipelines OPEN with full membership",
            self.satisfied_fraction * 100.0
        )
    }

    fn is_pre_check(&self) -> bool {
        false
    }
}

/// Every replicated pipeline has at least one member reporting in. Optional.
pub struct OneReplicaPipelineRule {
    all_satisfied: bool,
}

impl Default for OneReplicaPipelineRule {
    fn default() -> Self {
        Self { all_satisfied: true }
    }
}

impl SafeModeRule for OneReplicaPipelineRule {
    fn refresh(&mut self, state: &KernelState) {
        let pipelines = state.pipelines.read().expect("pipeline table lock poisoned");
        let nodes = state.nodes.read().expect("node table lock poisoned");
        self.all_satisfied = pipelines
            .by_id
            .values()
            .filter(|p| p.config.replication_type == ReplicationType::Replicated)
            .all(|p| p.members.iter().any(|m| nodes.by_id.contains_key(m)));
    }

    fn validate(&self) -> bool {
        self.all_satisfied
    }

    fn status_text(&self) -> String {
        format!("OneReplicaPipelineRule: all replicated pipelines have a reporting member: {}", self.all_satisfied)
    }

    fn is_pre_check(&self) -> bool {
        false
    }
}

/// Orchestrates the rule set and owns the monotone `SafeModeStatus` flip
/// (§4.7). Re-evaluated after every report that could satisfy a rule; never
/// regresses `in_safe_mode` back to `true` once it has gone `false`.
pub struct SafeModeController {
    rules: Vec<Box<dyn SafeModeRule>>,
}

impl SafeModeController {
    pub fn new(rules: Vec<Box<dyn SafeModeRule>>) -> Self {
        Self { rules }
    }

    /// Re-evaluates every rule and applies the monotone flip logic, returning
    /// `Some(new_status)` only when the status actually changed this call —
    /// callers use that to decide whether to emit `Effect::SafeModeStatusChanged`.
    pub fn refresh(&mut self, state: &KernelState) -> Option<SafeModeStatus> {
        for rule in &mut self.rules {
            rule.refresh(state);
        }

        let mut status = state.safe_mode.write().expect("safe-mode lock poisoned");

        let pre_check_ok = self.rules.iter().filter(|r| r.is_pre_check()).all(|r| r.validate());
        let all_ok = self.rules.iter().all(|r| r.validate());

        let changed = status.advance(pre_check_ok, !all_ok);
        let next = *status;
        drop(status);

        if changed {
            info!(
                in_safe_mode = next.in_safe_mode,
                pre_check_complete = next.pre_check_complete,
                "safe-mode status changed"
            );
            for rule in &self.rules {
                info!("{}", rule.status_text());
            }
            Some(next)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scm_directory_ref::{CachedDnsToSwitchResolver, StaticDnsToSwitchResolver};
    use scm_types::{NodeDetails, NodeReport, StorageVolumeReport, VolumeType};

    fn details(n: u8) -> NodeDetails {
        NodeDetails {
            node_id: None,
            hostname: format!("dn{n}"),
            ip_address: format!("10.0.0.{n}"),
            ports: vec![9860],
        }
    }

    fn report() -> NodeReport {
        NodeReport {
            volumes: vec![StorageVolumeReport { capacity_bytes: 100, used_bytes: 0, remaining_bytes: 100, volume_type: VolumeType::Disk }],
            metadata_volume_count: 1,
            healthy_volume_count: 1,
        }
    }

    #[test]
    fn fresh_cluster_with_zero_containers_flips_out_of_safe_mode_after_min_dn_met() {
        let state = KernelState::new();
        let mut controller = SafeModeController::new(vec![
            Box::new(MinDatanodesRule::new(3)),
            Box::new(ContainerReplicaRule::new(0.99)),
        ]);
        let resolver = CachedDnsToSwitchResolver::new(StaticDnsToSwitchResolver::new());
        let node_manager = NodeManager::new(&state);

        controller.refresh(&state);
        assert!(state.safe_mode.read().unwrap().in_safe_mode);
        assert!(!state.safe_mode.read().unwrap().pre_check_complete);

        node_manager.register(scm_types::NodeId::random(), &details(1), &report(), &resolver, 0).unwrap();
        controller.refresh(&state);
        assert!(!state.safe_mode.read().unwrap().pre_check_complete);

        node_manager.register(scm_types::NodeId::random(), &details(2), &report(), &resolver, 0).unwrap();
        node_manager.register(scm_types::NodeId::random(), &details(3), &report(), &resolver, 0).unwrap();
        let changed = controller.refresh(&state);
        let status = changed.expect("status must have changed on the third registration");
        assert!(status.pre_check_complete);
        assert!(!status.in_safe_mode, "zero containers vacuously satisfies the container rule");
    }

    #[test]
    fn status_never_regresses_once_out_of_safe_mode() {
        let state = KernelState::new();
        state.safe_mode.write().unwrap().advance(true, false);
        assert!(!state.safe_mode.read().unwrap().in_safe_mode);

        let mut controller = SafeModeController::new(vec![Box::new(MinDatanodesRule::new(10))]);
        controller.refresh(&state);
        assert!(!state.safe_mode.read().unwrap().in_safe_mode, "must not flip back into safe mode");
    }
}
