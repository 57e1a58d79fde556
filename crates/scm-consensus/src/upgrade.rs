//! Rolling-upgrade gate (§6 `layoutVersion`/`upgradingToLayoutVersion`):
//! a view change must not elect a leader whose on-disk layout version the
//! rest of the group hasn't yet reported compatibility with, so a mixed
//! old/new-binary rollout never has a new-layout leader issuing commands
//! an old-layout follower can't decode.

use std::collections::HashMap;

use crate::types::ReplicaId;

/// What each replica in the group has reported as its current layout
/// version (read from its own `VERSION` file, §6).
#[derive(Debug, Default)]
pub struct UpgradeGate {
    reported: HashMap<ReplicaId, u32>,
}

impl UpgradeGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, replica: ReplicaId, layout_version: u32) {
        self.reported.insert(replica, layout_version);
    }

    /// A view change may proceed once every member of `group` has
    /// reported the *same* layout version — i.e. the rolling upgrade has
    /// finished propagating the binary, not merely started.
    #[must_use]
    pub fn view_change_allowed(&self, group: &[ReplicaId]) -> bool {
        let mut versions = group.iter().filter_map(|id| self.reported.get(id));
        let Some(first) = versions.next() else { return false };
        versions.all(|v| v == first) && self.reported.len() >= group.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_until_every_replica_reports_the_same_version() {
        let mut gate = UpgradeGate::new();
        let group = vec![ReplicaId(0), ReplicaId(1), ReplicaId(2)];
        gate.report(ReplicaId(0), 2);
        gate.report(ReplicaId(1), 2);
        assert!(!gate.view_change_allowed(&group));
        gate.report(ReplicaId(2), 1);
        assert!(!gate.view_change_allowed(&group), "mismatched versions must not allow a view change");
        gate.report(ReplicaId(2), 2);
        assert!(gate.view_change_allowed(&group));
    }
}
