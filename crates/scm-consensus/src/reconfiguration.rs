//! Consensus-group reconfiguration: adding or removing SCM replicas
//! without downtime. An ambient HA concern the distilled spec doesn't
//! call out by name but that any "set of SCM replicas" (§1) needs to
//! stay operable across replica replacement — distinct from pipeline
//! replication, which is a `replicated_type`/`factor` concept over
//! *datanodes* (§3), not over SCM replicas.
//!
//! Kept deliberately small relative to the teacher's own membership-change
//! protocol: one pending reconfiguration at a time, agreed by the same
//! quorum rule as a view change, committed as an ordinary log entry so
//! group-membership changes replay exactly like any other command.

use serde::{Deserialize, Serialize};

use crate::types::ReplicaId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconfigurationOp {
    AddReplica(ReplicaId),
    RemoveReplica(ReplicaId),
}

/// Tracks one in-flight membership change until it has been acknowledged
/// by a quorum of the *new* group (so a removed replica can't block its
/// own removal, and a freshly added replica doesn't get to vote on its
/// own admission before it has caught up).
#[derive(Debug, Clone)]
pub struct PendingReconfiguration {
    pub op: ReconfigurationOp,
    acks: Vec<ReplicaId>,
}

impl PendingReconfiguration {
    #[must_use]
    pub fn new(op: ReconfigurationOp) -> Self {
        Self { op, acks: Vec::new() }
    }

    pub fn ack(&mut self, from: ReplicaId) {
        if !self.acks.contains(&from) {
            self.acks.push(from);
        }
    }

    #[must_use]
    pub fn resulting_group(&self, current: &[ReplicaId]) -> Vec<ReplicaId> {
        let mut group = current.to_vec();
        match self.op {
            ReconfigurationOp::AddReplica(id) => {
                if !group.contains(&id) {
                    group.push(id);
                }
            }
            ReconfigurationOp::RemoveReplica(id) => group.retain(|member| *member != id),
        }
        group.sort();
        group
    }

    #[must_use]
    pub fn has_quorum(&self, resulting_group_size: usize) -> bool {
        self.acks.len() >= resulting_group_size / 2 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_replica_grows_and_dedups_the_group() {
        let op = ReconfigurationOp::AddReplica(ReplicaId(3));
        let pending = PendingReconfiguration::new(op);
        let group = pending.resulting_group(&[ReplicaId(0), ReplicaId(1), ReplicaId(2)]);
        assert_eq!(group, vec![ReplicaId(0), ReplicaId(1), ReplicaId(2), ReplicaId(3)]);
    }

    #[test]
    fn remove_replica_shrinks_the_group() {
        let op = ReconfigurationOp::RemoveReplica(ReplicaId(1));
        let pending = PendingReconfiguration::new(op);
        let group = pending.resulting_group(&[ReplicaId(0), ReplicaId(1), ReplicaId(2)]);
        assert_eq!(group, vec![ReplicaId(0), ReplicaId(2)]);
    }

    #[test]
    fn quorum_is_computed_against_the_resulting_group_size() {
        let mut pending = PendingReconfiguration::new(ReconfigurationOp::RemoveReplica(ReplicaId(2)));
        pending.ack(ReplicaId(0));
        assert!(!pending.has_quorum(2));
        pending.ack(ReplicaId(1));
        assert!(pending.has_quorum(2));
    }
}
