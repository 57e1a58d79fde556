use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::{NodeId, PipelineId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReplicationType {
    /// Factor is always 1.
    SingleCopy,
    Replicated,
}

/// (type, factor) pair that identifies a placement class (§3, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicationConfig {
    pub replication_type: ReplicationType,
    pub factor: u8,
}

impl ReplicationConfig {
    pub fn single_copy() -> Self {
        Self { replication_type: ReplicationType::SingleCopy, factor: 1 }
    }

    pub fn replicated(factor: u8) -> Self {
        Self { replication_type: ReplicationType::Replicated, factor }
    }

    pub fn validate(self) -> bool {
        match self.replication_type {
            ReplicationType::SingleCopy => self.factor == 1,
            ReplicationType::Replicated => self.factor == 1 || self.factor == 3,
        }
    }
}

/// Pipeline lifecycle state (§3, §4.5). Rank order below is used only for
/// readability in logs; transitions are validated by explicit match arms
/// in `scm-kernel`, not by rank comparison (unlike container state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Allocated,
    Open,
    Dormant,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub pipeline_id: PipelineId,
    pub config: ReplicationConfig,
    /// Leader first for a replicated pipeline; single entry for
    /// single-copy.
    pub members: Vec<NodeId>,
    pub state: PipelineState,
    pub created_at_millis: u64,
    pub member_set_hash: u64,
    /// Containers this manager's index believes live on this pipeline.
    /// Maintained by the Container Manager, persisted alongside the
    /// pipeline record for crash recovery of the reverse index.
    pub containers: BTreeSet<crate::ids::ContainerId>,
}

impl Pipeline {
    pub fn new(
        pipeline_id: PipelineId,
        config: ReplicationConfig,
        members: Vec<NodeId>,
        created_at_millis: u64,
    ) -> Self {
        debug_assert_eq!(members.len(), config.factor as usize);
        let hash = member_set_hash(&members);
        Self {
            pipeline_id,
            config,
            members,
            state: PipelineState::Allocated,
            created_at_millis,
            member_set_hash: hash,
            containers: BTreeSet::new(),
        }
    }

    pub fn leader(&self) -> Option<NodeId> {
        self.members.first().copied()
    }

    pub fn members_distinct(&self) -> bool {
        let set: BTreeSet<_> = self.members.iter().collect();
        set.len() == self.members.len()
    }
}

/// Stable hash of the sorted member-id set (§3, §4.5 "same-node placement
/// hash"). Used to detect "is this a rebuild of an existing logical
/// pipeline" and to enforce "no two OPEN pipelines with an identical
/// member set" for a given (type, factor).
///
/// Deterministic and independent of input order, so it can be computed
/// identically on every replica regardless of how the caller happened to
/// order the member list.
pub fn member_set_hash(members: &[NodeId]) -> u64 {
    let mut sorted: Vec<u128> = members.iter().map(|n| n.as_u128()).collect();
    sorted.sort_unstable();

    // FNV-1a over the sorted, fixed-width member ids. Cheap, deterministic
    // across platforms and across Rust's un-seeded-by-default `Hash` impls
    // (which `std::collections::hash_map::DefaultHasher` explicitly does
    // not guarantee to be stable across versions).
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    for id in sorted {
        for byte in id.to_le_bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(PRIME);
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_set_hash_is_order_independent() {
        let a = NodeId::from_raw(1);
        let b = NodeId::from_raw(2);
        let c = NodeId::from_raw(3);
        assert_eq!(member_set_hash(&[a, b, c]), member_set_hash(&[c, a, b]));
        assert_ne!(member_set_hash(&[a, b, c]), member_set_hash(&[a, b]));
    }
}
