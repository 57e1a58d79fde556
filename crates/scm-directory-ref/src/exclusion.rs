use std::collections::{BTreeMap, BTreeSet};

use scm_types::{NodeId, Pipeline, PipelineState, ReplicationConfig, member_set_hash};

/// §4.5 step 1: "Build the exclusion set = union of NodeIds in all
/// ALLOCATED/OPEN/DORMANT pipelines of this (type, factor)." A single
/// node may otherwise end up in an unbounded number of open pipelines.
pub fn exclusion_set<'a>(
    pipelines: impl IntoIterator<Item = &'a Pipeline>,
    config: ReplicationConfig,
) -> BTreeSet<NodeId> {
    pipelines
        .into_iter()
        .filter(|p| p.config == config && counts_toward_exclusion(p.state))
        .flat_map(|p| p.members.iter().copied())
        .collect()
}

fn counts_toward_exclusion(state: PipelineState) -> bool {
    matches!(state, PipelineState::Allocated | PipelineState::Open | PipelineState::Dormant)
}

/// Tracks, per (type, factor), which member-set hashes currently have an
/// OPEN pipeline — the index §4.5 consults to reject "no two OPEN
/// pipelines with identical sorted-NodeIds hash" (§3 invariant, §8
/// "their member-set hashes differ").
#[derive(Debug, Default)]
pub struct SameMemberIndex {
    open_hashes: BTreeMap<ReplicationConfig, BTreeSet<u64>>,
}

impl SameMemberIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild<'a>(&mut self, pipelines: impl IntoIterator<Item = &'a Pipeline>) {
        self.open_hashes.clear();
        for pipeline in pipelines {
            if pipeline.state == PipelineState::Open {
                self.open_hashes.entry(pipeline.config).or_default().insert(pipeline.member_set_hash);
            }
        }
    }

    pub fn has_open_pipeline_with_members(&self, config: ReplicationConfig, members: &[NodeId]) -> bool {
        let hash = member_set_hash(members);
        self.open_hashes.get(&config).is_some_and(|hashes| hashes.contains(&hash))
    }

    pub fn mark_open(&mut self, config: ReplicationConfig, hash: u64) {
        self.open_hashes.entry(config).or_default().insert(hash);
    }

    pub fn mark_closed(&mut self, config: ReplicationConfig, hash: u64) {
        if let Some(hashes) = self.open_hashes.get_mut(&config) {
            hashes.remove(&hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scm_types::PipelineId;

    fn pipeline(id: u128, members: Vec<NodeId>, state: PipelineState) -> Pipeline {
        let mut p = Pipeline::new(PipelineId::from_raw(id), ReplicationConfig::replicated(3), members, 0);
        p.state = state;
        p
    }

    #[test]
    fn exclusion_set_only_counts_non_closed_pipelines_of_the_same_class() {
        let a = NodeId::from_raw(1);
        let b = NodeId::from_raw(2);
        let c = NodeId::from_raw(3);
        let closed = pipeline(1, vec![a, b, c], PipelineState::Closed);
        let open = pipeline(2, vec![b], PipelineState::Open);
        let excluded = exclusion_set([&closed, &open], ReplicationConfig::replicated(3));
        assert!(!excluded.contains(&a));
        assert!(excluded.contains(&b));
    }

    #[test]
    fn same_member_index_detects_duplicate_open_pipelines() {
        let a = NodeId::from_raw(1);
        let b = NodeId::from_raw(2);
        let c = NodeId::from_raw(3);
        let p = pipeline(1, vec![a, b, c], PipelineState::Open);

        let mut index = SameMemberIndex::new();
        index.rebuild([&p]);

        let config = ReplicationConfig::replicated(3);
        assert!(index.has_open_pipeline_with_members(config, &[c, b, a]));
        assert!(!index.has_open_pipeline_with_members(config, &[a, b]));
    }
}
