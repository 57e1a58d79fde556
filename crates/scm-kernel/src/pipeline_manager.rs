use std::collections::BTreeSet;

use scm_directory_ref::{exclusion_set, PlacementPolicy, SameMemberIndex};
use scm_types::{
    NodeId, Pipeline, PipelineId, PipelineState, Result, ReplicationConfig, ScmError,
};
use tracing::{info, warn};

use crate::state::KernelState;

/// Pipeline Manager (§4.5). Like `NodeManager`, carries no state of its
/// own — only the shared `KernelState` and, per call, the placement
/// machinery the caller has already constructed.
pub struct PipelineManager<'a> {
    pub state: &'a KernelState,
}

impl<'a> PipelineManager<'a> {
    pub fn new(state: &'a KernelState) -> Self {
        Self { state }
    }

    /// §4.5 `create`: build the exclusion set, ask the placement policy
    /// for `config.factor` candidates, reject on a same-member-set
    /// collision, and insert the new pipeline in `ALLOCATED`.
    pub fn create(
        &self,
        pipeline_id: PipelineId,
        config: ReplicationConfig,
        healthy_candidates: &[NodeId],
        policy: &dyn PlacementPolicy,
        now_millis: u64,
    ) -> Result<Pipeline> {
        if !config.validate() {
            return Err(ScmError::InvalidArgument(format!(
                "replication config {config:?} is not a supported (type, factor) pair"
            )));
        }

        let pipelines = self.state.pipelines.read().expect("pipeline table lock poisoned");
        let exclude = exclusion_set(pipelines.by_id.values(), config);
        let mut same_member = SameMemberIndex::new();
        same_member.rebuild(pipelines.by_id.values());
        drop(pipelines);

        let members = policy.choose(healthy_candidates, &exclude, config.factor as usize, 0).map_err(|e| {
            warn!(error = %e, "placement policy could not satisfy pipeline creation");
            match e {
                scm_directory_ref::PlacementError::InsufficientDatanodes { needed, available } => {
                    ScmError::InsufficientDatanodes { needed, available }
                }
            }
        })?;

        if same_member.has_open_pipeline_with_members(config, &members) {
            return Err(ScmError::DuplicatePipeline { member_set_hash: scm_types::member_set_hash(&members) });
        }

        let pipeline = Pipeline::new(pipeline_id, config, members, now_millis);
        let mut pipelines = self.state.pipelines.write().expect("pipeline table lock poisoned");
        pipelines.by_id.insert(pipeline_id, pipeline.clone());
        info!(pipeline = %pipeline_id, factor = config.factor, "allocated pipeline");
        Ok(pipeline)
    }

    /// §4.5 `open`: ALLOCATED -> OPEN once every member has ack'd
    /// (modeled here as the caller passing the set of members that
    /// reported `CreatePipeline` success). Marks the same-member index.
    pub fn open(&self, pipeline_id: PipelineId, acked_members: &BTreeSet<NodeId>) -> Result<()> {
        let mut pipelines = self.state.pipelines.write().expect("pipeline table lock poisoned");
        let pipeline = pipelines
            .by_id
            .get_mut(&pipeline_id)
            .ok_or_else(|| ScmError::NotFound(format!("pipeline {pipeline_id}")))?;

        if pipeline.state != PipelineState::Allocated {
            // Idempotent: opening an already-open pipeline is a no-op,
            // matching the container FSM's "already reached" rule even
            // though pipeline state is not rank-ordered.
            if pipeline.state == PipelineState::Open {
                return Ok(());
            }
            return Err(ScmError::InvalidStateTransition {
                from: format!("{:?}", pipeline.state),
                event: "Open".to_string(),
            });
        }

        if !pipeline.members.iter().all(|m| acked_members.contains(m)) {
            return Err(ScmError::InvalidArgument(
                "pipeline cannot open until every member has acknowledged creation".to_string(),
            ));
        }

        pipeline.state = PipelineState::Open;
        info!(pipeline = %pipeline_id, "pipeline opened");
        Ok(())
    }

    /// §4.5 `close`: OPEN/DORMANT -> CLOSED, cascading `Finalize` to every
    /// container still OPEN on this pipeline, which the caller (container
    /// manager) applies — this only drives those containers to CLOSING;
    /// QUASI_CLOSE/CLOSE arrive later from datanode `ReportContainer`
    /// events. Returns the container ids that need cascading so the
    /// runtime can dispatch them in the same apply (§9 Open Question
    /// resolution: close is idempotent from any non-CLOSED state).
    pub fn close(&self, pipeline_id: PipelineId) -> Result<BTreeSet<scm_types::ContainerId>> {
        let mut pipelines = self.state.pipelines.write().expect("pipeline table lock poisoned");
        let pipeline = pipelines
            .by_id
            .get_mut(&pipeline_id)
            .ok_or_else(|| ScmError::NotFound(format!("pipeline {pipeline_id}")))?;

        if pipeline.state == PipelineState::Closed {
            return Ok(BTreeSet::new());
        }

        pipeline.state = PipelineState::Closed;
        info!(pipeline = %pipeline_id, "pipeline closed");
        Ok(pipeline.containers.clone())
    }

    /// §4.5 `deactivate`: OPEN -> DORMANT. Only reachable from OPEN (§9
    /// Open Question: a pipeline still ALLOCATED when asked to close
    /// skips DORMANT entirely and goes straight to CLOSED via `close`).
    pub fn deactivate(&self, pipeline_id: PipelineId) -> Result<()> {
        let mut pipelines = self.state.pipelines.write().expect("pipeline table lock poisoned");
        let pipeline = pipelines
            .by_id
            .get_mut(&pipeline_id)
            .ok_or_else(|| ScmError::NotFound(format!("pipeline {pipeline_id}")))?;

        match pipeline.state {
            PipelineState::Open => {
                pipeline.state = PipelineState::Dormant;
                Ok(())
            }
            PipelineState::Dormant => Ok(()),
            other => Err(ScmError::InvalidStateTransition {
                from: format!("{other:?}"),
                event: "Deactivate".to_string(),
            }),
        }
    }

    /// §4.5 `activate`: DORMANT -> OPEN, the reverse of `deactivate`.
    pub fn activate(&self, pipeline_id: PipelineId) -> Result<()> {
        let mut pipelines = self.state.pipelines.write().expect("pipeline table lock poisoned");
        let pipeline = pipelines
            .by_id
            .get_mut(&pipeline_id)
            .ok_or_else(|| ScmError::NotFound(format!("pipeline {pipeline_id}")))?;

        match pipeline.state {
            PipelineState::Dormant => {
                pipeline.state = PipelineState::Open;
                Ok(())
            }
            PipelineState::Open => Ok(()),
            other => Err(ScmError::InvalidStateTransition {
                from: format!("{other:?}"),
                event: "Activate".to_string(),
            }),
        }
    }

    /// Closes every pipeline that has lost quorum because one or more of
    /// its members just crossed into DEAD (§4.4 sweeper cascade, §8
    /// invariant "a pipeline is CLOSED whenever any member is DEAD").
    pub fn close_pipelines_with_dead_member(
        &self,
        dead_node: NodeId,
    ) -> Vec<(PipelineId, BTreeSet<scm_types::ContainerId>)> {
        let affected: Vec<PipelineId> = {
            let pipelines = self.state.pipelines.read().expect("pipeline table lock poisoned");
            pipelines
                .by_id
                .values()
                .filter(|p| {
                    p.state != PipelineState::Closed && p.members.contains(&dead_node)
                })
                .map(|p| p.pipeline_id)
                .collect()
        };

        let mut result = Vec::new();
        for id in affected {
            match self.close(id) {
                Ok(containers) => result.push((id, containers)),
                Err(err) => warn!(pipeline = %id, error = %err, "failed to close pipeline after dead member"),
            }
        }
        result
    }

    pub fn get(&self, pipeline_id: PipelineId) -> Option<Pipeline> {
        self.state.pipelines.read().expect("pipeline table lock poisoned").by_id.get(&pipeline_id).cloned()
    }

    pub fn list(&self) -> Vec<Pipeline> {
        self.state.pipelines.read().expect("pipeline table lock poisoned").by_id.values().cloned().collect()
    }

    pub fn register_container(&self, pipeline_id: PipelineId, container_id: scm_types::ContainerId) {
        let mut pipelines = self.state.pipelines.write().expect("pipeline table lock poisoned");
        if let Some(p) = pipelines.by_id.get_mut(&pipeline_id) {
            p.containers.insert(container_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scm_directory_ref::RandomPlacementPolicy;

    fn ids(n: u128) -> Vec<NodeId> {
        (1..=n).map(NodeId::from_raw).collect()
    }

    #[test]
    fn create_allocates_with_the_requested_factor() {
        let state = KernelState::new();
        let manager = PipelineManager::new(&state);
        let policy = RandomPlacementPolicy;
        let pipeline = manager
            .create(PipelineId::random(), ReplicationConfig::replicated(3), &ids(5), &policy, 0)
            .unwrap();
        assert_eq!(pipeline.members.len(), 3);
        assert_eq!(pipeline.state, PipelineState::Allocated);
    }

    #[test]
    fn create_with_no_spare_candidates_past_the_exclusion_set_is_insufficient_datanodes() {
        let state = KernelState::new();
        let manager = PipelineManager::new(&state);
        let policy = RandomPlacementPolicy;
        let nodes = ids(3);

        let first = manager
            .create(PipelineId::random(), ReplicationConfig::replicated(3), &nodes, &policy, 0)
            .unwrap();
        let acked: BTreeSet<_> = first.members.iter().copied().collect();
        manager.open(first.pipeline_id, &acked).unwrap();

        // The exclusion set (§4.5 step 1) already removes every member of
        // an OPEN pipeline of the same (type, factor) from the candidate
        // pool, so with only these same three nodes available the
        // placement policy runs out of candidates before the same-member
        // hash check is ever reached.
        let second = manager.create(PipelineId::random(), ReplicationConfig::replicated(3), &nodes, &policy, 0);
        assert!(matches!(second, Err(ScmError::InsufficientDatanodes { .. })));
    }

    #[test]
    fn same_member_index_rejects_an_identical_open_member_set() {
        // Exercises the §3 guard directly: the exclusion set guarantees a
        // freshly-placed member set is always disjoint from any existing
        // OPEN pipeline of the same class, so `create` can never observe
        // this rejection through placement alone. The index itself still
        // has to enforce "no two OPEN pipelines share a member-set hash"
        // for any caller that builds a pipeline by another path.
        let mut index = SameMemberIndex::new();
        let config = ReplicationConfig::replicated(3);
        let members = ids(3);
        index.mark_open(config, scm_types::member_set_hash(&members));
        assert!(index.has_open_pipeline_with_members(config, &members));
    }

    #[test]
    fn close_on_allocated_pipeline_skips_dormant_and_is_idempotent() {
        let state = KernelState::new();
        let manager = PipelineManager::new(&state);
        let policy = RandomPlacementPolicy;
        let pipeline = manager
            .create(PipelineId::random(), ReplicationConfig::replicated(3), &ids(3), &policy, 0)
            .unwrap();

        manager.close(pipeline.pipeline_id).unwrap();
        assert_eq!(manager.get(pipeline.pipeline_id).unwrap().state, PipelineState::Closed);
        // Idempotent: closing twice is not an error.
        manager.close(pipeline.pipeline_id).unwrap();
    }

    #[test]
    fn deactivate_requires_open_not_allocated() {
        let state = KernelState::new();
        let manager = PipelineManager::new(&state);
        let policy = RandomPlacementPolicy;
        let pipeline = manager
            .create(PipelineId::random(), ReplicationConfig::replicated(3), &ids(3), &policy, 0)
            .unwrap();
        let result = manager.deactivate(pipeline.pipeline_id);
        assert!(matches!(result, Err(ScmError::InvalidStateTransition { .. })));
    }
}
