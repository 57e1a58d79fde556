use serde::{Deserialize, Serialize};

use crate::error::ScmError;
use crate::ids::{ContainerId, NodeId};
use crate::pipeline::ReplicationConfig;
use crate::pipeline::PipelineId;

/// Container lifecycle state (§4.6). Rank order is load-bearing: the FSM's
/// self-loop rule ("every event is a no-op when the target state has
/// already been reached or passed") is implemented as a rank comparison,
/// not a special case per state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContainerState {
    Open = 0,
    Closing = 1,
    QuasiClosed = 2,
    Closed = 3,
    Deleting = 4,
    Deleted = 5,
}

impl ContainerState {
    fn rank(self) -> u8 {
        self as u8
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ContainerState::Closed | ContainerState::Deleted)
    }
}

/// Events accepted by the container lifecycle FSM (§4.6, exhaustive table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerEvent {
    Finalize,
    QuasiClose,
    Close,
    ForceClose,
    Delete,
    Cleanup,
}

impl ContainerEvent {
    /// The state this event drives a container *to* when applied from its
    /// one valid source state.
    fn target(self) -> ContainerState {
        match self {
            ContainerEvent::Finalize => ContainerState::Closing,
            ContainerEvent::QuasiClose => ContainerState::QuasiClosed,
            ContainerEvent::Close => ContainerState::Closed,
            ContainerEvent::ForceClose => ContainerState::Closed,
            ContainerEvent::Delete => ContainerState::Deleting,
            ContainerEvent::Cleanup => ContainerState::Deleted,
        }
    }

    /// The one state this event is valid from, per the exhaustive
    /// transition table in §4.6.
    fn valid_source(self) -> ContainerState {
        match self {
            ContainerEvent::Finalize => ContainerState::Open,
            ContainerEvent::QuasiClose | ContainerEvent::Close => ContainerState::Closing,
            ContainerEvent::ForceClose => ContainerState::QuasiClosed,
            ContainerEvent::Delete => ContainerState::Closed,
            ContainerEvent::Cleanup => ContainerState::Deleting,
        }
    }
}

/// Applies `event` to `state`, returning the new state.
///
/// Self-loops are idempotent no-ops: if `state` already equals or has
/// passed the event's target rank, the call returns `Ok(state)` unchanged
/// (§4.6 "every event is accepted as a no-op when the target state is
/// already reached or has been passed"). Otherwise the event must apply
/// from its single valid source state or the transition is rejected.
///
/// `ForceClose` applied directly from `OPEN` is the canonical rejected
/// case from §8's boundary behaviors: `OPEN`'s rank (0) is below
/// `ForceClose`'s source rank (`QuasiClosed` = 2) and below its own
/// target rank (`Closed` = 3), so it is neither a no-op nor a valid
/// source match, and `InvalidStateTransition` is returned.
pub fn transition(state: ContainerState, event: ContainerEvent) -> Result<ContainerState, ScmError> {
    let target = event.target();
    if state.rank() >= target.rank() {
        return Ok(state);
    }
    if state == event.valid_source() {
        return Ok(target);
    }
    Err(ScmError::InvalidStateTransition {
        from: format!("{state:?}"),
        event: format!("{event:?}"),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub container_id: ContainerId,
    pub pipeline_id: PipelineId,
    pub state: ContainerState,
    pub used_bytes: u64,
    pub key_count: u64,
    pub state_entered_at_millis: u64,
    pub owner: String,
    pub replication: ReplicationConfig,
    pub delete_transaction_id: u64,
}

impl ContainerInfo {
    pub fn new(
        container_id: ContainerId,
        pipeline_id: PipelineId,
        owner: String,
        replication: ReplicationConfig,
        now_millis: u64,
    ) -> Self {
        Self {
            container_id,
            pipeline_id,
            state: ContainerState::Open,
            used_bytes: 0,
            key_count: 0,
            state_entered_at_millis: now_millis,
            owner,
            replication,
            delete_transaction_id: 0,
        }
    }

    pub fn apply_event(&mut self, event: ContainerEvent, now_millis: u64) -> Result<(), ScmError> {
        let next = transition(self.state, event)?;
        if next != self.state {
            self.state = next;
            self.state_entered_at_millis = now_millis;
        }
        Ok(())
    }

    pub fn has_free_capacity(&self, size: u64, max_container_size: u64) -> bool {
        self.state == ContainerState::Open && self.used_bytes.saturating_add(size) <= max_container_size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaReportedState {
    Open,
    Closing,
    QuasiClosed,
    Closed,
    Unhealthy,
}

/// Physical replica record (§3 `ContainerReplica`). Purely derived from
/// datanode reports: never persisted in the replicated log, rebuilt from
/// `ReportContainer` RPCs on every restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerReplica {
    pub container_id: ContainerId,
    pub node_id: NodeId,
    pub reported_state: ReplicaReportedState,
    pub bytes_used: u64,
    pub key_count: u64,
    pub last_seen_millis: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ContainerState::Open, ContainerEvent::Finalize => Ok(ContainerState::Closing))]
    #[test_case(ContainerState::Closing, ContainerEvent::QuasiClose => Ok(ContainerState::QuasiClosed))]
    #[test_case(ContainerState::Closing, ContainerEvent::Close => Ok(ContainerState::Closed))]
    #[test_case(ContainerState::QuasiClosed, ContainerEvent::ForceClose => Ok(ContainerState::Closed))]
    #[test_case(ContainerState::Closed, ContainerEvent::Delete => Ok(ContainerState::Deleting))]
    #[test_case(ContainerState::Deleting, ContainerEvent::Cleanup => Ok(ContainerState::Deleted))]
    fn valid_transitions(state: ContainerState, event: ContainerEvent) -> Result<ContainerState, ScmError> {
        transition(state, event)
    }

    #[test]
    fn force_close_from_open_is_rejected() {
        let result = transition(ContainerState::Open, ContainerEvent::ForceClose);
        assert!(matches!(result, Err(ScmError::InvalidStateTransition { .. })));
    }

    #[test]
    fn repeated_finalize_is_idempotent_no_op() {
        let once = transition(ContainerState::Open, ContainerEvent::Finalize).unwrap();
        let twice = transition(once, ContainerEvent::Finalize).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn finalize_after_closed_is_a_no_op_not_an_error() {
        let result = transition(ContainerState::Closed, ContainerEvent::Finalize);
        assert_eq!(result.unwrap(), ContainerState::Closed);
    }

    #[test]
    fn rank_is_monotone_non_decreasing_across_every_valid_event() {
        let events = [
            ContainerEvent::Finalize,
            ContainerEvent::QuasiClose,
            ContainerEvent::Close,
        ];
        let mut state = ContainerState::Open;
        for event in events {
            let next = transition(state, event);
            if let Ok(next) = next {
                assert!(next.rank() >= state.rank());
                state = next;
            }
        }
    }
}
