use thiserror::Error;

/// Shared error taxonomy (§7). Every variant is a plain value returned
/// from a state-manager method; only the `Internal`/`Metadata` kinds are
/// fatal, and only on the apply path — `scm-kernel::classification` is
/// the single place that decides that (§4.2 "mid-apply exceptions are
/// classified").
#[derive(Debug, Clone, Error)]
pub enum ScmError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid state transition from {from} on event {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("insufficient datanodes: needed {needed}, available {available}")]
    InsufficientDatanodes { needed: usize, available: usize },

    #[error("not leader{}", .leader_hint.as_ref().map(|h| format!(", suggested leader {h}")).unwrap_or_default())]
    NotLeader { leader_hint: Option<String> },

    #[error("timeout waiting for {0}")]
    Timeout(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("duplicate pipeline: member-set hash {member_set_hash:#x} already has an open pipeline")]
    DuplicatePipeline { member_set_hash: u64 },

    /// Corruption, disk-full, or any other unrecoverable condition hit
    /// while applying a committed command. Fatal: the apply task logs,
    /// flushes what it can, and terminates the process (§7).
    #[error("internal error: {0}")]
    Internal(String),

    /// Same fatality as `Internal`, split out because metadata corruption
    /// specifically should prompt an operator toward a snapshot-restore
    /// runbook rather than a generic crash-loop investigation.
    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("security initialization failed: {0}")]
    SecurityInitFailed(String),
}

impl ScmError {
    /// §7: only these two kinds terminate the process; everything else
    /// propagates to the RPC layer as a response code.
    pub fn is_fatal_on_apply(&self) -> bool {
        matches!(self, ScmError::Internal(_) | ScmError::Metadata(_))
    }

    /// §7 admin-CLI exit codes: 0 success, 1 validation, 2 timeout,
    /// 3 not-leader, 4 fatal.
    pub fn exit_code(&self) -> i32 {
        match self {
            ScmError::NotFound(_)
            | ScmError::AlreadyExists(_)
            | ScmError::InvalidStateTransition { .. }
            | ScmError::InsufficientDatanodes { .. }
            | ScmError::InvalidArgument(_)
            | ScmError::DuplicatePipeline { .. }
            | ScmError::Conflict(_) => 1,
            ScmError::Timeout(_) => 2,
            ScmError::NotLeader { .. } => 3,
            ScmError::Internal(_) | ScmError::Metadata(_) | ScmError::SecurityInitFailed(_) => 4,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScmError>;
