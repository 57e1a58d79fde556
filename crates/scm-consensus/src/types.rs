//! Plain numeric/identifier types shared by every VSR message and the
//! replica state machine. No I/O, no clock reads — kept pure so the
//! replica logic (`replica/*.rs`) stays a deterministic function of
//! `(state, event) -> (state, outputs)`.

use serde::{Deserialize, Serialize};
use std::fmt;

use scm_types::Command;

/// Identifies one SCM replica within the consensus group. Indices, not
/// random ids — the group membership (§4.2 reconfiguration) is a small,
/// explicitly-ordered list every replica agrees on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaId(pub u8);

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replica-{}", self.0)
    }
}

/// The current view (leader epoch). `leader_for(view, group_size)` is the
/// standard VSR `view mod group_size` leader assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct ViewNumber(pub u64);

impl ViewNumber {
    #[must_use]
    pub fn leader(self, group_size: usize) -> ReplicaId {
        ReplicaId((self.0 % group_size as u64) as u8)
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Position of an entry in the log; strictly increasing, gap-free once
/// committed (§4.2 "Ordering: strict, single-threaded apply").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct OpNumber(pub u64);

impl OpNumber {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// The highest op number known to be committed on a majority. `apply`
/// (§4.2) only ever advances through committed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct CommitNumber(pub u64);

/// Phase a replica believes itself to be in. `Recovering`/`Standby` map to
/// §4.2's `install_snapshot` path; everything else is normal-operation or
/// view-change bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaStatus {
    Normal,
    ViewChange,
    Recovering,
    Standby,
}

/// One slot in the replicated log: the command plus the view/op it was
/// prepared under. Snapshot-truncated entries are dropped once
/// `take_snapshot` has persisted their effect (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub op_number: OpNumber,
    pub view: ViewNumber,
    pub command: Command,
}
