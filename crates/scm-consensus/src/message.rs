//! VSR protocol messages (§4.2).
//!
//! ## Normal operation
//! - [`Prepare`] leader -> backup: replicate this entry.
//! - [`PrepareOk`] backup -> leader: persisted, you may count my vote.
//! - [`Commit`] leader -> backup: everything up to here is committed.
//! - [`Heartbeat`] leader -> backup: liveness, resets the backup's timer.
//!
//! ## View change
//! - [`StartViewChange`] backup -> all: I suspect the leader is down.
//! - [`DoViewChange`] backup -> new leader: here is my log tail.
//! - [`StartView`] new leader -> all: the new view is live.
//!
//! ## Repair & snapshot install
//! - [`RepairRequest`]/[`RepairResponse`]/[`Nack`]: gap-filling for a
//!   replica that missed committed prepares.
//! - [`StateTransferRequest`]/[`StateTransferResponse`]: `install_snapshot`
//!   (§4.2) for a replica too far behind to repair.

use serde::{Deserialize, Serialize};

use crate::types::{CommitNumber, LogEntry, OpNumber, ReplicaId, ViewNumber};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prepare {
    pub view: ViewNumber,
    pub op_number: OpNumber,
    pub commit_number: CommitNumber,
    pub entry: LogEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareOk {
    pub view: ViewNumber,
    pub op_number: OpNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub view: ViewNumber,
    pub commit_number: CommitNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub view: ViewNumber,
    pub commit_number: CommitNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartViewChange {
    pub view: ViewNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoViewChange {
    pub view: ViewNumber,
    pub log_tail: Vec<LogEntry>,
    pub last_normal_view: ViewNumber,
    pub op_number: OpNumber,
    pub commit_number: CommitNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartView {
    pub view: ViewNumber,
    pub log_tail: Vec<LogEntry>,
    pub op_number: OpNumber,
    pub commit_number: CommitNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairRequest {
    pub view: ViewNumber,
    pub from_op: OpNumber,
    pub to_op: OpNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairResponse {
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nack {
    pub op_number: OpNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransferRequest {
    pub known_index: OpNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransferResponse {
    pub index: OpNumber,
    pub term: ViewNumber,
    /// Encoded checkpoint files (§4.1 "whole-store consistent
    /// checkpoint"). Transport-agnostic: `scm-server` is responsible for
    /// streaming these over the cluster-internal snapshot transport;
    /// here they are just bytes.
    pub checkpoint_files: Vec<(String, Vec<u8>)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessagePayload {
    Prepare(Prepare),
    PrepareOk(PrepareOk),
    Commit(Commit),
    Heartbeat(Heartbeat),
    StartViewChange(StartViewChange),
    DoViewChange(DoViewChange),
    StartView(StartView),
    RepairRequest(RepairRequest),
    RepairResponse(RepairResponse),
    Nack(Nack),
    StateTransferRequest(StateTransferRequest),
    StateTransferResponse(StateTransferResponse),
}

/// Envelope carrying routing information alongside the payload. `to ==
/// None` is a broadcast to every other replica in the group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub from: ReplicaId,
    pub to: Option<ReplicaId>,
    pub payload: MessagePayload,
}

impl Message {
    #[must_use]
    pub fn targeted(from: ReplicaId, to: ReplicaId, payload: MessagePayload) -> Self {
        Self { from, to: Some(to), payload }
    }

    #[must_use]
    pub fn broadcast(from: ReplicaId, payload: MessagePayload) -> Self {
        Self { from, to: None, payload }
    }

    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.to.is_none()
    }
}
