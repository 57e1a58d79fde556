use serde::{Deserialize, Serialize};

use crate::ids::{ClientId, ContainerId, NodeId, PipelineId, SequenceNumber};

/// Tag carried on every submitted payload so the replicated log can route
/// it to the right state manager without knowing its shape (§4.2
/// "Payloads are typed tags ... plus a serialized method name and
/// argument blob"). Mirrors the teacher's single-tagged-command redesign
/// in §9 rather than a class hierarchy of request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandTag {
    Node,
    Pipeline,
    Container,
}

/// One submitted write, addressed to exactly one manager by `tag`. The
/// `method` name plus `argument` blob are interpreted only by that
/// manager's apply-dispatch function (`scm-kernel::runtime`).
///
/// `client_id`/`sequence` are the dedup key §4.2's client-session table
/// uses to make resubmission after a `NotLeader`/`Timeout` idempotent —
/// carrying them in the payload, rather than deriving them from local
/// state at apply time, is what keeps the write deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub tag: CommandTag,
    pub method: String,
    pub argument: Vec<u8>,
    pub client_id: ClientId,
    pub sequence: SequenceNumber,
}

/// Commands the datanode may receive over a heartbeat reply (§6). Each
/// carries the leader term it was issued under; a datanode drops any
/// command whose term is older than one it has already seen for that
/// command type (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DatanodeCommand {
    CreatePipeline { pipeline_id: PipelineId, members: Vec<NodeId>, term: u64 },
    ClosePipeline { pipeline_id: PipelineId, term: u64 },
    CloseContainer { container_id: ContainerId, term: u64 },
    ReplicateContainer { container_id: ContainerId, source_nodes: Vec<NodeId>, term: u64 },
    DeleteContainer { container_id: ContainerId, term: u64 },
    DeleteBlocks { transaction_id: u64, block_ids: Vec<u64>, term: u64 },
    Reregister { term: u64 },
}

impl DatanodeCommand {
    pub fn term(&self) -> u64 {
        match self {
            DatanodeCommand::CreatePipeline { term, .. }
            | DatanodeCommand::ClosePipeline { term, .. }
            | DatanodeCommand::CloseContainer { term, .. }
            | DatanodeCommand::ReplicateContainer { term, .. }
            | DatanodeCommand::DeleteContainer { term, .. }
            | DatanodeCommand::DeleteBlocks { term, .. }
            | DatanodeCommand::Reregister { term, .. } => *term,
        }
    }

    /// Discriminant used to key "last seen term per command type" on the
    /// datanode side (§6).
    pub fn kind_name(&self) -> &'static str {
        match self {
            DatanodeCommand::CreatePipeline { .. } => "CreatePipeline",
            DatanodeCommand::ClosePipeline { .. } => "ClosePipeline",
            DatanodeCommand::CloseContainer { .. } => "CloseContainer",
            DatanodeCommand::ReplicateContainer { .. } => "ReplicateContainer",
            DatanodeCommand::DeleteContainer { .. } => "DeleteContainer",
            DatanodeCommand::DeleteBlocks { .. } => "DeleteBlocks",
            DatanodeCommand::Reregister { .. } => "Reregister",
        }
    }
}
