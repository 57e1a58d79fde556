//! Standby / snapshot install (§4.2 `install_snapshot`): a replica too
//! far behind to repair (the leader's log has been truncated past its
//! last-applied index, §8 scenario 5) abandons log-replay and downloads a
//! checkpoint instead.

use crate::message::{MessagePayload, StateTransferRequest, StateTransferResponse};
use crate::types::{OpNumber, ReplicaId, ReplicaStatus, ViewNumber};

use super::{msg_to, Replica, ReplicaOutput};

pub(super) fn on_state_transfer_request(
    replica: &mut Replica,
    from: ReplicaId,
    _request: StateTransferRequest,
) -> ReplicaOutput {
    let mut out = ReplicaOutput::default();
    // Only a replica that has actually taken a snapshot (§4.1 checkpoint)
    // can serve this; the caller of `Replica::step` is expected to have
    // called `take_snapshot` first and supply the resulting files through
    // `scm-kv`'s checkpoint API. This protocol-state layer only frames
    // the response; `scm-server` fills in real checkpoint bytes from the
    // KV store when wiring this onto the network.
    out.messages.push(msg_to(
        replica.id,
        from,
        MessagePayload::StateTransferResponse(StateTransferResponse {
            index: OpNumber(replica.commit_number.0),
            term: replica.view,
            checkpoint_files: Vec::new(),
        }),
    ));
    out
}

/// Applied by the caller once it has atomically swapped in the
/// checkpoint files named in the response (§4.1: a whole-store consistent
/// checkpoint usable for bulk transfer). Resumes applying at
/// `index + 1`, never regressing the snapshot index (§4.2 "Snapshot
/// index must never decrease").
pub(super) fn on_state_transfer_response(replica: &mut Replica, response: StateTransferResponse) -> ReplicaOutput {
    let mut out = ReplicaOutput::default();
    if response.index.0 <= replica.commit_number.0 {
        return out; // stale snapshot, ignore (never regress)
    }
    replica.commit_number = crate::types::CommitNumber(response.index.0);
    replica.op_number = response.index;
    replica.applied_index = response.index.0;
    replica.view = ViewNumber(replica.view.0.max(response.term.0));
    replica.status = ReplicaStatus::Normal;
    // The log itself is truncated: everything before the snapshot index
    // is represented only by the KV store's restored state from here on.
    replica.log.retain(|e| e.op_number.0 > response.index.0);
    out
}
