//! Repair (§4.2): gap-filling for a replica that missed one or more
//! committed prepares, requested from peers by op-number range. Bounded
//! by `crate::repair_budget::RepairBudget` so one lagging replica can't
//! saturate the cluster-internal transport (§5).

use crate::message::{MessagePayload, Nack, RepairRequest, RepairResponse};
use crate::types::ReplicaId;

use super::{msg_to, Replica, ReplicaOutput};

pub(super) fn on_repair_request(replica: &mut Replica, from: ReplicaId, request: RepairRequest) -> ReplicaOutput {
    let mut out = ReplicaOutput::default();
    if request.view > replica.view {
        return out; // we're behind too, nothing useful to offer
    }
    let entries: Vec<_> = replica
        .log
        .iter()
        .filter(|e| e.op_number.0 >= request.from_op.0 && e.op_number.0 <= request.to_op.0)
        .cloned()
        .collect();
    if entries.is_empty() {
        out.messages.push(msg_to(replica.id, from, MessagePayload::Nack(Nack { op_number: request.from_op })));
    } else {
        out.messages.push(msg_to(replica.id, from, MessagePayload::RepairResponse(RepairResponse { entries })));
    }
    out
}

pub(super) fn on_repair_response(replica: &mut Replica, response: RepairResponse, local_millis: u64) -> ReplicaOutput {
    let mut out = ReplicaOutput::default();
    for entry in response.entries {
        replica.repair_budget.release();
        if entry.op_number.0 == replica.op_number.0 + 1 {
            replica.op_number = entry.op_number;
            replica.log.push(entry);
        }
    }
    if let Err(error) = replica.drain_apply(local_millis).map(|applied| out.newly_committed.extend(applied)) {
        scm_kernel::classification::handle_fatal(&error, &scm_kernel::classification::RealProcessExit);
    }
    out
}

pub(super) fn on_nack(replica: &mut Replica, _from: ReplicaId, nack: Nack) -> ReplicaOutput {
    replica.repair_budget.release();
    // A Nack means that peer doesn't have the range either; the caller's
    // retry policy (driven by `scm-cluster-dev`'s harness or
    // `scm-server`'s transport) picks another peer. Nothing to do here
    // beyond freeing the budget slot this request held.
    let _ = nack.op_number;
    ReplicaOutput::default()
}
