//! Normal-operation sub-protocol (§4.2): leader accepts `submit`,
//! prepares to backups, commits on a quorum of `PrepareOk`, applies in
//! strict log-index order.

use scm_types::{Command, ScmError};

use crate::message::{Commit, Heartbeat, MessagePayload, Prepare, PrepareOk};
use crate::types::{CommitNumber, LogEntry, ReplicaId, ReplicaStatus};

use super::{msg_broadcast, msg_to, Replica, ReplicaOutput};

pub(super) fn on_client_submit(replica: &mut Replica, command: Command, local_millis: u64) -> ReplicaOutput {
    let mut out = ReplicaOutput::default();
    if !replica.is_leader() {
        // The gateway surfaces this as `ScmError::NotLeader`; the state
        // machine itself has no reply channel, so callers that drive a
        // `Replica` directly (the gateway handle) check `is_leader()`
        // before ever calling `step` with `ClientSubmit`. This arm exists
        // so misuse fails loudly rather than silently dropping the
        // command.
        debug_assert!(replica.is_leader(), "ClientSubmit routed to a non-leader replica");
        return out;
    }

    // Exact replay of an already-applied (client_id, sequence): short
    // circuit without appending a new log entry at all (§9 Open
    // Question 2 — the counter inside a write method never sees a
    // second apply for the same command).
    if let crate::client_sessions::Lookup::CachedReply(reply) =
        replica.client_sessions.lookup(command.client_id, command.sequence)
    {
        out.newly_committed.push((replica.op_number, reply.to_vec()));
        return out;
    }

    replica.op_number = replica.op_number.next();
    let entry = LogEntry { op_number: replica.op_number, view: replica.view, command: command.clone() };
    replica.log.push(entry.clone());
    replica.prepare_oks.insert(replica.op_number, std::iter::once(replica.id).collect());

    for peer in replica.group.iter().copied().filter(|p| *p != replica.id) {
        out.messages.push(msg_to(
            replica.id,
            peer,
            MessagePayload::Prepare(Prepare {
                view: replica.view,
                op_number: replica.op_number,
                commit_number: replica.commit_number,
                entry: entry.clone(),
            }),
        ));
    }

    maybe_advance_commit(replica, &mut out, local_millis);
    out
}

pub(super) fn on_prepare(replica: &mut Replica, from: ReplicaId, prepare: Prepare, local_millis: u64) -> ReplicaOutput {
    let mut out = ReplicaOutput::default();
    if prepare.view < replica.view {
        return out; // stale leader, ignore
    }
    if prepare.view > replica.view {
        replica.view = prepare.view;
        replica.status = ReplicaStatus::Normal;
    }
    if prepare.op_number.0 == replica.op_number.0 + 1 {
        replica.op_number = prepare.op_number;
        replica.log.push(prepare.entry);
        replica.commit_number = replica.commit_number.max(prepare.commit_number);
        apply_committed_entries(replica, &mut out, local_millis);
        out.messages.push(msg_to(
            replica.id,
            from,
            MessagePayload::PrepareOk(PrepareOk { view: replica.view, op_number: prepare.op_number }),
        ));
    } else if prepare.op_number.0 > replica.op_number.0 + 1 && replica.repair_budget.try_acquire() {
        // Gap: ask for repair instead of silently accepting an
        // out-of-order entry (§4.2's ordering guarantee). Bounded by the
        // repair budget (§5) so a replica that's badly behind doesn't
        // flood the leader with overlapping requests on every Prepare.
        out.messages.push(msg_to(
            replica.id,
            from,
            MessagePayload::RepairRequest(crate::message::RepairRequest {
                view: replica.view,
                from_op: crate::types::OpNumber(replica.op_number.0 + 1),
                to_op: prepare.op_number,
            }),
        ));
    }
    out
}

pub(super) fn on_prepare_ok(replica: &mut Replica, from: ReplicaId, ok: PrepareOk) -> ReplicaOutput {
    let mut out = ReplicaOutput::default();
    if ok.view != replica.view || !replica.is_leader() {
        return out;
    }
    if let Some(set) = replica.prepare_oks.get_mut(&ok.op_number) {
        set.insert(from);
    }
    maybe_advance_commit(replica, &mut out, 0);
    out
}

pub(super) fn on_commit(replica: &mut Replica, commit: Commit, local_millis: u64) -> ReplicaOutput {
    let mut out = ReplicaOutput::default();
    if commit.view < replica.view {
        return out;
    }
    replica.commit_number = replica.commit_number.max(commit.commit_number);
    apply_committed_entries(replica, &mut out, local_millis);
    out
}

pub(super) fn on_heartbeat(replica: &mut Replica, heartbeat: Heartbeat) -> ReplicaOutput {
    if heartbeat.view >= replica.view {
        replica.view = heartbeat.view;
        replica.status = ReplicaStatus::Normal;
        replica.commit_number = replica.commit_number.max(heartbeat.commit_number);
    }
    ReplicaOutput::default()
}

pub(super) fn on_heartbeat_send(replica: &mut Replica) -> ReplicaOutput {
    let mut out = ReplicaOutput::default();
    if replica.is_leader() {
        out.messages.push(msg_broadcast(
            replica.id,
            MessagePayload::Heartbeat(Heartbeat { view: replica.view, commit_number: replica.commit_number }),
        ));
    }
    out
}

/// Leader-side: once a quorum of `PrepareOk` has arrived for the highest
/// contiguous prepared op, advance `commit_number` and broadcast
/// `Commit`, then apply locally.
fn maybe_advance_commit(replica: &mut Replica, out: &mut ReplicaOutput, local_millis: u64) {
    if !replica.is_leader() {
        return;
    }
    let quorum = replica.quorum();
    let mut new_commit = replica.commit_number;
    for entry in &replica.log {
        if entry.op_number.0 <= new_commit.0 {
            continue;
        }
        let acked = replica.prepare_oks.get(&entry.op_number).map(std::collections::HashSet::len).unwrap_or(0);
        if acked >= quorum && entry.op_number.0 == new_commit.0 + 1 {
            new_commit = CommitNumber(entry.op_number.0);
        } else {
            break;
        }
    }
    if new_commit != replica.commit_number {
        replica.commit_number = new_commit;
        out.messages.push(msg_broadcast(
            replica.id,
            MessagePayload::Commit(Commit { view: replica.view, commit_number: replica.commit_number }),
        ));
        apply_committed_entries(replica, out, local_millis);
    }
}

fn apply_committed_entries(replica: &mut Replica, out: &mut ReplicaOutput, local_millis: u64) {
    match replica.drain_apply(local_millis) {
        Ok((applied, effects)) => {
            out.newly_committed.extend(applied);
            out.effects.extend(effects);
        }
        Err(error) => {
            // §7: INTERNAL_ERROR/METADATA_ERROR are fatal during apply.
            // The state machine itself never calls `process::exit` — the
            // gateway handle classifies and terminates, mirroring
            // `scm-kernel::classification`.
            if matches!(error, ScmError::Internal(_) | ScmError::Metadata(_)) {
                scm_kernel::classification::handle_fatal(&error, &scm_kernel::classification::RealProcessExit);
            }
        }
    }
}
