//! View change (§4.2): leader-timeout-triggered election via the
//! `StartViewChange`/`DoViewChange`/`StartView` quorum protocol. A
//! deposed leader's unreplied submissions are exactly the ones a client
//! must retry against the new leader per §4.2's failure model.

use crate::message::{DoViewChange, MessagePayload, StartView, StartViewChange};
use crate::types::{OpNumber, ReplicaId, ReplicaStatus};

use super::{msg_broadcast, msg_to, Replica, ReplicaOutput};

pub(super) fn on_leader_silence(replica: &mut Replica) -> ReplicaOutput {
    let mut out = ReplicaOutput::default();
    if replica.is_leader() {
        return out; // the leader doesn't time out on itself
    }
    replica.view = replica.view.next();
    replica.status = ReplicaStatus::ViewChange;
    replica.start_view_changes.clear();
    replica.start_view_changes.insert(replica.id);
    replica.do_view_changes.clear();
    out.messages.push(msg_broadcast(replica.id, MessagePayload::StartViewChange(StartViewChange { view: replica.view })));
    out
}

pub(super) fn on_start_view_change(replica: &mut Replica, from: ReplicaId, message: StartViewChange) -> ReplicaOutput {
    let mut out = ReplicaOutput::default();
    if message.view < replica.view {
        return out;
    }
    if message.view > replica.view {
        replica.view = message.view;
        replica.status = ReplicaStatus::ViewChange;
        replica.start_view_changes.clear();
        replica.do_view_changes.clear();
    }
    replica.start_view_changes.insert(from);
    if replica.start_view_changes.len() >= replica.quorum() && matches!(replica.status, ReplicaStatus::ViewChange) {
        let new_leader = replica.view.leader(replica.group.len());
        out.messages.push(msg_to(
            replica.id,
            new_leader,
            MessagePayload::DoViewChange(DoViewChange {
                view: replica.view,
                log_tail: replica.log.clone(),
                last_normal_view: replica.view,
                op_number: replica.op_number,
                commit_number: replica.commit_number,
            }),
        ));
    }
    out
}

pub(super) fn on_do_view_change(replica: &mut Replica, _from: ReplicaId, message: DoViewChange) -> ReplicaOutput {
    let mut out = ReplicaOutput::default();
    if message.view < replica.view {
        return out;
    }
    if message.view > replica.view {
        replica.view = message.view;
        replica.status = ReplicaStatus::ViewChange;
        replica.do_view_changes.clear();
    }
    if replica.view.leader(replica.group.len()) != replica.id {
        return out; // only the prospective new leader assembles quorum
    }
    replica.do_view_changes.push(message);
    if replica.do_view_changes.len() >= replica.quorum() {
        // Adopt the most complete log among the quorum's reports (§4.2
        // "repair": the new leader's log must dominate every voter's).
        let best = replica
            .do_view_changes
            .iter()
            .max_by_key(|d| (d.op_number.0, d.commit_number.0))
            .cloned()
            .expect("quorum is non-empty");
        if best.log_tail.len() > replica.log.len() {
            replica.log = best.log_tail.clone();
        }
        replica.op_number = OpNumber(replica.op_number.0.max(best.op_number.0));
        replica.commit_number = replica.commit_number.max(best.commit_number);
        replica.status = ReplicaStatus::Normal;
        replica.prepare_oks.clear();
        replica.do_view_changes.clear();
        out.messages.push(msg_broadcast(
            replica.id,
            MessagePayload::StartView(StartView {
                view: replica.view,
                log_tail: replica.log.clone(),
                op_number: replica.op_number,
                commit_number: replica.commit_number,
            }),
        ));
    }
    out
}

pub(super) fn on_start_view(replica: &mut Replica, message: StartView, local_millis: u64) -> ReplicaOutput {
    let mut out = ReplicaOutput::default();
    if message.view < replica.view {
        return out;
    }
    replica.view = message.view;
    replica.status = ReplicaStatus::Normal;
    if message.log_tail.len() > replica.log.len() {
        replica.log = message.log_tail;
    }
    replica.op_number = OpNumber(replica.op_number.0.max(message.op_number.0));
    replica.commit_number = replica.commit_number.max(message.commit_number);
    replica.start_view_changes.clear();
    replica.do_view_changes.clear();
    if let Err(error) = replica.drain_apply(local_millis).map(|applied| out.newly_committed.extend(applied)) {
        scm_kernel::classification::handle_fatal(&error, &scm_kernel::classification::RealProcessExit);
    }
    out
}
