//! Replica state machine (§4.2). `Replica` is a pure value: `step`
//! consumes an event and returns the messages to send plus whatever
//! became newly committed. No I/O happens in this module — sending the
//! returned messages and driving timers is the caller's job (see
//! `crate::transport` and `scm-cluster-dev`'s in-process harness).

mod normal;
mod repair;
mod standby;
mod view_change;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use scm_types::{Command, Result};

use crate::clock::Clock;
use crate::client_sessions::ClientSessions;
use crate::message::{Message, MessagePayload};
use crate::repair_budget::RepairBudget;
use crate::types::{CommitNumber, LogEntry, OpNumber, ReplicaId, ReplicaStatus, ViewNumber};

/// Timers the caller is responsible for driving; `Replica::step` reacts
/// to their expiry but owns no actual wall-clock timer itself (§5
/// "sleeping ... is a suspension point" belongs to the transport, not the
/// state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Backup hasn't heard from the leader in too long (§4.2 view change
    /// trigger).
    LeaderSilence,
    /// Leader's own heartbeat-send interval.
    HeartbeatSend,
}

/// What drove this call to `step`.
pub enum ReplicaEvent {
    /// A client asked the leader to replicate `command`.
    ClientSubmit(Command),
    /// A protocol message arrived from a peer.
    Receive(Message),
    /// A timer fired.
    Timeout(TimeoutKind),
}

/// What `step` produced: messages to send and, when an entry newly
/// committed on this call, its encoded reply (useful only on the replica
/// that is currently leader — followers compute and discard it).
#[derive(Default)]
pub struct ReplicaOutput {
    pub messages: Vec<Message>,
    pub newly_committed: Vec<(OpNumber, Vec<u8>)>,
    /// Side effects from every entry applied during this call, in apply
    /// order (§9). The caller (`scm`'s bootstrap, or `scm-cluster-dev`'s
    /// harness) forwards these to the mailbox and to `scm::broadcast`;
    /// every replica computes the same list, so only the leader's
    /// execution of them is externally meaningful.
    pub effects: Vec<scm_kernel::Effect>,
}

fn msg_broadcast(from: ReplicaId, payload: MessagePayload) -> Message {
    Message::broadcast(from, payload)
}

fn msg_to(from: ReplicaId, to: ReplicaId, payload: MessagePayload) -> Message {
    Message::targeted(from, to, payload)
}

/// One replica's full state (§4.2). `runtime` is the deterministic
/// apply-side state machine from `scm-kernel`; everything else here is
/// VSR bookkeeping around it.
pub struct Replica {
    pub id: ReplicaId,
    pub group: Vec<ReplicaId>,
    pub view: ViewNumber,
    pub status: ReplicaStatus,
    pub op_number: OpNumber,
    pub commit_number: CommitNumber,
    pub log: Vec<LogEntry>,
    pub(crate) prepare_oks: HashMap<OpNumber, HashSet<ReplicaId>>,
    pub(crate) start_view_changes: HashSet<ReplicaId>,
    pub(crate) do_view_changes: Vec<crate::message::DoViewChange>,
    pub client_sessions: ClientSessions,
    pub clock: Clock,
    pub repair_budget: RepairBudget,
    /// Shared with `scm_kernel::HaGateway`'s read path — see the comment
    /// on `HaGateway::runtime`.
    pub runtime: Arc<scm_kernel::Runtime>,
    /// Highest op number already fed through `apply_committed`. Distinct
    /// from `commit_number`: an entry can be committed (a majority has
    /// it) for several steps before this replica gets around to applying
    /// it in `drain_apply`.
    pub(super) applied_index: u64,
}

impl Replica {
    #[must_use]
    pub fn new(id: ReplicaId, group: Vec<ReplicaId>, runtime: Arc<scm_kernel::Runtime>) -> Self {
        Self {
            id,
            group,
            view: ViewNumber(0),
            status: ReplicaStatus::Normal,
            op_number: OpNumber(0),
            commit_number: CommitNumber(0),
            log: Vec::new(),
            prepare_oks: HashMap::new(),
            start_view_changes: HashSet::new(),
            do_view_changes: Vec::new(),
            client_sessions: ClientSessions::new(),
            clock: Clock::new(),
            repair_budget: RepairBudget::new(4),
            runtime,
            applied_index: 0,
        }
    }

    #[must_use]
    pub fn is_leader(&self) -> bool {
        matches!(self.status, ReplicaStatus::Normal) && self.view.leader(self.group.len()) == self.id
    }

    #[must_use]
    pub fn leader_hint(&self) -> ReplicaId {
        self.view.leader(self.group.len())
    }

    #[must_use]
    pub fn quorum(&self) -> usize {
        self.group.len() / 2 + 1
    }

    pub fn step(&mut self, event: ReplicaEvent, local_millis: u64) -> ReplicaOutput {
        match event {
            ReplicaEvent::ClientSubmit(command) => normal::on_client_submit(self, command, local_millis),
            ReplicaEvent::Receive(message) => self.dispatch(message, local_millis),
            ReplicaEvent::Timeout(kind) => match kind {
                TimeoutKind::LeaderSilence => view_change::on_leader_silence(self),
                TimeoutKind::HeartbeatSend => normal::on_heartbeat_send(self),
            },
        }
    }

    fn dispatch(&mut self, message: Message, local_millis: u64) -> ReplicaOutput {
        let from = message.from;
        match message.payload {
            MessagePayload::Prepare(p) => normal::on_prepare(self, from, p, local_millis),
            MessagePayload::PrepareOk(p) => normal::on_prepare_ok(self, from, p),
            MessagePayload::Commit(c) => normal::on_commit(self, c, local_millis),
            MessagePayload::Heartbeat(h) => normal::on_heartbeat(self, h),
            MessagePayload::StartViewChange(s) => view_change::on_start_view_change(self, from, s),
            MessagePayload::DoViewChange(d) => view_change::on_do_view_change(self, from, d),
            MessagePayload::StartView(s) => view_change::on_start_view(self, s, local_millis),
            MessagePayload::RepairRequest(r) => repair::on_repair_request(self, from, r),
            MessagePayload::RepairResponse(r) => repair::on_repair_response(self, r, local_millis),
            MessagePayload::Nack(n) => repair::on_nack(self, from, n),
            MessagePayload::StateTransferRequest(r) => standby::on_state_transfer_request(self, from, r),
            MessagePayload::StateTransferResponse(r) => standby::on_state_transfer_response(self, r),
        }
    }

    /// Applies every committed-but-not-yet-applied log entry in strict
    /// order, feeding `scm-kernel::Runtime::apply_committed` (§4.2
    /// "dispatches on the tag to the corresponding state manager").
    /// Returns the encoded reply for each newly-applied entry, in order.
    fn drain_apply(&mut self, local_millis: u64) -> Result<(Vec<(OpNumber, Vec<u8>)>, Vec<scm_kernel::Effect>)> {
        let mut outputs = Vec::new();
        let mut effects = Vec::new();
        let is_leader = self.is_leader();
        let term = self.view.0;
        let synchronized_millis = self.clock.now_millis(local_millis);
        for entry in self.log.iter().filter(|e| e.op_number.0 <= self.commit_number.0 && e.op_number.0 > self.applied_index) {
            match self.client_sessions.lookup(entry.command.client_id, entry.command.sequence) {
                crate::client_sessions::Lookup::CachedReply(reply) | crate::client_sessions::Lookup::Stale(reply) => {
                    outputs.push((entry.op_number, reply.to_vec()));
                }
                crate::client_sessions::Lookup::Fresh => {
                    let (reply, entry_effects) =
                        self.runtime.apply_committed(&entry.command, synchronized_millis, is_leader, term)?;
                    self.client_sessions.record(entry.command.client_id, entry.command.sequence, reply.clone());
                    outputs.push((entry.op_number, reply));
                    effects.extend(entry_effects);
                }
            }
            self.applied_index = entry.op_number.0;
        }
        Ok((outputs, effects))
    }
}
