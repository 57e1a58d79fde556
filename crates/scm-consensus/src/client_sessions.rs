//! Client session table (§4.2, §9 Open Question 1).
//!
//! Resolves the "swallowed replicated-log error" open question in favor
//! of idempotent replay: a resubmission of an already-applied
//! `(client_id, sequence)` returns the cached reply instead of re-running
//! the write method. This is what makes scenario 4 in §8 true — a client
//! that provides a dedup key observes exactly one container created
//! across a leader failover, never two.
//!
//! Only the *latest* sequence number per client is tracked, mirroring the
//! teacher's bounded session table: a client is expected to submit
//! sequence numbers in order and never reuse an old one once a newer one
//! has been accepted.

use std::collections::HashMap;

use scm_types::{ClientId, SequenceNumber};

#[derive(Debug, Clone)]
struct Session {
    sequence: SequenceNumber,
    reply: Vec<u8>,
}

/// In-memory dedup table, rebuilt from the log tail on recovery (it is
/// derived state: replaying the committed log from the start reconstructs
/// it exactly, so it is never itself persisted to the KV store).
#[derive(Debug, Default)]
pub struct ClientSessions {
    sessions: HashMap<ClientId, Session>,
}

/// What the caller should do with a submitted command, decided purely by
/// comparing the submitted sequence number against the session table.
pub enum Lookup<'a> {
    /// Never seen before (or strictly newer than the cached entry) — run
    /// the write method for real.
    Fresh,
    /// Exact replay of the most recently applied command for this
    /// client — return the cached reply without re-running anything.
    CachedReply(&'a [u8]),
    /// Older than the most recently applied sequence for this client —
    /// a stale resubmission racing behind a newer one. The command is
    /// accepted as a no-op that returns the cached (newer) reply, same as
    /// an exact replay: the client will only ever see the *result*, not a
    /// double-apply.
    Stale(&'a [u8]),
}

impl ClientSessions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, client_id: ClientId, sequence: SequenceNumber) -> Lookup<'_> {
        match self.sessions.get(&client_id) {
            Some(session) if session.sequence == sequence => Lookup::CachedReply(&session.reply),
            Some(session) if sequence < session.sequence => Lookup::Stale(&session.reply),
            _ => Lookup::Fresh,
        }
    }

    /// Records the reply for a freshly-applied command. Must only be
    /// called once per unique `(client_id, sequence)` — the apply path
    /// checks `lookup` first and skips re-running (and re-recording) a
    /// replay (§9 Open Question 2: the monotone counter inside the write
    /// method itself only advances on this first-apply path too).
    pub fn record(&mut self, client_id: ClientId, sequence: SequenceNumber, reply: Vec<u8>) {
        self.sessions.insert(client_id, Session { sequence, reply });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_then_cached_then_stale() {
        let mut sessions = ClientSessions::new();
        let client = ClientId(1);

        assert!(matches!(sessions.lookup(client, SequenceNumber(1)), Lookup::Fresh));
        sessions.record(client, SequenceNumber(1), b"reply-1".to_vec());

        match sessions.lookup(client, SequenceNumber(1)) {
            Lookup::CachedReply(reply) => assert_eq!(reply, b"reply-1"),
            _ => panic!("expected cached reply"),
        }

        sessions.record(client, SequenceNumber(2), b"reply-2".to_vec());
        match sessions.lookup(client, SequenceNumber(1)) {
            Lookup::Stale(reply) => assert_eq!(reply, b"reply-2"),
            _ => panic!("expected stale replay to surface the newer cached reply"),
        }

        assert!(matches!(sessions.lookup(client, SequenceNumber(3)), Lookup::Fresh));
    }
}
