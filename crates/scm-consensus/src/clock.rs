//! Cluster clock (§4.3): the single source of "now" a write method is
//! allowed to observe, provided by the HA gateway at apply time. Every
//! replica computes the same value from the same committed command
//! because the value itself — not a local `SystemTime::now()` read — is
//! what gets carried in the log entry that drives `apply_committed`.

use std::collections::HashMap;

use crate::marzullo::{intersect, Interval};
use crate::types::ReplicaId;

/// A single peer sample: this replica's local clock minus the peer's
/// reported clock, plus a round-trip-derived error bound.
#[derive(Debug, Clone, Copy)]
pub struct PeerSample {
    pub offset_millis: i64,
    pub error_bound_millis: i64,
}

/// Synchronizes a local monotonic clock against the rest of the
/// consensus group using Marzullo intersection, the same algorithm the
/// teacher's `clock.rs` uses. The leader stamps each `Prepare` with the
/// synchronized value; that value — not any replica's own wall clock —
/// is the `now_millis` parameter `Runtime::apply_committed` receives.
#[derive(Debug, Default)]
pub struct Clock {
    samples: HashMap<ReplicaId, PeerSample>,
}

impl Clock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sample(&mut self, from: ReplicaId, sample: PeerSample) {
        self.samples.insert(from, sample);
    }

    /// Combines all recorded peer samples plus this replica's own
    /// zero-offset sample into a synchronized offset. Falls back to 0
    /// (trust the local clock outright) when no peer samples have been
    /// collected yet, e.g. immediately after startup.
    #[must_use]
    pub fn synchronized_offset_millis(&self) -> i64 {
        if self.samples.is_empty() {
            return 0;
        }
        let intervals: Vec<Interval> = self
            .samples
            .values()
            .map(|s| Interval::new(s.offset_millis, s.error_bound_millis))
            .collect();
        intersect(&intervals).map(|(range, _)| (range.low + range.high) / 2).unwrap_or(0)
    }

    /// The value to stamp on a `Prepare`: local monotonic millis adjusted
    /// by the synchronized offset.
    #[must_use]
    pub fn now_millis(&self, local_millis: u64) -> u64 {
        let adjusted = local_millis as i64 + self.synchronized_offset_millis();
        adjusted.max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_samples_trusts_the_local_clock() {
        let clock = Clock::new();
        assert_eq!(clock.now_millis(1_000), 1_000);
    }

    #[test]
    fn agreeing_peers_pull_the_offset_toward_consensus() {
        let mut clock = Clock::new();
        clock.record_sample(ReplicaId(1), PeerSample { offset_millis: 50, error_bound_millis: 10 });
        clock.record_sample(ReplicaId(2), PeerSample { offset_millis: 55, error_bound_millis: 10 });
        let offset = clock.synchronized_offset_millis();
        assert!((40..=65).contains(&offset));
    }
}
