//! # scm-consensus: the replicated log (§4.2)
//!
//! A Viewstamped-Replication-style protocol that delivers an ordered
//! stream of opaque command payloads to every SCM replica, exactly once
//! in that order, surviving any minority failure. `replica` is the pure
//! state machine; `gateway_handle` wires it into `scm-kernel`'s
//! `ReplicatedLogHandle` seam so `scm-kernel` never has to know what a
//! "view" is.
//!
//! Supplemented beyond the distilled spec (§9 "Cyclic graphs" /
//! "Coroutine control flow" notes and grounded on the teacher's own
//! `kimberlite-vsr`):
//!
//! - [`client_sessions`]: idempotent replay, resolving §9 Open Question 1
//!   in favor of fail-fast + dedup rather than silently swallowing errors.
//! - [`clock`]/[`marzullo`]: the single synchronized apply-time clock
//!   value every write method is allowed to observe (§4.3).
//! - [`reconfiguration`]: adding/removing SCM replicas without downtime.
//! - [`repair_budget`]: bounds concurrent repair traffic (§5).
//! - [`log_scrubber`]: background integrity scan feeding `Corruption`
//!   (§4.1) up to the fatal-error path (§7).
//! - [`upgrade`]: rolling-upgrade gate keyed on the `VERSION` file's
//!   `layoutVersion` (§6).
//! - [`instrumentation`]: optional Prometheus metrics (`otel` feature).

pub mod client_sessions;
pub mod clock;
pub mod gateway_handle;
pub mod instrumentation;
pub mod log_scrubber;
pub mod marzullo;
pub mod message;
pub mod reconfiguration;
pub mod repair_budget;
mod replica;
pub mod transport;
pub mod types;
pub mod upgrade;

#[cfg(kani)]
mod kani_proofs;

pub use gateway_handle::ReplicaHandle;
pub use replica::{Replica, ReplicaEvent, ReplicaOutput, TimeoutKind};
pub use transport::Transport;
