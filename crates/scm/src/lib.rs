//! # scm: the Storage Container Manager runtime shell
//!
//! Everything in `scm-types`/`scm-kernel`/`scm-consensus` is a pure state
//! machine; this crate is the imperative shell that turns it into a
//! runnable replica. [`bootstrap::Scm`] opens the on-disk KV store,
//! restores kernel state from it, and wires a replicated-log handle
//! behind the HA invocation gateway. [`sweeper`] drives the periodic
//! health sweep that keeps node/pipeline/container state converging even
//! when no client happens to be calling in. [`broadcast`] (behind the
//! `broadcast` feature) fans safe-mode transitions out to subscribers —
//! `scm-server`'s RPC layer and `scm-cli`'s watch command both consume it.
//!
//! `scm-server` (the network-facing binary) and `scm-cluster-dev` (the
//! in-process dev-cluster harness) are the two things that actually call
//! into this crate; neither duplicates the bootstrap logic that lives
//! here.

mod bootstrap;
#[cfg(feature = "broadcast")]
mod broadcast;
mod error;
pub mod sweeper;

pub use bootstrap::{BootstrapConfig, Scm};
#[cfg(feature = "broadcast")]
pub use broadcast::SafeModeBroadcast;
pub use error::{Error, Result};
pub use sweeper::{SweeperConfig, SWEEPER_CLIENT_ID};
