//! Library half of `scm-server`: the wire protocol, error taxonomy, and
//! RPC plumbing the binary's event loop is built from, reused as-is by
//! `scm-cli` to dial a replica without duplicating the frame codec.

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod peer_transport;
mod pem;
pub mod tls;
pub mod wire;
