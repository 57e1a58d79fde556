//! Server error types.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur during server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Wire-protocol framing/decoding error.
    #[error("wire protocol error: {0}")]
    Wire(String),

    /// Error surfaced from the SCM kernel/gateway (§7 taxonomy).
    #[error("scm error: {0}")]
    Scm(#[from] scm_types::ScmError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Bind failed.
    #[error("failed to bind to {addr}: {source}")]
    BindFailed { addr: std::net::SocketAddr, source: std::io::Error },

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Cluster/config error surfaced at startup.
    #[error("configuration error: {0}")]
    Config(String),
}
