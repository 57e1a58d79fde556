//! Error type for the bootstrap/SDK layer. Wraps the lower crates' error
//! types rather than flattening them, so a caller that wants to match on
//! `ScmError::NotLeader` (say, to retry against a different node) still
//! can.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Scm(#[from] scm_types::ScmError),

    #[error(transparent)]
    Kv(#[from] scm_kv::KvError),

    #[error(transparent)]
    Config(#[from] scm_config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
