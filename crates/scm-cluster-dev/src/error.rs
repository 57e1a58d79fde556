//! Error types for dev-cluster orchestration.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cluster not initialized at {0}")]
    NotInitialized(PathBuf),

    #[error("replica {0} is already running")]
    ReplicaAlreadyRunning(u8),

    #[error("replica {0} not found")]
    ReplicaNotFound(u8),

    #[error("replica {0} failed to start: {1}")]
    ReplicaStartFailed(u8, String),

    #[error("replica {0} crashed with exit code {1:?}")]
    ReplicaCrashed(u8, Option<i32>),

    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    #[error("invalid replica count: {0} (must be >= 1)")]
    InvalidReplicaCount(usize),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
