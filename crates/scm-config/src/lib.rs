//! Configuration management for the Storage Container Manager (§6)
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, layered on by the caller)
//! 2. Environment variables (`SCM_*` prefix)
//! 3. scm.local.toml (gitignored, local overrides)
//! 4. scm.toml (git-tracked, project config)
//! 5. ~/.config/scm/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// The full recognized configuration surface (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScmConfig {
    pub node: NodeConfig,
    pub heartbeat: HeartbeatConfig,
    pub pipeline: PipelineConfig,
    pub container: ContainerConfig,
    pub safe_mode: SafeModeConfig,
    pub replication: ReplicationConfig,
    pub failover: FailoverConfig,
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub bind_address: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self { data_dir: PathBuf::from(".scm/data"), bind_address: "127.0.0.1:9860".to_string() }
    }
}

/// §6: "`heartbeat_interval` (seconds between datanode heartbeats),
/// `stale_after` (seconds to STALE), `dead_after` (seconds to DEAD)".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub heartbeat_interval_secs: u64,
    pub stale_after_secs: u64,
    pub dead_after_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { heartbeat_interval_secs: 3, stale_after_secs: 30, dead_after_secs: 120 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub pipelines_per_metadata_volume: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { pipelines_per_metadata_volume: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub container_size_bytes: u64,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self { container_size_bytes: 5_000_000_000 }
    }
}

/// §6: "`safe_mode.enabled`, `safe_mode.container_threshold` ∈ [0,1],
/// `safe_mode.pipeline_availability_check` (bool)".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeModeConfig {
    pub enabled: bool,
    pub container_threshold: f64,
    pub pipeline_availability_check: bool,
    pub min_datanodes: usize,
}

impl Default for SafeModeConfig {
    fn default() -> Self {
        Self { enabled: true, container_threshold: 0.99, pipeline_availability_check: false, min_datanodes: 1 }
    }
}

/// §6: "`replication_type` (single-copy|replicated), `replication_factor`
/// (1|3)".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub replication_type: ReplicationType,
    pub replication_factor: u32,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self { replication_type: ReplicationType::Replicated, replication_factor: 3 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReplicationType {
    SingleCopy,
    Replicated,
}

/// §6: "`failover_max_attempts`, `wait_between_retries_ms`".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    pub failover_max_attempts: u32,
    pub wait_between_retries_ms: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self { failover_max_attempts: 5, wait_between_retries_ms: 200 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub replicas: Vec<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { replicas: Vec::new() }
    }
}

impl ScmConfig {
    /// Load configuration from default locations.
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from a specific storage-root directory.
    pub fn load_from_dir(storage_root: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(storage_root).load()
    }

    /// Resolve relative paths to absolute, rooted at `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();
        if self.node.data_dir.is_relative() {
            self.node.data_dir = base.join(&self.node.data_dir);
        }
    }

    /// Replication factor this config actually wants: a single-copy
    /// config always has a factor of 1 regardless of what
    /// `replication.replication_factor` says (§6's two fields are
    /// coupled, not independent).
    pub fn effective_replication_factor(&self) -> u32 {
        match self.replication.replication_type {
            ReplicationType::SingleCopy => 1,
            ReplicationType::Replicated => self.replication.replication_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = ScmConfig::default();
        assert_eq!(config.heartbeat.stale_after_secs, 30);
        assert_eq!(config.heartbeat.dead_after_secs, 120);
        assert_eq!(config.safe_mode.container_threshold, 0.99);
        assert_eq!(config.replication.replication_factor, 3);
    }

    #[test]
    fn single_copy_replication_always_has_factor_one() {
        let mut config = ScmConfig::default();
        config.replication.replication_type = ReplicationType::SingleCopy;
        config.replication.replication_factor = 3;
        assert_eq!(config.effective_replication_factor(), 1);
    }

    #[test]
    fn path_resolution_anchors_relative_data_dir() {
        let mut config = ScmConfig::default();
        config.resolve_paths("/var/lib/scm");
        assert_eq!(config.node.data_dir, PathBuf::from("/var/lib/scm/.scm/data"));
    }
}
