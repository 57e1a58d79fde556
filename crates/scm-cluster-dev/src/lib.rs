//! Multi-replica cluster management for local SCM development and testing.
//!
//! Provides local cluster orchestration for testing and development:
//! - Process supervision for multiple `scm-server` replicas
//! - Cluster initialization and topology configuration
//! - Health monitoring and crash restart with backoff
//! - Single supervisor process managing N replicas
//!
//! Not used by the production SCM: this crate is `publish = false` and
//! exists purely so a developer (or an integration test) can stand up a
//! small consensus group on localhost without hand-writing topology.

pub mod config;
pub mod error;
pub mod replica;
pub mod supervisor;

pub use config::{ClusterConfig, ClusterTopology, ReplicaConfig};
pub use error::{Error, Result};
pub use replica::{ReplicaProcess, ReplicaStatus};
pub use supervisor::ClusterSupervisor;

use std::path::PathBuf;

/// Creates a new cluster with the specified number of replicas.
pub fn init_cluster(data_dir: PathBuf, replica_count: usize, base_port: u16) -> Result<ClusterConfig> {
    let config = ClusterConfig::checked_new(data_dir, replica_count, base_port)?;
    config.save()?;
    config.create_directories()?;
    Ok(config)
}

/// Starts an existing cluster.
pub async fn start_cluster(data_dir: PathBuf) -> Result<ClusterSupervisor> {
    let config = ClusterConfig::load(&data_dir)?;
    let mut supervisor = ClusterSupervisor::new(config);
    supervisor.start_all().await?;
    Ok(supervisor)
}

/// Stops a running cluster gracefully.
pub async fn stop_cluster(supervisor: &mut ClusterSupervisor) -> Result<()> {
    supervisor.stop_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_cluster_creates_one_directory_per_replica() {
        let temp = TempDir::new().unwrap();
        let config = init_cluster(temp.path().to_path_buf(), 3, 9800).unwrap();

        assert_eq!(config.replica_count, 3);
        assert_eq!(config.base_port, 9800);
        assert!(temp.path().join("cluster").exists());
        for replica in &config.topology.replicas {
            assert!(replica.data_dir.exists());
        }
    }

    #[test]
    fn cluster_config_save_load_round_trips() {
        let temp = TempDir::new().unwrap();
        let config = ClusterConfig::new(temp.path().to_path_buf(), 3, 9800);
        config.save().unwrap();

        let loaded = ClusterConfig::load(temp.path()).unwrap();
        assert_eq!(loaded.replica_count, config.replica_count);
        assert_eq!(loaded.base_port, config.base_port);
    }
}
