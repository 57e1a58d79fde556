//! Cluster configuration management for a local dev/test SCM cluster:
//! N replicas on `127.0.0.1`, each with its own data directory and the
//! full peer list needed to form the consensus group (§4.2, §1 "a set of
//! SCM replicas").

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub replica_count: usize,
    pub base_port: u16,
    pub data_dir: PathBuf,
    pub topology: ClusterTopology,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterTopology {
    pub replicas: Vec<ReplicaConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    pub id: u8,
    pub port: u16,
    pub bind_address: String,
    pub data_dir: PathBuf,
    pub peers: Vec<String>,
}

impl ClusterConfig {
    /// # Panics
    /// Panics if `replica_count == 0`; callers that accept untrusted
    /// input should validate with [`ClusterConfig::checked_new`] instead.
    #[must_use]
    pub fn new(data_dir: PathBuf, replica_count: usize, base_port: u16) -> Self {
        assert!(replica_count > 0, "replica_count must be >= 1");

        let replicas = (0..replica_count)
            .map(|id| {
                let port = base_port + id as u16;
                let replica_data_dir = data_dir.join("cluster").join(format!("replica-{id}"));
                let peers = (0..replica_count)
                    .filter(|&peer| peer != id)
                    .map(|peer| format!("{peer}=127.0.0.1:{}", base_port + peer as u16))
                    .collect();
                ReplicaConfig { id: id as u8, port, bind_address: "127.0.0.1".to_string(), data_dir: replica_data_dir, peers }
            })
            .collect();

        Self { replica_count, base_port, data_dir, topology: ClusterTopology { replicas } }
    }

    pub fn checked_new(data_dir: PathBuf, replica_count: usize, base_port: u16) -> Result<Self> {
        if replica_count == 0 {
            return Err(Error::InvalidReplicaCount(replica_count));
        }
        Ok(Self::new(data_dir, replica_count, base_port))
    }

    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join("cluster").join("cluster.toml");
        if !config_path.exists() {
            return Err(Error::NotInitialized(data_dir.to_path_buf()));
        }
        let contents = fs::read_to_string(&config_path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn save(&self) -> Result<()> {
        let cluster_dir = self.data_dir.join("cluster");
        fs::create_dir_all(&cluster_dir)?;
        let contents = toml::to_string_pretty(self)?;
        fs::write(cluster_dir.join("cluster.toml"), contents)?;
        Ok(())
    }

    pub fn create_directories(&self) -> Result<()> {
        for replica in &self.topology.replicas {
            fs::create_dir_all(&replica.data_dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_lists_exclude_self() {
        let config = ClusterConfig::new(PathBuf::from("/tmp/scm-dev"), 3, 9800);
        assert_eq!(config.topology.replicas.len(), 3);
        for replica in &config.topology.replicas {
            assert_eq!(replica.peers.len(), 2);
            assert!(!replica.peers.contains(&format!("127.0.0.1:{}", replica.port)));
        }
    }

    #[test]
    fn zero_replicas_is_rejected_without_panicking() {
        let result = ClusterConfig::checked_new(PathBuf::from("/tmp/scm-dev"), 0, 9800);
        assert!(matches!(result, Err(Error::InvalidReplicaCount(0))));
    }
}
