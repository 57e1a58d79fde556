//! Supervisor for a multi-replica dev/test SCM cluster.

use std::collections::HashMap;

use tokio::signal;
use tokio::time::{interval, Duration};

use crate::{ClusterConfig, Error, ReplicaProcess, ReplicaStatus, Result};

pub struct ClusterSupervisor {
    config: ClusterConfig,
    replicas: HashMap<u8, ReplicaProcess>,
    running: bool,
}

impl ClusterSupervisor {
    pub fn new(config: ClusterConfig) -> Self {
        let mut replicas = HashMap::new();
        for replica_config in config.topology.replicas.clone() {
            let replica = ReplicaProcess::new(replica_config);
            replicas.insert(replica.id(), replica);
        }

        Self { config, replicas, running: false }
    }

    pub async fn start_all(&mut self) -> Result<()> {
        for (id, replica) in &mut self.replicas {
            match replica.start().await {
                Ok(()) => tracing::info!(replica_id = id, port = replica.port(), "replica started"),
                Err(error) => tracing::warn!(replica_id = id, %error, "replica failed to start"),
            }
        }

        self.running = true;
        Ok(())
    }

    pub async fn start_replica(&mut self, id: u8) -> Result<()> {
        let replica = self.replicas.get_mut(&id).ok_or(Error::ReplicaNotFound(id))?;
        replica.start().await?;
        tracing::info!(replica_id = id, port = replica.port(), "replica started");
        Ok(())
    }

    pub async fn stop_all(&mut self) -> Result<()> {
        for (id, replica) in &mut self.replicas {
            match replica.stop().await {
                Ok(()) => tracing::info!(replica_id = id, "replica stopped"),
                Err(error) => tracing::warn!(replica_id = id, %error, "replica failed to stop"),
            }
        }

        self.running = false;
        Ok(())
    }

    pub async fn stop_replica(&mut self, id: u8) -> Result<()> {
        let replica = self.replicas.get_mut(&id).ok_or(Error::ReplicaNotFound(id))?;
        replica.stop().await?;
        tracing::info!(replica_id = id, "replica stopped");
        Ok(())
    }

    pub fn status(&mut self) -> Vec<(u8, ReplicaStatus, u16)> {
        let mut status = Vec::new();
        for (id, replica) in &mut self.replicas {
            if replica.status == ReplicaStatus::Running && !replica.is_alive() {
                replica.status = ReplicaStatus::Crashed;
            }
            status.push((*id, replica.status, replica.port()));
        }
        status.sort_by_key(|(id, _, _)| *id);
        status
    }

    /// Runs until Ctrl+C, restarting crashed replicas with backoff.
    pub async fn monitor_loop(&mut self) {
        let mut tick = interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    for (id, replica) in &mut self.replicas {
                        if replica.status == ReplicaStatus::Running && !replica.is_alive() {
                            tracing::warn!(replica_id = id, "replica crashed, attempting restart");
                            replica.status = ReplicaStatus::Crashed;
                            if let Err(error) = replica.restart().await {
                                tracing::error!(replica_id = id, %error, "restart failed");
                            } else {
                                tracing::info!(replica_id = id, "replica restarted");
                            }
                        }
                    }

                    if !self.running {
                        break;
                    }
                }

                _ = signal::ctrl_c() => {
                    tracing::info!("received interrupt, shutting down cluster");
                    if let Err(error) = self.stop_all().await {
                        tracing::error!(%error, "error during shutdown");
                    }
                    break;
                }
            }
        }
    }

    pub fn running_count(&mut self) -> usize {
        self.status().iter().filter(|(_, status, _)| *status == ReplicaStatus::Running).count()
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn supervisor_creation_tracks_one_replica_per_config_entry() {
        let temp = TempDir::new().unwrap();
        let config = ClusterConfig::new(temp.path().to_path_buf(), 3, 9800);
        let supervisor = ClusterSupervisor::new(config);

        assert_eq!(supervisor.replicas.len(), 3);
        assert!(!supervisor.running);
    }

    #[tokio::test]
    async fn stopping_an_unknown_replica_is_an_error() {
        let temp = TempDir::new().unwrap();
        let config = ClusterConfig::new(temp.path().to_path_buf(), 3, 9800);
        let mut supervisor = ClusterSupervisor::new(config);

        let result = supervisor.stop_replica(42).await;
        assert!(matches!(result, Err(Error::ReplicaNotFound(42))));
    }

    #[tokio::test]
    async fn status_reports_all_replicas_stopped_initially() {
        let temp = TempDir::new().unwrap();
        let config = ClusterConfig::new(temp.path().to_path_buf(), 3, 9800);
        let mut supervisor = ClusterSupervisor::new(config);

        let status = supervisor.status();
        assert_eq!(status.len(), 3);
        for (_, replica_status, _) in status {
            assert_eq!(replica_status, ReplicaStatus::Stopped);
        }
    }
}
