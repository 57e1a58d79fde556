//! Replica process management: spawns and supervises a single `scm-server`
//! instance as a child process.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::sleep;

use crate::{Error, ReplicaConfig, Result};

/// Status of a cluster replica process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaStatus {
    Stopped,
    Starting,
    Running,
    Crashed,
}

/// A managed `scm-server` process.
pub struct ReplicaProcess {
    pub config: ReplicaConfig,
    pub process: Option<Child>,
    pub status: ReplicaStatus,
    pub restart_count: usize,
}

impl ReplicaProcess {
    pub fn new(config: ReplicaConfig) -> Self {
        Self { config, process: None, status: ReplicaStatus::Stopped, restart_count: 0 }
    }

    /// Starts the replica process.
    ///
    /// Spawns `scm-server` on `$PATH` with the replica's config file as its
    /// sole argument. In environments without a built `scm-server` binary
    /// (e.g. this crate's own unit tests), the spawn itself may succeed
    /// against a stub but the process typically exits immediately; callers
    /// driving a real cluster are expected to have `scm-server` on `PATH`.
    pub async fn start(&mut self) -> Result<()> {
        if self.status != ReplicaStatus::Stopped && self.status != ReplicaStatus::Crashed {
            return Err(Error::ReplicaAlreadyRunning(self.config.id));
        }

        self.status = ReplicaStatus::Starting;

        let child = Command::new("scm-server")
            .arg("--replica-id")
            .arg(self.config.id.to_string())
            .arg("--bind")
            .arg(format!("{}:{}", self.config.bind_address, self.config.port))
            .arg("--data-dir")
            .arg(&self.config.data_dir)
            .args(self.config.peers.iter().flat_map(|peer| ["--peer".to_string(), peer.clone()]))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::SpawnError(e.to_string()))?;

        self.process = Some(child);

        sleep(Duration::from_millis(200)).await;

        if self.is_alive() {
            self.status = ReplicaStatus::Running;
            Ok(())
        } else {
            self.status = ReplicaStatus::Crashed;
            Err(Error::ReplicaStartFailed(self.config.id, "process exited immediately".to_string()))
        }
    }

    /// Stops the replica process gracefully, killing it if it does not
    /// exit within 5 seconds.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.process.take() else {
            return Ok(());
        };

        child.kill().await.ok();

        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(Ok(_status)) => {
                self.status = ReplicaStatus::Stopped;
                Ok(())
            }
            Ok(Err(e)) => {
                self.status = ReplicaStatus::Stopped;
                Err(Error::Io(e))
            }
            Err(_) => {
                self.status = ReplicaStatus::Stopped;
                Ok(())
            }
        }
    }

    pub fn is_alive(&mut self) -> bool {
        match &mut self.process {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    pub fn id(&self) -> u8 {
        self.config.id
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Attempts to restart a crashed replica with capped exponential
    /// backoff (2s, 4s, 8s, ... capped at 2^5 = 32s).
    pub async fn restart(&mut self) -> Result<()> {
        if self.status != ReplicaStatus::Crashed {
            return Ok(());
        }

        self.restart_count += 1;
        let backoff = Duration::from_secs(2u64.pow(self.restart_count.min(5) as u32));
        sleep(backoff).await;

        self.start().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_replica_config() -> ReplicaConfig {
        ReplicaConfig {
            id: 0,
            port: 9800,
            bind_address: "127.0.0.1".to_string(),
            data_dir: PathBuf::from("/tmp/scm-dev-replica-0"),
            peers: vec!["127.0.0.1:9801".to_string()],
        }
    }

    #[test]
    fn replica_process_starts_stopped() {
        let replica = ReplicaProcess::new(test_replica_config());
        assert_eq!(replica.status, ReplicaStatus::Stopped);
        assert_eq!(replica.id(), 0);
        assert_eq!(replica.port(), 9800);
    }

    #[tokio::test]
    async fn starting_twice_without_stopping_is_rejected() {
        let mut replica = ReplicaProcess::new(test_replica_config());
        replica.status = ReplicaStatus::Running;
        let result = replica.start().await;
        assert!(matches!(result, Err(Error::ReplicaAlreadyRunning(0))));
    }
}
