//! Background health-sweep task (§4.4 "a sweeper task runs periodically
//! ... querying the liveness of each DataNode"). Submits `sweep_health`
//! and `reap_dead_nodes` through the HA gateway on a fixed interval; on a
//! follower these calls resolve to `NotLeader` and are dropped, so only
//! one replica in the group is ever actually driving the sweep.

use std::sync::Arc;
use std::time::Duration;

use scm_consensus::Transport;
use scm_types::{next_local_sequence, ClientId, ScmError};
use tracing::{debug, warn};

use crate::bootstrap::Scm;

/// The client identity the sweeper uses for its own `submit` calls.
/// Distinct from any real RPC client so its commands never collide with
/// an actual datanode or admin session in `ClientSessions`'s dedup table.
pub const SWEEPER_CLIENT_ID: ClientId = ClientId(0);

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub tick: Duration,
    pub stale_after_millis: u64,
    pub dead_after_millis: u64,
    pub grace_period_millis: u64,
}

/// Runs forever, sweeping node health and reaping dead nodes on every
/// tick. The caller spawns this (`tokio::spawn(sweeper::run(scm, cfg))`)
/// alongside whatever drives the replica's transport; it never returns
/// under normal operation.
pub async fn run<T: Transport + 'static>(scm: Arc<Scm<T>>, config: SweeperConfig) {
    let mut ticker = tokio::time::interval(config.tick);
    loop {
        ticker.tick().await;

        let gateway = scm.gateway();
        match gateway.sweep_health(config.stale_after_millis, config.dead_after_millis, SWEEPER_CLIENT_ID, next_local_sequence()) {
            Ok(()) => {}
            Err(ScmError::NotLeader { .. }) => {
                debug!("sweep skipped: local replica is not leader");
                continue;
            }
            Err(error) => warn!(%error, "sweep_health failed"),
        }

        match gateway.reap_dead_nodes(config.grace_period_millis, SWEEPER_CLIENT_ID, next_local_sequence()) {
            Ok(()) => {}
            Err(ScmError::NotLeader { .. }) => {}
            Err(error) => warn!(%error, "reap_dead_nodes failed"),
        }

        scm.execute_pending_effects();
    }
}
