//! The "imperative shell" that turns the pure `scm-kernel`/`scm-consensus`
//! state machines into a runnable process: opens the KV store, restores
//! kernel state from it, wires a replicated-log handle behind the HA
//! invocation gateway, and executes the side effects each apply call
//! produces. Mirrors the role `kimberlite::Kimberlite` plays over
//! `kimberlite-kernel`'s `State`/`Effect` pair, generalized to a
//! replicated (rather than single-writer) apply path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use scm_consensus::types::ReplicaId;
use scm_consensus::{Replica, ReplicaHandle, Transport};
use scm_directory_ref::{PlacementPolicy, RandomPlacementPolicy};
use scm_kernel::{HaGateway, Runtime, RuntimeConfig};
use scm_kv::KvStore;
use scm_types::{ClusterId, ScmId};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Everything a single replica's process needs to come up (§6). Mirrors
/// the layered `ScmConfig` on disk, plus the identifiers fixed at
/// cluster-formation time rather than reloaded from a config file on
/// every restart.
pub struct BootstrapConfig {
    pub data_dir: PathBuf,
    pub cluster_id: ClusterId,
    pub scm_id: ScmId,
    pub software_version: String,
    pub replica_id: ReplicaId,
    pub group: Vec<ReplicaId>,
    pub runtime: RuntimeConfig,
    pub submit_timeout: Duration,
}

/// Ties together the persisted KV store and the in-memory replicated
/// state machine for one replica. Generic over `T: Transport` so the same
/// shell runs atop `scm-server`'s `mio` transport and `scm-cluster-dev`'s
/// in-process one.
pub struct Scm<T: Transport> {
    kv: KvStore,
    gateway: HaGateway<ReplicaHandle<T>>,
    #[cfg(feature = "broadcast")]
    broadcast: crate::broadcast::SafeModeBroadcast,
}

impl<T: Transport> Scm<T> {
    /// Opens (or creates) the KV store at `config.data_dir`, replays it
    /// into a fresh `Runtime`, and wraps `transport` in a `ReplicaHandle`
    /// sharing that same `Runtime` with the HA gateway's read path
    /// (§4.3: a read issued right after a `submit` returns must observe
    /// that write).
    pub fn open(config: BootstrapConfig, transport: T, placement_policy: Option<Box<dyn PlacementPolicy>>) -> Result<Self> {
        let kv_dir = scm_config::Paths::kv_store_dir(&config.data_dir);
        let kv = KvStore::open(kv_dir)?;
        let state = scm_kernel::persistence::load(&kv);
        let policy = placement_policy.unwrap_or_else(|| Box::new(RandomPlacementPolicy));
        let runtime = Arc::new(Runtime::with_state(config.runtime, policy, state));

        let replica = Replica::new(config.replica_id, config.group, Arc::clone(&runtime));
        let handle = ReplicaHandle::new(replica, transport, config.submit_timeout);
        let gateway = HaGateway::new(runtime, handle, config.cluster_id, config.scm_id, config.software_version);

        info!(scm_id = %gateway.scm_id, "storage container manager replica opened");
        Ok(Self {
            kv,
            gateway,
            #[cfg(feature = "broadcast")]
            broadcast: crate::broadcast::SafeModeBroadcast::default(),
        })
    }

    pub fn gateway(&self) -> &HaGateway<ReplicaHandle<T>> {
        &self.gateway
    }

    #[cfg(feature = "broadcast")]
    pub fn broadcast(&self) -> &crate::broadcast::SafeModeBroadcast {
        &self.broadcast
    }

    /// Flushes the current in-memory state to the KV store and records
    /// `last_applied_index` (§4.2 `take_snapshot`). Called periodically
    /// by `scm-server` and before a clean shutdown; a replica that's
    /// behind on the log catches back up from here rather than replaying
    /// from op 0.
    pub fn checkpoint(&self, last_applied_index: u64) -> Result<()> {
        scm_kernel::persistence::persist(&self.gateway.runtime.state, &self.kv, last_applied_index)?;
        Ok(())
    }

    /// Drains every effect produced since the last call and executes the
    /// ones with actual externally visible behavior, mirroring
    /// `kimberlite::KimberliteInner::execute_effects`'s imperative shell.
    /// Call this after every `pump_once`/`submit` round; it is cheap and
    /// a no-op when nothing committed.
    pub fn execute_pending_effects(&self) {
        let effects = self.gateway.log.drain_effects();
        if effects.is_empty() {
            return;
        }
        for effect in effects {
            self.execute_effect(effect);
        }
    }

    /// Wipes the KV store's on-disk tables. Test-harness-only escape
    /// hatch (`fuzz-reset` feature) for starting a fresh replica without
    /// tearing down and recreating the whole `Scm`; production code has
    /// no legitimate reason to discard committed state.
    #[cfg(feature = "fuzz-reset")]
    pub fn reset_state(&mut self) -> Result<()> {
        self.kv.reset()?;
        Ok(())
    }

    fn execute_effect(&self, effect: scm_kernel::Effect) {
        match effect {
            scm_kernel::Effect::EnqueueDatanodeCommand { node, command } => {
                // The command itself was already placed on the node's
                // mailbox by the apply call (§4.4); this is purely a
                // wake-up signal for whatever is polling that mailbox on
                // the leader (scm-server's RPC handler).
                debug!(node = %node, command = ?command, "datanode command enqueued");
            }
            scm_kernel::Effect::SafeModeStatusChanged(status) => {
                info!(?status, "safe-mode status changed");
                #[cfg(feature = "broadcast")]
                self.broadcast.send(status);
            }
            scm_kernel::Effect::NodeDeclaredDead { node } => {
                warn!(node = %node, "node declared dead");
            }
        }
    }
}
