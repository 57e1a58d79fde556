//! `scm-server`: the Storage Container Manager network daemon.
//!
//! One process is one replica. It owns:
//!
//! - a `mio` event loop accepting the datanode/admin RPC surface (§6),
//! - a background VSR peer transport carrying inter-replica consensus
//!   traffic (`peer_transport`),
//! - a health sweeper driving §4.4's STALE/DEAD transitions, and
//! - periodic checkpointing of kernel state to the KV store (§4.1/§4.2
//!   `take_snapshot`).
//!
//! Unlike the teacher, where `kimberlite-server` is a library embedded by
//! `kimberlite-cli`'s `start` command, SCM replicas are independent
//! processes (§1 "a set of SCM replicas ... a single SCM failure does not
//! lose cluster state") — `scm-cluster-dev` spawns exactly this binary.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scm_consensus::types::ReplicaId;
use scm_consensus::{Replica, ReplicaHandle};
use scm_directory_ref::RandomPlacementPolicy;
use scm_kernel::{HaGateway, Runtime, RuntimeConfig};
use scm_kv::KvStore;
use scm_types::VersionFile;

use scm_server::config::{parse_peer_spec, PeerAddress, ServerConfig};
use scm_server::connection::{Connection, Socket};
use scm_server::handler::RequestHandler;
use scm_server::metrics::ServerMetrics;
use scm_server::{peer_transport, tls};

const LISTENER_TOKEN: Token = Token(0);
const SOFTWARE_VERSION: &str = env!("CARGO_PKG_VERSION");
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(3);

/// Command-line surface `scm-cluster-dev::ReplicaProcess::start` spawns
/// against (§6 ambient bootstrap): `scm-server --replica-id <id> --bind
/// <peer addr> --data-dir <dir> --peer <id>=<host:port>...`.
#[derive(Debug, Parser)]
#[command(name = "scm-server", about = "Storage Container Manager replica daemon")]
struct Args {
    /// This replica's identity in the consensus group.
    #[arg(long)]
    replica_id: u8,

    /// Bind address for inter-replica VSR traffic.
    #[arg(long)]
    bind: String,

    /// Bind address for the datanode/client RPC surface (§6). Defaults to
    /// `bind`'s host with the port incremented by 1000, mirroring the
    /// `scm.toml` default `rpc` port offset from the consensus port.
    #[arg(long)]
    rpc_bind: Option<String>,

    /// Storage root for the `VERSION` file, the KV store, and `scm.toml`
    /// (§6).
    #[arg(long)]
    data_dir: PathBuf,

    /// `<id>=<host:port>` for one consensus peer; may be repeated.
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// TLS certificate chain (PEM). Enables mutual TLS on the RPC surface
    /// when set alongside `--tls-key` (§6).
    #[arg(long)]
    tls_cert: Option<PathBuf>,
    #[arg(long)]
    tls_key: Option<PathBuf>,
    #[arg(long)]
    tls_ca: Option<PathBuf>,
}

fn derive_rpc_bind(peer_bind: &str) -> anyhow::Result<String> {
    let addr: SocketAddr = peer_bind.parse()?;
    Ok(SocketAddr::new(addr.ip(), addr.port().saturating_add(1000)).to_string())
}

/// Reads the on-disk `VERSION` file, or initializes one on a fresh
/// install (§6: "Absence of the file on a fresh install triggers
/// initialization"). A dangling `upgradingToLayoutVersion` means the
/// previous run crashed mid-upgrade and startup aborts with a recovery
/// message rather than silently resuming.
fn open_or_init_version(data_dir: &std::path::Path) -> anyhow::Result<VersionFile> {
    if let Some(version) = scm_config::Paths::read_version_file(data_dir)? {
        if version.crashed_mid_upgrade() {
            anyhow::bail!(
                "storage root {} crashed mid-upgrade (layoutVersion={}, upgradingTo={:?}); \
                 run the layout-version recovery procedure before restarting",
                data_dir.display(),
                version.layout_version,
                version.upgrading_to_layout_version,
            );
        }
        return Ok(version);
    }

    let now_millis =
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
    let version = VersionFile::fresh("SCM", now_millis, 1);
    scm_config::Paths::write_version_file(data_dir, &version)?;
    info!(cluster_id = %version.cluster_id, scm_id = %version.scm_id, "initialized fresh VERSION file");
    Ok(version)
}

fn build_server_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut scm_config = scm_config::ScmConfig::load_from_dir(&args.data_dir).unwrap_or_default();
    scm_config.resolve_paths(&args.data_dir);
    scm_config.node.bind_address.clone_from(&args.bind);

    let rpc_bind_address = match &args.rpc_bind {
        Some(addr) => addr.clone(),
        None => derive_rpc_bind(&args.bind)?,
    };

    let peers: Vec<PeerAddress> = args.peers.iter().map(|spec| parse_peer_spec(spec)).collect::<Result<_, _>>()?;

    let tls = match (&args.tls_cert, &args.tls_key) {
        (Some(cert), Some(key)) => {
            let mut cfg = tls::TlsConfig::new(cert, key);
            if let Some(ca) = &args.tls_ca {
                cfg = cfg.with_client_auth(ca);
            }
            Some(cfg)
        }
        _ => None,
    };

    Ok(ServerConfig {
        scm: scm_config,
        replica_id: ReplicaId(args.replica_id),
        peers,
        rpc_bind_address,
        peer_bind_address: args.bind.clone(),
        tls,
        data_dir: args.data_dir.clone(),
    })
}

fn runtime_config(scm: &scm_config::ScmConfig) -> RuntimeConfig {
    RuntimeConfig {
        queue_depth_limit: 64,
        pipelines_per_metadata_volume: scm.pipeline.pipelines_per_metadata_volume,
        max_container_size_bytes: scm.container.container_size_bytes,
        preallocate_threshold_bytes: scm.container.container_size_bytes / 20,
        min_datanodes: scm.safe_mode.min_datanodes,
        container_replica_threshold: scm.safe_mode.container_threshold,
        pipeline_availability_check: scm.safe_mode.pipeline_availability_check,
        pipeline_threshold: 0.9,
    }
}

/// Executes one apply-produced side effect (§9): the mailbox entry itself
/// was already placed by the apply call, this is purely logging plus the
/// safe-mode broadcast. Mirrors `scm::bootstrap::Scm::execute_effect`;
/// duplicated here rather than pulled in through `scm` because this
/// binary builds its gateway directly against `PeerTransport` rather than
/// through `scm::Scm::open` (it needs the gateway behind an `Arc` shared
/// with the sweeper and the VSR pump loop, not owned by a wrapper type).
fn execute_effect(effect: scm_kernel::Effect) {
    match effect {
        scm_kernel::Effect::EnqueueDatanodeCommand { node, command } => {
            tracing::debug!(node = %node, command = ?command, "datanode command enqueued");
        }
        scm_kernel::Effect::SafeModeStatusChanged(status) => {
            info!(?status, "safe-mode status changed");
        }
        scm_kernel::Effect::NodeDeclaredDead { node } => {
            warn!(node = %node, "node declared dead");
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    std::fs::create_dir_all(&args.data_dir)?;
    let server_config = build_server_config(&args)?;
    let version = open_or_init_version(&args.data_dir)?;

    let kv_dir = scm_config::Paths::kv_store_dir(&args.data_dir);
    let kv = KvStore::open(kv_dir)?;
    let state = scm_kernel::persistence::load(&kv);
    let resume_index = scm_kernel::persistence::last_applied_index(&kv);

    let runtime = Arc::new(Runtime::with_state(
        runtime_config(&server_config.scm),
        Box::new(RandomPlacementPolicy),
        state,
    ));

    let peer_addresses: Vec<(ReplicaId, String)> =
        server_config.peers.iter().map(|p| (p.replica_id, p.address.clone())).collect();
    let transport = peer_transport::PeerTransport::bind(server_config.replica_id, &server_config.peer_bind_address, &peer_addresses)?;

    let replica = Replica::new(server_config.replica_id, server_config.group(), Arc::clone(&runtime));
    let submit_timeout = Duration::from_millis(server_config.scm.failover.wait_between_retries_ms * u64::from(server_config.scm.failover.failover_max_attempts));
    let handle = ReplicaHandle::new(replica, transport, submit_timeout.max(Duration::from_secs(1)));

    let gateway = Arc::new(HaGateway::new(
        runtime,
        handle,
        version.cluster_id.clone(),
        version.scm_id,
        SOFTWARE_VERSION.to_string(),
    ));

    info!(
        replica = %server_config.replica_id,
        cluster_id = %version.cluster_id,
        scm_id = %version.scm_id,
        resume_index,
        "scm-server replica starting",
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    install_shutdown_hook(Arc::clone(&shutdown))?;

    let pump_gateway = Arc::clone(&gateway);
    let pump_shutdown = Arc::clone(&shutdown);
    std::thread::spawn(move || {
        while !pump_shutdown.load(Ordering::Relaxed) {
            pump_gateway.log.pump_once(Duration::from_millis(50));
            for effect in pump_gateway.log.drain_effects() {
                execute_effect(effect);
            }
        }
    });

    let sweep_gateway = Arc::clone(&gateway);
    let sweep_shutdown = Arc::clone(&shutdown);
    let stale_after_millis = server_config.scm.heartbeat.stale_after_secs * 1000;
    let dead_after_millis = server_config.scm.heartbeat.dead_after_secs * 1000;
    std::thread::spawn(move || {
        while !sweep_shutdown.load(Ordering::Relaxed) {
            std::thread::sleep(SWEEP_INTERVAL);
            let seq = scm_types::next_local_sequence();
            match sweep_gateway.sweep_health(stale_after_millis, dead_after_millis, scm_types::ClientId(0), seq) {
                Ok(()) | Err(scm_types::ScmError::NotLeader { .. }) => {}
                Err(error) => warn!(%error, "sweep_health failed"),
            }
            let seq = scm_types::next_local_sequence();
            match sweep_gateway.reap_dead_nodes(dead_after_millis * 4, scm_types::ClientId(0), seq) {
                Ok(()) | Err(scm_types::ScmError::NotLeader { .. }) => {}
                Err(error) => warn!(%error, "reap_dead_nodes failed"),
            }
            for effect in sweep_gateway.log.drain_effects() {
                execute_effect(effect);
            }
        }
    });

    let checkpoint_kv = kv;
    let checkpoint_gateway = Arc::clone(&gateway);
    let checkpoint_shutdown = Arc::clone(&shutdown);
    std::thread::spawn(move || {
        while !checkpoint_shutdown.load(Ordering::Relaxed) {
            std::thread::sleep(CHECKPOINT_INTERVAL);
            let last_applied = scm_kernel::persistence::last_applied_index(&checkpoint_kv);
            if let Err(error) = scm_kernel::persistence::persist(&checkpoint_gateway.runtime.state, &checkpoint_kv, last_applied) {
                error!(%error, "periodic checkpoint failed");
            }
        }
    });

    run_rpc_listener(&server_config, gateway, &shutdown)
}

/// Registers SIGINT/SIGTERM handling so a `Ctrl+C` or an orchestrator's
/// `SIGTERM` drains in-flight connections instead of dropping them mid
/// write (§5 "cancellation is cooperative").
#[cfg(unix)]
fn install_shutdown_hook(shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    signal_hook::flag::register(SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown))?;
    Ok(())
}

#[cfg(not(unix))]
fn install_shutdown_hook(_shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    Ok(())
}

/// The `mio` event loop for the datanode/admin RPC surface (§6). One
/// thread, non-blocking sockets, `Connection` objects keyed by `Token`
/// exactly as `connection.rs` was built to support.
fn run_rpc_listener<L>(server_config: &ServerConfig, gateway: Arc<HaGateway<L>>, shutdown: &Arc<AtomicBool>) -> anyhow::Result<()>
where
    L: scm_kernel::ReplicatedLogHandle + 'static,
{
    let registry = prometheus::Registry::new();
    let metrics = Arc::new(ServerMetrics::register(&registry)?);
    let handler = Arc::new(RequestHandler::new(gateway, metrics));

    let tls_server_config = server_config.tls.as_ref().map(tls::TlsConfig::build_server_config).transpose()?;

    let bind_addr: SocketAddr = server_config.rpc_bind_address.parse()?;
    let mut listener = TcpListener::bind(bind_addr)?;

    let mut poll = Poll::new()?;
    poll.registry().register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

    let mut connections: std::collections::HashMap<Token, Connection> = std::collections::HashMap::new();
    let mut next_token = 1usize;
    let mut events = Events::with_capacity(256);

    info!(bind = %bind_addr, tls = tls_server_config.is_some(), "RPC listener ready");

    while !shutdown.load(Ordering::Relaxed) {
        if let Err(error) = poll.poll(&mut events, Some(Duration::from_millis(200))) {
            if error.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(error.into());
        }

        for event in &events {
            match event.token() {
                LISTENER_TOKEN => loop {
                    match listener.accept() {
                        Ok((stream, peer)) => {
                            let token = Token(next_token);
                            next_token += 1;
                            let socket = match &tls_server_config {
                                Some(cfg) => Socket::Tls(tls::TlsStream::new(stream, Arc::clone(cfg))?),
                                None => Socket::Plain(stream),
                            };
                            let mut connection = Connection::new(token, socket, 64 * 1024);
                            register_connection(&poll, &mut connection, token)?;
                            connections.insert(token, connection);
                            tracing::trace!(%peer, "accepted connection");
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) => {
                            warn!(%e, "accept failed");
                            break;
                        }
                    }
                },
                token => {
                    let done = connections
                        .get_mut(&token)
                        .map(|connection| service_connection(connection, &handler))
                        .unwrap_or(true);
                    if done {
                        if let Some(mut connection) = connections.remove(&token) {
                            let _ = poll.registry().deregister(socket_source(&mut connection.socket));
                        }
                    } else if let Some(connection) = connections.get_mut(&token) {
                        let interest = connection.interest();
                        let _ = poll.registry().reregister(socket_source(&mut connection.socket), token, interest);
                    }
                }
            }
        }
    }

    info!("shutdown signal received, draining connections");
    Ok(())
}

fn register_connection(poll: &Poll, connection: &mut Connection, token: Token) -> io::Result<()> {
    poll.registry().register(socket_source(&mut connection.socket), token, Interest::READABLE)
}

/// Narrows a `Connection`'s socket (plain or TLS-wrapped) to the `mio`
/// event source `Poll::registry()` needs, without `Connection` itself
/// having to be generic.
fn socket_source(socket: &mut Socket) -> &mut dyn mio::event::Source {
    match socket {
        Socket::Plain(stream) => stream,
        Socket::Tls(tls) => &mut tls.socket,
    }
}

/// Drives one connection's read/decode/handle/write cycle until it would
/// block. Returns `true` once the peer has closed the socket (or it hit
/// an unrecoverable error) so the caller can drop it.
fn service_connection<L: scm_kernel::ReplicatedLogHandle>(connection: &mut Connection, handler: &RequestHandler<L>) -> bool {
    if connection.drive_handshake().is_err() {
        return true;
    }
    if !connection.handshake_complete {
        return false;
    }

    match connection.read() {
        Ok(false) => return true,
        Ok(true) => {}
        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
        Err(_) => return true,
    }

    loop {
        match connection.try_decode_request() {
            Ok(Some(request)) => {
                let response = handler.handle(request);
                if connection.queue_response(&response).is_err() {
                    return true;
                }
            }
            Ok(None) => break,
            Err(_) => return true,
        }
    }

    matches!(connection.write(), Err(_))
}
