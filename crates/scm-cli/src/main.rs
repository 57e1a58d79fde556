//! `scm`: the admin CLI for the Storage Container Manager.
//!
//! Dials a live replica's client/admin RPC surface (§6) and prints its
//! responses, translating the §7 error taxonomy to the process exit codes
//! named there (`0` success, `1` validation, `2` timeout, `3` not-leader,
//! `4` fatal). Mirrors the teacher's `kimberlite-cli` dispatch shape —
//! one `Cli`/`Commands` pair, one `main` that matches and delegates —
//! narrowed to the five read/write surfaces SCM exposes rather than a
//! full REPL/migration/backup toolkit, since those collaborators live
//! outside this core (§1 Non-goals).

mod client;
mod commands;
mod style;

use anyhow::Result;
use clap::{Parser, Subcommand};

use style::print_error;

const DEFAULT_SERVER: &str = "127.0.0.1:10860";

#[derive(Parser)]
#[command(name = "scm", author, version, about = "Admin CLI for the Storage Container Manager", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// `host:port` of the replica to dial. Any replica answers reads;
    /// writes on a follower come back `NotLeader` with a leader hint (§7).
    #[arg(short, long, global = true, default_value = DEFAULT_SERVER)]
    server: String,

    /// Disable ANSI color codes (also honors `NO_COLOR`).
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the cluster/replica identity (§4.4 `get_version`).
    Version,

    /// Node Manager queries (§4.4).
    #[command(subcommand)]
    Node(NodeCommands),

    /// Pipeline Manager queries and admin actions (§4.5).
    #[command(subcommand)]
    Pipeline(PipelineCommands),

    /// Container Manager queries and lifecycle events (§4.6).
    #[command(subcommand)]
    Container(ContainerCommands),

    /// Safe-Mode Controller status (§4.7).
    #[command(subcommand)]
    Safemode(SafemodeCommands),
}

#[derive(Subcommand)]
enum NodeCommands {
    /// List every node SCM has registered.
    List,
    /// Look up one node by id.
    Get {
        /// Hex-encoded node id, as printed by `node list`.
        node_id: String,
    },
}

#[derive(Subcommand)]
enum PipelineCommands {
    /// List every pipeline.
    List,
    /// Look up one pipeline by id.
    Get {
        /// Hex-encoded pipeline id.
        pipeline_id: String,
    },
    /// Create a new pipeline (§4.5 creation algorithm).
    Create {
        /// "single" or "replicated".
        #[arg(long, default_value = "replicated")]
        replication: String,
        /// Replication factor (1 for single-copy, 1 or 3 for replicated).
        #[arg(long, default_value_t = 3)]
        factor: u8,
    },
    /// Request a pipeline's closure.
    Close {
        /// Hex-encoded pipeline id.
        pipeline_id: String,
    },
}

#[derive(Subcommand)]
enum ContainerCommands {
    /// List every container.
    List,
    /// Look up one container by id.
    Get {
        /// Decimal container id.
        container_id: String,
    },
    /// Allocate a new container on a pipeline (§4.6 `allocate`).
    Allocate {
        /// Hex-encoded pipeline id to allocate onto.
        #[arg(long)]
        pipeline: String,
        /// Owner string recorded on the container.
        #[arg(long)]
        owner: String,
        #[arg(long, default_value = "replicated")]
        replication: String,
        #[arg(long, default_value_t = 3)]
        factor: u8,
    },
    /// Drive a container through one lifecycle event (§4.6 exhaustive
    /// event table: finalize, quasi-close, close, force-close, delete,
    /// cleanup).
    Event {
        /// Decimal container id.
        container_id: String,
        /// One of: finalize, quasi-close, close, force-close, delete, cleanup.
        event: String,
    },
}

#[derive(Subcommand)]
enum SafemodeCommands {
    /// Show the current safe-mode barrier status (§3 `SafeModeStatus`).
    Status,
}

fn main() {
    let cli = Cli::parse();
    style::set_no_color(cli.no_color || std::env::var_os("NO_COLOR").is_some());

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match run(&cli) {
        Ok(code) => code,
        Err(error) => {
            print_error(&error.to_string());
            4
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: &Cli) -> Result<i32> {
    let server = cli.server.as_str();
    match &cli.command {
        Commands::Version => commands::version::run(server),
        Commands::Node(NodeCommands::List) => commands::node::list(server),
        Commands::Node(NodeCommands::Get { node_id }) => commands::node::get(server, node_id),
        Commands::Pipeline(PipelineCommands::List) => commands::pipeline::list(server),
        Commands::Pipeline(PipelineCommands::Get { pipeline_id }) => commands::pipeline::get(server, pipeline_id),
        Commands::Pipeline(PipelineCommands::Create { replication, factor }) => {
            commands::pipeline::create(server, replication, *factor)
        }
        Commands::Pipeline(PipelineCommands::Close { pipeline_id }) => commands::pipeline::close(server, pipeline_id),
        Commands::Container(ContainerCommands::List) => commands::container::list(server),
        Commands::Container(ContainerCommands::Get { container_id }) => commands::container::get(server, container_id),
        Commands::Container(ContainerCommands::Allocate { pipeline, owner, replication, factor }) => {
            commands::container::allocate(server, pipeline, owner, replication, *factor)
        }
        Commands::Container(ContainerCommands::Event { container_id, event }) => {
            commands::container::event(server, container_id, event)
        }
        Commands::Safemode(SafemodeCommands::Status) => commands::safemode::status(server),
    }
}
