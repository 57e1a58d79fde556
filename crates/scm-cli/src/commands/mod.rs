pub mod container;
pub mod node;
pub mod pipeline;
pub mod safemode;
pub mod version;

use anyhow::{bail, Context, Result};
use scm_types::{ContainerId, NodeId, PipelineId, ReplicationConfig, ReplicationType};

/// Parses a hex-encoded 128-bit id as printed by `Display` on `NodeId`.
pub fn parse_node_id(raw: &str) -> Result<NodeId> {
    let value = u128::from_str_radix(raw.trim_start_matches("0x"), 16).with_context(|| format!("invalid node id {raw}"))?;
    Ok(NodeId::from_raw(value))
}

pub fn parse_pipeline_id(raw: &str) -> Result<PipelineId> {
    let value =
        u128::from_str_radix(raw.trim_start_matches("0x"), 16).with_context(|| format!("invalid pipeline id {raw}"))?;
    Ok(PipelineId::from_raw(value))
}

pub fn parse_container_id(raw: &str) -> Result<ContainerId> {
    let value: u64 = raw.parse().with_context(|| format!("invalid container id {raw}"))?;
    Ok(ContainerId::from_raw(value))
}

/// Builds a (type, factor) pair from the CLI's `--replication` / `--factor`
/// flags, validated against §3's "factor equals 1 or N" invariant.
pub fn replication_config(replication: &str, factor: u8) -> Result<ReplicationConfig> {
    let config = match replication {
        "single" | "single-copy" => ReplicationConfig { replication_type: ReplicationType::SingleCopy, factor: 1 },
        "replicated" => ReplicationConfig { replication_type: ReplicationType::Replicated, factor },
        other => bail!("unknown replication type {other:?} (expected \"single\" or \"replicated\")"),
    };
    if !config.validate() {
        bail!("replication factor {factor} is invalid for {replication}");
    }
    Ok(config)
}

/// Every command returns the §7 exit code its response maps to; `main`
/// is the only place that calls `std::process::exit`.
pub const EXIT_SUCCESS: i32 = 0;

/// Prints a `Response::Error`'s message and returns its carried exit code
/// (§7: the server hands the CLI the code directly rather than making it
/// re-derive one from the message string).
pub fn report_error(message: &str, exit_code: i32) -> i32 {
    crate::style::print_error(message);
    exit_code
}
