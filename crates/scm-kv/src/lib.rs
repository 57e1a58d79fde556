//! # scm-kv: persistent KV store (§4.1)
//!
//! An ordered keyed store with named tables. Each table supports point
//! get/put/delete, an all-or-nothing batched write, forward/reverse range
//! iteration, and participates in a whole-store consistent checkpoint used
//! for snapshot transfer (§4.2 `take_snapshot`/`install_snapshot`).
//!
//! Tables required by the rest of the workspace: `nodes`, `pipelines`,
//! `containers`, `meta` (§4.1). The store itself has no opinion on what
//! lives in a table — `scm-kernel` owns that mapping.
//!
//! Layout on disk, one append-only segment file per table plus a manifest:
//!
//! ```text
//! <root>/
//!   nodes.wal
//!   pipelines.wal
//!   containers.wal
//!   meta.wal
//!   MANIFEST
//! ```
//!
//! Durability model: every `put`/`delete`/`write_batch` appends one or
//! more framed, checksummed records to the table's WAL before returning,
//! then updates the in-memory index. On open, each WAL is replayed in
//! order to rebuild the index; [`canary`] distinguishes a clean crash
//! (truncated trailing record) from genuine corruption (§7 `Corruption`
//! is fatal, a truncated tail is not).

mod canary;
mod codec;
mod compaction;
mod error;
mod index;
mod record;
mod storage;
mod write_batch;

pub use error::{KvError, KvResult};
pub use storage::{CheckpointManifest, KvStore, Table, TableName};
pub use write_batch::{WriteBatch, WriteOp};

#[cfg(kani)]
mod kani_proofs;
