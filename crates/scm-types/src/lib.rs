//! # scm-types: core type definitions for the Storage Container Manager
//!
//! Shared across every other `scm-*` crate. Nothing in here touches disk,
//! the network, or a clock — these are plain data types plus the small pure
//! functions (hashing, rank ordering, FSM transition tables) that must stay
//! identical on every replica for the replicated log to be meaningful.
//!
//! - Identifiers: [`NodeId`], [`PipelineId`], [`ContainerId`], [`ClusterId`]
//! - Node-manager types ([`NodeInfo`], [`NodeHealth`], [`NodeReport`])
//! - Pipeline-manager types ([`Pipeline`], [`PipelineState`], [`ReplicationConfig`])
//! - Container-manager types ([`ContainerInfo`], [`ContainerState`], [`ContainerReplica`])
//! - The datanode command envelope ([`DatanodeCommand`])
//! - Safe-mode status ([`SafeModeStatus`])
//! - The shared error taxonomy ([`ScmError`])
//! - The on-disk `VERSION` file ([`VersionFile`])

mod command;
mod container;
mod error;
mod ids;
mod node;
mod pipeline;
mod safemode;
mod version;

pub use command::{Command, CommandTag, DatanodeCommand};
pub use container::{
    transition, ContainerEvent, ContainerInfo, ContainerReplica, ContainerState, ReplicaReportedState,
};
pub use error::{Result, ScmError};
pub use ids::{next_local_sequence, ClientId, ClusterId, ContainerId, NodeId, PipelineId, ScmId, SequenceNumber};
pub use node::{
    NodeDetails, NodeHealth, NodeInfo, NodeReport, PipelineReportEntry, StorageVolumeReport,
    VolumeType,
};
pub use pipeline::{Pipeline, PipelineState, ReplicationConfig, ReplicationType, member_set_hash};
pub use safemode::SafeModeStatus;
pub use version::VersionFile;
