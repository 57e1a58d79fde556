use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Opaque 128-bit identifier assigned to a storage node on first
/// registration and persisted by the node thereafter. Immutable once
/// assigned (§3 `NodeId`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u128);

impl NodeId {
    pub fn from_raw(value: u128) -> Self {
        Self(value)
    }

    /// Allocates a fresh id. Must only be called from a write path that is
    /// itself deterministic given the command payload (the random bits are
    /// generated by the client issuing `Register`, not at apply time) —
    /// see §4.3's determinism contract.
    pub fn random() -> Self {
        Self(random_u128())
    }

    pub fn as_u128(self) -> u128 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Random 128-bit identifier for a pipeline (§3 `PipelineId`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PipelineId(u128);

impl PipelineId {
    pub fn from_raw(value: u128) -> Self {
        Self(value)
    }

    pub fn random() -> Self {
        Self(random_u128())
    }

    pub fn as_u128(self) -> u128 {
        self.0
    }
}

impl Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Monotonically increasing 64-bit identifier, unique across the cluster
/// lifetime (§3 `ContainerId`). The counter itself lives in the `meta`
/// table (§4.1) and only advances on first-apply of an `allocate` command
/// (§9 Open Question 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContainerId(u64);

impl ContainerId {
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `CID-<uuid-v4>` cluster identifier (§6 "Cluster IDs").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterId(String);

impl ClusterId {
    pub fn generate() -> Self {
        let bytes = random_u128().to_be_bytes();
        Self(format!(
            "CID-{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            u32::from_be_bytes(bytes[0..4].try_into().unwrap()),
            u16::from_be_bytes(bytes[4..6].try_into().unwrap()),
            u16::from_be_bytes(bytes[6..8].try_into().unwrap()),
            u16::from_be_bytes(bytes[8..10].try_into().unwrap()),
            u64::from_be_bytes([0, 0, bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]]),
        ))
    }

    pub fn parse(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Random 128-bit identifier for one SCM replica (§6 "Cluster IDs").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScmId(u128);

impl ScmId {
    pub fn random() -> Self {
        Self(random_u128())
    }

    pub fn from_raw(value: u128) -> Self {
        Self(value)
    }
}

impl Display for ScmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Client-supplied dedup key for §4.2's client-session table: a client
/// identity plus a per-client monotone sequence number. Carrying both
/// inside the submitted payload (rather than reading a local counter at
/// apply time) is what keeps `submit` deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u128);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

fn random_u128() -> u128 {
    let mut buf = [0u8; 16];
    // getrandom is infallible on every platform this workspace targets;
    // a failure here means the OS RNG is unavailable and nothing downstream
    // of id generation could be trusted anyway.
    getrandom::fill(&mut buf).expect("OS randomness source unavailable");
    u128::from_le_bytes(buf)
}

/// Process-local fallback sequence allocator for tests and single-process
/// tools that don't have a real client session. Never used on the apply
/// path itself.
pub(crate) static LOCAL_SEQ: AtomicU64 = AtomicU64::new(1);

pub fn next_local_sequence() -> SequenceNumber {
    SequenceNumber(LOCAL_SEQ.fetch_add(1, Ordering::Relaxed))
}
