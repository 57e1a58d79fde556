use serde::{Deserialize, Serialize};

/// One WAL entry. `Put` carries the full value; `Delete` is a tombstone —
/// both are replayed in file order to rebuild a table's in-memory index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl RecordKind {
    pub fn key(&self) -> &[u8] {
        match self {
            RecordKind::Put { key, .. } | RecordKind::Delete { key } => key,
        }
    }
}

/// A record plus the sequence number it was assigned within its table's
/// WAL, used only for diagnostics (canary scanning reports the last good
/// sequence number on truncation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub sequence: u64,
    pub kind: RecordKind,
}
