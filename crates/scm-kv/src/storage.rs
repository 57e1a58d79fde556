use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{info, warn};

use crate::canary::scan;
use crate::codec::{encode_record, make_delete, make_put};
use crate::compaction::compact;
use crate::error::{KvError, KvResult};
use crate::index::TableIndex;
use crate::record::RecordKind;
use crate::write_batch::{WriteBatch, WriteOp};

/// The four tables §4.1 requires. `meta` holds the current layout-version
/// integer and the replicated log's last-applied index (§4.2
/// `take_snapshot`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableName {
    Nodes,
    Pipelines,
    Containers,
    Meta,
}

impl TableName {
    pub const ALL: [TableName; 4] =
        [TableName::Nodes, TableName::Pipelines, TableName::Containers, TableName::Meta];

    fn file_name(self) -> &'static str {
        match self {
            TableName::Nodes => "nodes.wal",
            TableName::Pipelines => "pipelines.wal",
            TableName::Containers => "containers.wal",
            TableName::Meta => "meta.wal",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            TableName::Nodes => "nodes",
            TableName::Pipelines => "pipelines",
            TableName::Containers => "containers",
            TableName::Meta => "meta",
        }
    }
}

/// One open table: an in-memory ordered index plus the WAL file backing
/// it. Guarded by an `RwLock` so readers (many request-handler threads,
/// §5) never block behind each other, only behind the single apply-path
/// writer.
pub struct Table {
    name: TableName,
    path: PathBuf,
    file: RwLock<File>,
    index: RwLock<TableIndex>,
    next_sequence: RwLock<u64>,
}

impl Table {
    fn open(root: &Path, name: TableName) -> KvResult<Self> {
        let path = root.join(name.file_name());
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|source| KvError::IoFailed { table: name.as_str().to_string(), source })?;

        let reader = BufReader::new(
            File::open(&path).map_err(|source| KvError::IoFailed {
                table: name.as_str().to_string(),
                source,
            })?,
        );
        let scan_result = scan(reader, name.as_str())?;

        if scan_result.valid_length
            != fs::metadata(&path)
                .map_err(|source| KvError::IoFailed { table: name.as_str().to_string(), source })?
                .len()
        {
            warn!(table = name.as_str(), "truncating WAL tail left by an interrupted write");
            file.set_len(scan_result.valid_length)
                .map_err(|source| KvError::IoFailed { table: name.as_str().to_string(), source })?;
        }

        let mut index = TableIndex::new();
        let mut max_sequence = 0;
        for record in scan_result.records {
            max_sequence = max_sequence.max(record.sequence);
            match record.kind {
                RecordKind::Put { key, value } => index.put(key, value),
                RecordKind::Delete { key } => index.delete(&key),
            }
        }

        Ok(Self {
            name,
            path,
            file: RwLock::new(file),
            index: RwLock::new(index),
            next_sequence: RwLock::new(max_sequence + 1),
        })
    }

    pub fn get(&self, key: &[u8]) -> KvResult<Vec<u8>> {
        self.index
            .read()
            .expect("table index lock poisoned")
            .get(key)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| KvError::NotFound { table: self.name.as_str().to_string() })
    }

    pub fn try_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.index.read().expect("table index lock poisoned").get(key).map(<[u8]>::to_vec)
    }

    pub fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> KvResult<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write_batch(&batch)
    }

    pub fn delete(&self, key: impl Into<Vec<u8>>) -> KvResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write_batch(&batch)
    }

    /// Appends every op in `batch` to the WAL as one contiguous write
    /// before mutating the index for any of them — the all-or-nothing
    /// contract of §4.1.
    pub fn write_batch(&self, batch: &WriteBatch) -> KvResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut sequence_guard = self.next_sequence.write().expect("sequence lock poisoned");
        let mut encoded = Vec::new();
        let mut sequence = *sequence_guard;
        for op in batch.ops() {
            let record = match op {
                WriteOp::Put { key, value } => make_put(sequence, key.clone(), value.clone()),
                WriteOp::Delete { key } => make_delete(sequence, key.clone()),
            };
            encoded.extend(encode_record(&record));
            sequence += 1;
        }

        {
            let mut file = self.file.write().expect("table file lock poisoned");
            file.write_all(&encoded)
                .and_then(|()| file.sync_data())
                .map_err(|source| KvError::IoFailed { table: self.name.as_str().to_string(), source })?;
        }
        *sequence_guard = sequence;
        drop(sequence_guard);

        let mut index = self.index.write().expect("table index lock poisoned");
        for op in batch.ops() {
            match op {
                WriteOp::Put { key, value } => index.put(key.clone(), value.clone()),
                WriteOp::Delete { key } => index.delete(key),
            }
        }
        Ok(())
    }

    pub fn range_forward(&self, from: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.index
            .read()
            .expect("table index lock poisoned")
            .range_forward(from)
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect()
    }

    pub fn range_reverse(&self, from: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.index
            .read()
            .expect("table index lock poisoned")
            .range_reverse(from)
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index.read().expect("table index lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().expect("table index lock poisoned").is_empty()
    }

    /// Rewrites the WAL to hold exactly one `Put` per live key (§4.1
    /// ambient maintenance, `compaction.rs`). Swaps the new file in with
    /// a rename so a crash mid-compaction leaves either the old or the
    /// new file intact, never a half-written one.
    pub fn compact(&self) -> KvResult<()> {
        let index = self.index.read().expect("table index lock poisoned");
        let sequence = *self.next_sequence.read().expect("sequence lock poisoned");
        let compacted = compact(&index, sequence);
        drop(index);

        let tmp_path = self.path.with_extension("wal.compacting");
        fs::write(&tmp_path, &compacted)
            .map_err(|source| KvError::IoFailed { table: self.name.as_str().to_string(), source })?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|source| KvError::IoFailed { table: self.name.as_str().to_string(), source })?;

        let new_file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|source| KvError::IoFailed { table: self.name.as_str().to_string(), source })?;
        *self.file.write().expect("table file lock poisoned") = new_file;
        info!(table = self.name.as_str(), "compacted table WAL");
        Ok(())
    }
}

/// A whole-store consistent checkpoint: the file-level snapshot §4.1
/// requires and §4.2's `take_snapshot` records `(index, term)` against.
pub struct CheckpointManifest {
    pub files: Vec<PathBuf>,
}

/// The persistent KV store: one `Table` per name, opened from (and
/// durable to) a single root directory.
pub struct KvStore {
    root: PathBuf,
    tables: HashMap<TableName, Table>,
}

impl KvStore {
    pub fn open(root: impl Into<PathBuf>) -> KvResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|source| KvError::IoFailed { table: "<root>".to_string(), source })?;

        let mut tables = HashMap::new();
        for name in TableName::ALL {
            tables.insert(name, Table::open(&root, name)?);
        }
        Ok(Self { root, tables })
    }

    pub fn table(&self, name: TableName) -> &Table {
        self.tables.get(&name).expect("all TableName variants are opened in KvStore::open")
    }

    /// Compacts every table. Typically invoked right before
    /// [`KvStore::checkpoint`] so the checkpoint is as small as possible.
    pub fn compact_all(&self) -> KvResult<()> {
        for table in self.tables.values() {
            table.compact()?;
        }
        Ok(())
    }

    /// Produces a consistent, file-level checkpoint suitable for the
    /// cluster-internal snapshot transport (§4.2 `take_snapshot`). Copies
    /// each table's compacted WAL into `dest` rather than hard-linking,
    /// since the destination is typically on a different replica.
    pub fn checkpoint(&self, dest: impl AsRef<Path>) -> KvResult<CheckpointManifest> {
        self.compact_all()?;
        let dest = dest.as_ref();
        fs::create_dir_all(dest)
            .map_err(|source| KvError::IoFailed { table: "<checkpoint>".to_string(), source })?;

        let mut files = Vec::new();
        for name in TableName::ALL {
            let src = self.root.join(name.file_name());
            let dst = dest.join(name.file_name());
            fs::copy(&src, &dst)
                .map_err(|source| KvError::IoFailed { table: name.as_str().to_string(), source })?;
            files.push(dst);
        }
        info!(dest = %dest.display(), "wrote KV store checkpoint");
        Ok(CheckpointManifest { files })
    }

    /// Atomically replaces this store's live tables with the contents of
    /// a downloaded checkpoint directory (§4.2 `install_snapshot`).
    pub fn install_checkpoint(root: impl Into<PathBuf>, checkpoint_dir: impl AsRef<Path>) -> KvResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|source| KvError::IoFailed { table: "<root>".to_string(), source })?;
        for name in TableName::ALL {
            let src = checkpoint_dir.as_ref().join(name.file_name());
            let dst = root.join(name.file_name());
            fs::copy(&src, &dst)
                .map_err(|source| KvError::IoFailed { table: name.as_str().to_string(), source })?;
        }
        Self::open(root)
    }

    #[cfg(any(test, feature = "fuzz-reset"))]
    pub fn reset(&mut self) -> KvResult<()> {
        for name in TableName::ALL {
            let path = self.root.join(name.file_name());
            fs::write(&path, [])
                .map_err(|source| KvError::IoFailed { table: name.as_str().to_string(), source })?;
        }
        *self = Self::open(self.root.clone())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = KvStore::open(dir.path()).unwrap();
        store.table(TableName::Nodes).put(b"n1".to_vec(), b"info".to_vec()).unwrap();
        assert_eq!(store.table(TableName::Nodes).get(b"n1").unwrap(), b"info");
    }

    #[test]
    fn batch_write_is_all_or_nothing_visible() {
        let dir = tempdir().unwrap();
        let store = KvStore::open(dir.path()).unwrap();
        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.put(b"b".to_vec(), b"2".to_vec());
        store.table(TableName::Pipelines).write_batch(&batch).unwrap();
        assert_eq!(store.table(TableName::Pipelines).len(), 2);
    }

    #[test]
    fn reopen_after_close_recovers_all_data() {
        let dir = tempdir().unwrap();
        {
            let store = KvStore::open(dir.path()).unwrap();
            store.table(TableName::Containers).put(b"c1".to_vec(), b"data".to_vec()).unwrap();
        }
        let reopened = KvStore::open(dir.path()).unwrap();
        assert_eq!(reopened.table(TableName::Containers).get(b"c1").unwrap(), b"data");
    }

    #[test]
    fn checkpoint_then_install_produces_an_identical_store() {
        let dir = tempdir().unwrap();
        let store = KvStore::open(dir.path()).unwrap();
        store.table(TableName::Meta).put(b"last_applied".to_vec(), b"42".to_vec()).unwrap();

        let checkpoint_dir = tempdir().unwrap();
        store.checkpoint(checkpoint_dir.path()).unwrap();

        let restored_root = tempdir().unwrap();
        let restored = KvStore::install_checkpoint(restored_root.path(), checkpoint_dir.path()).unwrap();
        assert_eq!(restored.table(TableName::Meta).get(b"last_applied").unwrap(), b"42");
    }

    #[test]
    fn compaction_preserves_current_values() {
        let dir = tempdir().unwrap();
        let store = KvStore::open(dir.path()).unwrap();
        let table = store.table(TableName::Nodes);
        table.put(b"n1".to_vec(), b"v1".to_vec()).unwrap();
        table.put(b"n1".to_vec(), b"v2".to_vec()).unwrap();
        table.delete(b"n1".to_vec()).unwrap();
        table.put(b"n2".to_vec(), b"v3".to_vec()).unwrap();
        table.compact().unwrap();
        assert!(table.try_get(b"n1").is_none());
        assert_eq!(table.get(b"n2").unwrap(), b"v3");
    }
}
