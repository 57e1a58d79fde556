use std::io::{Read, Seek, SeekFrom};

use crate::codec::{DecodeOutcome, RecordReader};
use crate::error::{KvError, KvResult};
use crate::record::Record;

/// Result of scanning a table's WAL at open time.
pub struct ScanResult {
    /// Records recovered in order, ready to replay into the index.
    pub records: Vec<Record>,
    /// Byte offset the WAL should be truncated to before further appends,
    /// if a trailing partial record was discarded.
    pub valid_length: u64,
}

/// Replays every record in `reader`, stopping at the first sign of
/// trouble and classifying it per §4.1/§7:
///
/// - A clean end of file: all records recovered, nothing to repair.
/// - A truncated trailing record (length prefix or payload cut short):
///   the signature of a crash mid-append. Not corruption — the caller
///   truncates the WAL to `valid_length` and continues.
/// - A checksum mismatch or malformed payload *before* the end of the
///   file: genuine corruption. Fatal (§7): the caller must abort the
///   process rather than silently drop data.
pub fn scan<R: Read + Seek>(mut reader: R, table: &str) -> KvResult<ScanResult> {
    let mut records = Vec::new();
    let mut offset: u64 = 0;
    let mut wrapped = CountingReader { inner: &mut reader, read: 0 };

    loop {
        let mut framed = RecordReader::new(&mut wrapped);
        match framed.read_next() {
            DecodeOutcome::Record(record) => {
                offset += wrapped.read as u64;
                wrapped.read = 0;
                records.push(record);
            }
            DecodeOutcome::CleanEof => {
                offset += wrapped.read as u64;
                break;
            }
            DecodeOutcome::Truncated => {
                // Discard the partial tail; everything up to `offset` is
                // durable and uncorrupted.
                break;
            }
            DecodeOutcome::ChecksumMismatch => {
                return Err(KvError::Corruption {
                    table: table.to_string(),
                    detail: format!("checksum mismatch at byte offset {offset}"),
                });
            }
        }
    }

    reader
        .seek(SeekFrom::Start(offset))
        .map_err(|source| KvError::IoFailed { table: table.to_string(), source })?;

    Ok(ScanResult { records, valid_length: offset })
}

/// Wraps a reader to count bytes consumed by the most recent `read_next`
/// call, so `scan` can track file offsets without re-reading.
struct CountingReader<'a, R> {
    inner: &'a mut R,
    read: usize,
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_record, make_put};
    use std::io::Cursor;

    #[test]
    fn recovers_all_records_on_a_clean_file() {
        let mut bytes = Vec::new();
        bytes.extend(encode_record(&make_put(1, b"a".to_vec(), b"1".to_vec())));
        bytes.extend(encode_record(&make_put(2, b"b".to_vec(), b"2".to_vec())));
        let result = scan(Cursor::new(bytes), "nodes").unwrap();
        assert_eq!(result.records.len(), 2);
    }

    #[test]
    fn truncated_tail_is_recovered_up_to_the_last_good_record() {
        let mut bytes = Vec::new();
        bytes.extend(encode_record(&make_put(1, b"a".to_vec(), b"1".to_vec())));
        let good_len = bytes.len();
        bytes.extend(encode_record(&make_put(2, b"b".to_vec(), b"2".to_vec())));
        bytes.truncate(bytes.len() - 3);

        let result = scan(Cursor::new(bytes), "nodes").unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.valid_length, good_len as u64);
    }

    #[test]
    fn corruption_in_the_middle_of_the_file_is_fatal() {
        let mut bytes = Vec::new();
        bytes.extend(encode_record(&make_put(1, b"a".to_vec(), b"1".to_vec())));
        let flip_at = bytes.len() + 4;
        bytes.extend(encode_record(&make_put(2, b"b".to_vec(), b"2".to_vec())));
        bytes[flip_at] ^= 0xFF;

        let result = scan(Cursor::new(bytes), "nodes");
        assert!(matches!(result, Err(KvError::Corruption { .. })));
    }
}
