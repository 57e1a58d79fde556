//! Bounded model-checking harnesses for the record codec (§4.1, §8
//! round-trip law: "Serialize then Deserialize -> identity"). Compiled
//! only under `cfg(kani)`, following the teacher's own verification
//! practice of keeping proofs adjacent to the code they cover rather than
//! in a separate crate.

use crate::codec::{encode_record, DecodeOutcome, RecordReader};
use crate::record::{Record, RecordKind};

#[kani::proof]
fn put_record_round_trips() {
    let sequence: u64 = kani::any();
    let key: [u8; 4] = kani::any();
    let value: [u8; 4] = kani::any();

    let record = Record { sequence, kind: RecordKind::Put { key: key.to_vec(), value: value.to_vec() } };
    let encoded = encode_record(&record);
    let mut reader = RecordReader::new(std::io::Cursor::new(encoded));
    match reader.read_next() {
        DecodeOutcome::Record(decoded) => assert_eq!(decoded, record),
        _ => panic!("freshly encoded record must decode cleanly"),
    }
}
