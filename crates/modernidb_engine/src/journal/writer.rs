//! Appending to and replaying a journal.

use crate::error::EngineResult;
use crate::journal::record::{decode_frame, Frame, JournalRecord};
use modernidb_storage::StorageBackend;
use tracing::{debug, warn};

/// The journal of one database.
pub(crate) struct Journal {
    backend: Box<dyn StorageBackend>,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal").finish_non_exhaustive()
    }
}

impl Journal {
    /// Opens a journal and reads back its records.
    ///
    /// A torn record at the tail is cut off so later appends start on a
    /// frame boundary.
    pub(crate) fn open(
        mut backend: Box<dyn StorageBackend>,
    ) -> EngineResult<(Self, Vec<JournalRecord>)> {
        let bytes = backend.read_all()?;
        let mut records = Vec::new();
        let mut offset = 0;

        while offset < bytes.len() {
            match decode_frame(&bytes[offset..])? {
                Frame::Record(record, len) => {
                    records.push(record);
                    offset += len;
                }
                Frame::Torn => {
                    warn!(
                        offset,
                        dropped = bytes.len() - offset,
                        "dropping torn journal tail"
                    );
                    backend.truncate(offset as u64)?;
                    break;
                }
            }
        }

        debug!(records = records.len(), bytes = offset, "journal replayed");
        Ok((Self { backend }, records))
    }

    /// Appends a record, flushing when `flush` is set.
    pub(crate) fn append(&mut self, record: &JournalRecord, flush: bool) -> EngineResult<u64> {
        let frame = record.encode_frame()?;
        let offset = self.backend.append(&frame)?;
        if flush {
            self.backend.flush()?;
        }
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::journal::JournalOp;
    use modernidb_storage::InMemoryBackend;

    fn record(txid: u64) -> JournalRecord {
        JournalRecord {
            txid,
            ops: vec![JournalOp::SetVersion { version: txid }],
        }
    }

    #[test]
    fn appended_records_replay_in_order() {
        let mut bytes = Vec::new();
        for txid in 1..=3 {
            bytes.extend(record(txid).encode_frame().unwrap());
        }
        let (_, records) = Journal::open(Box::new(InMemoryBackend::with_data(bytes))).unwrap();
        let ids: Vec<u64> = records.iter().map(|r| r.txid).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn torn_tail_is_dropped_and_appends_continue() {
        let mut bytes = record(1).encode_frame().unwrap();
        let second = record(2).encode_frame().unwrap();
        bytes.extend_from_slice(&second[..second.len() / 2]);

        let (mut journal, records) =
            Journal::open(Box::new(InMemoryBackend::with_data(bytes))).unwrap();
        assert_eq!(records.len(), 1);

        let first_len = record(1).encode_frame().unwrap().len() as u64;
        assert_eq!(journal.append(&record(3), true).unwrap(), first_len);
    }

    #[test]
    fn corrupted_middle_record_fails_open() {
        let mut bytes = record(1).encode_frame().unwrap();
        let len = bytes.len();
        bytes.extend(record(2).encode_frame().unwrap());
        bytes[len - 1] ^= 0x01;
        let result = Journal::open(Box::new(InMemoryBackend::with_data(bytes)));
        assert!(matches!(result, Err(EngineError::ChecksumMismatch { .. })));
    }
}
