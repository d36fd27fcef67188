//! Journal records and their framing.

use crate::error::{EngineError, EngineResult};
use crate::schema::{IndexSchema, StoreSchema};
use modernidb_codec::{from_cbor, to_cbor, Key, KeyRange};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Magic bytes opening every record.
pub(crate) const JOURNAL_MAGIC: [u8; 4] = *b"MIDB";

/// Current record format version.
pub(crate) const JOURNAL_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4)
pub(crate) const HEADER_SIZE: usize = 10;

pub(crate) const CRC_SIZE: usize = 4;

/// One logical change inside a committed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum JournalOp {
    /// The database moved to a new version.
    SetVersion {
        /// New version.
        version: u64,
    },
    /// An object store was created.
    CreateStore {
        /// Its schema.
        schema: StoreSchema,
    },
    /// An object store was dropped.
    DeleteStore {
        /// Store name.
        name: String,
    },
    /// An index was created.
    CreateIndex {
        /// Owning store.
        store: String,
        /// Its schema.
        schema: IndexSchema,
    },
    /// An index was dropped.
    DeleteIndex {
        /// Owning store.
        store: String,
        /// Index name.
        name: String,
    },
    /// A record was written under a resolved key.
    Put {
        /// Store name.
        store: String,
        /// Primary key.
        key: Key,
        /// Stored value.
        value: Value,
    },
    /// Records in a range were deleted.
    Delete {
        /// Store name.
        store: String,
        /// Deleted range.
        range: KeyRange,
    },
    /// Every record of a store was deleted.
    Clear {
        /// Store name.
        store: String,
    },
}

/// The operations of one committed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct JournalRecord {
    /// Committing transaction.
    pub txid: u64,
    /// Operations in commit order.
    pub ops: Vec<JournalOp>,
}

impl JournalRecord {
    /// Builds the framed bytes for this record.
    pub(crate) fn encode_frame(&self) -> EngineResult<Vec<u8>> {
        let payload = to_cbor(self)?;
        let len = u32::try_from(payload.len())
            .map_err(|_| EngineError::journal_corruption("journal record payload too large"))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&JOURNAL_MAGIC);
        frame.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);
        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }
}

/// Result of reading one frame.
#[derive(Debug)]
pub(crate) enum Frame {
    /// A whole record and the number of bytes it spanned.
    Record(JournalRecord, usize),
    /// The bytes end in the middle of a frame.
    Torn,
}

/// Reads the frame at the start of `bytes`.
pub(crate) fn decode_frame(bytes: &[u8]) -> EngineResult<Frame> {
    if bytes.len() < HEADER_SIZE {
        return Ok(Frame::Torn);
    }
    if bytes[0..4] != JOURNAL_MAGIC {
        return Err(EngineError::journal_corruption(format!(
            "bad record magic {:02x?}",
            &bytes[0..4]
        )));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != JOURNAL_VERSION {
        return Err(EngineError::journal_corruption(format!(
            "unsupported record version {version}"
        )));
    }
    let len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let total = HEADER_SIZE + len + CRC_SIZE;
    if bytes.len() < total {
        return Ok(Frame::Torn);
    }

    let body_end = HEADER_SIZE + len;
    let expected = u32::from_le_bytes([
        bytes[body_end],
        bytes[body_end + 1],
        bytes[body_end + 2],
        bytes[body_end + 3],
    ]);
    let actual = compute_crc32(&bytes[..body_end]);
    if expected != actual {
        return Err(EngineError::ChecksumMismatch { expected, actual });
    }

    let record = from_cbor(&bytes[HEADER_SIZE..body_end])?;
    Ok(Frame::Record(record, total))
}

/// CRC-32 (IEEE).
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StoreParams;
    use serde_json::json;

    fn sample() -> JournalRecord {
        JournalRecord {
            txid: 7,
            ops: vec![
                JournalOp::SetVersion { version: 2 },
                JournalOp::CreateStore {
                    schema: StoreSchema::new("widgets", StoreParams::new().key_path("id")).unwrap(),
                },
                JournalOp::Put {
                    store: "widgets".into(),
                    key: Key::from("a"),
                    value: json!({"id": "a", "qty": 3}),
                },
                JournalOp::Delete {
                    store: "widgets".into(),
                    range: KeyRange::lower_bound("b", false),
                },
            ],
        }
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn frame_decodes_to_the_same_record() {
        let frame = sample().encode_frame().unwrap();
        match decode_frame(&frame).unwrap() {
            Frame::Record(record, len) => {
                assert_eq!(record, sample());
                assert_eq!(len, frame.len());
            }
            Frame::Torn => panic!("complete frame reported as torn"),
        }
    }

    #[test]
    fn short_frames_are_torn() {
        let frame = sample().encode_frame().unwrap();
        assert!(matches!(decode_frame(&frame[..5]).unwrap(), Frame::Torn));
        assert!(matches!(
            decode_frame(&frame[..frame.len() - 1]).unwrap(),
            Frame::Torn
        ));
    }

    #[test]
    fn flipped_payload_byte_fails_checksum() {
        let mut frame = sample().encode_frame().unwrap();
        frame[HEADER_SIZE + 2] ^= 0xFF;
        assert!(matches!(
            decode_frame(&frame),
            Err(EngineError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut frame = sample().encode_frame().unwrap();
        frame[0] = b'X';
        assert!(matches!(
            decode_frame(&frame),
            Err(EngineError::JournalCorruption { .. })
        ));
    }
}
