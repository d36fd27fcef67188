//! Write-ahead journal.
//!
//! Every committed read-write or version-change transaction appends one
//! record holding its logical operations:
//!
//! ```text
//! | magic "MIDB" (4) | version (2) | length (4) | CBOR payload (N) | crc32 (4) |
//! ```
//!
//! Replaying the records in order rebuilds the database. A record cut short
//! at the end of the journal is a crash during append and is dropped; a bad
//! checksum anywhere is corruption and fails the load.

mod record;
mod writer;

pub(crate) use record::{JournalOp, JournalRecord};
pub(crate) use writer::Journal;
