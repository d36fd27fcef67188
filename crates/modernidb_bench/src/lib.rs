//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use modernidb::{Factory, IndexParams, ModernIdb, StoreParams, TransactionMode, TransactionOptions};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A benchmark record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Primary key.
    pub id: String,
    /// Indexed by `by_score`.
    pub score: u32,
    /// Unindexed payload.
    pub payload: String,
}

/// Generate a random alphanumeric string of `len` characters.
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate `count` records with ids `r000000`, ... and random scores.
pub fn generate_records(count: usize, payload_size: usize) -> Vec<Record> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| Record {
            id: format!("r{i:06}"),
            score: rng.gen_range(0..1_000),
            payload: random_string(payload_size),
        })
        .collect()
}

/// An open in-memory client with a `records` store keyed by `id` and a
/// `by_score` index.
pub fn bench_db() -> ModernIdb {
    let factory = Factory::in_memory();
    let db = ModernIdb::builder(&factory, "bench")
        .on_init(|ctx| {
            let records = ctx
                .manager
                .create_object_store::<Record>("records", StoreParams::new().key_path("id"))?;
            records.create_index("by_score", "score", IndexParams::new())?;
            Ok(())
        })
        .build()
        .expect("Failed to build client");
    db.open().expect("Failed to open client");
    db
}

/// [`bench_db`] holding `records`.
pub fn populated_db(records: &[Record]) -> ModernIdb {
    let db = bench_db();
    let (store, done) = db
        .transaction::<Record>("records", TransactionMode::ReadWrite, TransactionOptions::default())
        .expect("Failed to start transaction");
    for record in records {
        store.put(record, None).expect("Failed to put record");
    }
    done.wait().expect("Failed to commit");
    db
}
