//! # ModernIDB Engine
//!
//! A transactional, versioned, key-ordered object store.
//!
//! This crate provides:
//! - Named databases with an integer version and upgrade transactions
//! - Object stores with in-line or out-of-line keys and a key generator
//! - Unique and multi-entry indexes maintained on every write
//! - Read-only and read-write transactions with queued requests
//! - Cursors over stores and indexes in four directions
//! - An append-only journal per database, replayed on open
//!
//! ## Driving requests
//!
//! Nothing runs in the background. Requests queue on their transaction and
//! run, in issuance order, when a request is settled or the transaction is
//! committed. Dropping the last handle of a transaction commits it.
//!
//! ```
//! use modernidb_engine::{Durability, Factory, OpenOutcome, StoreParams, TransactionMode};
//! use serde_json::json;
//!
//! let factory = Factory::in_memory();
//! let OpenOutcome::Opened(db, _) = factory
//!     .open("widgets", 1)
//!     .on_upgrade_needed(|upgrade| {
//!         upgrade
//!             .connection
//!             .create_object_store("widgets", StoreParams::new().key_path("id"))?;
//!         Ok(())
//!     })
//!     .send()
//!     .unwrap()
//! else {
//!     unreachable!()
//! };
//!
//! let tx = db
//!     .transaction(["widgets"], TransactionMode::ReadWrite, Durability::Default)
//!     .unwrap();
//! let store = tx.object_store("widgets").unwrap();
//! store.put(json!({"id": "a", "qty": 3}), None).unwrap();
//! let get = store.get("a").unwrap();
//! assert_eq!(get.into_result().unwrap(), Some(json!({"id": "a", "qty": 3})));
//! tx.commit().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod cursor;
mod database;
#[cfg(feature = "std")]
mod dir;
mod error;
mod factory;
mod index;
mod journal;
mod object_store;
mod schema;
mod store;
#[cfg(test)]
mod testutil;
mod transaction;
mod types;

pub use config::FactoryConfig;
pub use connection::Connection;
pub use cursor::{Cursor, CursorRequest, CursorSource};
pub use error::{EngineError, EngineResult};
pub use factory::{DatabaseInfo, DeleteOutcome, Factory, OpenDbRequest, OpenOutcome, UpgradeNeeded};
pub use index::IndexHandle;
pub use modernidb_codec::{CursorDirection, Key, KeyPath, KeyRange};
pub use object_store::ObjectStoreHandle;
pub use schema::{IndexParams, IndexSchema, StoreParams, StoreSchema};
pub use transaction::{Request, Transaction};
pub use types::{
    Durability, EventType, ListenerId, ReadyState, SuccessEvent, TransactionMode,
    TransactionOutcome, VersionChangeEvent,
};
