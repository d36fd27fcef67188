//! # ModernIDB
//!
//! A typed client over the ModernIDB engine.
//!
//! - [`ModernIdb`] owns one connection through a closed, opening, open
//!   lifecycle and runs `on_init` / `on_upgrade` migrations when the
//!   stored version is behind
//! - [`ObjectStore`], [`ObjectStoreIndex`] and the cursor types decode
//!   records into your own serde types
//! - [`CursorStream`] turns an engine cursor into an iterator
//! - [`TransactionEventBus`] reports committed transactions by mode
//! - [`AsyncOp`] and [`QueryClient`] report failures as data
//!
//! ```
//! use modernidb::{
//!     CursorDirection, Factory, IndexParams, ModernIdb, SchemaDescriptor, StoreParams,
//!     TransactionMode, TransactionOptions,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Widget {
//!     id: String,
//!     qty: u32,
//! }
//!
//! let factory = Factory::in_memory();
//! let db = ModernIdb::builder(&factory, "inventory")
//!     .version(1)
//!     .schema(SchemaDescriptor::builder().store::<Widget>("widgets").index("by_qty").build())
//!     .on_init(|ctx| {
//!         let widgets = ctx
//!             .manager
//!             .create_object_store::<Widget>("widgets", StoreParams::new().key_path("id"))?;
//!         widgets.create_index("by_qty", "qty", IndexParams::new())?;
//!         Ok(())
//!     })
//!     .build()
//!     .unwrap();
//! db.open().unwrap();
//!
//! let (widgets, done) = db
//!     .transaction::<Widget>("widgets", TransactionMode::ReadWrite, TransactionOptions::default())
//!     .unwrap();
//! widgets.put(&Widget { id: "a".into(), qty: 3 }, None).unwrap();
//! widgets.put(&Widget { id: "b".into(), qty: 1 }, None).unwrap();
//! done.wait().unwrap();
//!
//! let (widgets, _done) = db
//!     .transaction::<Widget>("widgets", TransactionMode::ReadOnly, TransactionOptions::default())
//!     .unwrap();
//! let by_qty: Vec<String> = widgets
//!     .index("by_qty")
//!     .unwrap()
//!     .open_cursor(None, CursorDirection::Next)
//!     .unwrap()
//!     .map(|cursor| cursor.unwrap().into_value().id)
//!     .collect();
//! assert_eq!(by_qty, ["b", "a"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapters;
mod async_op;
mod client;
mod cursor;
mod error;
mod events;
mod index;
mod manager;
mod object_store;
mod query;
mod schema;
mod single_flight;
#[cfg(test)]
mod testutil;
mod transaction;

pub use adapters::{request_to_result, Completion, CursorItem, CursorStream, TransactionCompleteEvent};
pub use async_op::AsyncOp;
pub use client::{
    delete_database, BlockingContext, BlockingHandler, ConnectionState, ModernIdb,
    ModernIdbBuilder, OpenRequestHandlers, UpgradeContext, VersionChangeHandler,
};
pub use cursor::{Cursor, CursorWithValue, IndexCursor, IndexCursorWithValue};
pub use error::{AsyncOpStateError, HandlerError, ModernIdbError, Result};
pub use events::{ListenerId, Subscription, TransactionEvent, TransactionEventBus};
pub use index::ObjectStoreIndex;
pub use manager::VersionChangeManager;
pub use object_store::{ObjectStore, VersionChangeObjectStore};
pub use query::{
    to_known_error, DatabaseOpenRequestOp, DatabaseQueryOpFailure, InaccessibleDatabaseError,
    QueryClient, QueryError, QueryOp,
};
pub use schema::{SchemaBuilder, SchemaDescriptor, StoreBuilder};
pub use single_flight::{FlightGuard, SingleFlight};
pub use transaction::{Transaction, TransactionOptions, VersionChangeTransaction};

pub use modernidb_engine::{
    CursorDirection, CursorSource, Durability, EngineError, EventType, Factory, FactoryConfig,
    IndexParams, Key, KeyPath, KeyRange, StoreParams, SuccessEvent, TransactionMode,
    VersionChangeEvent,
};
