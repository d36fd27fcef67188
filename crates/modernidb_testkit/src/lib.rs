//! # ModernIDB Testkit
//!
//! Test utilities for ModernIDB.
//!
//! This crate provides:
//! - Factories with automatic cleanup and a ready-made catalog database
//! - Property-based test generators using proptest
//! - Concurrency stress helpers
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust
//! use modernidb_testkit::prelude::*;
//!
//! with_catalog(|db| {
//!     db.put_to_store("items", &Item::new("a", "tools", 3), None).unwrap();
//!     let item: Option<Item> = db.get_from_store("items", "a").unwrap();
//!     assert_eq!(item.map(|item| item.price), Some(3));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;

/// Installs a test-friendly `tracing` subscriber, once per process.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
