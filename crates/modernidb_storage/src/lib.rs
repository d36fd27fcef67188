//! # ModernIDB Storage
//!
//! Byte stores that hold database journals.
//!
//! A backend is an **opaque, append-only byte store**. It knows nothing about
//! journal records, object stores or keys; the engine owns every byte format
//! and only asks the backend to append, read back, flush and truncate.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - journals that live as long as the factory
//! - [`FileBackend`] - one file per database on the OS file system
//!
//! ## Example
//!
//! ```rust
//! use modernidb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut journal = InMemoryBackend::new();
//! let offset = journal.append(b"record").unwrap();
//! assert_eq!(journal.read_at(offset, 6).unwrap(), b"record");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
