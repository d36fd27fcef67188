//! # ModernIDB Codec
//!
//! Value-level building blocks shared by the engine and the client:
//!
//! - [`Key`] - the ordered key type records and indexes are sorted by
//! - [`KeyRange`] - bounded or unbounded intervals over keys
//! - [`KeyPath`] - how a key is found inside a JSON record
//! - [`CursorDirection`] - the order a cursor walks its source in
//! - [`to_cbor`] / [`from_cbor`] - the journal's payload encoding
//!
//! ## Key order
//!
//! Keys of different kinds never compare equal. The order is
//! `Number < Date < String < Binary < Array`; inside a kind numbers compare
//! numerically, strings by UTF-16 code unit, binaries bytewise and arrays
//! element by element.
//!
//! ```
//! use modernidb_codec::Key;
//!
//! assert!(Key::from(10) < Key::from("1"));
//! assert!(Key::from("Z") < Key::from("a"));
//! assert!(Key::from(vec![Key::from(1)]) > Key::from("anything"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod direction;
mod error;
mod key;
mod key_path;
mod range;

pub use cbor::{from_cbor, to_cbor};
pub use direction::CursorDirection;
pub use error::{CodecError, CodecResult};
pub use key::Key;
pub use key_path::KeyPath;
pub use range::KeyRange;
