//! Decoder for a legacy in-memory datastore's on-disk snapshot format
//! (magic `REDIS`, version 12): a forward-only binary stream of opcodes
//! and typed value records that this crate turns into an owned tree of
//! [`LogicalValue`]s under [`KeyRecord`]s, collected into a [`SnapshotResult`].
//!
//! Serialising that tree to JSON or any other sink, parsing command-line
//! arguments, and talking to a live server over its network protocol are
//! all out of scope: this crate stops at the logical value tree.

mod byte_reader;
mod containers;
mod crc;
mod driver;
mod error;
mod lzf;
mod primitives;
mod stream;
mod value;
mod warning;

pub use byte_reader::ByteReader;
pub use driver::{decode_snapshot, DecodeOptions, KeyRecord, SnapshotResult};
pub use error::{Error, ErrorKind, Result};
pub use value::LogicalValue;
pub use warning::{Warning, WarningKind};
