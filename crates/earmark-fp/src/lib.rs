//! Earmark fingerprint file formats
//!
//! A stored track is its metadata plus `(hash, anchor_time)` entries. Three
//! encodings share the same [`TrackFile`] model: pretty JSON, BSON and a
//! compact checksummed binary `.fp` layout.

pub mod error;
pub mod format;
pub mod json_format;
pub mod reader;
pub mod writer;

pub use error::{FpError, Result};
pub use format::{FpEntry, FpHeader, TrackFile, TrackInfo, ENTRY_SIZE, HEADER_SIZE, MAGIC, VERSION};
pub use reader::FpReader;
pub use writer::FpWriter;
