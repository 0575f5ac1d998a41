//! Format violations and I/O failures

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FpError>;

#[derive(Debug, Error)]
pub enum FpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a fingerprint file: magic bytes mismatch")]
    BadMagic,

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    #[error("file truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("checksum mismatch: header {expected:#018x}, computed {actual:#018x}")]
    ChecksumMismatch { expected: u64, actual: u64 },

    #[error("payload holds {actual} bytes, expected {expected}")]
    PayloadSize { expected: usize, actual: usize },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BSON encode failed: {0}")]
    BsonEncode(#[from] bson::ser::Error),

    #[error("BSON decode failed: {0}")]
    BsonDecode(#[from] bson::de::Error),

    #[error("unknown fingerprint file extension: {0}")]
    UnknownExtension(String),
}
