//! Error kinds surfaced by the fingerprinting core
//!
//! A query that finds nothing is not an error: see [`crate::matching::MatchOutcome`].

use crate::index::TrackId;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Input audio could not be turned into a sample sequence
    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    /// Configuration rejected at construction time
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Another writer holds the track; callers may retry
    #[error("concurrent write in progress for track {0}")]
    IndexWriteConflict(TrackId),

    /// Conflict retries exhausted
    #[error("ingest of track {track_id} failed after {attempts} attempts")]
    IngestFailed { track_id: TrackId, attempts: u32 },

    #[error("track {0} is already indexed")]
    TrackAlreadyIndexed(TrackId),

    /// Storage is unreachable or its state is unusable
    #[error("fingerprint index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Short machine-readable name used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Decode { .. } => "decode_error",
            Error::InvalidConfig(_) => "invalid_config",
            Error::IndexWriteConflict(_) => "index_write_conflict",
            Error::IngestFailed { .. } => "ingest_failed",
            Error::TrackAlreadyIndexed(_) => "track_already_indexed",
            Error::IndexUnavailable(_) => "index_unavailable",
            Error::Cancelled => "cancelled",
        }
    }

    /// Errors that affect every unit of work rather than a single file or query
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Error::InvalidConfig(_) | Error::IndexUnavailable(_))
    }
}
