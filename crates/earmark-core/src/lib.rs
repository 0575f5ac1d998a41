//! Earmark Core - Landmark Audio Fingerprinting
//!
//! Turns audio into spectral peak landmarks, pairs them into compact hashes,
//! keeps those hashes in a concurrent inverted index and identifies query
//! clips by voting on consistent time offsets.

pub mod audio;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod fingerprinter;
pub mod index;
pub mod landmark;
pub mod matching;
pub mod pipeline;
pub mod stats;
pub mod storage_backend;
pub mod storage_config;
pub mod transform;

#[cfg(test)]
mod test_signals;

pub use audio::{AudioData, AudioFormat, Decoder, FileDecoder};
pub use cancel::CancelToken;
pub use catalog::{TrackCatalog, TrackMetadata};
pub use config::{EngineConfig, FingerprintConfig, MatchConfig, PipelineConfig};
pub use engine::Engine;
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, FingerprintGenerator};
pub use fingerprinter::{Fingerprinter, TrackFingerprints};
pub use index::{FingerprintIndex, IndexStats, MemoryIndex, Posting, TrackId};
pub use landmark::{Landmark, LandmarkExtractor};
pub use matching::{MatchOutcome, MatchResult, Matcher};
pub use pipeline::{BatchReport, BatchSummary, FileReport, FileStatus, Pipeline, TrackSource};
pub use stats::StatsSnapshot;
pub use storage_backend::{hydrate, next_track_id, open_backend, HydrateSummary, StorageBackend, StoredTrack};
pub use storage_config::EarmarkConfig;

use std::path::Path;

/// Decode one file and fingerprint it
pub fn fingerprint_file(path: &Path, config: &FingerprintConfig) -> Result<TrackFingerprints> {
    config.validate()?;
    let audio = FileDecoder::from_config(config).decode(path)?;
    Ok(Fingerprinter::new(config)?.fingerprint(&audio.samples))
}
