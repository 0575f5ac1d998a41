//! Batch fingerprinting
//!
//! Files are decoded, fingerprinted and ingested one per task on a dedicated
//! worker pool. A failing file is reported and the batch moves on.

use crate::audio::Decoder;
use crate::cancel::CancelToken;
use crate::config::{FingerprintConfig, PipelineConfig};
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::fingerprinter::Fingerprinter;
use crate::index::{ingest_with_retry, FingerprintIndex, TrackId};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};


/// One file to fingerprint
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSource {
    pub track_id: TrackId,
    pub path: PathBuf,
    pub title: String,
    pub artist: Option<String>,
}

impl TrackSource {
    /// Source titled after the file stem
    pub fn new(track_id: TrackId, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("track {}", track_id));

        Self {
            track_id,
            path,
            title,
            artist: None,
        }
    }
}

/// A track whose postings were just committed
#[derive(Debug)]
pub struct IngestedTrack<'a> {
    pub source: &'a TrackSource,
    pub duration_ms: u32,
    pub fingerprints: &'a [Fingerprint],
}

#[derive(Debug)]
pub enum FileStatus {
    Indexed {
        duration_ms: u32,
        landmarks: usize,
        fingerprints: usize,
    },
    Failed(Error),
    /// Not started because the batch was cancelled
    Cancelled,
}

#[derive(Debug)]
pub struct FileReport {
    pub track_id: TrackId,
    pub path: PathBuf,
    pub status: FileStatus,
    pub elapsed: Duration,
}

impl FileReport {
    pub fn is_indexed(&self) -> bool {
        matches!(self.status, FileStatus::Indexed { .. })
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.status {
            FileStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Per-file reports in input order
#[derive(Debug)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub indexed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub fingerprints: usize,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.files.len(),
            ..Default::default()
        };
        for report in &self.files {
            match &report.status {
                FileStatus::Indexed { fingerprints, .. } => {
                    summary.indexed += 1;
                    summary.fingerprints += fingerprints;
                }
                FileStatus::Failed(_) => summary.failed += 1,
                FileStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|r| r.error().is_some())
    }
}

pub struct Pipeline {
    fingerprinter: Fingerprinter,
    sample_rate: u32,
    config: PipelineConfig,
    pool: rayon::ThreadPool,
}

impl Pipeline {
    pub fn new(fingerprint_config: &FingerprintConfig, config: &PipelineConfig) -> Result<Self> {
        fingerprint_config.validate()?;
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("earmark-worker-{}", i))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("cannot start worker pool: {}", e)))?;

        Ok(Self {
            fingerprinter: Fingerprinter::new(fingerprint_config)?,
            sample_rate: fingerprint_config.sample_rate,
            config: config.clone(),
            pool,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn run(
        &self,
        sources: &[TrackSource],
        decoder: &dyn Decoder,
        index: &dyn FingerprintIndex,
        cancel: &CancelToken,
    ) -> BatchReport {
        self.run_observed(sources, decoder, index, cancel, &|_| {})
    }

    /// Like [`Pipeline::run`], calling `observer` after each successful ingest
    pub fn run_observed(
        &self,
        sources: &[TrackSource],
        decoder: &dyn Decoder,
        index: &dyn FingerprintIndex,
        cancel: &CancelToken,
        observer: &(dyn Fn(&IngestedTrack<'_>) + Sync),
    ) -> BatchReport {
        let start = Instant::now();
        // Set when the index fails in a way no later file can recover from
        let halted = AtomicBool::new(false);

        log::info!(
            "Fingerprinting {} files on {} workers",
            sources.len(),
            self.workers()
        );

        let files = self.pool.install(|| {
            sources
                .par_iter()
                .map(|source| self.process(source, decoder, index, cancel, &halted, observer))
                .collect()
        });

        let report = BatchReport {
            files,
            elapsed: start.elapsed(),
        };
        let summary = report.summary();
        log::info!(
            "Batch done in {:.2?}: {} indexed, {} failed, {} cancelled",
            report.elapsed,
            summary.indexed,
            summary.failed,
            summary.cancelled
        );
        report
    }

    fn process(
        &self,
        source: &TrackSource,
        decoder: &dyn Decoder,
        index: &dyn FingerprintIndex,
        cancel: &CancelToken,
        halted: &AtomicBool,
        observer: &(dyn Fn(&IngestedTrack<'_>) + Sync),
    ) -> FileReport {
        let start = Instant::now();

        let status = if cancel.is_cancelled() || halted.load(Ordering::SeqCst) {
            FileStatus::Cancelled
        } else {
            match self.index_file(source, decoder, index, observer) {
                Ok(status) => status,
                Err(Error::Cancelled) => FileStatus::Cancelled,
                Err(e) => {
                    log::warn!("Failed {}: {}", source.path.display(), e);
                    if e.is_batch_fatal() {
                        halted.store(true, Ordering::SeqCst);
                    }
                    FileStatus::Failed(e)
                }
            }
        };

        FileReport {
            track_id: source.track_id,
            path: source.path.clone(),
            status,
            elapsed: start.elapsed(),
        }
    }

    fn index_file(
        &self,
        source: &TrackSource,
        decoder: &dyn Decoder,
        index: &dyn FingerprintIndex,
        observer: &(dyn Fn(&IngestedTrack<'_>) + Sync),
    ) -> Result<FileStatus> {
        let audio = decoder.decode(&source.path)?;
        if audio.sample_rate != self.sample_rate {
            return Err(Error::Decode {
                path: source.path.clone(),
                reason: format!(
                    "decoded at {} Hz, expected {} Hz",
                    audio.sample_rate, self.sample_rate
                ),
            });
        }

        let result = self.fingerprinter.fingerprint(&audio.samples);
        ingest_with_retry(index, source.track_id, &result.fingerprints, &self.config)?;

        observer(&IngestedTrack {
            source,
            duration_ms: audio.duration_ms,
            fingerprints: &result.fingerprints,
        });

        log::info!(
            "Indexed {} as track {}: {} landmarks, {} fingerprints",
            source.path.display(),
            source.track_id,
            result.landmarks,
            result.fingerprints.len()
        );

        Ok(FileStatus::Indexed {
            duration_ms: audio.duration_ms,
            landmarks: result.landmarks,
            fingerprints: result.fingerprints.len(),
        })
    }
}
