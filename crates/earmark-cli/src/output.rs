//! JSON output formatting

use earmark_core::{
    BatchReport, BatchSummary, Engine, FileStatus, HydrateSummary, IndexStats, MatchOutcome, MatchResult,
    TrackId, TrackMetadata,
};
use serde::Serialize;

/// Per-file line of an `emgen` run
#[derive(Debug, Serialize)]
pub struct FileOutput {
    pub track_id: TrackId,
    pub path: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprints: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct BatchOutput {
    pub files: Vec<FileOutput>,
    pub summary: BatchSummary,
    pub processing_time_seconds: f64,
}

impl BatchOutput {
    pub fn from_report(report: &BatchReport) -> Self {
        let files = report
            .files
            .iter()
            .map(|file| {
                let mut out = FileOutput {
                    track_id: file.track_id,
                    path: file.path.display().to_string(),
                    status: "indexed",
                    fingerprints: None,
                    error_kind: None,
                    error: None,
                    elapsed_ms: file.elapsed.as_secs_f64() * 1000.0,
                };
                match &file.status {
                    FileStatus::Indexed { fingerprints, .. } => out.fingerprints = Some(*fingerprints),
                    FileStatus::Failed(e) => {
                        out.status = "failed";
                        out.error_kind = Some(e.kind());
                        out.error = Some(e.to_string());
                    }
                    FileStatus::Cancelled => out.status = "cancelled",
                }
                out
            })
            .collect();

        Self {
            files,
            summary: report.summary(),
            processing_time_seconds: report.elapsed.as_secs_f64(),
        }
    }

    /// Mark an indexed file whose track could not be persisted
    pub fn mark_unsaved(&mut self, track_id: TrackId, error: &anyhow::Error) {
        if let Some(file) = self.files.iter_mut().find(|f| f.track_id == track_id) {
            file.status = "failed";
            file.error_kind = Some("storage_error");
            file.error = Some(format!("{:#}", error));
            self.summary.indexed = self.summary.indexed.saturating_sub(1);
            self.summary.failed += 1;
        }
    }
}

/// A match joined with catalog metadata
#[derive(Debug, Serialize)]
pub struct MatchedTrack {
    #[serde(flatten)]
    pub result: MatchResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutput {
    Match {
        query_path: String,
        detections: usize,
        results: Vec<MatchedTrack>,
    },
    NoMatch {
        query_path: String,
        query_fingerprints: usize,
        candidates: usize,
    },
}

impl MatchOutput {
    pub fn new(query_path: &str, outcome: MatchOutcome, engine: &Engine) -> Self {
        match outcome {
            MatchOutcome::Matched(results) => {
                let results: Vec<MatchedTrack> = results
                    .into_iter()
                    .map(|result| {
                        let metadata = engine.metadata(result.track_id).ok().flatten();
                        MatchedTrack {
                            title: metadata.as_ref().map(|m| m.title.clone()),
                            artist: metadata.as_ref().and_then(|m| m.artist.clone()),
                            source_path: metadata.and_then(|m| m.source_path),
                            result,
                        }
                    })
                    .collect();
                MatchOutput::Match {
                    query_path: query_path.to_string(),
                    detections: results.len(),
                    results,
                }
            }
            MatchOutcome::NoMatch {
                query_fingerprints,
                candidates,
            } => MatchOutput::NoMatch {
                query_path: query_path.to_string(),
                query_fingerprints,
                candidates,
            },
        }
    }
}

/// Counts derived from storage. Query counters live only as long as one
/// process and are not reported here.
#[derive(Debug, Serialize)]
pub struct StatsOutput {
    pub tracks_indexed: usize,
    pub hashes_stored: usize,
    pub distinct_hashes: usize,
    pub stored: HydrateSummary,
    pub tracks: Vec<TrackMetadata>,
}

impl StatsOutput {
    pub fn new(index: IndexStats, stored: HydrateSummary, tracks: Vec<TrackMetadata>) -> Self {
        Self {
            tracks_indexed: index.tracks,
            hashes_stored: index.postings,
            distinct_hashes: index.distinct_hashes,
            stored,
            tracks,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RemoveOutput {
    pub track_id: TrackId,
    pub removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Print any output as pretty JSON
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing output: {}", e),
    }
}
