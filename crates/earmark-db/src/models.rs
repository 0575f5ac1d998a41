use serde::{Deserialize, Serialize};

/// A stored track row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRow {
    pub id: i32,
    pub title: String,
    pub artist: Option<String>,
    pub source_path: Option<String>,
    pub duration_ms: i32,
    pub sample_rate: i32,
    pub algorithm_params: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Input structure for a track insert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTrack {
    pub id: i32,
    pub title: String,
    pub artist: Option<String>,
    pub source_path: Option<String>,
    pub duration_ms: i32,
    pub sample_rate: i32,
    pub algorithm_params: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One `(hash, anchor time)` posting of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingRow {
    pub track_id: i32,
    pub hash: i64,
    pub t: i32,
}
