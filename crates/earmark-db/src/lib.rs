//! Earmark Database Layer
//!
//! PostgreSQL storage for tracks and their postings

pub mod connection;
pub mod models;
pub mod operations;

// Re-export commonly used types
pub use connection::{create_pool, test_connection, DbPool};
pub use models::{NewTrack, PostingRow, TrackRow};
pub use operations::{
    delete_track, ensure_schema, get_all_tracks, get_postings_by_track, get_track, replace_track,
};
