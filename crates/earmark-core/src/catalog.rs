//! Track metadata side table
//!
//! Reporting looks tracks up here by id. Scoring never reads it.

use crate::error::{Error, Result};
use crate::index::TrackId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub track_id: TrackId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    pub duration_ms: u32,
    pub sample_rate: u32,
    /// RFC 3339 timestamp
    pub created_at: String,
}

impl TrackMetadata {
    /// Metadata stamped with the current time
    pub fn new(track_id: TrackId, title: impl Into<String>, duration_ms: u32, sample_rate: u32) -> Self {
        Self {
            track_id,
            title: title.into(),
            artist: None,
            source_path: None,
            duration_ms,
            sample_rate,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TrackCatalog {
    tracks: RwLock<BTreeMap<TrackId, TrackMetadata>>,
}

impl TrackCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, metadata: TrackMetadata) -> Result<()> {
        self.tracks
            .write()
            .map_err(|_| poisoned())?
            .insert(metadata.track_id, metadata);
        Ok(())
    }

    pub fn get(&self, track_id: TrackId) -> Result<Option<TrackMetadata>> {
        Ok(self.tracks.read().map_err(|_| poisoned())?.get(&track_id).cloned())
    }

    pub fn remove(&self, track_id: TrackId) -> Result<Option<TrackMetadata>> {
        Ok(self.tracks.write().map_err(|_| poisoned())?.remove(&track_id))
    }

    /// All tracks ordered by id
    pub fn list(&self) -> Result<Vec<TrackMetadata>> {
        Ok(self.tracks.read().map_err(|_| poisoned())?.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.tracks.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest id above every catalogued track
    pub fn next_track_id(&self) -> Result<TrackId> {
        let tracks = self.tracks.read().map_err(|_| poisoned())?;
        Ok(tracks.keys().next_back().map_or(1, |id| id + 1))
    }
}

fn poisoned() -> Error {
    Error::IndexUnavailable("track catalog lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let catalog = TrackCatalog::new();
        assert!(catalog.is_empty());
        assert_eq!(catalog.next_track_id().unwrap(), 1);

        let mut meta = TrackMetadata::new(4, "Sweep", 10_000, 16000);
        meta.artist = Some("Test Signal".into());
        catalog.insert(meta.clone()).unwrap();
        catalog.insert(TrackMetadata::new(2, "Other", 5_000, 16000)).unwrap();

        assert_eq!(catalog.get(4).unwrap(), Some(meta));
        assert_eq!(catalog.next_track_id().unwrap(), 5);
        let ids: Vec<TrackId> = catalog.list().unwrap().iter().map(|m| m.track_id).collect();
        assert_eq!(ids, vec![2, 4]);

        assert!(catalog.remove(4).unwrap().is_some());
        assert!(catalog.get(4).unwrap().is_none());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_created_at_is_rfc3339() {
        let meta = TrackMetadata::new(1, "x", 0, 16000);
        assert!(chrono::DateTime::parse_from_rfc3339(&meta.created_at).is_ok());
    }
}
