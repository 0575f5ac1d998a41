//! Fingerprinting engine
//!
//! Owns the index handle, the track catalog and the counters, and exposes
//! the ingest, query and removal operations as one facade.

use crate::audio::Decoder;
use crate::cancel::CancelToken;
use crate::catalog::{TrackCatalog, TrackMetadata};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::index::{ingest_with_retry, FingerprintIndex, MemoryIndex, TrackId};
use crate::matching::{MatchOutcome, Matcher};
use crate::pipeline::{BatchReport, FileStatus, IngestedTrack, Pipeline, TrackSource};
use crate::stats::{EngineStats, StatsSnapshot};
use std::sync::Arc;
use std::time::Instant;

pub struct Engine {
    config: EngineConfig,
    index: Arc<dyn FingerprintIndex>,
    catalog: TrackCatalog,
    stats: EngineStats,
    pipeline: Pipeline,
    matcher: Matcher,
}

impl Engine {
    pub fn new(config: EngineConfig, index: Arc<dyn FingerprintIndex>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            pipeline: Pipeline::new(&config.fingerprint, &config.pipeline)?,
            matcher: Matcher::new(&config.fingerprint, &config.matching)?,
            index,
            catalog: TrackCatalog::new(),
            stats: EngineStats::default(),
            config,
        })
    }

    /// Engine backed by a fresh [`MemoryIndex`]
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        let index = Arc::new(MemoryIndex::with_config(&config.pipeline));
        Self::new(config, index)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<dyn FingerprintIndex> {
        &self.index
    }

    pub fn catalog(&self) -> &TrackCatalog {
        &self.catalog
    }

    pub fn fingerprint(
        &self,
        sources: &[TrackSource],
        decoder: &dyn Decoder,
        cancel: &CancelToken,
    ) -> BatchReport {
        self.fingerprint_observed(sources, decoder, cancel, &|_| {})
    }

    /// Fingerprint a batch, cataloguing every track that gets indexed
    pub fn fingerprint_observed(
        &self,
        sources: &[TrackSource],
        decoder: &dyn Decoder,
        cancel: &CancelToken,
        observer: &(dyn Fn(&IngestedTrack<'_>) + Sync),
    ) -> BatchReport {
        let report = self.pipeline.run_observed(
            sources,
            decoder,
            self.index.as_ref(),
            cancel,
            &|track| {
                self.catalog_track(track);
                observer(track);
            },
        );

        for file in &report.files {
            match file.status {
                FileStatus::Indexed { .. } => self.stats.record_file(file.elapsed, true),
                FileStatus::Failed(_) => self.stats.record_file(file.elapsed, false),
                FileStatus::Cancelled => {}
            }
        }
        report
    }

    fn catalog_track(&self, track: &IngestedTrack<'_>) {
        let source = track.source;
        let mut metadata = TrackMetadata::new(
            source.track_id,
            source.title.clone(),
            track.duration_ms,
            self.config.fingerprint.sample_rate,
        );
        metadata.artist = source.artist.clone();
        metadata.source_path = Some(source.path.display().to_string());

        if let Err(e) = self.catalog.insert(metadata) {
            log::warn!("Could not catalog track {}: {}", source.track_id, e);
        }
    }

    pub fn match_samples(&self, samples: &[f32]) -> Result<MatchOutcome> {
        self.match_samples_with(samples, &CancelToken::new())
    }

    /// Match with a caller-supplied token, which may carry a deadline
    pub fn match_samples_with(&self, samples: &[f32], cancel: &CancelToken) -> Result<MatchOutcome> {
        let start = Instant::now();
        let outcome = self.matcher.match_samples(self.index.as_ref(), samples, cancel)?;
        self.stats.record_query(start.elapsed(), outcome.is_match());
        Ok(outcome)
    }

    /// Index a track whose fingerprints were computed elsewhere
    pub fn ingest_track(&self, metadata: TrackMetadata, fingerprints: &[Fingerprint]) -> Result<usize> {
        let count = ingest_with_retry(
            self.index.as_ref(),
            metadata.track_id,
            fingerprints,
            &self.config.pipeline,
        )?;
        self.catalog.insert(metadata)?;
        Ok(count)
    }

    /// Remove a track from the index and the catalog
    pub fn remove(&self, track_id: TrackId) -> Result<usize> {
        let removed = self.index.remove(track_id)?;
        self.catalog.remove(track_id)?;
        log::info!("Removed track {} ({} postings)", track_id, removed);
        Ok(removed)
    }

    pub fn metadata(&self, track_id: TrackId) -> Result<Option<TrackMetadata>> {
        self.catalog.get(track_id)
    }

    pub fn stats(&self) -> Result<StatsSnapshot> {
        Ok(self.stats.snapshot(self.index.stats()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioData;
    use crate::error::Error;
    use crate::fingerprinter::Fingerprinter;
    use crate::test_signals::{clip, stepped_sweep};
    use std::path::Path;
    use std::time::Duration;

    struct SweepDecoder;

    impl Decoder for SweepDecoder {
        fn decode(&self, path: &Path) -> Result<AudioData> {
            let variant = if path.ends_with("second.wav") { 1 } else { 0 };
            Ok(AudioData::from_interleaved(stepped_sweep(6.0, 16000, variant), 16000, 1))
        }
    }

    fn engine() -> Engine {
        Engine::in_memory(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.matching.max_results = 0;
        assert!(matches!(Engine::in_memory(config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_fingerprint_then_match_with_metadata() {
        let engine = engine();
        let mut second = TrackSource::new(2, "/music/second.wav");
        second.artist = Some("Synth".into());
        let batch = vec![TrackSource::new(1, "/music/first.wav"), second];

        let report = engine.fingerprint(&batch, &SweepDecoder, &CancelToken::new());
        assert_eq!(report.summary().indexed, 2);

        let meta = engine.metadata(2).unwrap().unwrap();
        assert_eq!(meta.title, "second");
        assert_eq!(meta.artist.as_deref(), Some("Synth"));
        assert_eq!(meta.duration_ms, 6000);
        assert_eq!(meta.source_path.as_deref(), Some("/music/second.wav"));

        let query = clip(&stepped_sweep(6.0, 16000, 1), 16000, 1.0, 2.0);
        let outcome = engine.match_samples(&query).unwrap();
        assert_eq!(outcome.best().unwrap().track_id, 2);

        let stats = engine.stats().unwrap();
        assert_eq!(stats.tracks_indexed, 2);
        assert_eq!(stats.files_fingerprinted, 2);
        assert_eq!(stats.queries_served, 1);
        assert_eq!(stats.matches_found, 1);
        assert!(stats.hashes_stored > 0);
    }

    #[test]
    fn test_ingest_track_and_remove() {
        let engine = engine();
        let config = engine.config().fingerprint.clone();
        let samples = stepped_sweep(6.0, 16000, 0);
        let fps = Fingerprinter::new(&config).unwrap().fingerprint(&samples).fingerprints;

        let count = engine
            .ingest_track(TrackMetadata::new(7, "stored", 6000, 16000), &fps)
            .unwrap();
        assert_eq!(count, fps.len());
        assert!(engine.metadata(7).unwrap().is_some());

        let query = clip(&samples, 16000, 2.0, 2.0);
        assert!(engine.match_samples(&query).unwrap().is_match());

        assert_eq!(engine.remove(7).unwrap(), fps.len());
        assert!(engine.metadata(7).unwrap().is_none());
        let outcome = engine.match_samples(&query).unwrap();
        assert!(outcome.results().iter().all(|r| r.track_id != 7));
        assert_eq!(engine.stats().unwrap().tracks_indexed, 0);
    }

    #[test]
    fn test_expired_deadline_cancels_query() {
        let engine = engine();
        let samples = stepped_sweep(3.0, 16000, 0);
        let token = CancelToken::with_timeout(Duration::ZERO);
        assert!(matches!(
            engine.match_samples_with(&samples, &token),
            Err(Error::Cancelled)
        ));
        assert_eq!(engine.stats().unwrap().queries_served, 0);
    }
}
