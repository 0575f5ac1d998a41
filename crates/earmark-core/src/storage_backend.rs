//! Storage backend trait and implementations
//!
//! Persists indexed tracks (metadata, fingerprints and the parameters that
//! produced them) to the filesystem or PostgreSQL, and loads them back into
//! an [`Engine`] at startup.

use anyhow::{Context, Result};
use async_trait::async_trait;
use earmark_fp::{FpEntry, FpWriter, TrackFile, TrackInfo};
use std::path::{Path, PathBuf};

use crate::catalog::{TrackCatalog, TrackMetadata};
use crate::config::FingerprintConfig;
use crate::engine::Engine;
use crate::fingerprint::Fingerprint;
use crate::index::TrackId;
use crate::storage_config::{BackendKind, FileFormat, FilesystemConfig, PostgresqlConfig, StorageConfig};

/// A track as persisted
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTrack {
    pub metadata: TrackMetadata,
    /// JSON of the [`FingerprintConfig`] the fingerprints were made with
    pub algorithm_params: String,
    pub fingerprints: Vec<Fingerprint>,
}

impl StoredTrack {
    pub fn new(metadata: TrackMetadata, config: &FingerprintConfig, fingerprints: Vec<Fingerprint>) -> Self {
        Self {
            metadata,
            algorithm_params: config.signature(),
            fingerprints,
        }
    }

    pub fn track_id(&self) -> TrackId {
        self.metadata.track_id
    }

    /// Whether the stored parameters equal `config`
    pub fn is_compatible(&self, config: &FingerprintConfig) -> bool {
        serde_json::from_str::<FingerprintConfig>(&self.algorithm_params)
            .map(|stored| stored == *config)
            .unwrap_or(false)
    }
}

impl From<&StoredTrack> for TrackFile {
    fn from(track: &StoredTrack) -> Self {
        let meta = &track.metadata;
        let info = TrackInfo {
            track_id: meta.track_id,
            title: meta.title.clone(),
            artist: meta.artist.clone(),
            source_path: meta.source_path.clone(),
            duration_ms: meta.duration_ms,
            sample_rate: meta.sample_rate,
            created_at: meta.created_at.clone(),
            algorithm_params: track.algorithm_params.clone(),
        };
        let entries = track
            .fingerprints
            .iter()
            .map(|fp| FpEntry {
                hash: fp.hash,
                t: fp.anchor_time,
            })
            .collect();
        TrackFile::new(info, entries)
    }
}

impl From<TrackFile> for StoredTrack {
    fn from(file: TrackFile) -> Self {
        let info = file.info;
        Self {
            metadata: TrackMetadata {
                track_id: info.track_id,
                title: info.title,
                artist: info.artist,
                source_path: info.source_path,
                duration_ms: info.duration_ms,
                sample_rate: info.sample_rate,
                created_at: info.created_at,
            },
            algorithm_params: info.algorithm_params,
            fingerprints: file
                .entries
                .into_iter()
                .map(|e| Fingerprint {
                    hash: e.hash,
                    anchor_time: e.t,
                })
                .collect(),
        }
    }
}

/// Abstract storage backend trait
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Save a track, replacing any stored track with the same id
    async fn save_track(&self, track: &StoredTrack) -> Result<()>;

    async fn load_track(&self, track_id: TrackId) -> Result<Option<StoredTrack>>;

    /// Load every stored track, ordered by id
    async fn load_all(&self) -> Result<Vec<StoredTrack>>;

    /// Returns whether the track existed
    async fn delete_track(&self, track_id: TrackId) -> Result<bool>;

    async fn list_tracks(&self) -> Result<Vec<TrackMetadata>>;
}

static KNOWN_EXTENSIONS: [&str; 3] = ["json", "bson", "fp"];

/// Filesystem-based storage backend, one file per track
pub struct FilesystemBackend {
    base_dir: PathBuf,
    format: FileFormat,
    compress: bool,
}

impl FilesystemBackend {
    /// Create a new filesystem backend
    pub fn new(config: &FilesystemConfig) -> Self {
        Self {
            base_dir: PathBuf::from(&config.base_directory),
            format: config.format,
            compress: config.compress,
        }
    }

    /// Create from directory path and format
    pub fn from_path(base_dir: impl AsRef<Path>, format: FileFormat) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            format,
            compress: false,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, track_id: TrackId, ext: &str) -> PathBuf {
        self.base_dir.join(format!("{:08}.{}", track_id, ext))
    }

    /// Extensions this backend reads
    fn readable_extensions(&self) -> &'static [&'static str] {
        match self.format {
            FileFormat::Auto => &KNOWN_EXTENSIONS,
            FileFormat::Json => &KNOWN_EXTENSIONS[..1],
            FileFormat::Bson => &KNOWN_EXTENSIONS[1..2],
            FileFormat::Binary => &KNOWN_EXTENSIONS[2..],
        }
    }

    /// Find fingerprint file for a track
    fn find_file(&self, track_id: TrackId) -> Option<PathBuf> {
        self.readable_extensions()
            .iter()
            .map(|ext| self.path_for(track_id, ext))
            .find(|path| path.exists())
    }

    fn track_files(&self) -> Result<Vec<PathBuf>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let readable = self.readable_extensions();
        let entries = std::fs::read_dir(&self.base_dir)
            .with_context(|| format!("Failed to list {}", self.base_dir.display()))?;

        Ok(entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .map(|ext| readable.contains(&ext.to_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect())
    }

    fn write_file(&self, path: &Path, file: &TrackFile) -> Result<()> {
        match self.format {
            FileFormat::Json | FileFormat::Auto => file.save_json(path)?,
            FileFormat::Bson => file.save_bson(path)?,
            FileFormat::Binary => {
                let writer = if self.compress {
                    FpWriter::compressed(3)
                } else {
                    FpWriter::new()
                };
                writer.write(path, file)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn save_track(&self, track: &StoredTrack) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("Failed to create {}", self.base_dir.display()))?;

        let ext = self.format.extension();
        let path = self.path_for(track.track_id(), ext);
        let tmp = self.base_dir.join(format!("{:08}.{}.tmp", track.track_id(), ext));

        // Readers only ever see complete files
        self.write_file(&tmp, &TrackFile::from(track))
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move {} into place", path.display()))?;

        log::debug!("Saved track {} to {}", track.track_id(), path.display());
        Ok(())
    }

    async fn load_track(&self, track_id: TrackId) -> Result<Option<StoredTrack>> {
        match self.find_file(track_id) {
            Some(path) => {
                let file = TrackFile::load_auto(&path)
                    .with_context(|| format!("Failed to load {}", path.display()))?;
                Ok(Some(file.into()))
            }
            None => Ok(None),
        }
    }

    async fn load_all(&self) -> Result<Vec<StoredTrack>> {
        use rayon::prelude::*;

        let files = self.track_files()?;

        // Load all files in parallel; unreadable files are skipped
        let mut tracks: Vec<StoredTrack> = files
            .par_iter()
            .filter_map(|path| match TrackFile::load_auto(path) {
                Ok(file) => Some(StoredTrack::from(file)),
                Err(e) => {
                    log::warn!("Failed to load {}: {}", path.display(), e);
                    None
                }
            })
            .collect();

        tracks.sort_by_key(|t| t.track_id());
        Ok(tracks)
    }

    async fn delete_track(&self, track_id: TrackId) -> Result<bool> {
        let mut deleted = false;
        for ext in KNOWN_EXTENSIONS {
            let path = self.path_for(track_id, ext);
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to delete {}", path.display()))?;
                deleted = true;
            }
        }
        Ok(deleted)
    }

    async fn list_tracks(&self) -> Result<Vec<TrackMetadata>> {
        Ok(self.load_all().await?.into_iter().map(|t| t.metadata).collect())
    }
}

/// PostgreSQL-based storage backend
pub struct PostgresqlBackend {
    pool: deadpool_postgres::Pool,
}

impl PostgresqlBackend {
    /// Connect and make sure the schema exists
    pub async fn new(config: &PostgresqlConfig) -> Result<Self> {
        let pool = earmark_db::create_pool(
            &config.host,
            config.port,
            &config.database,
            &config.user,
            &config.password,
            config.max_connections,
        )?;

        // Test the connection
        earmark_db::test_connection(&pool)
            .await
            .with_context(|| format!("Cannot reach PostgreSQL at {}:{}", config.host, config.port))?;
        earmark_db::ensure_schema(&pool).await?;

        Ok(Self { pool })
    }

    fn to_stored(row: earmark_db::TrackRow, postings: Vec<earmark_db::PostingRow>) -> StoredTrack {
        StoredTrack {
            metadata: TrackMetadata {
                track_id: row.id as TrackId,
                title: row.title,
                artist: row.artist,
                source_path: row.source_path,
                duration_ms: row.duration_ms as u32,
                sample_rate: row.sample_rate as u32,
                created_at: row.created_at.to_rfc3339(),
            },
            algorithm_params: row.algorithm_params,
            fingerprints: postings
                .into_iter()
                .map(|p| Fingerprint {
                    hash: p.hash as u64,
                    anchor_time: p.t as u32,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl StorageBackend for PostgresqlBackend {
    async fn save_track(&self, track: &StoredTrack) -> Result<()> {
        let meta = &track.metadata;
        let id = meta.track_id as i32;

        let created_at = chrono::DateTime::parse_from_rfc3339(&meta.created_at)
            .map(|t| t.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now());

        let new_track = earmark_db::NewTrack {
            id,
            title: meta.title.clone(),
            artist: meta.artist.clone(),
            source_path: meta.source_path.clone(),
            duration_ms: meta.duration_ms as i32,
            sample_rate: meta.sample_rate as i32,
            algorithm_params: track.algorithm_params.clone(),
            created_at,
        };

        // Hashes use 60 bits, so they fit BIGINT unchanged
        let postings: Vec<earmark_db::PostingRow> = track
            .fingerprints
            .iter()
            .map(|fp| earmark_db::PostingRow {
                track_id: id,
                hash: fp.hash as i64,
                t: fp.anchor_time as i32,
            })
            .collect();

        earmark_db::replace_track(&self.pool, &new_track, &postings).await
    }

    async fn load_track(&self, track_id: TrackId) -> Result<Option<StoredTrack>> {
        let id = track_id as i32;
        match earmark_db::get_track(&self.pool, id).await? {
            Some(row) => {
                let postings = earmark_db::get_postings_by_track(&self.pool, id).await?;
                Ok(Some(Self::to_stored(row, postings)))
            }
            None => Ok(None),
        }
    }

    async fn load_all(&self) -> Result<Vec<StoredTrack>> {
        let rows = earmark_db::get_all_tracks(&self.pool).await?;

        let mut tracks = Vec::with_capacity(rows.len());
        for row in rows {
            let postings = earmark_db::get_postings_by_track(&self.pool, row.id).await?;
            tracks.push(Self::to_stored(row, postings));
        }
        Ok(tracks)
    }

    async fn delete_track(&self, track_id: TrackId) -> Result<bool> {
        earmark_db::delete_track(&self.pool, track_id as i32).await
    }

    async fn list_tracks(&self) -> Result<Vec<TrackMetadata>> {
        Ok(earmark_db::get_all_tracks(&self.pool)
            .await?
            .into_iter()
            .map(|row| Self::to_stored(row, Vec::new()).metadata)
            .collect())
    }
}

/// Open the backend selected in configuration
pub async fn open_backend(config: &StorageConfig) -> Result<Box<dyn StorageBackend>> {
    match config.backend {
        BackendKind::Filesystem => {
            log::info!("Using filesystem storage at {}", config.filesystem.base_directory);
            Ok(Box::new(FilesystemBackend::new(&config.filesystem)))
        }
        BackendKind::Postgresql => {
            log::info!(
                "Using PostgreSQL storage at {}:{}/{}",
                config.postgresql.host,
                config.postgresql.port,
                config.postgresql.database
            );
            Ok(Box::new(PostgresqlBackend::new(&config.postgresql).await?))
        }
    }
}

/// First unused track id in `backend`
pub async fn next_track_id(backend: &dyn StorageBackend) -> Result<TrackId> {
    let catalog = TrackCatalog::new();
    for metadata in backend.list_tracks().await? {
        catalog.insert(metadata)?;
    }
    Ok(catalog.next_track_id()?)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct HydrateSummary {
    pub loaded: usize,
    pub skipped: usize,
}

/// Load every stored track into `engine`
///
/// Tracks fingerprinted with different parameters are skipped.
pub async fn hydrate(backend: &dyn StorageBackend, engine: &Engine) -> Result<HydrateSummary> {
    let current = &engine.config().fingerprint;
    let mut summary = HydrateSummary::default();

    for track in backend.load_all().await? {
        if !track.is_compatible(current) {
            log::warn!(
                "Skipping track {} ({}): fingerprinted with different parameters",
                track.track_id(),
                track.metadata.title
            );
            summary.skipped += 1;
            continue;
        }

        let track_id = track.track_id();
        engine
            .ingest_track(track.metadata, &track.fingerprints)
            .with_context(|| format!("Failed to index stored track {}", track_id))?;
        summary.loaded += 1;
    }

    log::info!(
        "Loaded {} stored tracks ({} skipped)",
        summary.loaded,
        summary.skipped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::fingerprinter::Fingerprinter;
    use crate::test_signals::{clip, stepped_sweep};

    fn stored(track_id: TrackId, variant: u32) -> StoredTrack {
        let config = FingerprintConfig::default();
        let samples = stepped_sweep(4.0, config.sample_rate, variant);
        let fingerprints = Fingerprinter::new(&config).unwrap().fingerprint(&samples).fingerprints;
        let mut metadata = TrackMetadata::new(track_id, format!("track {}", track_id), 4000, config.sample_rate);
        metadata.artist = Some("Tester".into());
        StoredTrack::new(metadata, &config, fingerprints)
    }

    #[tokio::test]
    async fn test_filesystem_save_and_load_each_format() {
        for format in [FileFormat::Json, FileFormat::Bson, FileFormat::Binary] {
            let dir = tempfile::tempdir().unwrap();
            let backend = FilesystemBackend::from_path(dir.path(), format);
            let track = stored(12, 0);

            backend.save_track(&track).await.unwrap();
            let expected = dir.path().join(format!("00000012.{}", format.extension()));
            assert!(expected.exists(), "{:?}", format);

            let loaded = backend.load_track(12).await.unwrap().unwrap();
            assert_eq!(loaded, track, "{:?}", format);
            assert!(backend.load_track(13).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_compressed_binary_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = FilesystemConfig {
            base_directory: dir.path().display().to_string(),
            format: FileFormat::Binary,
            compress: true,
        };
        let backend = FilesystemBackend::new(&config);
        let track = stored(1, 1);

        backend.save_track(&track).await.unwrap();
        assert_eq!(backend.load_all().await.unwrap(), vec![track]);
    }

    #[tokio::test]
    async fn test_save_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::from_path(dir.path(), FileFormat::Json);
        backend.save_track(&stored(3, 0)).await.unwrap();
        backend.save_track(&stored(3, 1)).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["00000003.json".to_string()]);
    }

    #[tokio::test]
    async fn test_load_all_is_sorted_and_skips_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::from_path(dir.path(), FileFormat::Auto);
        for id in [5, 2, 9] {
            backend.save_track(&stored(id, id % 3)).await.unwrap();
        }
        std::fs::write(dir.path().join("00000004.json"), "{ truncated").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let ids: Vec<TrackId> = backend.load_all().await.unwrap().iter().map(|t| t.track_id()).collect();
        assert_eq!(ids, vec![2, 5, 9]);

        let listed = backend.list_tracks().await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].artist.as_deref(), Some("Tester"));
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::from_path(dir.path().join("absent"), FileFormat::Auto);
        assert!(backend.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_track() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::from_path(dir.path(), FileFormat::Bson);
        backend.save_track(&stored(8, 0)).await.unwrap();

        assert!(backend.delete_track(8).await.unwrap());
        assert!(!backend.delete_track(8).await.unwrap());
        assert!(backend.load_track(8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_filesystem_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StorageConfig::default();
        config.filesystem.base_directory = dir.path().display().to_string();

        let backend = open_backend(&config).await.unwrap();
        backend.save_track(&stored(1, 0)).await.unwrap();
        assert!(dir.path().join("00000001.json").exists());
    }

    #[tokio::test]
    async fn test_next_track_id() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::from_path(dir.path(), FileFormat::Json);
        assert_eq!(next_track_id(&backend).await.unwrap(), 1);

        backend.save_track(&stored(4, 0)).await.unwrap();
        backend.save_track(&stored(2, 1)).await.unwrap();
        assert_eq!(next_track_id(&backend).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_hydrate_then_match() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::from_path(dir.path(), FileFormat::Binary);
        backend.save_track(&stored(1, 0)).await.unwrap();
        backend.save_track(&stored(2, 1)).await.unwrap();

        let mut foreign = stored(3, 2);
        let mut other_config = FingerprintConfig::default();
        other_config.fan_out = 9;
        foreign.algorithm_params = other_config.signature();
        backend.save_track(&foreign).await.unwrap();

        let engine = Engine::in_memory(EngineConfig::default()).unwrap();
        let summary = hydrate(&backend, &engine).await.unwrap();
        assert_eq!(summary, HydrateSummary { loaded: 2, skipped: 1 });
        assert!(engine.metadata(3).unwrap().is_none());
        assert_eq!(engine.metadata(2).unwrap().unwrap().title, "track 2");

        let query = clip(&stepped_sweep(4.0, 16000, 1), 16000, 1.0, 2.0);
        let outcome = engine.match_samples(&query).unwrap();
        assert_eq!(outcome.best().unwrap().track_id, 2);
    }

    #[test]
    fn test_compatibility_check() {
        let config = FingerprintConfig::default();
        let mut track = stored(1, 0);
        assert!(track.is_compatible(&config));

        track.algorithm_params = "not json".into();
        assert!(!track.is_compatible(&config));
    }
}
