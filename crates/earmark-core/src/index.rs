//! Inverted fingerprint index
//!
//! Maps a hash to the postings of every committed track that produced it.
//! The index is the only shared mutable state in the engine.

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, TryLockError};
use std::time::Duration;

pub type TrackId = u32;

/// One occurrence of a hash in an indexed track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Posting {
    pub track_id: TrackId,
    pub anchor_time: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub tracks: usize,
    pub postings: usize,
    pub distinct_hashes: usize,
}

/// Storage for hash postings.
///
/// A track's postings become visible to `lookup` all at once when its
/// `ingest` call returns, and disappear all at once on `remove`.
pub trait FingerprintIndex: Send + Sync {
    /// Add every fingerprint of a track. Returns the number of postings written.
    fn ingest(&self, track_id: TrackId, fingerprints: &[Fingerprint]) -> Result<usize>;

    fn lookup(&self, hash: u64) -> Result<Vec<Posting>>;

    /// Delete all postings of a track. Returns the number removed.
    fn remove(&self, track_id: TrackId) -> Result<usize>;

    fn contains_track(&self, track_id: TrackId) -> Result<bool>;

    fn stats(&self) -> Result<IndexStats>;
}

type Shard = RwLock<HashMap<u64, Vec<Posting>>>;

/// Sharded in-memory index
pub struct MemoryIndex {
    shards: Vec<Shard>,
    shard_bits: u32,
    /// Per-track write locks. Entries are never dropped so every writer of a
    /// track contends on the same mutex.
    writers: Mutex<HashMap<TrackId, Arc<Mutex<()>>>>,
    /// Tracks whose ingest has committed
    visible: RwLock<HashSet<TrackId>>,
    postings: AtomicU64,
}

impl MemoryIndex {
    /// `shard_count` is rounded up to a power of two
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1).next_power_of_two();
        let shards = (0..shard_count).map(|_| RwLock::new(HashMap::new())).collect();

        Self {
            shards,
            shard_bits: shard_count.trailing_zeros(),
            writers: Mutex::new(HashMap::new()),
            visible: RwLock::new(HashSet::new()),
            postings: AtomicU64::new(0),
        }
    }

    pub fn with_config(config: &PipelineConfig) -> Self {
        Self::new(config.index_shards)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Fibonacci mixing so that hashes differing only in low bits spread out
    fn shard_for(&self, hash: u64) -> usize {
        if self.shard_bits == 0 {
            return 0;
        }
        (hash.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> (64 - self.shard_bits)) as usize
    }

    fn writer_lock(&self, track_id: TrackId) -> Result<Arc<Mutex<()>>> {
        let mut writers = self.writers.lock().map_err(|_| poisoned("writer table"))?;
        Ok(writers.entry(track_id).or_default().clone())
    }

    fn is_visible(&self, track_id: TrackId) -> Result<bool> {
        let visible = self.visible.read().map_err(|_| poisoned("visibility set"))?;
        Ok(visible.contains(&track_id))
    }

    /// Drop every posting of `track_id` from one shard
    fn purge_shard(shard: &Shard, track_id: TrackId) -> Result<usize> {
        let mut map = shard.write().map_err(|_| poisoned("shard"))?;
        let mut removed = 0;
        map.retain(|_, postings| {
            let before = postings.len();
            postings.retain(|p| p.track_id != track_id);
            removed += before - postings.len();
            !postings.is_empty()
        });
        Ok(removed)
    }

    fn rollback(&self, track_id: TrackId, touched: &[usize]) {
        for &idx in touched {
            if let Err(e) = Self::purge_shard(&self.shards[idx], track_id) {
                log::warn!("rollback of track {} in shard {} failed: {}", track_id, idx, e);
            }
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::with_config(&PipelineConfig::default())
    }
}

impl FingerprintIndex for MemoryIndex {
    fn ingest(&self, track_id: TrackId, fingerprints: &[Fingerprint]) -> Result<usize> {
        let lock = self.writer_lock(track_id)?;
        let _guard = match lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(Error::IndexWriteConflict(track_id)),
            Err(TryLockError::Poisoned(_)) => return Err(poisoned("track lock")),
        };

        if self.is_visible(track_id)? {
            return Err(Error::TrackAlreadyIndexed(track_id));
        }

        let mut staged: Vec<Vec<(u64, Posting)>> = vec![Vec::new(); self.shards.len()];
        for fp in fingerprints {
            staged[self.shard_for(fp.hash)].push((
                fp.hash,
                Posting {
                    track_id,
                    anchor_time: fp.anchor_time,
                },
            ));
        }

        let mut touched = Vec::new();
        for (idx, entries) in staged.into_iter().enumerate() {
            if entries.is_empty() {
                continue;
            }
            let mut map = match self.shards[idx].write() {
                Ok(map) => map,
                Err(_) => {
                    self.rollback(track_id, &touched);
                    return Err(poisoned("shard"));
                }
            };
            touched.push(idx);
            for (hash, posting) in entries {
                map.entry(hash).or_default().push(posting);
            }
        }

        match self.visible.write() {
            Ok(mut visible) => {
                visible.insert(track_id);
            }
            Err(_) => {
                self.rollback(track_id, &touched);
                return Err(poisoned("visibility set"));
            }
        }

        let count = fingerprints.len();
        self.postings.fetch_add(count as u64, Ordering::Relaxed);
        log::debug!("Indexed track {} with {} postings", track_id, count);
        Ok(count)
    }

    fn lookup(&self, hash: u64) -> Result<Vec<Posting>> {
        let candidates = {
            let map = self.shards[self.shard_for(hash)]
                .read()
                .map_err(|_| poisoned("shard"))?;
            match map.get(&hash) {
                Some(postings) => postings.clone(),
                None => return Ok(Vec::new()),
            }
        };

        let visible = self.visible.read().map_err(|_| poisoned("visibility set"))?;
        Ok(candidates
            .into_iter()
            .filter(|p| visible.contains(&p.track_id))
            .collect())
    }

    fn remove(&self, track_id: TrackId) -> Result<usize> {
        let lock = self.writer_lock(track_id)?;
        let _guard = lock.lock().map_err(|_| poisoned("track lock"))?;

        self.visible
            .write()
            .map_err(|_| poisoned("visibility set"))?
            .remove(&track_id);

        let mut removed = 0;
        for shard in &self.shards {
            removed += Self::purge_shard(shard, track_id)?;
        }

        self.postings.fetch_sub(removed as u64, Ordering::Relaxed);
        log::debug!("Removed track {} ({} postings)", track_id, removed);
        Ok(removed)
    }

    fn contains_track(&self, track_id: TrackId) -> Result<bool> {
        self.is_visible(track_id)
    }

    fn stats(&self) -> Result<IndexStats> {
        let tracks = self.visible.read().map_err(|_| poisoned("visibility set"))?.len();
        let mut distinct_hashes = 0;
        for shard in &self.shards {
            distinct_hashes += shard.read().map_err(|_| poisoned("shard"))?.len();
        }

        Ok(IndexStats {
            tracks,
            postings: self.postings.load(Ordering::Relaxed) as usize,
            distinct_hashes,
        })
    }
}

/// Ingest a track, retrying per-track write conflicts with linear backoff
pub fn ingest_with_retry(
    index: &dyn FingerprintIndex,
    track_id: TrackId,
    fingerprints: &[Fingerprint],
    config: &PipelineConfig,
) -> Result<usize> {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match index.ingest(track_id, fingerprints) {
            Err(Error::IndexWriteConflict(_)) if attempts <= config.ingest_retries => {
                let backoff = Duration::from_millis(config.retry_backoff_ms * attempts as u64);
                log::debug!(
                    "Write conflict on track {}, retrying in {:?} (attempt {})",
                    track_id,
                    backoff,
                    attempts
                );
                std::thread::sleep(backoff);
            }
            Err(Error::IndexWriteConflict(_)) => {
                return Err(Error::IngestFailed { track_id, attempts });
            }
            other => return other,
        }
    }
}

fn poisoned(what: &str) -> Error {
    Error::IndexUnavailable(format!("{} lock poisoned", what))
}
