//! Query matching by offset voting
//!
//! Every query hash found in the index casts a vote for
//! `(track, reference_time - query_time)`. A true match piles its votes into a
//! single offset bucket; chance collisions spread out.

use crate::cancel::CancelToken;
use crate::config::{validate_matching, FingerprintConfig, MatchConfig};
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::fingerprinter::Fingerprinter;
use crate::index::{FingerprintIndex, TrackId};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};


/// One reported match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub track_id: TrackId,
    /// Aligned votes over query hashes, in `[0, 1]`
    pub confidence: f64,
    /// Votes in the best offset bucket
    pub votes: u32,
    /// Postings hit for this track at any offset
    pub hits: u32,
    /// Reference frame minus query frame, rounded to whole hops
    pub best_offset: i64,
    pub offset_seconds: f64,
    /// Query span covered by the aligned votes
    pub query_start_s: f64,
    pub query_stop_s: f64,
    /// Reference span covered by the aligned votes
    pub ref_start_s: f64,
    pub ref_stop_s: f64,
}

/// Result of a query. Failures travel separately as `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Ranked best first
    Matched(Vec<MatchResult>),
    NoMatch {
        query_fingerprints: usize,
        /// Tracks that received at least one vote
        candidates: usize,
    },
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched(_))
    }

    pub fn results(&self) -> &[MatchResult] {
        match self {
            MatchOutcome::Matched(results) => results,
            MatchOutcome::NoMatch { .. } => &[],
        }
    }

    pub fn best(&self) -> Option<&MatchResult> {
        self.results().first()
    }
}

/// Votes landing in one `(track, offset bucket)` cell
#[derive(Debug, Clone, Copy)]
struct Bucket {
    votes: u32,
    query_min: u32,
    query_max: u32,
    ref_min: u32,
    ref_max: u32,
}

impl Bucket {
    fn new(query_time: u32, ref_time: u32) -> Self {
        Self {
            votes: 0,
            query_min: query_time,
            query_max: query_time,
            ref_min: ref_time,
            ref_max: ref_time,
        }
    }

    fn vote(&mut self, query_time: u32, ref_time: u32) {
        self.votes += 1;
        self.query_min = self.query_min.min(query_time);
        self.query_max = self.query_max.max(query_time);
        self.ref_min = self.ref_min.min(ref_time);
        self.ref_max = self.ref_max.max(ref_time);
    }
}

/// Votes from one alignment of the query
struct Tally {
    /// Samples dropped from the start of the query
    skipped: usize,
    query_len: usize,
    /// Best `(offset, bucket)` per track
    best: HashMap<TrackId, (i64, Bucket)>,
    hits: HashMap<TrackId, u32>,
}

pub struct Matcher {
    fingerprinter: Fingerprinter,
    config: MatchConfig,
    /// Start offsets, in samples, a sample query is fingerprinted at
    offsets: Vec<usize>,
    frame_seconds: f64,
    sample_rate: f64,
}

impl Matcher {
    pub fn new(fingerprint_config: &FingerprintConfig, config: &MatchConfig) -> Result<Self> {
        validate_matching(fingerprint_config, config)?;

        Ok(Self {
            fingerprinter: Fingerprinter::new(fingerprint_config)?,
            config: config.clone(),
            offsets: config.query_offsets(fingerprint_config.hop_length),
            frame_seconds: fingerprint_config.frame_seconds(),
            sample_rate: fingerprint_config.sample_rate as f64,
        })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Fingerprint a query clip and match it against the index.
    ///
    /// The clip is fingerprinted once per configured sub-hop offset; each
    /// track is scored by whichever alignment gave it the most votes.
    pub fn match_samples(
        &self,
        index: &dyn FingerprintIndex,
        samples: &[f32],
        cancel: &CancelToken,
    ) -> Result<MatchOutcome> {
        let mut tallies = Vec::with_capacity(self.offsets.len());

        for &skipped in &self.offsets {
            cancel.check()?;
            let query = self.fingerprinter.fingerprint(samples.get(skipped..).unwrap_or(&[]));
            log::debug!(
                "Query at +{} samples: {} frames, {} landmarks, {} fingerprints",
                skipped,
                query.frames,
                query.landmarks,
                query.fingerprints.len()
            );
            tallies.push(self.tally(index, &query.fingerprints, skipped, cancel)?);
        }

        Ok(self.rank(tallies))
    }

    /// Match precomputed query fingerprints at a single alignment
    pub fn match_fingerprints(
        &self,
        index: &dyn FingerprintIndex,
        query: &[Fingerprint],
        cancel: &CancelToken,
    ) -> Result<MatchOutcome> {
        let tally = self.tally(index, query, 0, cancel)?;
        Ok(self.rank(vec![tally]))
    }

    fn tally(
        &self,
        index: &dyn FingerprintIndex,
        query: &[Fingerprint],
        skipped: usize,
        cancel: &CancelToken,
    ) -> Result<Tally> {
        let width = self.config.offset_bucket_width as i64;
        let mut buckets: HashMap<(TrackId, i64), Bucket> = HashMap::new();
        let mut hits: HashMap<TrackId, u32> = HashMap::new();

        for fp in query {
            cancel.check()?;

            for posting in index.lookup(fp.hash)? {
                let offset = posting.anchor_time as i64 - fp.anchor_time as i64;
                buckets
                    .entry((posting.track_id, offset.div_euclid(width)))
                    .or_insert_with(|| Bucket::new(fp.anchor_time, posting.anchor_time))
                    .vote(fp.anchor_time, posting.anchor_time);
                *hits.entry(posting.track_id).or_insert(0) += 1;
            }
        }

        // Best bucket per track: most votes, then lowest bucket
        let mut best: HashMap<TrackId, (i64, Bucket)> = HashMap::new();
        for (&(track_id, bucket_id), &bucket) in &buckets {
            best.entry(track_id)
                .and_modify(|current| {
                    if bucket.votes > current.1.votes
                        || (bucket.votes == current.1.votes && bucket_id * width < current.0)
                    {
                        *current = (bucket_id * width, bucket);
                    }
                })
                .or_insert((bucket_id * width, bucket));
        }

        Ok(Tally {
            skipped,
            query_len: query.len(),
            best,
            hits,
        })
    }

    /// Threshold, merge alignments and rank
    fn rank(&self, tallies: Vec<Tally>) -> MatchOutcome {
        let query_fingerprints = tallies.first().map(|t| t.query_len).unwrap_or(0);
        let candidates = tallies
            .iter()
            .flat_map(|t| t.hits.keys().copied())
            .collect::<HashSet<_>>()
            .len();

        let mut best: HashMap<TrackId, MatchResult> = HashMap::new();
        for tally in &tallies {
            for (&track_id, (offset, bucket)) in &tally.best {
                if (bucket.votes as f64) < self.config.match_threshold {
                    log::trace!(
                        "Skipping track {} at +{} samples: {} aligned votes (need {})",
                        track_id,
                        tally.skipped,
                        bucket.votes,
                        self.config.match_threshold
                    );
                    continue;
                }

                let track_hits = tally.hits.get(&track_id).copied().unwrap_or(0);
                let result = self.result(track_id, *offset, bucket, track_hits, tally);
                match best.entry(track_id) {
                    Entry::Occupied(mut current) => {
                        if result.votes > current.get().votes {
                            current.insert(result);
                        }
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(result);
                    }
                }
            }
        }

        if best.is_empty() {
            log::info!(
                "No match: {} query fingerprints, {} candidate tracks",
                query_fingerprints,
                candidates
            );
            return MatchOutcome::NoMatch {
                query_fingerprints,
                candidates,
            };
        }

        let mut results: Vec<MatchResult> = best.into_values().collect();
        results.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.track_id.cmp(&b.track_id))
        });
        results.truncate(self.config.max_results);

        log::info!(
            "Matched {} tracks from {} candidates (best: track {} with {} votes)",
            results.len(),
            candidates,
            results[0].track_id,
            results[0].votes
        );
        MatchOutcome::Matched(results)
    }

    fn result(&self, track_id: TrackId, offset: i64, bucket: &Bucket, hits: u32, tally: &Tally) -> MatchResult {
        let seconds = |frames: f64| frames * self.frame_seconds;
        // Query times count from the original clip start, not the shifted one
        let skipped = tally.skipped as f64 / self.sample_rate;
        let offset_seconds = seconds(offset as f64) - skipped;

        MatchResult {
            track_id,
            confidence: (bucket.votes as f64 / tally.query_len as f64).min(1.0),
            votes: bucket.votes,
            hits,
            best_offset: if tally.skipped == 0 {
                offset
            } else {
                (offset_seconds / self.frame_seconds).round() as i64
            },
            offset_seconds,
            query_start_s: seconds(bucket.query_min as f64) + skipped,
            query_stop_s: seconds(bucket.query_max as f64) + skipped,
            ref_start_s: seconds(bucket.ref_min as f64),
            ref_stop_s: seconds(bucket.ref_max as f64),
        }
    }
}
