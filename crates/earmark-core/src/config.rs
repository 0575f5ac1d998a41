//! Configuration parameters for fingerprinting, matching and batch ingest
//!
//! Every component receives its parameters at construction; nothing in the
//! algorithmic core reads ambient state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Widest value a single hash field can carry (see [`crate::fingerprint`])
pub const HASH_FIELD_LIMIT: usize = 1 << 20;

/// Parameters that determine the fingerprints themselves.
///
/// Two libraries are only comparable when they were fingerprinted with the
/// same values here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    // Audio processing
    pub sample_rate: u32,

    // Spectral transform
    pub n_fft: usize,
    pub hop_length: usize,

    // Landmark extraction
    pub max_landmarks_per_frame: usize,
    pub freq_neighborhood: usize,
    pub time_neighborhood: usize,
    pub min_magnitude: f32,

    // Hash generation
    pub fan_out: usize,
    pub min_time_delta: u32,
    pub max_time_delta: u32,
    pub max_freq_delta: u32,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,

            n_fft: 2048,
            hop_length: 512,

            max_landmarks_per_frame: 100,
            freq_neighborhood: 5,
            time_neighborhood: 3,
            // About -40 dBFS on the normalized magnitude scale
            min_magnitude: 0.01,

            fan_out: 5,
            min_time_delta: 1,
            max_time_delta: 32,
            max_freq_delta: 256,
        }
    }
}

impl FingerprintConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(invalid("sample_rate must be > 0"));
        }
        if self.n_fft < 2 {
            return Err(invalid("n_fft must be >= 2"));
        }
        if self.hop_length == 0 {
            return Err(invalid("hop_length must be > 0"));
        }
        if self.hop_length > self.n_fft {
            return Err(invalid("hop_length must be <= n_fft"));
        }
        if self.num_bins() > HASH_FIELD_LIMIT {
            return Err(invalid("n_fft too large for the 20-bit frequency hash field"));
        }
        if self.max_landmarks_per_frame == 0 {
            return Err(invalid("max_landmarks_per_frame must be > 0"));
        }
        if !self.min_magnitude.is_finite() || self.min_magnitude < 0.0 {
            return Err(invalid("min_magnitude must be a finite, non-negative value"));
        }
        if self.fan_out == 0 {
            return Err(invalid("fan_out must be > 0"));
        }
        if self.min_time_delta > self.max_time_delta {
            return Err(invalid("min_time_delta must be <= max_time_delta"));
        }
        if self.max_time_delta as usize >= HASH_FIELD_LIMIT {
            return Err(invalid("max_time_delta too large for the 20-bit time hash field"));
        }
        Ok(())
    }

    /// Number of non-negative frequency bins per frame
    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Duration of one hop in seconds
    pub fn frame_seconds(&self) -> f64 {
        self.hop_length as f64 / self.sample_rate as f64
    }

    /// Stable signature of the parameters, stored alongside persisted tracks
    pub fn signature(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Query-side parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Minimum number of offset-aligned votes a track needs to be reported.
    ///
    /// This is an absolute vote count, not a normalized score.
    pub match_threshold: f64,
    pub max_results: usize,
    /// Width of an offset histogram bucket, in frames
    pub offset_bucket_width: u32,
    /// Evenly spaced start offsets within one hop at which a sample query is
    /// fingerprinted. A clip cut off the reference hop grid only collides
    /// with the reference once one of these lines it back up.
    pub query_shifts: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            match_threshold: 5.0,
            max_results: 10,
            offset_bucket_width: 1,
            query_shifts: 4,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.match_threshold.is_finite() || self.match_threshold < 0.0 {
            return Err(invalid("match_threshold must be a finite, non-negative vote count"));
        }
        if self.max_results == 0 {
            return Err(invalid("max_results must be > 0"));
        }
        if self.offset_bucket_width == 0 {
            return Err(invalid("offset_bucket_width must be > 0"));
        }
        if self.query_shifts == 0 {
            return Err(invalid("query_shifts must be > 0"));
        }
        Ok(())
    }

    /// Sample offsets a query is fingerprinted at, given the hop length
    pub fn query_offsets(&self, hop_length: usize) -> Vec<usize> {
        (0..self.query_shifts)
            .map(|i| i * hop_length / self.query_shifts)
            .collect()
    }
}

/// Batch ingest parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
    pub ingest_retries: u32,
    pub retry_backoff_ms: u64,
    pub index_shards: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1);
        Self {
            workers,
            ingest_retries: 3,
            retry_backoff_ms: 10,
            index_shards: 64,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(invalid("workers must be > 0"));
        }
        if self.index_shards == 0 || !self.index_shards.is_power_of_two() {
            return Err(invalid("index_shards must be a power of two"));
        }
        Ok(())
    }
}

/// Everything an [`crate::Engine`] needs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub fingerprint: FingerprintConfig,
    #[serde(default)]
    pub matching: MatchConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        validate_matching(&self.fingerprint, &self.matching)?;
        self.pipeline.validate()
    }
}

/// Both halves of a matcher's configuration, and how they fit together
pub(crate) fn validate_matching(fingerprint: &FingerprintConfig, matching: &MatchConfig) -> Result<()> {
    fingerprint.validate()?;
    matching.validate()?;
    if matching.query_shifts > fingerprint.hop_length {
        return Err(invalid("query_shifts must be <= hop_length"));
    }
    Ok(())
}

fn invalid(reason: &str) -> Error {
    Error::InvalidConfig(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(FingerprintConfig::default().validate().is_ok());
        assert!(MatchConfig::default().validate().is_ok());
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config = FingerprintConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.n_fft, 2048);
        assert_eq!(config.hop_length, 512);
        assert_eq!(config.max_landmarks_per_frame, 100);
        assert_eq!(config.num_bins(), 1025);
        assert!((config.frame_seconds() - 0.032).abs() < 1e-12);
        assert_eq!(MatchConfig::default().match_threshold, 5.0);
    }

    #[test]
    fn test_rejects_bad_fingerprint_config() {
        let mut config = FingerprintConfig::default();
        config.hop_length = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = FingerprintConfig::default();
        config.hop_length = 4096;
        assert!(config.validate().is_err());

        let mut config = FingerprintConfig::default();
        config.min_time_delta = 40;
        assert!(config.validate().is_err());

        let mut config = FingerprintConfig::default();
        config.min_magnitude = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_match_and_pipeline_config() {
        let config = MatchConfig {
            match_threshold: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            index_shards: 48,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MatchConfig {
            query_shifts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.fingerprint.hop_length = 2;
        config.matching.query_shifts = 3;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_query_offsets_span_one_hop() {
        let config = MatchConfig::default();
        assert_eq!(config.query_offsets(512), vec![0, 128, 256, 384]);

        let single = MatchConfig {
            query_shifts: 1,
            ..Default::default()
        };
        assert_eq!(single.query_offsets(512), vec![0]);
    }

    #[test]
    fn test_signature_tracks_parameters() {
        let a = FingerprintConfig::default();
        let mut b = FingerprintConfig::default();
        assert_eq!(a.signature(), b.signature());
        b.fan_out = 8;
        assert_ne!(a.signature(), b.signature());
    }
}
