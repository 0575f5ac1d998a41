//! Samples to fingerprints in one pass

use crate::config::FingerprintConfig;
use crate::error::Result;
use crate::fingerprint::{Fingerprint, FingerprintGenerator};
use crate::landmark::{Landmark, LandmarkExtractor};
use crate::transform::SpectrogramBuilder;

/// Fingerprints of one sample sequence, with the counts behind them
#[derive(Debug, Clone, Default)]
pub struct TrackFingerprints {
    pub frames: usize,
    pub landmarks: usize,
    pub fingerprints: Vec<Fingerprint>,
}

/// Spectrogram, landmark and hash stages wired together.
///
/// Holds only planned FFT state, so one instance can be shared by every worker.
pub struct Fingerprinter {
    spectrogram: SpectrogramBuilder,
    extractor: LandmarkExtractor,
    generator: FingerprintGenerator,
}

impl Fingerprinter {
    pub fn new(config: &FingerprintConfig) -> Result<Self> {
        Ok(Self {
            spectrogram: SpectrogramBuilder::new(config)?,
            extractor: LandmarkExtractor::new(config),
            generator: FingerprintGenerator::new(config),
        })
    }

    pub fn landmarks(&self, samples: &[f32]) -> Vec<Landmark> {
        self.extractor.extract(self.spectrogram.frames(samples))
    }

    pub fn fingerprint(&self, samples: &[f32]) -> TrackFingerprints {
        let landmarks = self.landmarks(samples);
        let fingerprints = self.generator.generate(&landmarks);

        TrackFingerprints {
            frames: self.spectrogram.frame_count(samples.len()),
            landmarks: landmarks.len(),
            fingerprints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_signals::stepped_sweep;

    #[test]
    fn test_short_input_is_empty_not_an_error() {
        let fingerprinter = Fingerprinter::new(&FingerprintConfig::default()).unwrap();
        let result = fingerprinter.fingerprint(&[0.1; 1000]);
        assert_eq!(result.frames, 0);
        assert_eq!(result.landmarks, 0);
        assert!(result.fingerprints.is_empty());
    }

    #[test]
    fn test_sweep_produces_fingerprints() {
        let config = FingerprintConfig::default();
        let fingerprinter = Fingerprinter::new(&config).unwrap();
        let samples = stepped_sweep(3.0, config.sample_rate, 0);
        let result = fingerprinter.fingerprint(&samples);

        assert_eq!(result.frames, (48_000 - 2048) / 512 + 1);
        // Roughly one landmark per tone burst
        assert!(result.landmarks >= 25, "landmarks: {}", result.landmarks);
        assert!(result.fingerprints.len() >= result.landmarks);
        assert!(result.fingerprints.len() <= result.landmarks * config.fan_out);
    }

    #[test]
    fn test_fingerprinting_is_deterministic() {
        let config = FingerprintConfig::default();
        let samples = stepped_sweep(2.0, config.sample_rate, 1);
        let a = Fingerprinter::new(&config).unwrap().fingerprint(&samples);
        let b = Fingerprinter::new(&config).unwrap().fingerprint(&samples);
        assert_eq!(a.fingerprints, b.fingerprints);
    }
}
