//! Fingerprint generation and hashing
//!
//! Each fingerprint pairs an anchor landmark with a later landmark from its
//! target zone and packs `(anchor_bin, target_bin, delta_time)` into a u64.

use crate::config::FingerprintConfig;
use crate::landmark::Landmark;
use serde::{Deserialize, Serialize};

const FIELD_BITS: u32 = 20;
const FIELD_MASK: u64 = (1 << FIELD_BITS) - 1;

/// A hash and the frame of the anchor that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub hash: u64,
    pub anchor_time: u32,
}

impl Fingerprint {
    /// Build from an anchor and a target landmark (`target.t >= anchor.t`)
    pub fn new(anchor: &Landmark, target: &Landmark) -> Self {
        Self {
            hash: pack_hash(anchor.f, target.f, target.t - anchor.t),
            anchor_time: anchor.t,
        }
    }

    pub fn anchor_bin(&self) -> u32 {
        ((self.hash >> (2 * FIELD_BITS)) & FIELD_MASK) as u32
    }

    pub fn target_bin(&self) -> u32 {
        ((self.hash >> FIELD_BITS) & FIELD_MASK) as u32
    }

    pub fn delta_time(&self) -> u32 {
        (self.hash & FIELD_MASK) as u32
    }
}

/// Lossless for field values below 2^20, which the config validation guarantees
pub fn pack_hash(anchor_bin: u32, target_bin: u32, delta_time: u32) -> u64 {
    ((anchor_bin as u64 & FIELD_MASK) << (2 * FIELD_BITS))
        | ((target_bin as u64 & FIELD_MASK) << FIELD_BITS)
        | (delta_time as u64 & FIELD_MASK)
}

/// Fingerprint generator
pub struct FingerprintGenerator {
    fan_out: usize,
    min_time_delta: u32,
    max_time_delta: u32,
    max_freq_delta: u32,
}

impl FingerprintGenerator {
    pub fn new(config: &FingerprintConfig) -> Self {
        Self {
            fan_out: config.fan_out,
            min_time_delta: config.min_time_delta,
            max_time_delta: config.max_time_delta,
            max_freq_delta: config.max_freq_delta,
        }
    }

    /// Generate fingerprints from landmarks sorted by time then bin
    pub fn generate(&self, landmarks: &[Landmark]) -> Vec<Fingerprint> {
        let mut fingerprints = Vec::with_capacity(landmarks.len() * self.fan_out);

        for (i, anchor) in landmarks.iter().enumerate() {
            let mut paired = 0;

            for target in &landmarks[i + 1..] {
                let dt = target.t - anchor.t;
                if dt > self.max_time_delta {
                    break;
                }
                if dt < self.min_time_delta || anchor.f.abs_diff(target.f) > self.max_freq_delta {
                    continue;
                }

                fingerprints.push(Fingerprint::new(anchor, target));
                paired += 1;
                if paired == self.fan_out {
                    break;
                }
            }
        }

        log::debug!(
            "Generated {} fingerprints from {} landmarks",
            fingerprints.len(),
            landmarks.len()
        );
        fingerprints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lm(t: u32, f: u32) -> Landmark {
        Landmark::new(t, f, 0.5)
    }

    #[test]
    fn test_hash_fields_round_trip() {
        let fp = Fingerprint::new(&lm(100, 1024), &lm(131, 7));
        assert_eq!(fp.anchor_bin(), 1024);
        assert_eq!(fp.target_bin(), 7);
        assert_eq!(fp.delta_time(), 31);
        assert_eq!(fp.anchor_time, 100);

        let max = (1 << 20) - 1;
        let hash = pack_hash(max, 0, max);
        let fp = Fingerprint {
            hash,
            anchor_time: 0,
        };
        assert_eq!((fp.anchor_bin(), fp.target_bin(), fp.delta_time()), (max, 0, max));
    }

    #[test]
    fn test_distinct_pairs_distinct_hashes() {
        let a = Fingerprint::new(&lm(0, 10), &lm(5, 20));
        let b = Fingerprint::new(&lm(0, 20), &lm(5, 10));
        let c = Fingerprint::new(&lm(0, 10), &lm(6, 20));
        assert_ne!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
        // Hash is independent of absolute time
        assert_eq!(a.hash, Fingerprint::new(&lm(40, 10), &lm(45, 20)).hash);
    }

    #[test]
    fn test_respects_time_window() {
        let config = FingerprintConfig {
            min_time_delta: 2,
            max_time_delta: 5,
            fan_out: 10,
            ..Default::default()
        };
        let landmarks = vec![lm(0, 10), lm(1, 10), lm(2, 10), lm(5, 10), lm(6, 10)];
        let fps = FingerprintGenerator::new(&config).generate(&landmarks);

        assert!(fps.iter().all(|fp| (2..=5).contains(&fp.delta_time())));
        let from_zero: Vec<u32> = fps
            .iter()
            .filter(|fp| fp.anchor_time == 0)
            .map(|fp| fp.delta_time())
            .collect();
        assert_eq!(from_zero, vec![2, 5]);
    }

    #[test]
    fn test_respects_fan_out_and_freq_delta() {
        let config = FingerprintConfig {
            fan_out: 2,
            max_freq_delta: 50,
            ..Default::default()
        };
        let landmarks = vec![lm(0, 100), lm(1, 500), lm(2, 120), lm(3, 90), lm(4, 110)];
        let fps = FingerprintGenerator::new(&config).generate(&landmarks);

        let from_zero: Vec<u32> = fps
            .iter()
            .filter(|fp| fp.anchor_time == 0)
            .map(|fp| fp.target_bin())
            .collect();
        assert_eq!(from_zero, vec![120, 90]);
        assert!(fps
            .iter()
            .all(|fp| fp.anchor_bin().abs_diff(fp.target_bin()) <= 50));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let landmarks: Vec<Landmark> = (0..200).map(|i| lm(i / 3, (i * 37) % 900)).collect();
        let generator = FingerprintGenerator::new(&FingerprintConfig::default());
        let a = generator.generate(&landmarks);
        let b = generator.generate(&landmarks);
        assert_eq!(a, b);
        assert!(a.len() <= landmarks.len() * 5);
        assert!(a.windows(2).all(|w| w[0].anchor_time <= w[1].anchor_time));
    }

    #[test]
    fn test_empty_and_single_landmark() {
        let generator = FingerprintGenerator::new(&FingerprintConfig::default());
        assert!(generator.generate(&[]).is_empty());
        assert!(generator.generate(&[lm(3, 3)]).is_empty());
    }
}
