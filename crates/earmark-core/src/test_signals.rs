//! Synthetic audio shared by unit tests

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

/// Stepped tone sweep: a 60 ms Hann-shaped tone burst every 100 ms.
///
/// Burst `k` sits at `300 + 2500 * variant + (k % 10) * 240 + (k / 10) * 23` Hz,
/// so every burst is a single well-separated spectral peak. Variants `0..=2`
/// occupy disjoint bands below 8 kHz and share no hashes.
pub fn stepped_sweep(seconds: f32, sample_rate: u32, variant: u32) -> Vec<f32> {
    let len = (seconds * sample_rate as f32) as usize;
    let step = sample_rate as usize / 10;
    let burst = step * 6 / 10;
    let mut samples = vec![0.0; len];

    for (k, start) in (0..len).step_by(step).enumerate() {
        let freq = 300.0
            + 2500.0 * variant as f32
            + (k % 10) as f32 * 240.0
            + (k / 10) as f32 * 23.0;
        let end = (start + burst).min(len);

        for (n, sample) in samples[start..end].iter_mut().enumerate() {
            let envelope = 0.5 * (1.0 - (2.0 * PI * n as f32 / burst as f32).cos());
            *sample = 0.5 * envelope * (2.0 * PI * freq * n as f32 / sample_rate as f32).sin();
        }
    }

    samples
}

/// Continuous linear chirp from `f0` to `f1` Hz at amplitude 0.5
pub fn linear_chirp(seconds: f32, sample_rate: u32, f0: f64, f1: f64) -> Vec<f32> {
    let len = (seconds * sample_rate as f32) as usize;
    let rate = (f1 - f0) / seconds as f64;

    (0..len)
        .map(|n| {
            let t = n as f64 / sample_rate as f64;
            let phase = 2.0 * std::f64::consts::PI * (f0 * t + 0.5 * rate * t * t);
            (0.5 * phase.sin()) as f32
        })
        .collect()
}

/// Adds uniform noise in `[-amplitude, amplitude]`
pub fn with_noise(samples: &[f32], amplitude: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    samples
        .iter()
        .map(|s| s + rng.gen_range(-amplitude..=amplitude))
        .collect()
}

/// Sub-clip in seconds
pub fn clip(samples: &[f32], sample_rate: u32, start: f32, duration: f32) -> Vec<f32> {
    let from = (start * sample_rate as f32) as usize;
    let to = (from + (duration * sample_rate as f32) as usize).min(samples.len());
    samples[from.min(to)..to].to_vec()
}
