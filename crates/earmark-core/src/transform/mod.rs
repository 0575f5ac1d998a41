//! Short-time spectral transform
//!
//! Produces linear-frequency magnitude frames from a mono sample sequence.
//! Frames are computed lazily so long inputs never materialize a full
//! spectrogram unless the caller collects one.

use crate::config::FingerprintConfig;
use crate::error::Result;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// One column of the spectrogram
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralFrame {
    /// Frame number (hop position)
    pub index: usize,
    /// Magnitudes for bins `0..=n_fft/2`
    pub magnitudes: Vec<f32>,
}

/// Plans the transform once and hands out frame iterators
pub struct SpectrogramBuilder {
    n_fft: usize,
    hop_length: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Maps a windowed sinusoid of amplitude `a` to a magnitude of about `a`
    scale: f32,
}

impl SpectrogramBuilder {
    pub fn new(config: &FingerprintConfig) -> Result<Self> {
        config.validate()?;

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.n_fft);
        let window = create_hann_window(config.n_fft);
        let window_sum: f32 = window.iter().sum();

        Ok(Self {
            n_fft: config.n_fft,
            hop_length: config.hop_length,
            fft,
            window,
            scale: if window_sum > 0.0 { 2.0 / window_sum } else { 0.0 },
        })
    }

    /// Number of frames `frames` will yield for `len` samples
    pub fn frame_count(&self, len: usize) -> usize {
        if len < self.n_fft {
            0
        } else {
            (len - self.n_fft) / self.hop_length + 1
        }
    }

    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Lazy frame sequence over `samples`. Calling this again restarts from frame 0.
    pub fn frames<'a>(&'a self, samples: &'a [f32]) -> Frames<'a> {
        Frames {
            builder: self,
            samples,
            next: 0,
            total: self.frame_count(samples.len()),
            buffer: vec![Complex::new(0.0, 0.0); self.n_fft],
            scratch: vec![Complex::new(0.0, 0.0); self.fft.get_inplace_scratch_len()],
        }
    }

    /// Collect every frame
    pub fn compute(&self, samples: &[f32]) -> Vec<SpectralFrame> {
        self.frames(samples).collect()
    }
}

/// Iterator over the frames of one sample sequence
pub struct Frames<'a> {
    builder: &'a SpectrogramBuilder,
    samples: &'a [f32],
    next: usize,
    total: usize,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl Iterator for Frames<'_> {
    type Item = SpectralFrame;

    fn next(&mut self) -> Option<SpectralFrame> {
        if self.next >= self.total {
            return None;
        }

        let builder = self.builder;
        let start = self.next * builder.hop_length;
        let segment = &self.samples[start..start + builder.n_fft];

        for ((slot, &sample), &w) in self.buffer.iter_mut().zip(segment).zip(&builder.window) {
            *slot = Complex::new(sample * w, 0.0);
        }

        builder
            .fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        // Real input: bins above n_fft/2 mirror the lower half
        let magnitudes = self.buffer[..builder.num_bins()]
            .iter()
            .map(|c| c.norm() * builder.scale)
            .collect();

        let frame = SpectralFrame {
            index: self.next,
            magnitudes,
        };
        self.next += 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Frames<'_> {}

/// Periodic Hann window
fn create_hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            0.5 * (1.0 - (2.0 * PI * x).cos())
        })
        .collect()
}
