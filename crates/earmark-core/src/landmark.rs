//! Landmark extraction by neighbourhood max filtering
//!
//! A landmark is a spectral peak that dominates a rectangle of
//! ±`freq_neighborhood` bins by ±`time_neighborhood` frames. Frames are
//! consumed as a stream and only `2 * time_neighborhood + 1` of them are held
//! at once.

use crate::config::FingerprintConfig;
use crate::transform::SpectralFrame;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A local maximum in the spectrogram
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// Frame index
    pub t: u32,
    /// Frequency bin
    pub f: u32,
    /// Magnitude
    pub m: f32,
}

impl Landmark {
    pub fn new(t: u32, f: u32, m: f32) -> Self {
        Self { t, f, m }
    }
}

/// A buffered frame with its frequency-direction running maximum
struct FilteredFrame {
    magnitudes: Vec<f32>,
    freq_max: Vec<f32>,
}

impl FilteredFrame {
    fn new(magnitudes: Vec<f32>, radius: usize) -> Self {
        let n = magnitudes.len();
        let freq_max = (0..n)
            .map(|f| {
                let lo = f.saturating_sub(radius);
                let hi = (f + radius + 1).min(n);
                magnitudes[lo..hi].iter().copied().fold(f32::NEG_INFINITY, f32::max)
            })
            .collect();

        Self {
            magnitudes,
            freq_max,
        }
    }
}

pub struct LandmarkExtractor {
    freq_neighborhood: usize,
    time_neighborhood: usize,
    min_magnitude: f32,
    max_per_frame: usize,
}

impl LandmarkExtractor {
    pub fn new(config: &FingerprintConfig) -> Self {
        Self {
            freq_neighborhood: config.freq_neighborhood,
            time_neighborhood: config.time_neighborhood,
            min_magnitude: config.min_magnitude,
            max_per_frame: config.max_landmarks_per_frame,
        }
    }

    /// Extract landmarks ordered by frame, then by bin
    pub fn extract<I>(&self, frames: I) -> Vec<Landmark>
    where
        I: IntoIterator<Item = SpectralFrame>,
    {
        let radius = self.time_neighborhood;
        let mut window: VecDeque<FilteredFrame> = VecDeque::with_capacity(2 * radius + 1);
        // Stream position of window[0]
        let mut first = 0usize;
        // Next frame awaiting a decision
        let mut next = 0usize;
        let mut landmarks = Vec::new();

        for frame in frames {
            window.push_back(FilteredFrame::new(frame.magnitudes, self.freq_neighborhood));
            let arrived = first + window.len();

            while next + radius < arrived {
                self.decide(&window, first, next, &mut landmarks);
                next += 1;
                while first + radius < next {
                    window.pop_front();
                    first += 1;
                }
            }
        }

        // Trailing frames have a truncated right neighbourhood
        let arrived = first + window.len();
        while next < arrived {
            self.decide(&window, first, next, &mut landmarks);
            next += 1;
        }

        log::debug!("Extracted {} landmarks from {} frames", landmarks.len(), arrived);
        landmarks
    }

    fn decide(
        &self,
        window: &VecDeque<FilteredFrame>,
        first: usize,
        pos: usize,
        out: &mut Vec<Landmark>,
    ) {
        let lo = pos.saturating_sub(self.time_neighborhood).max(first);
        let hi = (pos + self.time_neighborhood).min(first + window.len() - 1);
        let center = &window[pos - first];

        let mut peaks: Vec<Landmark> = center
            .magnitudes
            .iter()
            .enumerate()
            .filter(|&(f, &m)| {
                // Zero magnitude is never a peak, even with a zero floor
                m > 0.0
                    && m >= self.min_magnitude
                    && (lo..=hi).all(|p| window[p - first].freq_max[f] <= m)
            })
            .map(|(f, &m)| Landmark::new(pos as u32, f as u32, m))
            .collect();

        if peaks.len() > self.max_per_frame {
            peaks.sort_by(|a, b| b.m.total_cmp(&a.m).then(a.f.cmp(&b.f)));
            peaks.truncate(self.max_per_frame);
            peaks.sort_by_key(|l| l.f);
        }

        out.extend(peaks);
    }
}
