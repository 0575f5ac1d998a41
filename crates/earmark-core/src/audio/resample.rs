//! Band-limited resampling with rubato

use anyhow::{Context, Result};
use rubato::{FftFixedIn, Resampler};

const CHUNK_SIZE: usize = 1024;

/// Resample mono audio from `from_rate` to `to_rate`.
///
/// Output length is `len * to_rate / from_rate`, aligned with the input
/// (the resampler's delay is removed).
pub fn resample_to_target(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, 2, 1)
        .context("failed to build resampler")?;

    let expected = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + CHUNK_SIZE);
    let mut pos = 0;

    // Zero-pad the tail so the final chunk flushes through the filter
    while output.len() < expected + delay {
        let need = resampler.input_frames_next();
        let mut chunk = vec![0.0f32; need];
        if pos < samples.len() {
            let end = (pos + need).min(samples.len());
            chunk[..end - pos].copy_from_slice(&samples[pos..end]);
        }
        pos += need;

        let out = resampler.process(&[chunk], None).context("resampling failed")?;
        output.extend_from_slice(&out[0]);
    }

    Ok(output.into_iter().skip(delay).take(expected).collect())
}
