//! Audio decoding for multiple formats

use super::{decode_container, resample_to_target, AudioFormat};
use anyhow::{Context, Result};
use std::path::Path;

/// Decoded audio data
#[derive(Debug, Clone)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: u32,
}

impl AudioData {
    /// Build from interleaved samples
    pub fn from_interleaved(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let frames = samples.len() / channels.max(1) as usize;
        let duration_ms = if sample_rate == 0 {
            0
        } else {
            (frames as u64 * 1000 / sample_rate as u64) as u32
        };

        Self {
            samples,
            sample_rate,
            channels,
            duration_ms,
        }
    }

    /// Convert to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        self.samples
            .chunks(self.channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }
}

/// Decode a file to mono at `target_sample_rate`
pub fn decode_file(path: &Path, target_sample_rate: u32) -> Result<AudioData> {
    if !path.exists() {
        anyhow::bail!("file not found");
    }

    let format = AudioFormat::from_path(path);
    let audio = match format {
        AudioFormat::Wav => decode_wav(path)?,
        AudioFormat::Mp3 => decode_mp3(path)?,
        AudioFormat::Flac => decode_flac(path)?,
        AudioFormat::Ogg => decode_ogg(path)?,
        _ if format.is_container() => decode_container(path)?,
        _ => anyhow::bail!("unsupported audio format"),
    };

    if audio.samples.is_empty() || audio.sample_rate == 0 {
        anyhow::bail!("no audio samples");
    }

    let mono = audio.to_mono();
    let samples = if audio.sample_rate == target_sample_rate {
        mono
    } else {
        resample_to_target(&mono, audio.sample_rate, target_sample_rate)?
    };

    log::debug!(
        "Decoded {} ({:?}, {} Hz, {} ch, {} ms)",
        path.display(),
        format,
        audio.sample_rate,
        audio.channels,
        audio.duration_ms
    );

    Ok(AudioData {
        samples,
        sample_rate: target_sample_rate,
        channels: 1,
        duration_ms: audio.duration_ms,
    })
}

fn decode_wav(path: &Path) -> Result<AudioData> {
    let mut reader = hound::WavReader::open(path).context("failed to open WAV file")?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("corrupt WAV data")?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .context("corrupt WAV data")?
        }
    };

    Ok(AudioData::from_interleaved(samples, spec.sample_rate, spec.channels))
}

fn decode_mp3(path: &Path) -> Result<AudioData> {
    let data = std::fs::read(path).context("failed to read MP3 file")?;
    let mut decoder = minimp3::Decoder::new(&data[..]);
    let mut samples = Vec::new();
    let mut sample_rate = 0;
    let mut channels = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = frame.sample_rate as u32;
                    channels = frame.channels as u16;
                }
                samples.extend(frame.data.iter().map(|&s| s as f32 / 32768.0));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => anyhow::bail!("MP3 decode error: {}", e),
        }
    }

    Ok(AudioData::from_interleaved(samples, sample_rate, channels))
}

fn decode_flac(path: &Path) -> Result<AudioData> {
    let mut reader = claxon::FlacReader::open(path).context("failed to open FLAC file")?;
    let info = reader.streaminfo();
    let scale = (1i64 << (info.bits_per_sample - 1)) as f32;

    let samples: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / scale))
        .collect::<std::result::Result<_, _>>()
        .context("corrupt FLAC data")?;

    Ok(AudioData::from_interleaved(samples, info.sample_rate, info.channels as u16))
}

fn decode_ogg(path: &Path) -> Result<AudioData> {
    let file = std::fs::File::open(path).context("failed to open OGG file")?;
    let mut reader =
        lewton::inside_ogg::OggStreamReader::new(file).context("invalid Ogg Vorbis stream")?;

    let sample_rate = reader.ident_hdr.audio_sample_rate;
    let channels = reader.ident_hdr.audio_channels as u16;
    let mut samples = Vec::new();

    while let Some(packet) = reader.read_dec_packet_itl()? {
        samples.extend(packet.iter().map(|&s| s as f32 / 32768.0));
    }

    Ok(AudioData::from_interleaved(samples, sample_rate, channels))
}
