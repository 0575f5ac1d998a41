//! Audio decoding and resampling
//!
//! Supports WAV, MP3, FLAC, OGG and container formats (MP4/M4A, MKV, WebM)
//! using pure Rust decoders. Everything is delivered as mono `f32` at the
//! fingerprinting sample rate.

mod container;
mod decoder;
mod resample;

pub use container::decode_container;
pub use decoder::{decode_file, AudioData};
pub use resample::resample_to_target;

use crate::config::FingerprintConfig;
use crate::error::{Error, Result};
use std::path::Path;

/// Supported input formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Flac,
    Ogg,

    // Containers, demuxed with Symphonia
    Mp4,
    Mkv,
    Webm,

    Unknown,
}

impl AudioFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("wav") | Some("wave") => AudioFormat::Wav,
            Some("mp3") => AudioFormat::Mp3,
            Some("flac") => AudioFormat::Flac,
            Some("ogg") | Some("oga") => AudioFormat::Ogg,
            Some("mp4") | Some("m4a") => AudioFormat::Mp4,
            Some("mkv") | Some("mka") => AudioFormat::Mkv,
            Some("webm") => AudioFormat::Webm,
            _ => AudioFormat::Unknown,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, AudioFormat::Mp4 | AudioFormat::Mkv | AudioFormat::Webm)
    }
}

/// Turns an audio file into a mono sample sequence
pub trait Decoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<AudioData>;
}

/// Decoder for files on disk
#[derive(Debug, Clone)]
pub struct FileDecoder {
    sample_rate: u32,
}

impl FileDecoder {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    pub fn from_config(config: &FingerprintConfig) -> Self {
        Self::new(config.sample_rate)
    }
}

impl Decoder for FileDecoder {
    fn decode(&self, path: &Path) -> Result<AudioData> {
        decode_file(path, self.sample_rate).map_err(|e| Error::Decode {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(AudioFormat::from_path(Path::new("a.WAV")), AudioFormat::Wav);
        assert_eq!(AudioFormat::from_path(Path::new("b.m4a")), AudioFormat::Mp4);
        assert_eq!(AudioFormat::from_path(Path::new("c.webm")), AudioFormat::Webm);
        assert_eq!(AudioFormat::from_path(Path::new("notes.txt")), AudioFormat::Unknown);
        assert_eq!(AudioFormat::from_path(Path::new("no_extension")), AudioFormat::Unknown);
        assert!(AudioFormat::Mkv.is_container());
        assert!(!AudioFormat::Flac.is_container());
    }

    #[test]
    fn test_file_decoder_reports_decode_error() {
        let decoder = FileDecoder::new(16000);
        let err = decoder
            .decode(Path::new("/nonexistent/track.mp3"))
            .unwrap_err();
        assert_eq!(err.kind(), "decode_error");
        assert!(err.to_string().contains("/nonexistent/track.mp3"));
    }
}
