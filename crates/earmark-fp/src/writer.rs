//! .fp file writer

use crate::error::Result;
use crate::format::{FpHeader, TrackFile, ENTRY_SIZE, HEADER_SIZE, VERSION};
use crc::{Crc, CRC_64_ECMA_182};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub(crate) const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

pub struct FpWriter {
    compress: bool,
    level: i32,
}

impl FpWriter {
    pub fn new() -> Self {
        Self {
            compress: false,
            level: 3,
        }
    }

    /// Writer that zstd-compresses the entry payload
    pub fn compressed(level: i32) -> Self {
        Self {
            compress: true,
            level,
        }
    }

    /// Write .fp file
    pub fn write(&self, path: &Path, track: &TrackFile) -> Result<()> {
        let bytes = self.encode(track)?;
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    pub fn encode(&self, track: &TrackFile) -> Result<Vec<u8>> {
        let metadata = serde_json::to_vec(&track.info)?;

        let mut payload = Vec::with_capacity(track.entries.len() * ENTRY_SIZE);
        for entry in &track.entries {
            payload.extend_from_slice(&entry.to_bytes());
        }

        let compressed;
        let stored: &[u8] = if self.compress {
            compressed = zstd::encode_all(payload.as_slice(), self.level)?;
            &compressed
        } else {
            &payload
        };

        let mut digest = CRC64.digest();
        digest.update(&metadata);
        digest.update(stored);

        let mut header = FpHeader {
            version: VERSION,
            flags: 0,
            metadata_size: metadata.len() as u32,
            num_entries: track.entries.len() as u32,
            payload_size: payload.len() as u64,
            stored_size: stored.len() as u64,
            checksum: digest.finalize(),
        };
        header.set_compressed(self.compress);

        let mut out = Vec::with_capacity(HEADER_SIZE + metadata.len() + stored.len());
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&metadata);
        out.extend_from_slice(stored);
        Ok(out)
    }
}

impl Default for FpWriter {
    fn default() -> Self {
        Self::new()
    }
}
