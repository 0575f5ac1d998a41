//! .fp file reader

use crate::error::{FpError, Result};
use crate::format::{FpEntry, FpHeader, TrackFile, TrackInfo, ENTRY_SIZE, HEADER_SIZE, MAGIC, VERSION};
use crate::writer::CRC64;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub struct FpReader;

impl FpReader {
    /// Read .fp file
    pub fn read(path: &Path) -> Result<TrackFile> {
        let file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        if len < HEADER_SIZE {
            return Err(FpError::Truncated {
                expected: HEADER_SIZE,
                actual: len,
            });
        }

        let mut bytes = Vec::with_capacity(len);
        BufReader::new(file).read_to_end(&mut bytes)?;
        Self::decode(&bytes)
    }

    pub fn read_header(bytes: &[u8]) -> Result<FpHeader> {
        if bytes.len() < HEADER_SIZE {
            return Err(FpError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        if bytes[..4] != MAGIC {
            return Err(FpError::BadMagic);
        }

        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&bytes[..HEADER_SIZE]);
        let header = FpHeader::from_bytes(&raw);
        if header.version != VERSION {
            return Err(FpError::UnsupportedVersion(header.version));
        }
        Ok(header)
    }

    pub fn decode(bytes: &[u8]) -> Result<TrackFile> {
        let header = Self::read_header(bytes)?;

        let metadata_end = HEADER_SIZE + header.metadata_size as usize;
        let stored_end = metadata_end + header.stored_size as usize;
        if bytes.len() < stored_end {
            return Err(FpError::Truncated {
                expected: stored_end,
                actual: bytes.len(),
            });
        }
        let metadata = &bytes[HEADER_SIZE..metadata_end];
        let stored = &bytes[metadata_end..stored_end];

        let mut digest = CRC64.digest();
        digest.update(metadata);
        digest.update(stored);
        let actual = digest.finalize();
        if actual != header.checksum {
            return Err(FpError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }

        let info: TrackInfo = serde_json::from_slice(metadata)?;

        let decompressed;
        let payload = if header.is_compressed() {
            decompressed = zstd::decode_all(stored)?;
            decompressed.as_slice()
        } else {
            stored
        };

        let expected = header.num_entries as usize * ENTRY_SIZE;
        if payload.len() != expected || payload.len() as u64 != header.payload_size {
            return Err(FpError::PayloadSize {
                expected,
                actual: payload.len(),
            });
        }

        let entries = payload.chunks_exact(ENTRY_SIZE).map(FpEntry::from_bytes).collect();

        Ok(TrackFile {
            version: header.version,
            info,
            entries,
        })
    }
}
