//! Track file model and the binary `.fp` layout
//!
//! ```text
//! offset  size  field
//!      0     4  magic "EMFP"
//!      4     2  version
//!      6     2  flags (bit 0: payload is zstd-compressed)
//!      8     4  metadata size
//!     12     4  entry count
//!     16     8  raw payload size
//!     24     8  stored payload size
//!     32     8  CRC-64 of metadata + stored payload
//!     40     8  reserved
//!     48        metadata (JSON), then payload
//! ```
//!
//! Each payload entry is 12 bytes: hash (u64 LE) then anchor time (u32 LE).

use serde::{Deserialize, Serialize};

pub const MAGIC: [u8; 4] = *b"EMFP";
pub const VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 48;
pub const ENTRY_SIZE: usize = 12;

const FLAG_COMPRESSED: u16 = 0x1;

/// Fixed-size binary header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FpHeader {
    pub version: u16,
    pub flags: u16,
    pub metadata_size: u32,
    pub num_entries: u32,
    pub payload_size: u64,
    pub stored_size: u64,
    pub checksum: u64,
}

impl FpHeader {
    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        if compressed {
            self.flags |= FLAG_COMPRESSED;
        } else {
            self.flags &= !FLAG_COMPRESSED;
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&MAGIC);
        out[4..6].copy_from_slice(&self.version.to_le_bytes());
        out[6..8].copy_from_slice(&self.flags.to_le_bytes());
        out[8..12].copy_from_slice(&self.metadata_size.to_le_bytes());
        out[12..16].copy_from_slice(&self.num_entries.to_le_bytes());
        out[16..24].copy_from_slice(&self.payload_size.to_le_bytes());
        out[24..32].copy_from_slice(&self.stored_size.to_le_bytes());
        out[32..40].copy_from_slice(&self.checksum.to_le_bytes());
        out
    }

    /// Parse without validating magic or version
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let u64_at = |i: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[i..i + 8]);
            u64::from_le_bytes(b)
        };

        Self {
            version: u16_at(4),
            flags: u16_at(6),
            metadata_size: u32_at(8),
            num_entries: u32_at(12),
            payload_size: u64_at(16),
            stored_size: u64_at(24),
            checksum: u64_at(32),
        }
    }
}

/// One stored hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FpEntry {
    pub hash: u64,
    pub t: u32,
}

impl FpEntry {
    pub fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        let mut out = [0u8; ENTRY_SIZE];
        out[..8].copy_from_slice(&self.hash.to_le_bytes());
        out[8..].copy_from_slice(&self.t.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hash = [0u8; 8];
        hash.copy_from_slice(&bytes[..8]);
        let mut t = [0u8; 4];
        t.copy_from_slice(&bytes[8..ENTRY_SIZE]);
        Self {
            hash: u64::from_le_bytes(hash),
            t: u32::from_le_bytes(t),
        }
    }
}

/// Descriptive metadata of a stored track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub track_id: u32,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    pub duration_ms: u32,
    pub sample_rate: u32,
    pub created_at: String,
    /// Serialized fingerprinting parameters the entries were produced with
    pub algorithm_params: String,
}

/// A stored track in any encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFile {
    pub version: u16,
    pub info: TrackInfo,
    pub entries: Vec<FpEntry>,
}

impl TrackFile {
    pub fn new(info: TrackInfo, entries: Vec<FpEntry>) -> Self {
        Self {
            version: VERSION,
            info,
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut header = FpHeader {
            version: VERSION,
            flags: 0,
            metadata_size: 100,
            num_entries: 3,
            payload_size: 36,
            stored_size: 36,
            checksum: 0xDEAD_BEEF,
        };
        header.set_compressed(true);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[..4], b"EMFP");
        assert_eq!(FpHeader::from_bytes(&bytes), header);
        assert!(FpHeader::from_bytes(&bytes).is_compressed());
    }

    #[test]
    fn test_entry_layout() {
        let entry = FpEntry {
            hash: 0x0123_4567_89AB_CDEF,
            t: 77,
        };
        let bytes = entry.to_bytes();
        assert_eq!(bytes[0], 0xEF);
        assert_eq!(FpEntry::from_bytes(&bytes), entry);
    }
}
