//! JSON and BSON encodings of a track file

use crate::error::{FpError, Result};
use crate::format::TrackFile;
use crate::reader::FpReader;
use std::fs;
use std::path::Path;

impl TrackFile {
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn save_bson(&self, path: &Path) -> Result<()> {
        let data = bson::to_vec(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn load_bson(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(bson::from_slice(&data)?)
    }

    /// Load by extension: `.json`, `.bson` or `.fp`
    pub fn load_auto(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "json" => Self::load_json(path),
            "bson" => Self::load_bson(path),
            "fp" => FpReader::read(path),
            _ => Err(FpError::UnknownExtension(ext)),
        }
    }
}
