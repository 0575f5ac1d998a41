//! Input file discovery

use anyhow::{Context, Result};
use earmark_core::AudioFormat;
use std::path::{Path, PathBuf};

/// Expand `paths` into audio files
///
/// Files are taken as given. Directories contribute files with a known audio
/// extension, descending into subdirectories only when `recursive`. Each
/// directory's files come back sorted.
pub fn collect_audio_files(paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            walk(path, recursive, &mut files)?;
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            anyhow::bail!("Input not found: {}", path.display());
        }
    }
    Ok(files)
}

fn walk(dir: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            if recursive {
                walk(&path, recursive, files)?;
            }
        } else if AudioFormat::from_path(&path) != AudioFormat::Unknown {
            files.push(path);
        } else {
            log::debug!("Skipping {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_directory_walk() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("live");
        fs::create_dir(&nested).unwrap();
        touch(&dir.path().join("b.mp3"));
        touch(&dir.path().join("a.FLAC"));
        touch(&dir.path().join("cover.jpg"));
        touch(&nested.join("set.m4a"));

        let flat = collect_audio_files(&[dir.path().to_path_buf()], false).unwrap();
        assert_eq!(flat, vec![dir.path().join("a.FLAC"), dir.path().join("b.mp3")]);

        let deep = collect_audio_files(&[dir.path().to_path_buf()], true).unwrap();
        assert_eq!(deep.len(), 3);
        assert!(deep.contains(&nested.join("set.m4a")));
    }

    #[test]
    fn test_explicit_files_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let odd = dir.path().join("recording.raw");
        touch(&odd);

        let files = collect_audio_files(&[odd.clone()], false).unwrap();
        assert_eq!(files, vec![odd]);
    }

    #[test]
    fn test_missing_input() {
        let err = collect_audio_files(&[PathBuf::from("/no/such/input")], false).unwrap_err();
        assert!(err.to_string().contains("/no/such/input"));
    }
}
