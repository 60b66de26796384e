//! Whole-file replacement for JSON artifacts
//!
//! Writers go through a sibling temp file followed by a rename, so a reader
//! sees either the previous complete file or the new complete file.

use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Replace `path` with `contents` atomically (write temp, then rename).
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_file = temp_path(path);
    if let Err(e) = fs::write(&temp_file, contents) {
        let _ = fs::remove_file(&temp_file);
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&temp_file, path) {
        let _ = fs::remove_file(&temp_file);
        return Err(e.into());
    }

    tracing::debug!(path = %path.display(), bytes = contents.len(), "Replaced file");
    Ok(())
}

/// Serialize `value` as pretty JSON and replace `path` atomically.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

/// Read a JSON document, returning `Ok(None)` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
