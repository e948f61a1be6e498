//! On-disk artifact helpers.
//!
//! Every file a stage hands forward goes through [`atomic_write`], so a
//! crashed run never leaves a half-written artifact at a well-known path.
//! Structured artifacts are JSON, except the drift report and the
//! configuration files, which are YAML.

use crate::error::PipelineError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Staging file next to `path`; same directory so the final rename stays on
/// one filesystem.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.partial", std::process::id()));
    path.with_file_name(name)
}

/// Write `data` to `path` via a synced staging file and a rename.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let staging = staging_path(path);
    let written = File::create(&staging).and_then(|mut file| {
        file.write_all(data)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|()| fs::rename(&staging, path)) {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }
    Ok(())
}

/// Serialize `data` as pretty JSON and write it atomically.
pub fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<(), PipelineError> {
    let body = serde_json::to_vec_pretty(data)?;
    Ok(atomic_write(path, &body)?)
}

/// Serialize `data` as YAML and write it atomically.
pub fn atomic_write_yaml<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<(), PipelineError> {
    let body = serde_yaml::to_string(data)?;
    Ok(atomic_write(path, body.as_bytes())?)
}

/// Read a JSON artifact, `Ok(None)` when the file is absent.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PipelineError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes).map(Some).map_err(|e| {
        PipelineError::dataset(format!("malformed artifact {}: {e}", path.display()))
    })
}

/// Read a JSON artifact that an upstream stage must have written.
pub fn load_required_json<T: DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    load_json(path)?
        .ok_or_else(|| PipelineError::not_found(format!("artifact {}", path.display())))
}

/// Read a YAML configuration file. Unreadable files are configuration errors.
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    let content = fs::read_to_string(path).map_err(|e| {
        PipelineError::config(format!("failed to read {}: {e}", path.display()))
    })?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
