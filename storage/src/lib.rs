//! Tokenomics Storage Layer - File-Based Snapshots
//!
//! The whole economy lives in memory; a snapshot is written after every
//! command and read back on the next start:
//! - `<name>.json` human-readable copy
//! - `<name>.bin` bincode copy, preferred when loading

use economics::EconomyState;
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Default snapshot name for the economy state
pub const STATE_SNAPSHOT: &str = "economy";

pub struct Storage {
    data_dir: PathBuf,
}

impl Storage {
    /// Open storage directory, creating it when missing
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data_dir = path.as_ref().to_path_buf();
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir)?;
        }
        Ok(Self { data_dir })
    }

    fn paths(&self, name: &str) -> (PathBuf, PathBuf) {
        (
            self.data_dir.join(format!("{}.json", name)),
            self.data_dir.join(format!("{}.bin", name)),
        )
    }

    /// Write both encodings. Each file goes to a temporary name first and is
    /// renamed into place, so a crash never leaves a torn snapshot.
    pub fn save_snapshot<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let (json_path, bin_path) = self.paths(name);

        let json = serde_json::to_string_pretty(data)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        let bin = bincode::serialize(data)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        write_replace(&json_path, json.as_bytes())?;
        write_replace(&bin_path, &bin)?;

        debug!(name, json_bytes = json.len(), bin_bytes = bin.len(), "snapshot saved");
        Ok(())
    }

    /// Load a snapshot, bincode first with JSON as the fallback
    pub fn load_snapshot<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let (json_path, bin_path) = self.paths(name);

        if bin_path.exists() {
            let data = fs::read(&bin_path)?;
            return bincode::deserialize(&data)
                .map_err(|e| StorageError::SerializationError(e.to_string()));
        }

        if json_path.exists() {
            let data = fs::read_to_string(&json_path)?;
            return serde_json::from_str(&data)
                .map_err(|e| StorageError::SerializationError(e.to_string()));
        }

        Err(StorageError::SnapshotNotFound(name.to_string()))
    }

    pub fn has_snapshot(&self, name: &str) -> bool {
        let (json_path, bin_path) = self.paths(name);
        bin_path.exists() || json_path.exists()
    }

    pub fn list_snapshots(&self) -> Result<Vec<String>> {
        let mut snapshots = Vec::new();

        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            let is_snapshot = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("json") | Some("bin")
            );
            if !is_snapshot {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                if !snapshots.iter().any(|s| s == name) {
                    snapshots.push(name.to_string());
                }
            }
        }

        snapshots.sort();
        Ok(snapshots)
    }

    pub fn delete_snapshot(&self, name: &str) -> Result<()> {
        let (json_path, bin_path) = self.paths(name);
        if bin_path.exists() {
            fs::remove_file(bin_path)?;
        }
        if json_path.exists() {
            fs::remove_file(json_path)?;
        }
        Ok(())
    }

    pub fn save_state(&self, state: &EconomyState) -> Result<()> {
        self.save_snapshot(STATE_SNAPSHOT, state)
    }

    pub fn load_state(&self) -> Result<EconomyState> {
        self.load_snapshot(STATE_SNAPSHOT)
    }

    pub fn has_state(&self) -> bool {
        self.has_snapshot(STATE_SNAPSHOT)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn write_replace(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
