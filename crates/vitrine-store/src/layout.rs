use std::path::{Path, PathBuf};

use vitrine_core::ids::SessionId;

use crate::error::StoreError;

/// Paths of one session's storage directory.
///
/// The directory name is the session id; everything a session persists
/// lives under it and nothing else writes there.
#[derive(Clone, Debug)]
pub struct SessionDirs {
    root: PathBuf,
}

impl SessionDirs {
    /// Create the session directory under `storage_root`.
    pub fn create(storage_root: &Path, id: &SessionId) -> Result<Self, StoreError> {
        let root = storage_root.join(id.as_str());
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Open an existing session directory without creating it.
    pub fn open(storage_root: &Path, id: &SessionId) -> Result<Self, StoreError> {
        let root = storage_root.join(id.as_str());
        if !root.is_dir() {
            return Err(StoreError::NotFound(format!(
                "session directory {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn journal_path(&self) -> PathBuf {
        self.root.join("journal.jsonl")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.jsonl")
    }

    pub fn recording_path(&self) -> PathBuf {
        self.root.join("recording.webm")
    }

    pub fn network_log_path(&self) -> PathBuf {
        self.root.join("network.ndjson")
    }

    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }
}
