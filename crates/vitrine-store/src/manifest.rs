use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use vitrine_core::evidence::EvidenceRecord;
use vitrine_core::hash::sha256_hex;

use crate::error::StoreError;

/// Ordered, append-only record of a session's evidence artifacts.
///
/// Backed by a JSONL file so appending never rewrites prior entries.
/// Append order equals capture order.
pub struct Manifest {
    path: PathBuf,
    inner: Mutex<Inner>,
}

struct Inner {
    file: File,
    entries: Vec<EvidenceRecord>,
}

impl Manifest {
    /// Open (or create) the manifest at `path`, reading back any existing
    /// entries.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let entries = if path.exists() { Self::load(path)? } else { Vec::new() };
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner { file, entries }),
        })
    }

    /// Append one record. Synchronous and ordered.
    pub fn append(&self, record: EvidenceRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        inner.file.write_all(&line)?;
        inner.file.flush()?;
        inner.entries.push(record);
        Ok(())
    }

    /// All entries, in capture order.
    pub fn entries(&self) -> Vec<EvidenceRecord> {
        self.inner.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read entries back from disk.
    pub fn load(path: &Path) -> Result<Vec<EvidenceRecord>, StoreError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str::<EvidenceRecord>(&line)?);
        }
        Ok(entries)
    }

    /// Recompute every entry's hash from the artifact bytes on disk.
    pub fn verify(dir: &Path, entries: &[EvidenceRecord]) -> Result<(), StoreError> {
        for entry in entries {
            let bytes = std::fs::read(dir.join(&entry.file_name)).map_err(|e| {
                StoreError::Integrity(format!("artifact {} unreadable: {e}", entry.file_name))
            })?;
            if bytes.len() as u64 != entry.bytes {
                return Err(StoreError::Integrity(format!(
                    "artifact {} is {} bytes, manifest says {}",
                    entry.file_name,
                    bytes.len(),
                    entry.bytes
                )));
            }
            let actual = sha256_hex(&bytes);
            if actual != entry.sha256 {
                return Err(StoreError::Integrity(format!(
                    "artifact {} hash mismatch",
                    entry.file_name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, bytes: &[u8]) -> EvidenceRecord {
        EvidenceRecord {
            file_name: name.into(),
            description: "page snapshot".into(),
            captured_at: "2026-08-03T12:00:00.000Z".into(),
            sha256: sha256_hex(bytes),
            bytes: bytes.len() as u64,
        }
    }

    #[test]
    fn append_preserves_capture_order() {
        let tmp = tempfile::tempdir().unwrap();
        let manifest = Manifest::open(&tmp.path().join("manifest.jsonl")).unwrap();

        manifest.append(record("a.png", b"first")).unwrap();
        manifest.append(record("b.png", b"second")).unwrap();

        let entries = manifest.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].file_name, "a.png");
        assert_eq!(entries[1].file_name, "b.png");
    }

    #[test]
    fn entries_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("manifest.jsonl");

        {
            let manifest = Manifest::open(&path).unwrap();
            manifest.append(record("a.png", b"data")).unwrap();
        }

        let manifest = Manifest::open(&path).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.entries()[0].file_name, "a.png");
    }

    #[test]
    fn verify_passes_when_bytes_match() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.png"), b"snapshot bytes").unwrap();
        let entries = vec![record("a.png", b"snapshot bytes")];
        Manifest::verify(tmp.path(), &entries).unwrap();
    }

    #[test]
    fn verify_detects_modified_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.png"), b"tampered").unwrap();
        let entries = vec![record("a.png", b"original")];
        let err = Manifest::verify(tmp.path(), &entries).unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }

    #[test]
    fn verify_detects_missing_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let entries = vec![record("gone.png", b"data")];
        assert!(Manifest::verify(tmp.path(), &entries).is_err());
    }
}
