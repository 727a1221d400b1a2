use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;

use vitrine_core::evidence::{EvidenceKind, EvidenceRecord};
use vitrine_core::hash::sha256_hex;

use crate::error::StoreError;
use crate::layout::SessionDirs;
use crate::manifest::Manifest;

/// Content-addressed evidence writer for one session.
///
/// `store` is the chain-of-custody point: the hash recorded in the
/// manifest is computed over exactly the bytes written to disk. The lock
/// serializes artifact-write + manifest-append so captures can never
/// interleave their manifest entries.
pub struct EvidenceVault {
    dirs: SessionDirs,
    manifest: Manifest,
    write_lock: Mutex<u64>,
}

impl EvidenceVault {
    pub fn open(dirs: SessionDirs) -> Result<Self, StoreError> {
        let manifest = Manifest::open(&dirs.manifest_path())?;
        let seq = manifest.len() as u64;
        Ok(Self {
            dirs,
            manifest,
            write_lock: Mutex::new(seq),
        })
    }

    /// Persist one artifact and append its manifest entry.
    pub fn store(&self, kind: EvidenceKind, bytes: &[u8]) -> Result<EvidenceRecord, StoreError> {
        let mut seq = self.write_lock.lock();
        *seq += 1;
        let file_name = format!(
            "{:04}-{}-{}.{}",
            *seq,
            kind,
            Utc::now().timestamp_millis(),
            kind.file_extension()
        );

        std::fs::write(self.dirs.artifact_path(&file_name), bytes)?;

        let record = EvidenceRecord {
            file_name,
            description: kind.describe().to_string(),
            captured_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            sha256: sha256_hex(bytes),
            bytes: bytes.len() as u64,
        };
        self.manifest.append(record.clone())?;
        Ok(record)
    }

    /// Manifest entries so far, in capture order.
    pub fn records(&self) -> Vec<EvidenceRecord> {
        self.manifest.entries()
    }

    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty()
    }

    /// Recheck every manifest entry against the artifact bytes on disk.
    pub fn verify(&self) -> Result<(), StoreError> {
        Manifest::verify(self.dirs.path(), &self.manifest.entries())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_core::ids::SessionId;

    fn vault_in(tmp: &tempfile::TempDir) -> EvidenceVault {
        let dirs = SessionDirs::create(tmp.path(), &SessionId::new()).unwrap();
        EvidenceVault::open(dirs).unwrap()
    }

    #[test]
    fn store_writes_bytes_and_manifest_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = vault_in(&tmp);

        let record = vault.store(EvidenceKind::Snapshot, b"png bytes").unwrap();
        assert_eq!(record.bytes, 9);
        assert_eq!(record.sha256, sha256_hex(b"png bytes"));
        assert_eq!(vault.len(), 1);
        vault.verify().unwrap();
    }

    #[test]
    fn manifest_hash_matches_bytes_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = SessionDirs::create(tmp.path(), &SessionId::new()).unwrap();
        let vault = EvidenceVault::open(dirs.clone()).unwrap();

        let record = vault
            .store(EvidenceKind::Document, b"<html></html>")
            .unwrap();
        let on_disk = std::fs::read(dirs.artifact_path(&record.file_name)).unwrap();
        assert_eq!(sha256_hex(&on_disk), record.sha256);
    }

    #[test]
    fn file_names_are_monotonic_within_a_session() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = vault_in(&tmp);

        let a = vault.store(EvidenceKind::Snapshot, b"one").unwrap();
        let b = vault.store(EvidenceKind::Snapshot, b"two").unwrap();
        let c = vault.store(EvidenceKind::Document, b"three").unwrap();
        assert!(a.file_name < b.file_name);
        assert!(b.file_name < c.file_name);
    }

    #[test]
    fn records_keep_capture_order() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = vault_in(&tmp);

        vault.store(EvidenceKind::Snapshot, b"one").unwrap();
        vault.store(EvidenceKind::Document, b"two").unwrap();

        let records = vault.records();
        assert_eq!(records.len(), 2);
        assert!(records[0].file_name.contains("snapshot"));
        assert!(records[1].file_name.contains("document"));
    }

    #[test]
    fn kind_extension_is_used() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = vault_in(&tmp);

        let snap = vault.store(EvidenceKind::Snapshot, b"x").unwrap();
        let doc = vault.store(EvidenceKind::Document, b"y").unwrap();
        assert!(snap.file_name.ends_with(".png"));
        assert!(doc.file_name.ends_with(".html"));
    }

    #[test]
    fn reopen_continues_numbering() {
        let tmp = tempfile::tempdir().unwrap();
        let id = SessionId::new();
        let dirs = SessionDirs::create(tmp.path(), &id).unwrap();

        {
            let vault = EvidenceVault::open(dirs.clone()).unwrap();
            vault.store(EvidenceKind::Snapshot, b"one").unwrap();
        }

        let vault = EvidenceVault::open(dirs).unwrap();
        let record = vault.store(EvidenceKind::Snapshot, b"two").unwrap();
        assert!(record.file_name.starts_with("0002-"));
        assert_eq!(vault.len(), 2);
    }
}
