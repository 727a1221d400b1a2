//! Evidence capture: page state into the vault, under chain of custody.

use std::sync::Arc;

use parking_lot::Mutex;

use vitrine_browser::AutomationPage;
use vitrine_core::error::SessionError;
use vitrine_core::evidence::{EvidenceKind, EvidenceRecord};
use vitrine_core::journal::JournalCategory;
use vitrine_core::state::SessionState;
use vitrine_store::{EvidenceVault, Journal};

/// Serialized capture front-end for one session.
///
/// Captures are serialized against each other (the manifest append must
/// not race with itself) but run independently of the frame and input
/// relays. Captures requested once teardown has begun are rejected;
/// captures already past that check are allowed to finish.
pub struct EvidenceService {
    page: Arc<dyn AutomationPage>,
    vault: Arc<EvidenceVault>,
    journal: Arc<Journal>,
    state: Arc<Mutex<SessionState>>,
    serialize: tokio::sync::Mutex<()>,
}

impl EvidenceService {
    pub fn new(
        page: Arc<dyn AutomationPage>,
        vault: Arc<EvidenceVault>,
        journal: Arc<Journal>,
        state: Arc<Mutex<SessionState>>,
    ) -> Self {
        Self {
            page,
            vault,
            journal,
            state,
            serialize: tokio::sync::Mutex::new(()),
        }
    }

    /// Fetch current page state, persist it, and append the manifest
    /// entry. The recorded hash is computed over exactly the bytes
    /// written to storage.
    pub async fn capture(&self, kind: EvidenceKind) -> Result<EvidenceRecord, SessionError> {
        let _guard = self.serialize.lock().await;

        if self.state.lock().is_teardown() {
            return Err(SessionError::TeardownInProgress);
        }

        let bytes = match kind {
            EvidenceKind::Snapshot => self.page.screenshot().await,
            EvidenceKind::Document => self.page.document_html().await.map(String::into_bytes),
        };
        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(e) => {
                self.report_failure(kind, &e.to_string());
                return Err(SessionError::Capture(e.to_string()));
            }
        };

        let record = match self.vault.store(kind, &bytes) {
            Ok(record) => record,
            Err(e) => {
                self.report_failure(kind, &e.to_string());
                return Err(SessionError::Capture(e.to_string()));
            }
        };

        if let Err(e) = self.journal.append(
            JournalCategory::EvidenceCaptured,
            serde_json::json!({
                "file_name": record.file_name,
                "sha256": record.sha256,
                "bytes": record.bytes,
            }),
        ) {
            tracing::warn!(error = %e, "capture landed but failed to journal");
        }

        tracing::info!(kind = %kind, file = %record.file_name, "evidence captured");
        Ok(record)
    }

    fn report_failure(&self, kind: EvidenceKind, reason: &str) {
        tracing::error!(kind = %kind, reason = reason, "evidence capture failed");
        let _ = self.journal.append(
            JournalCategory::Error,
            serde_json::json!({ "kind": "capture", "evidence": kind.to_string(), "message": reason }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_browser::mock::MockPage;
    use vitrine_core::hash::sha256_hex;
    use vitrine_core::ids::SessionId;
    use vitrine_store::SessionDirs;

    struct Rig {
        service: EvidenceService,
        state: Arc<Mutex<SessionState>>,
        dirs: SessionDirs,
        _tmp: tempfile::TempDir,
    }

    fn rig(page: Arc<MockPage>) -> Rig {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = SessionDirs::create(tmp.path(), &SessionId::new()).unwrap();
        let vault = Arc::new(EvidenceVault::open(dirs.clone()).unwrap());
        let journal = Arc::new(Journal::open(&dirs.journal_path()).unwrap());
        let state = Arc::new(Mutex::new(SessionState::Active));
        let service = EvidenceService::new(
            page as Arc<dyn AutomationPage>,
            vault,
            journal,
            Arc::clone(&state),
        );
        Rig {
            service,
            state,
            dirs,
            _tmp: tmp,
        }
    }

    fn journal_entries(r: &Rig) -> Vec<vitrine_core::journal::JournalEntry> {
        Journal::load(&r.dirs.journal_path()).unwrap()
    }

    #[tokio::test]
    async fn capture_produces_one_manifest_and_one_journal_entry() {
        let r = rig(Arc::new(MockPage::new()));

        let record = r.service.capture(EvidenceKind::Snapshot).await.unwrap();
        assert_eq!(record.sha256, sha256_hex(b"\x89PNG mock image bytes"));

        let on_disk = std::fs::read(r.dirs.artifact_path(&record.file_name)).unwrap();
        assert_eq!(sha256_hex(&on_disk), record.sha256);

        let entries = journal_entries(&r);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].category, JournalCategory::EvidenceCaptured);
        assert_eq!(entries[0].payload["file_name"], record.file_name);
    }

    #[tokio::test]
    async fn document_capture_hashes_the_serialized_markup() {
        let r = rig(Arc::new(MockPage::new()));
        let record = r.service.capture(EvidenceKind::Document).await.unwrap();
        assert!(record.file_name.ends_with(".html"));
        assert_eq!(record.sha256, sha256_hex(b"<html><body>mock</body></html>"));
    }

    #[tokio::test]
    async fn failed_capture_touches_nothing_but_the_error_log() {
        let r = rig(Arc::new(MockPage::with_capture_failure()));

        let err = r.service.capture(EvidenceKind::Snapshot).await.unwrap_err();
        assert!(matches!(err, SessionError::Capture(_)));

        let entries = journal_entries(&r);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].category, JournalCategory::Error);
        assert!(vitrine_store::Manifest::load(&r.dirs.manifest_path())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn captures_during_teardown_are_rejected() {
        let r = rig(Arc::new(MockPage::new()));
        *r.state.lock() = SessionState::Ending;

        let err = r.service.capture(EvidenceKind::Document).await.unwrap_err();
        assert!(matches!(err, SessionError::TeardownInProgress));
        assert!(journal_entries(&r).is_empty());
    }

    #[tokio::test]
    async fn concurrent_captures_serialize_onto_the_manifest() {
        let r = rig(Arc::new(MockPage::new()));

        let (a, b) = tokio::join!(
            r.service.capture(EvidenceKind::Snapshot),
            r.service.capture(EvidenceKind::Document),
        );
        a.unwrap();
        b.unwrap();

        let manifest = vitrine_store::Manifest::load(&r.dirs.manifest_path()).unwrap();
        assert_eq!(manifest.len(), 2);
        assert!(manifest[0].file_name < manifest[1].file_name);
    }
}
