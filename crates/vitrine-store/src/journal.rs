use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use parking_lot::Mutex;

use vitrine_core::journal::{JournalCategory, JournalEntry};

use crate::error::StoreError;

/// Append-only, hash-chained session journal backed by a JSONL file.
///
/// One entry per line, written and flushed synchronously under a lock so
/// entries land in append order. Nothing ever rewrites a prior line.
pub struct Journal {
    inner: Mutex<Inner>,
}

struct Inner {
    file: File,
    next_seq: u64,
    head_hash: Option<String>,
}

impl Journal {
    /// Open (or create) the journal at `path`, resuming the chain if the
    /// file already has entries.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let existing = if path.exists() { Self::load(path)? } else { Vec::new() };
        let next_seq = existing.last().map(|e| e.seq + 1).unwrap_or(0);
        let head_hash = existing.last().map(|e| e.hash.clone());

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                file,
                next_seq,
                head_hash,
            }),
        })
    }

    /// Append one entry. Synchronous: the line is written and flushed
    /// before this returns.
    pub fn append(
        &self,
        category: JournalCategory,
        payload: serde_json::Value,
    ) -> Result<JournalEntry, StoreError> {
        let mut inner = self.inner.lock();
        let entry = JournalEntry::next(
            inner.next_seq,
            category,
            payload,
            inner.head_hash.as_deref(),
        );

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        inner.file.write_all(&line)?;
        inner.file.flush()?;

        inner.next_seq = entry.seq + 1;
        inner.head_hash = Some(entry.hash.clone());
        Ok(entry)
    }

    /// Number of entries appended so far.
    pub fn len(&self) -> u64 {
        self.inner.lock().next_seq
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hash of the most recent entry.
    pub fn head_hash(&self) -> Option<String> {
        self.inner.lock().head_hash.clone()
    }

    /// Read all entries back from disk.
    pub fn load(path: &Path) -> Result<Vec<JournalEntry>, StoreError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str::<JournalEntry>(&line)?);
        }
        Ok(entries)
    }

    /// Verify sequence numbers, timestamp ordering, and the hash chain.
    pub fn verify_chain(entries: &[JournalEntry]) -> Result<(), StoreError> {
        let mut prev_hash: Option<&str> = None;
        let mut prev_ts: Option<&str> = None;
        for (i, entry) in entries.iter().enumerate() {
            if entry.seq != i as u64 {
                return Err(StoreError::Integrity(format!(
                    "entry {i} has seq {}",
                    entry.seq
                )));
            }
            // RFC3339 with fixed precision compares correctly as a string
            if let Some(prev) = prev_ts {
                if entry.ts.as_str() < prev {
                    return Err(StoreError::Integrity(format!(
                        "entry {i} timestamp went backwards"
                    )));
                }
            }
            if !entry.verifies_against(prev_hash) {
                return Err(StoreError::Integrity(format!(
                    "hash chain broken at entry {i}"
                )));
            }
            prev_hash = Some(&entry.hash);
            prev_ts = Some(&entry.ts);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn journal_in(dir: &Path) -> (Journal, std::path::PathBuf) {
        let path = dir.join("journal.jsonl");
        (Journal::open(&path).unwrap(), path)
    }

    #[test]
    fn appended_entries_round_trip_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let (journal, path) = journal_in(tmp.path());

        journal
            .append(JournalCategory::Connection, serde_json::json!({"url": "https://a"}))
            .unwrap();
        journal
            .append(JournalCategory::Input, serde_json::json!({"type": "mousedown"}))
            .unwrap();
        journal
            .append(JournalCategory::Disconnect, serde_json::json!({}))
            .unwrap();

        let entries = Journal::load(&path).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].category, JournalCategory::Connection);
        assert_eq!(entries[1].category, JournalCategory::Input);
        assert_eq!(entries[2].category, JournalCategory::Disconnect);
    }

    #[test]
    fn chain_verifies_and_timestamps_do_not_decrease() {
        let tmp = tempfile::tempdir().unwrap();
        let (journal, path) = journal_in(tmp.path());

        for i in 0..20 {
            journal
                .append(JournalCategory::Input, serde_json::json!({"i": i}))
                .unwrap();
        }

        let entries = Journal::load(&path).unwrap();
        Journal::verify_chain(&entries).unwrap();
        for w in entries.windows(2) {
            assert!(w[0].ts <= w[1].ts);
        }
    }

    #[test]
    fn tampering_with_a_line_breaks_the_chain() {
        let tmp = tempfile::tempdir().unwrap();
        let (journal, path) = journal_in(tmp.path());

        journal
            .append(JournalCategory::Connection, serde_json::json!({}))
            .unwrap();
        journal
            .append(JournalCategory::Input, serde_json::json!({"key": "a"}))
            .unwrap();

        let mut entries = Journal::load(&path).unwrap();
        entries[0].payload = serde_json::json!({"forged": true});
        let err = Journal::verify_chain(&entries).unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }

    #[test]
    fn reopen_resumes_the_chain() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("journal.jsonl");

        {
            let journal = Journal::open(&path).unwrap();
            journal
                .append(JournalCategory::Connection, serde_json::json!({}))
                .unwrap();
        }

        let journal = Journal::open(&path).unwrap();
        assert_eq!(journal.len(), 1);
        journal
            .append(JournalCategory::Disconnect, serde_json::json!({}))
            .unwrap();

        let entries = Journal::load(&path).unwrap();
        assert_eq!(entries.len(), 2);
        Journal::verify_chain(&entries).unwrap();
    }

    #[test]
    fn head_hash_tracks_latest_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let (journal, _) = journal_in(tmp.path());

        assert!(journal.head_hash().is_none());
        let entry = journal
            .append(JournalCategory::Connection, serde_json::json!({}))
            .unwrap();
        assert_eq!(journal.head_hash().as_deref(), Some(entry.hash.as_str()));
    }

    #[test]
    fn verify_rejects_reordered_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let (journal, path) = journal_in(tmp.path());

        journal
            .append(JournalCategory::Connection, serde_json::json!({}))
            .unwrap();
        journal
            .append(JournalCategory::Input, serde_json::json!({}))
            .unwrap();

        let mut entries = Journal::load(&path).unwrap();
        entries.swap(0, 1);
        assert!(Journal::verify_chain(&entries).is_err());
    }
}
