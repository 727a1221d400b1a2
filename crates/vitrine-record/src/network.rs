use std::fs::File;
use std::io::Write;
use std::path::Path;

use parking_lot::Mutex;

use vitrine_browser::NetworkEvent;

use crate::error::RecordError;

/// Passive network-activity capture for one session.
///
/// Attached when the automation context is created; every request and
/// response record lands as one NDJSON line. `finalize` closes the file
/// and is called only after the context is released, because engines
/// flush trailing events on context close.
pub struct NetworkLog {
    inner: Mutex<Option<Inner>>,
}

struct Inner {
    file: File,
    count: u64,
}

impl NetworkLog {
    pub fn create(path: &Path) -> Result<Self, RecordError> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Mutex::new(Some(Inner { file, count: 0 })),
        })
    }

    /// Persist one event. Best-effort: a write failure degrades the
    /// capture, never the session.
    pub fn record(&self, event: &NetworkEvent) {
        let mut guard = self.inner.lock();
        let Some(inner) = guard.as_mut() else {
            tracing::debug!("network event after capture finalized, dropping");
            return;
        };
        let mut line = match serde_json::to_vec(event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "network event failed to serialize");
                return;
            }
        };
        line.push(b'\n');
        if let Err(e) = inner.file.write_all(&line).and_then(|()| inner.file.flush()) {
            tracing::warn!(error = %e, "network capture write failed");
            return;
        }
        inner.count += 1;
    }

    /// Number of events persisted so far.
    pub fn count(&self) -> u64 {
        self.inner.lock().as_ref().map(|i| i.count).unwrap_or(0)
    }

    /// Close the capture file. Idempotent; returns the final event count.
    pub fn finalize(&self) -> u64 {
        let mut guard = self.inner.lock();
        match guard.take() {
            Some(mut inner) => {
                let _ = inner.file.flush();
                inner.count
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str) -> NetworkEvent {
        NetworkEvent::RequestWillBeSent {
            request_id: id.into(),
            method: "GET".into(),
            url: "https://example.com/".into(),
            ts: 1.0,
        }
    }

    #[test]
    fn records_land_as_ndjson_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("network.ndjson");
        let log = NetworkLog::create(&path).unwrap();

        log.record(&request("1"));
        log.record(&NetworkEvent::ResponseReceived {
            request_id: "1".into(),
            url: "https://example.com/".into(),
            status: 200,
            mime_type: "text/html".into(),
            ts: 2.0,
        });
        assert_eq!(log.finalize(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: NetworkEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, request("1"));
    }

    #[test]
    fn finalize_is_idempotent_and_drops_late_events() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("network.ndjson");
        let log = NetworkLog::create(&path).unwrap();

        log.record(&request("1"));
        assert_eq!(log.finalize(), 1);
        assert_eq!(log.finalize(), 0);

        log.record(&request("2"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn count_tracks_persisted_events() {
        let tmp = tempfile::tempdir().unwrap();
        let log = NetworkLog::create(&tmp.path().join("network.ndjson")).unwrap();
        assert_eq!(log.count(), 0);
        log.record(&request("1"));
        log.record(&request("2"));
        assert_eq!(log.count(), 2);
    }
}
