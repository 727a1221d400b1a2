use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::RecordError;

const FRAME_BUFFER: usize = 64;

/// External encoder invocation. The encoder reads raw frames from stdin
/// and writes the container to stdout, which the recorder redirects into
/// the session's recording file.
#[derive(Clone, Debug)]
pub struct EncoderConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".into(),
            args: [
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "image2pipe",
                "-framerate",
                "10",
                "-i",
                "pipe:0",
                "-c:v",
                "libvpx-vp9",
                "-f",
                "webm",
                "pipe:1",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Buffered pipe into an external encoder process.
///
/// Frames go through a bounded channel; a supervised task copies them
/// into the encoder's stdin and waits the process out. `stop` signals
/// end-of-input without waiting for the final flush — the artifact may
/// finish after the session record is already closed.
pub struct Recorder {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    active: AtomicBool,
}

impl Recorder {
    /// Spawn the encoder writing to `output` and start the feed task.
    pub fn start(output: &Path, config: &EncoderConfig) -> Result<Self, RecordError> {
        let out_file = std::fs::File::create(output)?;

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(out_file))
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecordError::Spawn(format!("{}: {e}", config.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecordError::Spawn("encoder stdin not piped".into()))?;

        let (tx, mut rx) = mpsc::channel::<Bytes>(FRAME_BUFFER);
        let program = config.program.clone();

        let supervisor = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = stdin.write_all(&frame).await {
                    tracing::warn!(error = %e, "encoder rejected frame, recording degraded");
                    break;
                }
            }
            // EOF to the encoder, then wait out the final flush
            drop(stdin);
            match child.wait().await {
                Ok(status) if status.success() => {
                    tracing::info!(encoder = %program, "recording finalized");
                }
                Ok(status) => {
                    tracing::warn!(encoder = %program, %status, "encoder exited abnormally");
                }
                Err(e) => {
                    tracing::warn!(encoder = %program, error = %e, "encoder wait failed");
                }
            }
        });

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            supervisor: Mutex::new(Some(supervisor)),
            active: AtomicBool::new(true),
        })
    }

    /// A recorder that drops everything, used when the encoder could not
    /// be started and the session runs without a recording.
    pub fn disabled() -> Self {
        Self {
            tx: Mutex::new(None),
            supervisor: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Queue one frame. Never blocks: a full buffer drops the frame, a
    /// stopped recorder ignores it.
    pub fn feed(&self, frame: Bytes) {
        let tx = self.tx.lock().clone();
        let Some(tx) = tx else { return };
        match tx.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("recording buffer full, dropping frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.active.store(false, Ordering::Relaxed);
            }
        }
    }

    /// Signal end-of-input. Returns immediately; the encoder flushes in
    /// the background. Idempotent.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Relaxed);
        self.tx.lock().take();
    }

    /// Take the supervisor handle to await encoder completion.
    pub fn completion(&self) -> Option<JoinHandle<()>> {
        self.supervisor.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `cat` stands in for the encoder: stdin is copied verbatim to the
    /// output file, so the artifact equals the fed frame bytes.
    fn passthrough() -> EncoderConfig {
        EncoderConfig {
            program: "cat".into(),
            args: Vec::new(),
        }
    }

    #[tokio::test]
    async fn frames_reach_the_output_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("recording.webm");

        let recorder = Recorder::start(&out, &passthrough()).unwrap();
        recorder.feed(Bytes::from_static(b"frame-1"));
        recorder.feed(Bytes::from_static(b"frame-2"));
        recorder.stop();
        recorder.completion().unwrap().await.unwrap();

        let written = std::fs::read(&out).unwrap();
        assert_eq!(written, b"frame-1frame-2");
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_feed_after_stop_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("recording.webm");

        let recorder = Recorder::start(&out, &passthrough()).unwrap();
        recorder.feed(Bytes::from_static(b"only"));
        recorder.stop();
        recorder.stop();
        recorder.feed(Bytes::from_static(b"late"));
        recorder.completion().unwrap().await.unwrap();

        assert_eq!(std::fs::read(&out).unwrap(), b"only");
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_not_panicked() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("recording.webm");

        let err = Recorder::start(
            &out,
            &EncoderConfig {
                program: "definitely-not-an-encoder".into(),
                args: Vec::new(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, RecordError::Spawn(_)));
    }

    #[tokio::test]
    async fn disabled_recorder_swallows_everything() {
        let recorder = Recorder::disabled();
        assert!(!recorder.is_active());
        recorder.feed(Bytes::from_static(b"frame"));
        recorder.stop();
        assert!(recorder.completion().is_none());
    }

    #[test]
    fn default_encoder_is_ffmpeg_piped() {
        let config = EncoderConfig::default();
        assert_eq!(config.program, "ffmpeg");
        assert!(config.args.iter().any(|a| a == "pipe:0"));
        assert!(config.args.iter().any(|a| a == "pipe:1"));
    }
}
