//! Session orchestration: one isolated browsing session per client.
//!
//! The orchestrator owns every sub-component handle and drives the
//! `Starting → Active → Ending → Closed` state machine. Teardown runs in
//! reverse dependency order with each step best-effort, so an early
//! failure never discards later cleanup.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vitrine_browser::{
    AutomationPage, BrowserConfig, BrowserContext, NetworkEvent, ScreencastFrame,
    ScreencastOptions, Viewport,
};
use vitrine_core::error::SessionError;
use vitrine_core::evidence::EvidenceRecord;
use vitrine_core::ids::SessionId;
use vitrine_core::journal::JournalCategory;
use vitrine_core::protocol::ServerMessage;
use vitrine_core::state::SessionState;
use vitrine_record::{EncoderConfig, NetworkLog, Recorder};
use vitrine_store::{EvidenceVault, Journal, SessionDirs};

use crate::evidence::EvidenceService;
use crate::frames;
use crate::input::InputRelay;

const TEARDOWN_GRACE: Duration = Duration::from_secs(1);

/// Per-session settings, fixed for the session's whole lifetime.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Directory session storage directories are created under.
    pub storage_root: PathBuf,
    /// DevTools endpoint of the remote browser.
    pub browser_endpoint: String,
    /// Start page when the client does not request one.
    pub default_url: String,
    /// Fixed virtual viewport, chosen once at session start.
    pub viewport: Viewport,
    pub encoder: EncoderConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./sessions"),
            browser_endpoint: "http://127.0.0.1:9222".into(),
            default_url: "https://www.google.com".into(),
            viewport: Viewport::default(),
            encoder: EncoderConfig::default(),
        }
    }
}

/// One live session: identity, storage, automation context, and the
/// relay tasks wired around them.
pub struct Session {
    id: SessionId,
    state: Arc<Mutex<SessionState>>,
    page: Arc<dyn AutomationPage>,
    journal: Arc<Journal>,
    vault: Arc<EvidenceVault>,
    recorder: Arc<Recorder>,
    network: Arc<NetworkLog>,
    input: InputRelay,
    evidence: EvidenceService,
    cancel: CancellationToken,
    closing: AtomicBool,
    frame_task: Mutex<Option<JoinHandle<()>>>,
    network_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Allocate identity and storage, then bring up the automation
    /// context. Any failure before the session reaches `Active` leaves a
    /// best-effort `error` journal entry and tears down whatever was
    /// already allocated.
    pub async fn open(
        config: &SessionConfig,
        requested_url: Option<String>,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<Arc<Self>, SessionError> {
        let id = SessionId::new();
        let url = requested_url.unwrap_or_else(|| config.default_url.clone());

        let dirs = SessionDirs::create(&config.storage_root, &id)
            .map_err(|e| SessionError::Setup(format!("session storage: {e}")))?;
        let journal = Arc::new(
            Journal::open(&dirs.journal_path())
                .map_err(|e| SessionError::Setup(format!("journal: {e}")))?,
        );
        journal
            .append(
                JournalCategory::Connection,
                serde_json::json!({ "url": url, "viewport": config.viewport }),
            )
            .map_err(|e| SessionError::Setup(format!("journal: {e}")))?;

        match Self::activate(config, &url, outbound, id.clone(), dirs, Arc::clone(&journal)).await
        {
            Ok(session) => Ok(session),
            Err(e) => {
                tracing::error!(session_id = %id, error = %e, "session setup failed");
                let _ = journal.append(
                    JournalCategory::Error,
                    serde_json::json!({ "kind": e.kind(), "message": e.to_string() }),
                );
                Err(e)
            }
        }
    }

    async fn activate(
        config: &SessionConfig,
        url: &str,
        outbound: mpsc::Sender<ServerMessage>,
        id: SessionId,
        dirs: SessionDirs,
        journal: Arc<Journal>,
    ) -> Result<Arc<Self>, SessionError> {
        let ctx = BrowserContext::connect(BrowserConfig {
            endpoint: config.browser_endpoint.clone(),
            viewport: config.viewport,
            screencast: ScreencastOptions::default(),
        })
        .await
        .map_err(|e| SessionError::Setup(format!("automation context: {e}")))?;

        let Some(frames_rx) = ctx.take_frames() else {
            ctx.close().await;
            return Err(SessionError::Setup("frame stream unavailable".into()));
        };
        let Some(network_rx) = ctx.take_network() else {
            ctx.close().await;
            return Err(SessionError::Setup("network stream unavailable".into()));
        };

        if let Err(e) = ctx.navigate(url).await {
            ctx.close().await;
            return Err(SessionError::Setup(format!("initial navigation: {e}")));
        }

        let page: Arc<dyn AutomationPage> = Arc::new(ctx);
        Self::assemble(config, outbound, id, dirs, journal, page, frames_rx, network_rx).await
    }

    /// Wire the relays, recording, and capture around an already-open
    /// automation page.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn assemble(
        config: &SessionConfig,
        outbound: mpsc::Sender<ServerMessage>,
        id: SessionId,
        dirs: SessionDirs,
        journal: Arc<Journal>,
        page: Arc<dyn AutomationPage>,
        frames_rx: mpsc::Receiver<ScreencastFrame>,
        network_rx: mpsc::Receiver<NetworkEvent>,
    ) -> Result<Arc<Self>, SessionError> {
        let vault = Arc::new(
            EvidenceVault::open(dirs.clone())
                .map_err(|e| SessionError::Setup(format!("evidence vault: {e}")))?,
        );
        let network = Arc::new(
            NetworkLog::create(&dirs.network_log_path())
                .map_err(|e| SessionError::Setup(format!("network capture: {e}")))?,
        );

        // A dead encoder degrades the session to live-only; it never
        // blocks setup.
        let recorder = match Recorder::start(&dirs.recording_path(), &config.encoder) {
            Ok(recorder) => Arc::new(recorder),
            Err(e) => {
                tracing::warn!(
                    session_id = %id,
                    error = %e,
                    "encoder unavailable, session runs without recording"
                );
                Arc::new(Recorder::disabled())
            }
        };

        let state = Arc::new(Mutex::new(SessionState::Starting));
        let cancel = CancellationToken::new();

        let input = InputRelay::new(
            Arc::clone(&page),
            Arc::clone(&journal),
            Arc::clone(&state),
            config.viewport,
        );
        let evidence = EvidenceService::new(
            Arc::clone(&page),
            Arc::clone(&vault),
            Arc::clone(&journal),
            Arc::clone(&state),
        );

        let frame_task = frames::spawn(
            id.clone(),
            Arc::clone(&page),
            frames_rx,
            outbound,
            Arc::clone(&recorder),
            cancel.clone(),
        );
        let network_task = spawn_network_pump(id.clone(), network_rx, Arc::clone(&network));

        if let Err(e) = page.start_screencast().await {
            cancel.cancel();
            recorder.stop();
            page.close().await;
            return Err(SessionError::Setup(format!("screencast: {e}")));
        }

        *state.lock() = SessionState::Active;
        tracing::info!(session_id = %id, "session active");

        Ok(Arc::new(Self {
            id,
            state,
            page,
            journal,
            vault,
            recorder,
            network,
            input,
            evidence,
            cancel,
            closing: AtomicBool::new(false),
            frame_task: Mutex::new(Some(frame_task)),
            network_task: Mutex::new(Some(network_task)),
        }))
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn input(&self) -> &InputRelay {
        &self.input
    }

    pub fn evidence(&self) -> &EvidenceService {
        &self.evidence
    }

    /// Manifest entries captured so far, in capture order.
    pub fn evidence_records(&self) -> Vec<EvidenceRecord> {
        self.vault.records()
    }

    /// Tear down in reverse dependency order. Idempotent; each step is
    /// best-effort and a failed step never blocks the ones after it.
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.lock() = SessionState::Ending;
        tracing::info!(session_id = %self.id, "session ending");

        // Relays stop first so nothing touches the context mid-teardown.
        self.cancel.cancel();

        if let Err(e) = self.page.stop_screencast().await {
            tracing::warn!(
                session_id = %self.id,
                step = "stop_screencast",
                error = %e,
                "teardown step failed"
            );
        }

        // End-of-input to the encoder; the final flush is asynchronous
        // and may land after the session record is already closed.
        self.recorder.stop();

        // Releasing the context also flushes trailing network events.
        self.page.close().await;

        let frame_task = self.frame_task.lock().take();
        if let Some(task) = frame_task {
            if tokio::time::timeout(TEARDOWN_GRACE, task).await.is_err() {
                tracing::warn!(session_id = %self.id, step = "frame_relay", "relay slow to stop");
            }
        }
        let network_task = self.network_task.lock().take();
        if let Some(task) = network_task {
            if tokio::time::timeout(TEARDOWN_GRACE, task).await.is_err() {
                tracing::warn!(
                    session_id = %self.id,
                    step = "network_capture",
                    "capture pump slow to stop"
                );
            }
        }
        self.network.finalize();

        if let Err(e) = self
            .journal
            .append(JournalCategory::Disconnect, serde_json::json!({}))
        {
            tracing::warn!(session_id = %self.id, step = "journal", error = %e, "teardown step failed");
        }

        *self.state.lock() = SessionState::Closed;
        tracing::info!(session_id = %self.id, "session closed");
    }
}

/// Drain the context's network events into the capture file. Runs until
/// the stream ends (the context released its connection), then finalizes
/// the capture — engines flush trailing events on context close.
fn spawn_network_pump(
    id: SessionId,
    mut events: mpsc::Receiver<NetworkEvent>,
    log: Arc<NetworkLog>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log.record(&event);
        }
        let count = log.finalize();
        tracing::debug!(session_id = %id, events = count, "network capture finalized");
    })
}
