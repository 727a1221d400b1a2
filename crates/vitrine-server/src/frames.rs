//! Frame relay: screencast frames to the client, a copy to the
//! recording pipeline, and an explicit ack back upstream.

use std::sync::Arc;

use base64::Engine as _;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vitrine_browser::{AutomationPage, ScreencastFrame};
use vitrine_core::ids::SessionId;
use vitrine_core::protocol::ServerMessage;
use vitrine_record::Recorder;

/// Spawn the relay task for one session's screencast stream.
///
/// Frames are forwarded to the client in arrival order; the awaited send
/// is the backpressure signal, propagated upstream by withholding the
/// ack. The recording copy goes first and never blocks on the encoder.
pub(crate) fn spawn(
    id: SessionId,
    page: Arc<dyn AutomationPage>,
    mut frames: mpsc::Receiver<ScreencastFrame>,
    outbound: mpsc::Sender<ServerMessage>,
    recorder: Arc<Recorder>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            match base64::engine::general_purpose::STANDARD.decode(&frame.data) {
                Ok(bytes) => recorder.feed(Bytes::from(bytes)),
                Err(e) => {
                    tracing::debug!(session_id = %id, error = %e, "frame skipped recording, bad base64")
                }
            }

            if outbound
                .send(ServerMessage::RenderFrame { data: frame.data })
                .await
                .is_err()
            {
                tracing::info!(session_id = %id, "client channel closed, frame relay stopping");
                break;
            }

            // A missed ack stalls the upstream producer until the next
            // successful one; degraded, not fatal.
            if let Err(e) = page.ack_frame(frame.ack_token).await {
                tracing::warn!(session_id = %id, token = frame.ack_token, error = %e, "frame ack failed");
            }
        }
        tracing::debug!(session_id = %id, "frame relay stopped");
    })
}
