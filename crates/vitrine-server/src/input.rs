//! Input relay: normalized client intents, journaled and dispatched to
//! the automation page.

use std::sync::Arc;

use parking_lot::Mutex;

use vitrine_browser::{AutomationPage, Viewport};
use vitrine_core::error::SessionError;
use vitrine_core::journal::JournalCategory;
use vitrine_core::protocol::{ClientMessage, NavAction};
use vitrine_core::state::SessionState;
use vitrine_store::Journal;

/// Translates client intents into automation calls.
///
/// Every well-formed intent is journaled before dispatch, so the audit
/// trail reflects what the client asked for, not only what succeeded.
/// Once teardown has begun the intent is still journaled but dispatch is
/// skipped.
pub struct InputRelay {
    page: Arc<dyn AutomationPage>,
    journal: Arc<Journal>,
    state: Arc<Mutex<SessionState>>,
    viewport: Viewport,
}

impl InputRelay {
    pub fn new(
        page: Arc<dyn AutomationPage>,
        journal: Arc<Journal>,
        state: Arc<Mutex<SessionState>>,
        viewport: Viewport,
    ) -> Self {
        Self {
            page,
            journal,
            state,
            viewport,
        }
    }

    /// Validate, journal, and dispatch one intent. Dispatch failures are
    /// isolated: the error is returned for logging and the session keeps
    /// processing subsequent intents.
    pub async fn handle(&self, intent: ClientMessage) -> Result<(), SessionError> {
        // evidence requests are routed to the capture service, not here
        if matches!(
            intent,
            ClientMessage::EvidenceSnapshot | ClientMessage::EvidenceDocument
        ) {
            return Ok(());
        }

        if !well_formed(&intent) {
            return Err(SessionError::Dispatch(format!(
                "malformed intent rejected: {intent:?}"
            )));
        }

        let category = match intent {
            ClientMessage::Navigate { .. } => JournalCategory::Navigation,
            _ => JournalCategory::Input,
        };
        let payload = serde_json::to_value(&intent).unwrap_or_else(|_| serde_json::json!({}));
        if let Err(e) = self.journal.append(category, payload) {
            tracing::warn!(error = %e, "intent failed to journal");
        }

        if !self.state.lock().accepts_input() {
            tracing::debug!("intent after teardown began, dispatch skipped");
            return Ok(());
        }

        let result = match intent {
            ClientMessage::MouseMove { x, y } => {
                self.page
                    .mouse_move(
                        x * f64::from(self.viewport.width),
                        y * f64::from(self.viewport.height),
                    )
                    .await
            }
            ClientMessage::MouseDown => self.page.mouse_down().await,
            ClientMessage::MouseUp => self.page.mouse_up().await,
            ClientMessage::Wheel { delta_x, delta_y } => self.page.wheel(delta_x, delta_y).await,
            ClientMessage::KeyDown { key } => self.page.press_key(&key).await,
            ClientMessage::Navigate { action } => match NavAction::parse(&action) {
                Some(NavAction::Back) => self.page.go_back().await,
                Some(NavAction::Forward) => self.page.go_forward().await,
                Some(NavAction::Reload) => self.page.reload().await,
                None => {
                    tracing::debug!(action = %action, "unknown navigation action ignored");
                    Ok(())
                }
            },
            ClientMessage::EvidenceSnapshot | ClientMessage::EvidenceDocument => Ok(()),
        };

        result.map_err(|e| {
            tracing::warn!(error = %e, "input dispatch failed, session continues");
            SessionError::Dispatch(e.to_string())
        })
    }
}

fn well_formed(intent: &ClientMessage) -> bool {
    match intent {
        ClientMessage::MouseMove { x, y } => {
            (0.0..=1.0).contains(x) && (0.0..=1.0).contains(y)
        }
        ClientMessage::Wheel { delta_x, delta_y } => delta_x.is_finite() && delta_y.is_finite(),
        _ => true,
    }
}
