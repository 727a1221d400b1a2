use async_trait::async_trait;

use crate::error::BrowserError;

/// The automation surface a live session drives.
///
/// All calls for one session funnel through a single sequencing queue in
/// the implementation, so concurrent relays (frames one way, input the
/// other) never race on the underlying protocol connection.
#[async_trait]
pub trait AutomationPage: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;
    async fn go_back(&self) -> Result<(), BrowserError>;
    async fn go_forward(&self) -> Result<(), BrowserError>;
    async fn reload(&self) -> Result<(), BrowserError>;

    /// Move the pointer to viewport coordinates.
    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), BrowserError>;
    async fn mouse_down(&self) -> Result<(), BrowserError>;
    async fn mouse_up(&self) -> Result<(), BrowserError>;
    async fn wheel(&self, delta_x: f64, delta_y: f64) -> Result<(), BrowserError>;
    async fn press_key(&self, key: &str) -> Result<(), BrowserError>;

    /// Rendered image of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError>;
    /// Serialized markup of the current document.
    async fn document_html(&self) -> Result<String, BrowserError>;

    /// Start pushing screencast frames.
    async fn start_screencast(&self) -> Result<(), BrowserError>;
    async fn stop_screencast(&self) -> Result<(), BrowserError>;
    /// Acknowledge a screencast frame so the producer resumes.
    async fn ack_frame(&self, token: u64) -> Result<(), BrowserError>;

    /// Release the context. Best-effort and idempotent.
    async fn close(&self);
}
