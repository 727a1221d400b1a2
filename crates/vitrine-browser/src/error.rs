#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("browser connect failed: {context}")]
    ConnectFailed { context: String },

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error("timed out after {timeout_ms}ms: {context}")]
    Timeout { timeout_ms: u64, context: String },

    #[error("navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("{action} failed: {reason}")]
    ActionFailed { action: String, reason: String },

    #[error("automation context is closed")]
    Closed,
}
