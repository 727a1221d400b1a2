/// Session-level error taxonomy.
///
/// Only setup failures and a broken client channel terminate a session;
/// everything else is isolated to its component and surfaced through
/// logs and the journal.
#[derive(Clone, Debug, thiserror::Error)]
pub enum SessionError {
    // Fatal — session ends
    #[error("session setup failed: {0}")]
    Setup(String),
    #[error("client channel closed")]
    ChannelClosed,

    // Isolated — session continues
    #[error("input dispatch failed: {0}")]
    Dispatch(String),
    #[error("evidence capture failed: {0}")]
    Capture(String),
    #[error("capture rejected: session teardown in progress")]
    TeardownInProgress,
    #[error("teardown step '{step}' failed: {reason}")]
    Teardown { step: &'static str, reason: String },
}

impl SessionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Setup(_) | Self::ChannelClosed)
    }

    /// Short classification string for logging and journal payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Setup(_) => "setup",
            Self::ChannelClosed => "channel_closed",
            Self::Dispatch(_) => "dispatch",
            Self::Capture(_) => "capture",
            Self::TeardownInProgress => "teardown_in_progress",
            Self::Teardown { .. } => "teardown",
        }
    }
}
