//! CDP automation client for remote isolated browsing sessions.
//!
//! Speaks the flat-session DevTools protocol to a remote Chromium
//! endpoint: one isolated browser context plus one page per session.
//! Only the commands this relay actually needs are implemented.

mod context;
mod error;
pub mod mock;
mod page;
mod types;

pub use context::{BrowserConfig, BrowserContext};
pub use error::BrowserError;
pub use page::AutomationPage;
pub use types::{
    FrameMetadata, NetworkEvent, ScreencastFormat, ScreencastFrame, ScreencastOptions, Viewport,
};
