//! WebSocket relay server for remote isolated browsing.
//!
//! One client connection owns one sandboxed browser context: screencast
//! frames stream down, normalized input streams up, and every session
//! materializes a hash-chained journal, an evidence manifest, a video
//! artifact, and a network capture under its own storage directory.

mod evidence;
mod frames;
mod input;
mod registry;
mod server;
mod session;

pub use evidence::EvidenceService;
pub use input::InputRelay;
pub use registry::SessionRegistry;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
pub use session::{Session, SessionConfig};

// Re-exported so the binary can build a config without depending on the
// lower crates directly.
pub use vitrine_browser::Viewport;
pub use vitrine_record::EncoderConfig;
