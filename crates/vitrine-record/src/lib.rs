//! Session materialization: the video recording pipeline and the network
//! activity capture. Both degrade the session when they fail; neither can
//! end it.

mod error;
mod network;
mod video;

pub use error::RecordError;
pub use network::NetworkLog;
pub use video::{EncoderConfig, Recorder};
