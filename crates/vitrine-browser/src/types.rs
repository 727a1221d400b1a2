use serde::{Deserialize, Serialize};

/// Fixed virtual viewport for a session, chosen once at session start.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// One screencast frame from the automation context.
///
/// `ack_token` is the upstream session token the producer expects back in
/// the acknowledge call; it has no meaning beyond that handshake.
#[derive(Clone, Debug)]
pub struct ScreencastFrame {
    /// Base64-encoded image bytes.
    pub data: String,
    /// Token echoed back in the frame acknowledgment.
    pub ack_token: u64,
    pub metadata: FrameMetadata,
}

/// Viewport metadata attached to a screencast frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub device_width: u32,
    pub device_height: u32,
    pub page_scale_factor: f64,
    pub scroll_offset_x: f64,
    pub scroll_offset_y: f64,
}

impl Default for FrameMetadata {
    fn default() -> Self {
        Self {
            device_width: 1920,
            device_height: 1080,
            page_scale_factor: 1.0,
            scroll_offset_x: 0.0,
            scroll_offset_y: 0.0,
        }
    }
}

/// Screencast tuning.
#[derive(Clone, Debug)]
pub struct ScreencastOptions {
    /// JPEG quality (0-100).
    pub quality: u32,
    pub format: ScreencastFormat,
    pub max_width: u32,
    pub max_height: u32,
    /// Capture every Nth frame (1 = every frame).
    pub every_nth_frame: u32,
}

impl Default for ScreencastOptions {
    fn default() -> Self {
        Self {
            quality: 75,
            format: ScreencastFormat::Jpeg,
            max_width: 1920,
            max_height: 1080,
            every_nth_frame: 2,
        }
    }
}

/// Screencast image format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScreencastFormat {
    Jpeg,
    Png,
}

impl ScreencastFormat {
    /// Protocol string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }
}

/// One structured record from the page's network activity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NetworkEvent {
    RequestWillBeSent {
        request_id: String,
        method: String,
        url: String,
        ts: f64,
    },
    ResponseReceived {
        request_id: String,
        url: String,
        status: u64,
        mime_type: String,
        ts: f64,
    },
    LoadingFailed {
        request_id: String,
        error_text: String,
        ts: f64,
    },
}

impl NetworkEvent {
    /// Map a protocol event to a capture record. Unhandled methods yield
    /// `None` and are dropped by the subscriber.
    pub fn from_cdp(method: &str, params: &serde_json::Value) -> Option<Self> {
        let request_id = params["requestId"].as_str()?.to_string();
        let ts = params["timestamp"].as_f64().unwrap_or(0.0);
        match method {
            "Network.requestWillBeSent" => Some(Self::RequestWillBeSent {
                request_id,
                method: params["request"]["method"].as_str().unwrap_or("").into(),
                url: params["request"]["url"].as_str().unwrap_or("").into(),
                ts,
            }),
            "Network.responseReceived" => Some(Self::ResponseReceived {
                request_id,
                url: params["response"]["url"].as_str().unwrap_or("").into(),
                status: params["response"]["status"].as_u64().unwrap_or(0),
                mime_type: params["response"]["mimeType"].as_str().unwrap_or("").into(),
                ts,
            }),
            "Network.loadingFailed" => Some(Self::LoadingFailed {
                request_id,
                error_text: params["errorText"].as_str().unwrap_or("").into(),
                ts,
            }),
            _ => None,
        }
    }
}
