use serde::{Deserialize, Serialize};

use crate::evidence::EvidenceRecord;

/// Messages a client sends over the session channel.
///
/// Pointer coordinates are unit-square values; the relay denormalizes them
/// against the session's fixed virtual viewport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "mousemove")]
    MouseMove { x: f64, y: f64 },
    #[serde(rename = "mousedown")]
    MouseDown,
    #[serde(rename = "mouseup")]
    MouseUp,
    #[serde(rename = "wheel")]
    Wheel {
        #[serde(rename = "deltaX")]
        delta_x: f64,
        #[serde(rename = "deltaY")]
        delta_y: f64,
    },
    #[serde(rename = "keydown")]
    KeyDown { key: String },
    #[serde(rename = "navigate")]
    Navigate { action: String },
    #[serde(rename = "evidence:snapshot")]
    EvidenceSnapshot,
    #[serde(rename = "evidence:document")]
    EvidenceDocument,
}

/// History navigation commands. The wire carries a free-form string so an
/// unknown action can be ignored instead of failing the whole message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavAction {
    Back,
    Forward,
    Reload,
}

impl NavAction {
    /// Parse a wire action; `None` means "ignore it".
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "back" => Some(Self::Back),
            "forward" => Some(Self::Forward),
            "reload" => Some(Self::Reload),
            _ => None,
        }
    }
}

impl std::fmt::Display for NavAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Back => write!(f, "back"),
            Self::Forward => write!(f, "forward"),
            Self::Reload => write!(f, "reload"),
        }
    }
}

/// Messages the relay sends back to the client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// One screencast frame, base64-encoded image bytes.
    #[serde(rename = "render_frame")]
    RenderFrame { data: String },
    /// Confirmation that an evidence capture landed in the manifest.
    #[serde(rename = "evidence_ack")]
    EvidenceAck { entry: EvidenceRecord },
    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mousemove_parses_from_wire_json() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"mousemove","x":0.5,"y":0.25}"#).unwrap();
        assert_eq!(msg, ClientMessage::MouseMove { x: 0.5, y: 0.25 });
    }

    #[test]
    fn wheel_uses_camel_case_deltas() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"wheel","deltaX":-3.0,"deltaY":120.0}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Wheel {
                delta_x: -3.0,
                delta_y: 120.0
            }
        );
    }

    #[test]
    fn unit_variants_parse_without_payload() {
        let down: ClientMessage = serde_json::from_str(r#"{"type":"mousedown"}"#).unwrap();
        let up: ClientMessage = serde_json::from_str(r#"{"type":"mouseup"}"#).unwrap();
        assert_eq!(down, ClientMessage::MouseDown);
        assert_eq!(up, ClientMessage::MouseUp);
    }

    #[test]
    fn evidence_requests_parse() {
        let snap: ClientMessage = serde_json::from_str(r#"{"type":"evidence:snapshot"}"#).unwrap();
        let doc: ClientMessage = serde_json::from_str(r#"{"type":"evidence:document"}"#).unwrap();
        assert_eq!(snap, ClientMessage::EvidenceSnapshot);
        assert_eq!(doc, ClientMessage::EvidenceDocument);
    }

    #[test]
    fn unknown_message_type_is_a_parse_error() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"teleport"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn nav_action_parses_known_and_ignores_unknown() {
        assert_eq!(NavAction::parse("back"), Some(NavAction::Back));
        assert_eq!(NavAction::parse("forward"), Some(NavAction::Forward));
        assert_eq!(NavAction::parse("reload"), Some(NavAction::Reload));
        assert_eq!(NavAction::parse("teleport"), None);
        assert_eq!(NavAction::parse(""), None);
    }

    #[test]
    fn render_frame_serializes_with_type_tag() {
        let msg = ServerMessage::RenderFrame { data: "AQID".into() };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "render_frame");
        assert_eq!(json["data"], "AQID");
    }

    #[test]
    fn evidence_ack_carries_the_entry() {
        let msg = ServerMessage::EvidenceAck {
            entry: EvidenceRecord {
                file_name: "0001-snapshot-1722700000000.png".into(),
                description: "page snapshot".into(),
                captured_at: "2026-08-03T12:00:00.000Z".into(),
                sha256: "cd".repeat(32),
                bytes: 4,
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "evidence_ack");
        assert_eq!(json["entry"]["file_name"], "0001-snapshot-1722700000000.png");
    }

    #[test]
    fn error_message_wire_shape() {
        let msg = ServerMessage::Error {
            message: "Failed to start browser session".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("Failed to start browser session"));
    }
}
