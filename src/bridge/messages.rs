use serde::{Deserialize, Serialize};

/// Content → host messages.
///
/// This enum is the whole capability surface the embedded content can reach.
/// Anything that does not deserialize into one of these variants is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentMessage {
    /// Entry surface only: the auth flow finished.
    AuthSuccess { username: String, token: String },
    /// Room surface only: opaque telemetry, no effect on session state.
    GameEvent { event: String, data: String },
    /// Room surface only: the user asked to leave.
    LeaveRoom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    AuthSuccess,
    GameEvent,
    LeaveRoom,
}

impl ContentMessage {
    pub fn capability(&self) -> Capability {
        match self {
            ContentMessage::AuthSuccess { .. } => Capability::AuthSuccess,
            ContentMessage::GameEvent { .. } => Capability::GameEvent,
            ContentMessage::LeaveRoom => Capability::LeaveRoom,
        }
    }
}

/// Host → content replies on the bridge socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Accepted,
    Rejected { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_message_deserialize() {
        let json = r#"{"type": "game_event", "event": "score", "data": "12"}"#;
        let msg: ContentMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ContentMessage::GameEvent {
                event: "score".to_string(),
                data: "12".to_string()
            }
        );
        assert_eq!(msg.capability(), Capability::GameEvent);
    }

    #[test]
    fn test_unit_variant_deserialize() {
        let msg: ContentMessage = serde_json::from_str(r#"{"type": "leave_room"}"#).unwrap();
        assert_eq!(msg, ContentMessage::LeaveRoom);
    }

    #[test]
    fn test_unknown_capability_is_rejected() {
        let json = r#"{"type": "open_url", "url": "https://evil.example/"}"#;
        assert!(serde_json::from_str::<ContentMessage>(json).is_err());
    }

    #[test]
    fn test_host_message_serialize() {
        let json = serde_json::to_string(&HostMessage::Rejected {
            message: "nope".to_string(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"rejected\""));
        assert!(json.contains("\"message\":\"nope\""));
    }
}
