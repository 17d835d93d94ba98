use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::role::Role;

/// Inbound `{type, payload}` envelope. The payload stays raw until the
/// handler registered for `type` decodes it.
#[derive(Debug, Deserialize)]
pub struct ControlEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub user_id: String,
    pub role: Role,
    pub stand_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub stand_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    AuthSuccess,
    Pong,
    PresenceUpdate,
    Typing,
    EmergencyAlert,
    AlertConfirmation,
    DeliveryUpdate,
    IssueUpdate,
    AuditEvent,
}

/// Outbound `{type, payload}` envelope pushed to live connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub payload: Value,
}

impl OutboundMessage {
    pub fn new(message_type: MessageType, payload: Value) -> Self {
        Self {
            message_type,
            payload,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// One entry of the `onlineUsers` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: String,
    pub role: Role,
    pub stand_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsing_auth_envelope() {
        let raw = r#"{"type":"auth","payload":{"userId":"u-7","role":"supervisor","standId":"stand-4"}}"#;
        let envelope: ControlEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.kind, "auth");

        let auth: AuthPayload = serde_json::from_value(envelope.payload).unwrap();
        assert_eq!(auth.user_id, "u-7");
        assert_eq!(auth.role, Role::Supervisor);
        assert_eq!(auth.stand_id.as_deref(), Some("stand-4"));
    }

    #[test]
    fn test_envelope_without_payload() {
        let envelope: ControlEnvelope = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(envelope.kind, "ping");
        assert!(envelope.payload.is_null());
    }

    #[test]
    fn test_outbound_shape() {
        let msg = OutboundMessage::new(MessageType::PresenceUpdate, serde_json::json!({"onlineUsers": []}));
        let json: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "presence_update");
        assert_eq!(json["payload"]["onlineUsers"], serde_json::json!([]));
    }
}
