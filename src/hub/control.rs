//! Inbound control messages on a duplex connection.
//!
//! Each message type maps to one handler in [`HANDLERS`]. Handlers are plain
//! functions over the per-socket state, so each can be tested without a
//! socket.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use super::connection::ConnectionHandle;
use super::registry::{BroadcastFilter, ConnectionRegistry};
use crate::error::ControlError;
use crate::models::message::{AuthPayload, ControlEnvelope, PresencePayload, TypingPayload};
use crate::models::{MessageType, OutboundMessage};

type Handler = fn(&mut SocketState, Value) -> Result<(), ControlError>;

const HANDLERS: &[(&str, Handler)] = &[
    ("auth", handle_auth),
    ("ping", handle_ping),
    ("presence_update", handle_presence_update),
    ("typing", handle_typing),
];

/// State owned by one socket's reader task.
#[derive(Debug)]
pub struct SocketState {
    registry: ConnectionRegistry,
    handle: ConnectionHandle,
    user_id: Option<String>,
}

impl SocketState {
    pub fn new(registry: ConnectionRegistry, handle: ConnectionHandle) -> Self {
        Self {
            registry,
            handle,
            user_id: None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Parse one text frame and run its handler.
    pub fn handle_text(&mut self, text: &str) -> Result<(), ControlError> {
        let envelope: ControlEnvelope = serde_json::from_str(text)?;
        let handler = HANDLERS
            .iter()
            .find(|(kind, _)| *kind == envelope.kind)
            .map(|(_, handler)| *handler)
            .ok_or_else(|| ControlError::UnknownType(envelope.kind.clone()))?;
        handler(self, envelope.payload)
    }

    /// Release this socket's binding, if it still owns one.
    pub fn close(&mut self) {
        if let Some(user_id) = self.user_id.take() {
            self.registry.release(&user_id, self.handle.id());
        }
    }

    /// The user this socket acts for. A socket whose binding was taken over
    /// by a newer connection forgets its user and is refused.
    fn authenticated(&mut self, kind: &'static str) -> Result<String, ControlError> {
        let user_id = self
            .user_id
            .clone()
            .ok_or(ControlError::Unauthenticated(kind))?;
        if !self.registry.owns(&user_id, self.handle.id()) {
            self.user_id = None;
            return Err(ControlError::Superseded(user_id));
        }
        Ok(user_id)
    }

    fn reply(&self, message_type: MessageType, payload: Value) {
        if let Err(e) = self.handle.push(OutboundMessage::new(message_type, payload)) {
            debug!("Reply on connection {} dropped: {}", self.handle.id(), e);
        }
    }
}

/// A missing payload decodes like an empty object.
fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, ControlError> {
    let payload = match payload {
        Value::Null => json!({}),
        other => other,
    };
    Ok(serde_json::from_value(payload)?)
}

fn handle_auth(state: &mut SocketState, payload: Value) -> Result<(), ControlError> {
    let auth: AuthPayload = decode(payload)?;

    if let Some(previous) = state.user_id.take() {
        if previous != auth.user_id {
            state.registry.release(&previous, state.handle.id());
        }
    }

    let online = state
        .registry
        .authenticate(state.handle.clone(), &auth.user_id, auth.role, auth.stand_id);
    state.user_id = Some(auth.user_id);
    state.reply(
        MessageType::AuthSuccess,
        json!({ "connected": true, "onlineUsers": online }),
    );
    Ok(())
}

fn handle_ping(state: &mut SocketState, _payload: Value) -> Result<(), ControlError> {
    state.handle.mark_alive();
    state.reply(MessageType::Pong, json!({}));
    Ok(())
}

fn handle_presence_update(state: &mut SocketState, payload: Value) -> Result<(), ControlError> {
    let presence: PresencePayload = decode(payload)?;
    let user_id = state.authenticated("presence_update")?;
    if !state
        .registry
        .update_presence(&user_id, state.handle.id(), presence.stand_id)
    {
        return Err(ControlError::Superseded(user_id));
    }
    Ok(())
}

fn handle_typing(state: &mut SocketState, payload: Value) -> Result<(), ControlError> {
    let typing: TypingPayload = decode(payload)?;
    let user_id = state.authenticated("typing")?;
    let message = OutboundMessage::new(
        MessageType::Typing,
        json!({ "conversationId": typing.conversation_id, "userId": &user_id }),
    );
    state
        .registry
        .broadcast(&message, &BroadcastFilter::everyone().excluding(user_id));
    Ok(())
}
