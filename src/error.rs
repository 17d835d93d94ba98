use thiserror::Error;
use uuid::Uuid;

use crate::models::{EmergencyAlert, UnknownVariant};

/// Errors raised by an `IncidentStore` implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value no longer decodes into the model
    #[error("corrupt row: {0}")]
    Corrupt(#[from] UnknownVariant),
}

/// Errors surfaced to whoever drives an alert transition.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert not found: {0}")]
    NotFound(Uuid),

    #[error("invalid request: {0}")]
    Validation(String),

    /// The action is not allowed from the alert's current state. Carries that
    /// state so the caller can reconcile.
    #[error("cannot {action} alert {} in status {}", .current.id, .current.status)]
    InvalidTransition {
        action: &'static str,
        current: Box<EmergencyAlert>,
    },

    /// Another writer changed the alert between read and write; refetch and retry.
    #[error("stale write on alert {0}")]
    StaleWrite(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AlertError {
    pub fn invalid(action: &'static str, current: &EmergencyAlert) -> Self {
        AlertError::InvalidTransition {
            action,
            current: Box::new(current.clone()),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AlertError::Validation(msg.into())
    }
}

/// Why a push to one connection did not land. Expected under normal
/// operation; callers log and move on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("user {0} is not connected")]
    NotConnected(String),

    #[error("outbound queue full")]
    Backpressure,

    #[error("connection closed")]
    ChannelClosed,
}

/// Problems with an inbound control message. The message is dropped, the
/// connection stays up.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("malformed control message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown control message type '{0}'")]
    UnknownType(String),

    #[error("'{0}' requires an authenticated connection")]
    Unauthenticated(&'static str),

    /// A newer connection took over the user; this one only awaits its close.
    #[error("connection no longer holds user {0}")]
    Superseded(String),
}
