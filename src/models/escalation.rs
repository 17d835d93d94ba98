use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::alert::EscalationLevel;
use super::text_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    AutoTimeout,
    Manual,
    SeverityIncrease,
}

text_enum!(EscalationReason {
    AutoTimeout => "auto_timeout",
    Manual => "manual",
    SeverityIncrease => "severity_increase",
});

/// Append-only record of one level change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationEvent {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub from_level: EscalationLevel,
    pub to_level: EscalationLevel,
    pub reason: EscalationReason,
    /// `None` when the escalation scheduler triggered it.
    pub escalated_by: Option<String>,
    pub notified_user_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}
