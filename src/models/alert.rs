use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::text_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Medical,
    Security,
    Fire,
    Equipment,
    Weather,
    Crowd,
    Other,
}

text_enum!(AlertType {
    Medical => "medical",
    Security => "security",
    Fire => "fire",
    Equipment => "equipment",
    Weather => "weather",
    Crowd => "crowd",
    Other => "other",
});

impl AlertType {
    /// Default SLA target in minutes, applied when a report does not set one.
    pub fn default_sla_minutes(&self) -> i32 {
        match self {
            AlertType::Fire => 2,
            AlertType::Medical => 3,
            AlertType::Security => 5,
            AlertType::Crowd => 5,
            AlertType::Weather => 10,
            AlertType::Equipment => 15,
            AlertType::Other => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Reported,
    Dispatched,
    OnScene,
    Stabilized,
    Resolved,
}

text_enum!(AlertStatus {
    Reported => "reported",
    Dispatched => "dispatched",
    OnScene => "on_scene",
    Stabilized => "stabilized",
    Resolved => "resolved",
});

impl AlertStatus {
    pub fn is_open(&self) -> bool {
        !matches!(self, AlertStatus::Resolved)
    }
}

/// Organisational tier responsible for an alert. Ordered, so `<` compares tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    Level1 = 1,
    Level2 = 2,
    Level3 = 3,
    Level4 = 4,
}

impl EscalationLevel {
    pub const CEILING: EscalationLevel = EscalationLevel::Level4;

    pub fn next(&self) -> Option<EscalationLevel> {
        match self {
            EscalationLevel::Level1 => Some(EscalationLevel::Level2),
            EscalationLevel::Level2 => Some(EscalationLevel::Level3),
            EscalationLevel::Level3 => Some(EscalationLevel::Level4),
            EscalationLevel::Level4 => None,
        }
    }

    pub fn as_i16(&self) -> i16 {
        *self as i16
    }
}

impl TryFrom<i16> for EscalationLevel {
    type Error = super::UnknownVariant;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(EscalationLevel::Level1),
            2 => Ok(EscalationLevel::Level2),
            3 => Ok(EscalationLevel::Level3),
            4 => Ok(EscalationLevel::Level4),
            other => Err(super::UnknownVariant {
                kind: "EscalationLevel",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    Handled,
    Transferred,
    FalseAlarm,
    Duplicate,
}

text_enum!(ResolutionType {
    Handled => "handled",
    Transferred => "transferred",
    FalseAlarm => "false_alarm",
    Duplicate => "duplicate",
});

impl ResolutionType {
    /// Resolutions allowed straight from `Reported`, before anyone was dispatched.
    pub fn closes_unworked_alert(&self) -> bool {
        matches!(self, ResolutionType::FalseAlarm | ResolutionType::Duplicate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAlert {
    pub id: Uuid,
    pub reporter_id: String,
    pub stand_id: Option<String>,
    pub location: Option<String>,
    pub alert_type: AlertType,
    pub title: String,
    pub description: String,
    pub status: AlertStatus,
    pub escalation_level: EscalationLevel,
    pub sla_target_minutes: i32,
    pub last_escalated_at: Option<DateTime<Utc>>,
    pub auto_escalate: bool,
    pub assigned_responder_id: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    /// Minutes until the assigned responder expects to arrive.
    pub responder_eta: Option<i32>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub stabilized_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub resolution_type: Option<ResolutionType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every write; part of the optimistic precondition.
    pub version: i64,
}

/// Input for creating an alert.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub reporter_id: String,
    pub stand_id: Option<String>,
    pub alert_type: AlertType,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub sla_target_minutes: Option<i32>,
    pub auto_escalate: Option<bool>,
}

/// Snapshot of the fields a conditional write must still find unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    pub status: AlertStatus,
    pub escalation_level: EscalationLevel,
    pub last_escalated_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl EmergencyAlert {
    pub fn new(input: NewAlert, now: DateTime<Utc>) -> Self {
        let sla_target_minutes = input
            .sla_target_minutes
            .unwrap_or_else(|| input.alert_type.default_sla_minutes());

        Self {
            id: Uuid::new_v4(),
            reporter_id: input.reporter_id,
            stand_id: input.stand_id,
            location: input.location,
            alert_type: input.alert_type,
            title: input.title,
            description: input.description,
            status: AlertStatus::Reported,
            escalation_level: EscalationLevel::Level1,
            sla_target_minutes,
            last_escalated_at: None,
            auto_escalate: input.auto_escalate.unwrap_or(true),
            assigned_responder_id: None,
            assigned_at: None,
            responder_eta: None,
            acknowledged_by: None,
            acknowledged_at: None,
            arrived_at: None,
            stabilized_at: None,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
            resolution_type: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn precondition(&self) -> Precondition {
        Precondition {
            status: self.status,
            escalation_level: self.escalation_level,
            last_escalated_at: self.last_escalated_at,
            version: self.version,
        }
    }

    pub fn satisfies(&self, expected: &Precondition) -> bool {
        self.precondition() == *expected
    }

    /// Start of the current escalation window.
    pub fn escalation_anchor(&self) -> DateTime<Utc> {
        match self.last_escalated_at {
            Some(at) if at > self.created_at => at,
            _ => self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(alert_type: AlertType) -> NewAlert {
        NewAlert {
            reporter_id: "u-reporter".to_string(),
            stand_id: Some("stand-12".to_string()),
            alert_type,
            title: "Guest collapsed".to_string(),
            description: "Section 112, row F".to_string(),
            location: None,
            sla_target_minutes: None,
            auto_escalate: None,
        }
    }

    #[test]
    fn new_alert_uses_type_defaults() {
        let now = Utc::now();
        let alert = EmergencyAlert::new(report(AlertType::Fire), now);
        assert_eq!(alert.status, AlertStatus::Reported);
        assert_eq!(alert.escalation_level, EscalationLevel::Level1);
        assert_eq!(alert.sla_target_minutes, 2);
        assert!(alert.auto_escalate);
        assert_eq!(alert.escalation_anchor(), now);
    }

    #[test]
    fn levels_are_ordered_and_capped() {
        assert!(EscalationLevel::Level1 < EscalationLevel::Level2);
        assert_eq!(EscalationLevel::Level3.next(), Some(EscalationLevel::Level4));
        assert_eq!(EscalationLevel::Level4.next(), None);
        assert_eq!(EscalationLevel::try_from(2i16), Ok(EscalationLevel::Level2));
        assert!(EscalationLevel::try_from(5i16).is_err());
    }

    #[test]
    fn alert_serializes_with_contract_field_names() {
        let alert = EmergencyAlert::new(report(AlertType::Medical), Utc::now());
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["alertType"], "medical");
        assert_eq!(value["status"], "reported");
        assert_eq!(value["escalationLevel"], "level1");
        assert_eq!(value["slaTargetMinutes"], 3);
        assert_eq!(value["autoEscalate"], true);
    }
}
