//! The alert state machine as a pure function over the current record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AlertError;
use crate::models::{AlertStatus, EmergencyAlert, EscalationLevel, ResolutionType};

/// Operator or scheduler request against an existing alert.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertAction {
    Acknowledge {
        user_id: String,
    },
    Assign {
        responder_id: String,
        eta_minutes: Option<i32>,
    },
    Arrive,
    Stabilize,
    Resolve {
        user_id: String,
        notes: Option<String>,
        resolution_type: ResolutionType,
    },
    Escalate {
        to_level: EscalationLevel,
    },
}

impl AlertAction {
    pub fn name(&self) -> &'static str {
        match self {
            AlertAction::Acknowledge { .. } => "acknowledge",
            AlertAction::Assign { .. } => "assign",
            AlertAction::Arrive => "arrive",
            AlertAction::Stabilize => "stabilize",
            AlertAction::Resolve { .. } => "resolve",
            AlertAction::Escalate { .. } => "escalate",
        }
    }
}

/// Tag carried by every `emergency_alert` push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertTransition {
    Created,
    Acknowledged,
    Dispatched,
    OnScene,
    Stabilized,
    Resolved,
    /// Level increment layered over the operational status, which is unchanged.
    Escalated,
}

/// Compute the record that results from `action`, or reject it.
///
/// The returned alert has `version` bumped and `updated_at` set to `now`; the
/// input is never modified.
pub fn apply(
    alert: &EmergencyAlert,
    action: &AlertAction,
    now: DateTime<Utc>,
) -> Result<(EmergencyAlert, AlertTransition), AlertError> {
    let reject = || AlertError::invalid(action.name(), alert);
    if !alert.status.is_open() {
        return Err(reject());
    }

    let mut next = alert.clone();
    let transition = match action {
        AlertAction::Acknowledge { user_id } => {
            if alert.status != AlertStatus::Reported || alert.acknowledged_at.is_some() {
                return Err(reject());
            }
            next.acknowledged_by = Some(user_id.clone());
            next.acknowledged_at = Some(now);
            AlertTransition::Acknowledged
        }
        AlertAction::Assign {
            responder_id,
            eta_minutes,
        } => {
            if alert.status != AlertStatus::Reported {
                return Err(reject());
            }
            next.status = AlertStatus::Dispatched;
            next.assigned_responder_id = Some(responder_id.clone());
            next.assigned_at = Some(now);
            next.responder_eta = *eta_minutes;
            AlertTransition::Dispatched
        }
        AlertAction::Arrive => {
            if alert.status != AlertStatus::Dispatched {
                return Err(reject());
            }
            next.status = AlertStatus::OnScene;
            next.arrived_at = Some(now);
            AlertTransition::OnScene
        }
        AlertAction::Stabilize => {
            if alert.status != AlertStatus::OnScene {
                return Err(reject());
            }
            next.status = AlertStatus::Stabilized;
            next.stabilized_at = Some(now);
            AlertTransition::Stabilized
        }
        AlertAction::Resolve {
            user_id,
            notes,
            resolution_type,
        } => {
            // Nobody was dispatched: only a false alarm or duplicate can close it.
            if alert.status == AlertStatus::Reported && !resolution_type.closes_unworked_alert() {
                return Err(reject());
            }
            next.status = AlertStatus::Resolved;
            next.resolved_by = Some(user_id.clone());
            next.resolved_at = Some(now);
            next.resolution_notes = notes.clone();
            next.resolution_type = Some(*resolution_type);
            AlertTransition::Resolved
        }
        AlertAction::Escalate { to_level } => {
            if *to_level <= alert.escalation_level {
                return Err(reject());
            }
            next.escalation_level = *to_level;
            next.last_escalated_at = Some(now);
            AlertTransition::Escalated
        }
    };

    next.updated_at = now;
    next.version = alert.version + 1;
    Ok((next, transition))
}
