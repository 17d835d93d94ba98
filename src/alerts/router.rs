use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use super::directory::ResponderDirectory;
use super::transition::AlertTransition;
use crate::db::IncidentStore;
use crate::error::StoreError;
use crate::hub::{BroadcastFilter, ConnectionRegistry};
use crate::models::role::SUPERVISORY_ROLES;
use crate::models::{AlertNotification, EmergencyAlert, EscalationLevel, MessageType, OutboundMessage, Role};

/// Role tier responsible at each escalation level.
pub fn tier_roles(level: EscalationLevel) -> &'static [Role] {
    match level {
        EscalationLevel::Level1 => &[Role::StandLead, Role::Supervisor],
        EscalationLevel::Level2 => &[Role::DepartmentManager],
        EscalationLevel::Level3 => &[Role::OperationsManager],
        EscalationLevel::Level4 => &[Role::Executive, Role::External],
    }
}

/// Who hears about one transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Audience {
    /// Roles the tier segment was selected by; reapplied as a filter at push time.
    pub tier_roles: Vec<Role>,
    pub tier_users: BTreeSet<String>,
    /// Responders addressed by id regardless of role.
    pub individuals: BTreeSet<String>,
}

impl Audience {
    pub fn recipients(&self) -> Vec<String> {
        self.tier_users.union(&self.individuals).cloned().collect()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.tier_users.contains(user_id) || self.individuals.contains(user_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverySummary {
    pub recipients: usize,
    pub live_pushes: usize,
    pub failed_pushes: usize,
}

/// Maps alert transitions to recipients, records the durable trail, and
/// pushes through the connection registry.
#[derive(Clone)]
pub struct NotificationRouter {
    store: Arc<dyn IncidentStore>,
    registry: ConnectionRegistry,
    directory: Arc<ResponderDirectory>,
}

impl NotificationRouter {
    pub fn new(
        store: Arc<dyn IncidentStore>,
        registry: ConnectionRegistry,
        directory: Arc<ResponderDirectory>,
    ) -> Self {
        Self {
            store,
            registry,
            directory,
        }
    }

    pub async fn audience(
        &self,
        alert: &EmergencyAlert,
        transition: AlertTransition,
    ) -> Result<Audience, StoreError> {
        let mut roles: Vec<Role> = tier_roles(alert.escalation_level).to_vec();
        if transition == AlertTransition::Created {
            roles.extend_from_slice(SUPERVISORY_ROLES);
            roles.sort();
            roles.dedup();
        }

        let mut tier_users: BTreeSet<String> =
            self.store.users_with_roles(&roles).await?.into_iter().collect();
        tier_users.extend(self.registry.users_with_roles(&roles));

        let mut individuals = BTreeSet::new();
        if transition == AlertTransition::Created {
            individuals.extend(
                self.directory
                    .eligible_for(alert.alert_type)
                    .into_iter()
                    .map(|r| r.user_id),
            );
        }
        if let Some(responder) = &alert.assigned_responder_id {
            individuals.insert(responder.clone());
        }
        individuals.retain(|u| !tier_users.contains(u));

        Ok(Audience {
            tier_roles: roles,
            tier_users,
            individuals,
        })
    }

    /// Write one notification row per recipient, then push live. Recipients
    /// without a connection keep their row for pull-based sync.
    pub async fn deliver(
        &self,
        alert: &EmergencyAlert,
        transition: AlertTransition,
        audience: &Audience,
    ) -> Result<DeliverySummary, StoreError> {
        let now = Utc::now();
        let recipients = audience.recipients();
        let rows: Vec<AlertNotification> = recipients
            .iter()
            .map(|user_id| AlertNotification::in_app(alert.id, user_id.clone(), now))
            .collect();
        self.store.insert_notifications(&rows).await?;

        let message = OutboundMessage::new(
            MessageType::EmergencyAlert,
            json!({ "alert": alert, "transition": transition }),
        );

        let mut summary = DeliverySummary {
            recipients: recipients.len(),
            ..Default::default()
        };
        if !audience.tier_users.is_empty() {
            let filter = BroadcastFilter::everyone()
                .roles(audience.tier_roles.iter().copied())
                .users(audience.tier_users.iter().cloned());
            let report = self.registry.broadcast(&message, &filter);
            summary.live_pushes += report.delivered;
            summary.failed_pushes += report.failed;
        }
        if !audience.individuals.is_empty() {
            let filter = BroadcastFilter::everyone().users(audience.individuals.iter().cloned());
            let report = self.registry.broadcast(&message, &filter);
            summary.live_pushes += report.delivered;
            summary.failed_pushes += report.failed;
        }

        if !audience.contains(&alert.reporter_id) {
            let confirmation = OutboundMessage::new(
                MessageType::AlertConfirmation,
                json!({
                    "alertId": alert.id,
                    "status": alert.status,
                    "escalationLevel": alert.escalation_level,
                    "transition": transition,
                }),
            );
            if let Err(e) = self.registry.send(&alert.reporter_id, confirmation) {
                debug!("Reporter confirmation for alert {} not pushed: {}", alert.id, e);
            }
        }

        info!(
            "Alert {} {:?}: {} recipients, {} live pushes, {} failed",
            alert.id, transition, summary.recipients, summary.live_pushes, summary.failed_pushes
        );
        Ok(summary)
    }

    pub async fn notify(
        &self,
        alert: &EmergencyAlert,
        transition: AlertTransition,
    ) -> Result<DeliverySummary, StoreError> {
        let audience = self.audience(alert, transition).await?;
        self.deliver(alert, transition, &audience).await
    }
}
