//! In-memory `IncidentStore`, same semantics as the Postgres one.
//!
//! Used by tests and when the service runs without a database.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::IncidentStore;
use crate::error::StoreError;
use crate::models::{
    AlertNotification, EmergencyAlert, EscalationEvent, Precondition, ResponderRecord, Role,
};

#[derive(Debug, Default)]
pub struct InMemoryIncidentStore {
    alerts: RwLock<HashMap<Uuid, EmergencyAlert>>,
    escalations: RwLock<Vec<EscalationEvent>>,
    notifications: RwLock<Vec<AlertNotification>>,
    users: RwLock<BTreeMap<String, Role>>,
    responders: RwLock<BTreeMap<String, ResponderRecord>>,
}

impl InMemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a staff user so role lookups can find them.
    pub fn add_user(&self, user_id: impl Into<String>, role: Role) {
        self.users.write().insert(user_id.into(), role);
    }

    pub fn escalation_count(&self) -> usize {
        self.escalations.read().len()
    }

    fn stamp<F>(&self, alert_id: Uuid, user_id: &str, mut apply: F) -> u64
    where
        F: FnMut(&mut AlertNotification) -> bool,
    {
        let mut rows = self.notifications.write();
        rows.iter_mut()
            .filter(|n| n.alert_id == alert_id && n.user_id == user_id)
            .map(|n| apply(n) as u64)
            .sum()
    }
}

fn by_urgency(alerts: &mut [EmergencyAlert]) {
    alerts.sort_by(|a, b| {
        b.escalation_level
            .cmp(&a.escalation_level)
            .then(a.created_at.cmp(&b.created_at))
    });
}

#[async_trait]
impl IncidentStore for InMemoryIncidentStore {
    async fn insert_alert(&self, alert: &EmergencyAlert) -> Result<(), StoreError> {
        self.alerts.write().insert(alert.id, alert.clone());
        Ok(())
    }

    async fn get_alert(&self, id: Uuid) -> Result<Option<EmergencyAlert>, StoreError> {
        Ok(self.alerts.read().get(&id).cloned())
    }

    async fn update_alert(
        &self,
        alert: &EmergencyAlert,
        expected: &Precondition,
    ) -> Result<bool, StoreError> {
        let mut alerts = self.alerts.write();
        match alerts.get_mut(&alert.id) {
            Some(stored) if stored.satisfies(expected) => {
                *stored = alert.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn escalate_alert(
        &self,
        alert: &EmergencyAlert,
        expected: &Precondition,
        event: &EscalationEvent,
    ) -> Result<bool, StoreError> {
        // Both locks held so the check, the write and the append are one step.
        let mut alerts = self.alerts.write();
        let mut escalations = self.escalations.write();
        match alerts.get_mut(&alert.id) {
            Some(stored) if stored.satisfies(expected) => {
                *stored = alert.clone();
                escalations.push(event.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_open_auto_escalating(&self) -> Result<Vec<EmergencyAlert>, StoreError> {
        let mut open: Vec<_> = self
            .alerts
            .read()
            .values()
            .filter(|a| a.status.is_open() && a.auto_escalate)
            .cloned()
            .collect();
        open.sort_by_key(|a| a.created_at);
        Ok(open)
    }

    async fn list_active_alerts(&self) -> Result<Vec<EmergencyAlert>, StoreError> {
        let mut active: Vec<_> = self
            .alerts
            .read()
            .values()
            .filter(|a| a.status.is_open())
            .cloned()
            .collect();
        by_urgency(&mut active);
        Ok(active)
    }

    async fn escalation_history(&self, alert_id: Uuid) -> Result<Vec<EscalationEvent>, StoreError> {
        Ok(self
            .escalations
            .read()
            .iter()
            .filter(|e| e.alert_id == alert_id)
            .cloned()
            .collect())
    }

    async fn insert_notifications(&self, rows: &[AlertNotification]) -> Result<(), StoreError> {
        self.notifications.write().extend_from_slice(rows);
        Ok(())
    }

    async fn notifications_for_alert(
        &self,
        alert_id: Uuid,
    ) -> Result<Vec<AlertNotification>, StoreError> {
        Ok(self
            .notifications
            .read()
            .iter()
            .filter(|n| n.alert_id == alert_id)
            .cloned()
            .collect())
    }

    async fn unread_notifications(
        &self,
        user_id: &str,
    ) -> Result<Vec<AlertNotification>, StoreError> {
        Ok(self
            .notifications
            .read()
            .iter()
            .filter(|n| n.user_id == user_id && n.read_at.is_none())
            .cloned()
            .collect())
    }

    async fn mark_notification_read(
        &self,
        alert_id: Uuid,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self.stamp(alert_id, user_id, |n| {
            if n.read_at.is_some() {
                return false;
            }
            n.read_at = Some(at);
            true
        }))
    }

    async fn mark_notification_responded(
        &self,
        alert_id: Uuid,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self.stamp(alert_id, user_id, |n| {
            if n.responded_at.is_some() {
                return false;
            }
            n.responded_at = Some(at);
            n.read_at.get_or_insert(at);
            true
        }))
    }

    async fn users_with_roles(&self, roles: &[Role]) -> Result<Vec<String>, StoreError> {
        Ok(self
            .users
            .read()
            .iter()
            .filter(|(_, role)| roles.contains(role))
            .map(|(user_id, _)| user_id.clone())
            .collect())
    }

    async fn list_responders(&self) -> Result<Vec<ResponderRecord>, StoreError> {
        Ok(self.responders.read().values().cloned().collect())
    }

    async fn upsert_responder(&self, record: &ResponderRecord) -> Result<(), StoreError> {
        self.responders
            .write()
            .insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn set_responder_on_duty(
        &self,
        user_id: &str,
        on_duty: bool,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut responders = self.responders.write();
        let Some(record) = responders.get_mut(user_id) else {
            return Ok(false);
        };
        record.is_on_duty = on_duty;
        record.updated_at = at;
        Ok(true)
    }

    async fn set_responder_location(
        &self,
        user_id: &str,
        location: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut responders = self.responders.write();
        let Some(record) = responders.get_mut(user_id) else {
            return Ok(false);
        };
        record.location = location.map(str::to_string);
        record.updated_at = at;
        Ok(true)
    }
}
