use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::router::NotificationRouter;
use super::scheduler::is_overdue;
use super::transition::{apply, AlertAction, AlertTransition};
use crate::db::IncidentStore;
use crate::error::AlertError;
use crate::models::{
    AlertNotification, EmergencyAlert, EscalationEvent, EscalationLevel, EscalationReason,
    NewAlert, ResolutionType,
};

/// Owns every state change of an emergency alert.
///
/// Each change is read, checked against the transition table, and written
/// with a compare-and-swap on the state that was read. A concurrent writer
/// makes the later call fail with `StaleWrite` instead of overwriting.
#[derive(Clone)]
pub struct AlertManager {
    store: Arc<dyn IncidentStore>,
    router: NotificationRouter,
}

impl AlertManager {
    pub fn new(store: Arc<dyn IncidentStore>, router: NotificationRouter) -> Self {
        Self { store, router }
    }

    pub async fn create(&self, input: NewAlert) -> Result<EmergencyAlert, AlertError> {
        require("reporterId", &input.reporter_id)?;
        require("title", &input.title)?;
        require("description", &input.description)?;
        if matches!(input.sla_target_minutes, Some(minutes) if minutes <= 0) {
            return Err(AlertError::validation("slaTargetMinutes must be positive"));
        }

        let alert = EmergencyAlert::new(input, Utc::now());
        self.store.insert_alert(&alert).await?;
        info!(
            "Alert {} created: {} '{}' reported by {} (SLA {} min)",
            alert.id, alert.alert_type, alert.title, alert.reporter_id, alert.sla_target_minutes
        );

        self.publish(&alert, AlertTransition::Created).await;
        Ok(alert)
    }

    pub async fn get(&self, id: Uuid) -> Result<EmergencyAlert, AlertError> {
        self.store
            .get_alert(id)
            .await?
            .ok_or(AlertError::NotFound(id))
    }

    pub async fn acknowledge(&self, id: Uuid, user_id: &str) -> Result<EmergencyAlert, AlertError> {
        require("userId", user_id)?;
        self.transition(
            id,
            user_id,
            AlertAction::Acknowledge {
                user_id: user_id.to_string(),
            },
        )
        .await
    }

    pub async fn assign(
        &self,
        id: Uuid,
        responder_id: &str,
        eta_minutes: Option<i32>,
        acting_user_id: &str,
    ) -> Result<EmergencyAlert, AlertError> {
        require("responderId", responder_id)?;
        if matches!(eta_minutes, Some(eta) if eta < 0) {
            return Err(AlertError::validation("eta must not be negative"));
        }
        self.transition(
            id,
            acting_user_id,
            AlertAction::Assign {
                responder_id: responder_id.to_string(),
                eta_minutes,
            },
        )
        .await
    }

    pub async fn mark_arrived(&self, id: Uuid, acting_user_id: &str) -> Result<EmergencyAlert, AlertError> {
        self.transition(id, acting_user_id, AlertAction::Arrive).await
    }

    pub async fn mark_stabilized(
        &self,
        id: Uuid,
        acting_user_id: &str,
    ) -> Result<EmergencyAlert, AlertError> {
        self.transition(id, acting_user_id, AlertAction::Stabilize).await
    }

    pub async fn resolve(
        &self,
        id: Uuid,
        user_id: &str,
        notes: Option<String>,
        resolution_type: ResolutionType,
    ) -> Result<EmergencyAlert, AlertError> {
        require("userId", user_id)?;
        self.transition(
            id,
            user_id,
            AlertAction::Resolve {
                user_id: user_id.to_string(),
                notes,
                resolution_type,
            },
        )
        .await
    }

    /// Operator-driven escalation to `to_level`.
    pub async fn escalate(
        &self,
        id: Uuid,
        to_level: EscalationLevel,
        reason: EscalationReason,
        escalated_by: Option<String>,
    ) -> Result<EmergencyAlert, AlertError> {
        let current = self.get(id).await?;
        self.escalate_from(&current, to_level, reason, escalated_by, Utc::now())
            .await
    }

    /// Escalate from a previously read `snapshot`. Succeeds only if the stored
    /// alert still matches it, so two sweeps acting on the same read cannot
    /// both escalate.
    pub async fn escalate_from(
        &self,
        snapshot: &EmergencyAlert,
        to_level: EscalationLevel,
        reason: EscalationReason,
        escalated_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<EmergencyAlert, AlertError> {
        let (next, transition) = apply(snapshot, &AlertAction::Escalate { to_level }, now)?;
        let audience = self.router.audience(&next, transition).await?;

        let event = EscalationEvent {
            id: Uuid::new_v4(),
            alert_id: snapshot.id,
            from_level: snapshot.escalation_level,
            to_level,
            reason,
            escalated_by: escalated_by.clone(),
            notified_user_ids: audience.recipients(),
            created_at: now,
        };
        if !self
            .store
            .escalate_alert(&next, &snapshot.precondition(), &event)
            .await?
        {
            return Err(AlertError::StaleWrite(snapshot.id));
        }

        warn!(
            "Alert {} escalated {:?} -> {:?} ({}, by {})",
            next.id,
            event.from_level,
            event.to_level,
            reason,
            escalated_by.as_deref().unwrap_or("system")
        );

        if let Err(e) = self.router.deliver(&next, transition, &audience).await {
            error!("Failed to deliver escalation of alert {}: {}", next.id, e);
        }
        Ok(next)
    }

    /// Open, auto-escalating alerts whose current window exceeded the SLA.
    pub async fn alerts_needing_escalation(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<EmergencyAlert>, AlertError> {
        let open = self.store.list_open_auto_escalating().await?;
        Ok(open.into_iter().filter(|a| is_overdue(a, now)).collect())
    }

    pub async fn active_alerts(&self) -> Result<Vec<EmergencyAlert>, AlertError> {
        Ok(self.store.list_active_alerts().await?)
    }

    pub async fn escalation_history(&self, id: Uuid) -> Result<Vec<EscalationEvent>, AlertError> {
        self.get(id).await?;
        Ok(self.store.escalation_history(id).await?)
    }

    pub async fn notifications(&self, id: Uuid) -> Result<Vec<AlertNotification>, AlertError> {
        self.get(id).await?;
        Ok(self.store.notifications_for_alert(id).await?)
    }

    pub async fn unread_notifications(
        &self,
        user_id: &str,
    ) -> Result<Vec<AlertNotification>, AlertError> {
        Ok(self.store.unread_notifications(user_id).await?)
    }

    pub async fn mark_read(&self, id: Uuid, user_id: &str) -> Result<u64, AlertError> {
        require("userId", user_id)?;
        Ok(self.store.mark_notification_read(id, user_id, Utc::now()).await?)
    }

    pub async fn mark_responded(&self, id: Uuid, user_id: &str) -> Result<u64, AlertError> {
        require("userId", user_id)?;
        Ok(self
            .store
            .mark_notification_responded(id, user_id, Utc::now())
            .await?)
    }

    async fn transition(
        &self,
        id: Uuid,
        acting_user_id: &str,
        action: AlertAction,
    ) -> Result<EmergencyAlert, AlertError> {
        let current = self.get(id).await?;
        let (next, transition) = apply(&current, &action, Utc::now())?;

        if !self
            .store
            .update_alert(&next, &current.precondition())
            .await?
        {
            return Err(AlertError::StaleWrite(id));
        }
        info!(
            "Alert {} {} by {}: {} -> {}",
            id,
            action.name(),
            acting_user_id,
            current.status,
            next.status
        );

        self.publish(&next, transition).await;
        Ok(next)
    }

    /// Delivery problems never undo a committed transition.
    async fn publish(&self, alert: &EmergencyAlert, transition: AlertTransition) {
        if let Err(e) = self.router.notify(alert, transition).await {
            error!("Failed to notify {:?} of alert {}: {}", transition, alert.id, e);
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), AlertError> {
    if value.trim().is_empty() {
        return Err(AlertError::validation(format!("{} is required", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::directory::ResponderDirectory;
    use crate::db::InMemoryIncidentStore;
    use crate::hub::ConnectionRegistry;
    use crate::models::{AlertStatus, AlertType, Role};

    fn manager() -> (AlertManager, Arc<InMemoryIncidentStore>) {
        let store = Arc::new(InMemoryIncidentStore::new());
        store.add_user("lead-1", Role::StandLead);
        store.add_user("dept-1", Role::DepartmentManager);
        let directory = Arc::new(ResponderDirectory::new(store.clone()));
        let router = NotificationRouter::new(store.clone(), ConnectionRegistry::new(), directory);
        (AlertManager::new(store.clone(), router), store)
    }

    fn report() -> NewAlert {
        NewAlert {
            reporter_id: "cashier-4".to_string(),
            stand_id: Some("stand-9".to_string()),
            alert_type: AlertType::Security,
            title: "Unattended bag".to_string(),
            description: "Under the condiment station".to_string(),
            location: Some("Concourse A".to_string()),
            sla_target_minutes: None,
            auto_escalate: None,
        }
    }

    #[tokio::test]
    async fn create_validates_required_fields() {
        let (manager, _) = manager();
        let mut missing_title = report();
        missing_title.title = "  ".to_string();
        assert!(matches!(
            manager.create(missing_title).await,
            Err(AlertError::Validation(_))
        ));

        let mut bad_sla = report();
        bad_sla.sla_target_minutes = Some(0);
        assert!(matches!(manager.create(bad_sla).await, Err(AlertError::Validation(_))));
    }

    #[tokio::test]
    async fn rejected_transition_leaves_alert_unchanged() {
        let (manager, _) = manager();
        let alert = manager.create(report()).await.unwrap();

        let err = manager.mark_arrived(alert.id, "emt-1").await.unwrap_err();
        match err {
            AlertError::InvalidTransition { current, .. } => assert_eq!(*current, alert),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(manager.get(alert.id).await.unwrap(), alert);
    }

    #[tokio::test]
    async fn manual_escalation_records_event_with_notified_users() {
        let (manager, _) = manager();
        let alert = manager.create(report()).await.unwrap();

        let escalated = manager
            .escalate(
                alert.id,
                EscalationLevel::Level2,
                EscalationReason::Manual,
                Some("lead-1".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(escalated.escalation_level, EscalationLevel::Level2);
        assert_eq!(escalated.status, AlertStatus::Reported);

        let history = manager.escalation_history(alert.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, EscalationReason::Manual);
        assert_eq!(history[0].escalated_by.as_deref(), Some("lead-1"));
        assert_eq!(history[0].notified_user_ids, vec!["dept-1".to_string()]);
    }

    #[tokio::test]
    async fn stale_snapshot_cannot_escalate() {
        let (manager, store) = manager();
        let alert = manager.create(report()).await.unwrap();
        let now = Utc::now();

        manager
            .escalate_from(&alert, EscalationLevel::Level2, EscalationReason::AutoTimeout, None, now)
            .await
            .unwrap();
        let second = manager
            .escalate_from(&alert, EscalationLevel::Level2, EscalationReason::AutoTimeout, None, now)
            .await;

        assert!(matches!(second, Err(AlertError::StaleWrite(id)) if id == alert.id));
        assert_eq!(store.escalation_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_resolves_let_exactly_one_win() {
        let (manager, _) = manager();
        let alert = manager.create(report()).await.unwrap();
        manager.assign(alert.id, "sec-2", Some(3), "lead-1").await.unwrap();

        let a = manager.clone();
        let b = manager.clone();
        let (first, second) = tokio::join!(
            a.resolve(alert.id, "lead-1", None, ResolutionType::Handled),
            b.resolve(alert.id, "dept-1", None, ResolutionType::Handled),
        );

        let wins = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(wins, 1);
        let loser = if first.is_ok() { second } else { first };
        assert!(matches!(
            loser,
            Err(AlertError::StaleWrite(_)) | Err(AlertError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_alert_is_not_found() {
        let (manager, _) = manager();
        let id = Uuid::new_v4();
        assert!(matches!(manager.acknowledge(id, "lead-1").await, Err(AlertError::NotFound(x)) if x == id));
        assert!(matches!(manager.escalation_history(id).await, Err(AlertError::NotFound(_))));
    }
}
