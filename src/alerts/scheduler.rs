use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::lifecycle::AlertManager;
use crate::error::AlertError;
use crate::models::{EmergencyAlert, EscalationLevel, EscalationReason};

/// An alert is overdue when it is still open, opted into auto escalation,
/// below the top level, and its current window is older than the SLA.
pub fn is_overdue(alert: &EmergencyAlert, now: DateTime<Utc>) -> bool {
    alert.status.is_open()
        && alert.auto_escalate
        && alert.escalation_level < EscalationLevel::CEILING
        && now - alert.escalation_anchor() > chrono::Duration::minutes(alert.sla_target_minutes as i64)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub escalated: Vec<Uuid>,
    /// Lost a race with another writer; the next sweep re-reads.
    pub skipped: usize,
    pub failed: usize,
}

/// Periodically escalates alerts that sat past their SLA.
#[derive(Clone)]
pub struct EscalationScheduler {
    manager: AlertManager,
}

impl EscalationScheduler {
    pub fn new(manager: AlertManager) -> Self {
        Self { manager }
    }

    /// One pass over the open alerts as of `now`. Each overdue alert moves up
    /// a single level; overlapping passes produce at most one escalation per
    /// alert window because the write is conditional on the state read here.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, AlertError> {
        let due = self.manager.alerts_needing_escalation(now).await?;
        let mut report = SweepReport {
            examined: due.len(),
            ..Default::default()
        };

        for alert in due {
            let Some(next) = alert.escalation_level.next() else {
                continue;
            };
            match self
                .manager
                .escalate_from(&alert, next, EscalationReason::AutoTimeout, None, now)
                .await
            {
                Ok(_) => report.escalated.push(alert.id),
                Err(AlertError::StaleWrite(_)) | Err(AlertError::InvalidTransition { .. }) => {
                    debug!("Alert {} changed under the sweep, skipping", alert.id);
                    report.skipped += 1;
                }
                Err(e) => {
                    error!("Auto escalation of alert {} failed: {}", alert.id, e);
                    report.failed += 1;
                }
            }
        }

        if !report.escalated.is_empty() {
            info!(
                "Escalation sweep: {} overdue, {} escalated",
                report.examined,
                report.escalated.len()
            );
        }
        Ok(report)
    }

    pub async fn run(self, period: Duration, shutdown: CancellationToken) {
        info!("Escalation scheduler running every {:?}", period);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Escalation scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep(Utc::now()).await {
                        error!("Escalation sweep failed: {}", e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::alerts::directory::ResponderDirectory;
    use crate::alerts::router::NotificationRouter;
    use crate::db::{IncidentStore, InMemoryIncidentStore};
    use crate::hub::ConnectionRegistry;
    use crate::models::{AlertStatus, AlertType, NewAlert, ResolutionType, Role};

    fn scheduler() -> (EscalationScheduler, AlertManager, Arc<InMemoryIncidentStore>) {
        let store = Arc::new(InMemoryIncidentStore::new());
        store.add_user("dept-1", Role::DepartmentManager);
        let directory = Arc::new(ResponderDirectory::new(store.clone()));
        let router = NotificationRouter::new(store.clone(), ConnectionRegistry::new(), directory);
        let manager = AlertManager::new(store.clone(), router);
        (EscalationScheduler::new(manager.clone()), manager, store)
    }

    fn fire() -> NewAlert {
        NewAlert {
            reporter_id: "cook-3".to_string(),
            stand_id: Some("stand-1".to_string()),
            alert_type: AlertType::Fire,
            title: "Fryer flare-up".to_string(),
            description: "Flames above the hood".to_string(),
            location: None,
            sla_target_minutes: None,
            auto_escalate: None,
        }
    }

    fn minutes_later(alert: &EmergencyAlert, minutes: i64) -> DateTime<Utc> {
        alert.created_at + chrono::Duration::minutes(minutes)
    }

    #[tokio::test]
    async fn overdue_alert_climbs_one_level_per_window() {
        let (scheduler, manager, _) = scheduler();
        let alert = manager.create(fire()).await.unwrap();

        // Fire SLA is two minutes.
        let early = scheduler.sweep(minutes_later(&alert, 1)).await.unwrap();
        assert!(early.escalated.is_empty());

        let now = minutes_later(&alert, 3);
        let report = scheduler.sweep(now).await.unwrap();
        assert_eq!(report.escalated, vec![alert.id]);
        let escalated = manager.get(alert.id).await.unwrap();
        assert_eq!(escalated.escalation_level, EscalationLevel::Level2);
        assert_eq!(escalated.last_escalated_at, Some(now));

        // The window restarts from the escalation.
        let again = scheduler.sweep(now + chrono::Duration::minutes(1)).await.unwrap();
        assert!(again.escalated.is_empty());
    }

    #[tokio::test]
    async fn overlapping_sweeps_escalate_once() {
        let (scheduler, manager, store) = scheduler();
        let alert = manager.create(fire()).await.unwrap();
        let now = minutes_later(&alert, 5);

        let other = scheduler.clone();
        let (a, b) = tokio::join!(scheduler.sweep(now), other.sweep(now));
        let escalated = a.unwrap().escalated.len() + b.unwrap().escalated.len();

        assert_eq!(escalated, 1);
        assert_eq!(store.escalation_count(), 1);
        assert_eq!(
            manager.get(alert.id).await.unwrap().escalation_level,
            EscalationLevel::Level2
        );
    }

    #[tokio::test]
    async fn top_level_is_a_ceiling() {
        let (scheduler, manager, _) = scheduler();
        let alert = manager.create(fire()).await.unwrap();
        manager
            .escalate(alert.id, EscalationLevel::Level4, EscalationReason::SeverityIncrease, None)
            .await
            .unwrap();

        let report = scheduler
            .sweep(minutes_later(&alert, 600))
            .await
            .unwrap();
        assert_eq!(report.examined, 0);
        assert_eq!(
            manager.get(alert.id).await.unwrap().escalation_level,
            EscalationLevel::Level4
        );
    }

    #[tokio::test]
    async fn resolved_and_opted_out_alerts_are_left_alone() {
        let (scheduler, manager, store) = scheduler();
        let resolved = manager.create(fire()).await.unwrap();
        manager
            .resolve(resolved.id, "lead-1", None, ResolutionType::FalseAlarm)
            .await
            .unwrap();

        let mut manual = fire();
        manual.auto_escalate = Some(false);
        let manual = manager.create(manual).await.unwrap();

        let report = scheduler
            .sweep(minutes_later(&manual, 60))
            .await
            .unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(store.escalation_count(), 0);
        assert_eq!(
            manager.get(resolved.id).await.unwrap().status,
            AlertStatus::Resolved
        );
    }

    #[test]
    fn overdue_check_uses_latest_escalation_as_anchor() {
        let created = Utc::now();
        let mut alert = EmergencyAlert::new(fire(), created);
        assert!(is_overdue(&alert, created + chrono::Duration::minutes(3)));

        alert.last_escalated_at = Some(created + chrono::Duration::minutes(2));
        alert.escalation_level = EscalationLevel::Level2;
        assert!(!is_overdue(&alert, created + chrono::Duration::minutes(3)));
        assert!(is_overdue(&alert, created + chrono::Duration::minutes(5)));
    }

    #[tokio::test]
    async fn store_is_shared_with_the_sweep() {
        let (scheduler, manager, store) = scheduler();
        let alert = manager.create(fire()).await.unwrap();
        scheduler.sweep(minutes_later(&alert, 3)).await.unwrap();

        let history = store.escalation_history(alert.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, EscalationReason::AutoTimeout);
        assert_eq!(history[0].escalated_by, None);
        assert_eq!(history[0].notified_user_ids, vec!["dept-1".to_string()]);
    }
}
