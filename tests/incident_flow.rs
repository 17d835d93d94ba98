use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use stadium_incidents::alerts::{
    AlertManager, EscalationScheduler, NotificationRouter, ResponderDirectory,
};
use stadium_incidents::db::{IncidentStore, InMemoryIncidentStore};
use stadium_incidents::hub::{ConnectionHandle, ConnectionRegistry, Outbound};
use stadium_incidents::models::{
    AlertStatus, AlertType, EmergencyAlert, EscalationLevel, EscalationReason, MessageType,
    NewAlert, ResolutionType, ResponderRecord, Role,
};
use tokio::sync::mpsc::Receiver;

struct Venue {
    store: Arc<InMemoryIncidentStore>,
    registry: ConnectionRegistry,
    directory: Arc<ResponderDirectory>,
    manager: AlertManager,
    scheduler: EscalationScheduler,
}

fn venue() -> Venue {
    let store = Arc::new(InMemoryIncidentStore::new());
    let registry = ConnectionRegistry::new();
    let directory = Arc::new(ResponderDirectory::new(store.clone()));
    let router = NotificationRouter::new(store.clone(), registry.clone(), directory.clone());
    let manager = AlertManager::new(store.clone(), router);
    let scheduler = EscalationScheduler::new(manager.clone());
    Venue {
        store,
        registry,
        directory,
        manager,
        scheduler,
    }
}

fn responder(user_id: &str, on_duty: bool, types: &[AlertType]) -> ResponderRecord {
    ResponderRecord {
        user_id: user_id.to_string(),
        responder_type: "first_aid".to_string(),
        is_on_duty: on_duty,
        location: None,
        can_respond_to: types.to_vec(),
        updated_at: Utc::now(),
    }
}

fn connect(venue: &Venue, user_id: &str, role: Role) -> Receiver<Outbound> {
    let (handle, rx) = ConnectionHandle::new(32);
    venue.registry.authenticate(handle, user_id, role, None);
    rx
}

fn emergency_pushes(rx: &mut Receiver<Outbound>) -> usize {
    let mut count = 0;
    while let Ok(item) = rx.try_recv() {
        if matches!(item, Outbound::Message(ref m) if m.message_type == MessageType::EmergencyAlert) {
            count += 1;
        }
    }
    count
}

fn report(alert_type: AlertType, sla: Option<i32>) -> NewAlert {
    NewAlert {
        reporter_id: "vendor-22".to_string(),
        stand_id: Some("stand-118".to_string()),
        alert_type,
        title: "Guest collapsed".to_string(),
        description: "Guest collapsed in line, breathing".to_string(),
        location: Some("Section 118 concourse".to_string()),
        sla_target_minutes: sla,
        auto_escalate: Some(true),
    }
}

fn at(alert: &EmergencyAlert, minutes: i64) -> DateTime<Utc> {
    alert.created_at + Duration::minutes(minutes)
}

#[tokio::test]
async fn medical_alert_notifies_eligible_responders_and_supervisors_only() {
    let v = venue();
    for (user, role) in [
        ("lead-1", Role::StandLead),
        ("super-1", Role::Supervisor),
        ("ops-1", Role::OperationsManager),
        ("exec-1", Role::Executive),
        ("vendor-22", Role::Staff),
    ] {
        v.store.add_user(user, role);
    }
    v.directory
        .upsert(responder("emt-1", true, &[AlertType::Medical]))
        .await
        .unwrap();
    v.directory
        .upsert(responder("emt-2", true, &[AlertType::Medical, AlertType::Fire]))
        .await
        .unwrap();
    v.directory
        .upsert(responder("emt-off", false, &[AlertType::Medical]))
        .await
        .unwrap();
    v.directory
        .upsert(responder("guard-1", true, &[AlertType::Security]))
        .await
        .unwrap();

    let mut lead = connect(&v, "lead-1", Role::StandLead);
    let mut ops = connect(&v, "ops-1", Role::OperationsManager);
    let mut emt = connect(&v, "emt-1", Role::Responder);
    let mut exec = connect(&v, "exec-1", Role::Executive);
    let mut guard = connect(&v, "guard-1", Role::Responder);

    let alert = v.manager.create(report(AlertType::Medical, None)).await.unwrap();

    let notified: BTreeSet<String> = v
        .store
        .notifications_for_alert(alert.id)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.user_id)
        .collect();
    let expected: BTreeSet<String> = ["emt-1", "emt-2", "lead-1", "ops-1", "super-1"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(notified, expected);

    assert_eq!(emergency_pushes(&mut lead), 1);
    assert_eq!(emergency_pushes(&mut ops), 1);
    assert_eq!(emergency_pushes(&mut emt), 1);
    assert_eq!(emergency_pushes(&mut exec), 0);
    assert_eq!(emergency_pushes(&mut guard), 0);

    // Offline recipients pick it up through the unread query.
    let unread = v.manager.unread_notifications("emt-2").await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].alert_id, alert.id);
}

#[tokio::test]
async fn repeated_sweeps_record_a_single_escalation() {
    let v = venue();
    v.store.add_user("dept-1", Role::DepartmentManager);
    let alert = v
        .manager
        .create(report(AlertType::Equipment, Some(5)))
        .await
        .unwrap();
    let now = at(&alert, 6);

    let first = v.scheduler.sweep(now).await.unwrap();
    let second = v.scheduler.sweep(now).await.unwrap();

    assert_eq!(first.escalated, vec![alert.id]);
    assert!(second.escalated.is_empty());
    assert_eq!(v.store.escalation_history(alert.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unacknowledged_alert_escalates_then_leaves_the_sweep_once_resolved() {
    let v = venue();
    v.store.add_user("lead-1", Role::StandLead);
    v.store.add_user("dept-1", Role::DepartmentManager);
    let mut dept = connect(&v, "dept-1", Role::DepartmentManager);

    let alert = v
        .manager
        .create(report(AlertType::Medical, Some(5)))
        .await
        .unwrap();
    assert_eq!(alert.escalation_level, EscalationLevel::Level1);
    assert!(alert.auto_escalate);
    // Department managers are supervisory and hear about new alerts.
    assert_eq!(emergency_pushes(&mut dept), 1);

    // t = 6 min, nobody acknowledged.
    let report = v.scheduler.sweep(at(&alert, 6)).await.unwrap();
    assert_eq!(report.escalated, vec![alert.id]);

    let escalated = v.manager.get(alert.id).await.unwrap();
    assert_eq!(escalated.escalation_level, EscalationLevel::Level2);
    assert_eq!(escalated.status, AlertStatus::Reported);
    assert_eq!(emergency_pushes(&mut dept), 1);

    let history = v.manager.escalation_history(alert.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_level, EscalationLevel::Level1);
    assert_eq!(history[0].to_level, EscalationLevel::Level2);
    assert_eq!(history[0].reason, EscalationReason::AutoTimeout);
    assert_eq!(history[0].notified_user_ids, vec!["dept-1".to_string()]);

    // t = 10 min, a supervisor closes it out.
    let resolved = v
        .manager
        .resolve(
            alert.id,
            "lead-1",
            Some("Duplicate of the section 118 call".to_string()),
            ResolutionType::Duplicate,
        )
        .await
        .unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);

    let later = v.scheduler.sweep(at(&alert, 60)).await.unwrap();
    assert_eq!(later.examined, 0);
    assert!(v
        .manager
        .alerts_needing_escalation(at(&alert, 60))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(v.manager.escalation_history(alert.id).await.unwrap().len(), 1);
    assert!(v.manager.active_alerts().await.unwrap().is_empty());
}
