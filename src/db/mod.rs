use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    AlertNotification, EmergencyAlert, EscalationEvent, Precondition, ResponderRecord, Role,
};

pub mod memory;
pub mod postgres;
pub mod queries;

pub use memory::InMemoryIncidentStore;
pub use postgres::PgIncidentStore;

pub type DbPool = Pool<Postgres>;

pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Durable side of the incident core: alerts, escalation log, notification
/// trail, and the staff/responder rows it reads.
///
/// Implementations must be safe under concurrent use. Conditional writes
/// return `Ok(false)` when the stored alert no longer matches `expected`.
#[async_trait]
pub trait IncidentStore: Send + Sync + 'static {
    async fn insert_alert(&self, alert: &EmergencyAlert) -> Result<(), StoreError>;

    async fn get_alert(&self, id: Uuid) -> Result<Option<EmergencyAlert>, StoreError>;

    /// Replace the stored alert if it still satisfies `expected`.
    async fn update_alert(
        &self,
        alert: &EmergencyAlert,
        expected: &Precondition,
    ) -> Result<bool, StoreError>;

    /// Conditional update plus escalation log append, atomically.
    async fn escalate_alert(
        &self,
        alert: &EmergencyAlert,
        expected: &Precondition,
        event: &EscalationEvent,
    ) -> Result<bool, StoreError>;

    /// Unresolved alerts with `auto_escalate` set.
    async fn list_open_auto_escalating(&self) -> Result<Vec<EmergencyAlert>, StoreError>;

    /// Every unresolved alert, most escalated first.
    async fn list_active_alerts(&self) -> Result<Vec<EmergencyAlert>, StoreError>;

    async fn escalation_history(&self, alert_id: Uuid) -> Result<Vec<EscalationEvent>, StoreError>;

    async fn insert_notifications(&self, rows: &[AlertNotification]) -> Result<(), StoreError>;

    async fn notifications_for_alert(
        &self,
        alert_id: Uuid,
    ) -> Result<Vec<AlertNotification>, StoreError>;

    async fn unread_notifications(&self, user_id: &str)
        -> Result<Vec<AlertNotification>, StoreError>;

    /// Returns the number of rows stamped.
    async fn mark_notification_read(
        &self,
        alert_id: Uuid,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn mark_notification_responded(
        &self,
        alert_id: Uuid,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn users_with_roles(&self, roles: &[Role]) -> Result<Vec<String>, StoreError>;

    async fn list_responders(&self) -> Result<Vec<ResponderRecord>, StoreError>;

    async fn upsert_responder(&self, record: &ResponderRecord) -> Result<(), StoreError>;

    /// Touch only the duty flag. `false` when no such responder exists.
    async fn set_responder_on_duty(
        &self,
        user_id: &str,
        on_duty: bool,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Touch only the location. `false` when no such responder exists.
    async fn set_responder_location(
        &self,
        user_id: &str,
        location: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
