use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{queries, DbPool, IncidentStore};
use crate::error::StoreError;
use crate::models::{
    AlertNotification, EmergencyAlert, EscalationEvent, EscalationLevel, Precondition,
    ResponderRecord, Role,
};

/// `IncidentStore` backed by the Postgres schema in `sql/schema.sql`.
#[derive(Debug, Clone)]
pub struct PgIncidentStore {
    pool: DbPool,
}

impl PgIncidentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn alert_from_row(row: &PgRow) -> Result<EmergencyAlert, StoreError> {
    let alert_type: String = row.try_get("alert_type")?;
    let status: String = row.try_get("status")?;
    let level: i16 = row.try_get("escalation_level")?;
    let resolution_type: Option<String> = row.try_get("resolution_type")?;

    Ok(EmergencyAlert {
        id: row.try_get("id")?,
        reporter_id: row.try_get("reporter_id")?,
        stand_id: row.try_get("stand_id")?,
        location: row.try_get("location")?,
        alert_type: alert_type.parse()?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: status.parse()?,
        escalation_level: EscalationLevel::try_from(level)?,
        sla_target_minutes: row.try_get("sla_target_minutes")?,
        last_escalated_at: row.try_get("last_escalated_at")?,
        auto_escalate: row.try_get("auto_escalate")?,
        assigned_responder_id: row.try_get("assigned_responder_id")?,
        assigned_at: row.try_get("assigned_at")?,
        responder_eta: row.try_get("responder_eta")?,
        acknowledged_by: row.try_get("acknowledged_by")?,
        acknowledged_at: row.try_get("acknowledged_at")?,
        arrived_at: row.try_get("arrived_at")?,
        stabilized_at: row.try_get("stabilized_at")?,
        resolved_by: row.try_get("resolved_by")?,
        resolved_at: row.try_get("resolved_at")?,
        resolution_notes: row.try_get("resolution_notes")?,
        resolution_type: resolution_type.map(|r| r.parse()).transpose()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
    })
}

fn escalation_from_row(row: &PgRow) -> Result<EscalationEvent, StoreError> {
    let from_level: i16 = row.try_get("from_level")?;
    let to_level: i16 = row.try_get("to_level")?;
    let reason: String = row.try_get("reason")?;

    Ok(EscalationEvent {
        id: row.try_get("id")?,
        alert_id: row.try_get("alert_id")?,
        from_level: EscalationLevel::try_from(from_level)?,
        to_level: EscalationLevel::try_from(to_level)?,
        reason: reason.parse()?,
        escalated_by: row.try_get("escalated_by")?,
        notified_user_ids: row.try_get("notified_user_ids")?,
        created_at: row.try_get("created_at")?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<AlertNotification, StoreError> {
    let channel: String = row.try_get("channel")?;

    Ok(AlertNotification {
        id: row.try_get("id")?,
        alert_id: row.try_get("alert_id")?,
        user_id: row.try_get("user_id")?,
        channel: channel.parse()?,
        sent_at: row.try_get("sent_at")?,
        read_at: row.try_get("read_at")?,
        responded_at: row.try_get("responded_at")?,
    })
}

fn responder_from_row(row: &PgRow) -> Result<ResponderRecord, StoreError> {
    let can_respond_to: Vec<String> = row.try_get("can_respond_to")?;

    Ok(ResponderRecord {
        user_id: row.try_get("user_id")?,
        responder_type: row.try_get("responder_type")?,
        is_on_duty: row.try_get("is_on_duty")?,
        location: row.try_get("location")?,
        can_respond_to: can_respond_to
            .iter()
            .map(|t| t.parse())
            .collect::<Result<_, _>>()?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Binds the SET list and WHERE precondition of `UPDATE_ALERT_IF_UNCHANGED`.
fn conditional_update<'q>(
    alert: &'q EmergencyAlert,
    expected: &'q Precondition,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(queries::UPDATE_ALERT_IF_UNCHANGED)
        .bind(alert.id)
        .bind(alert.status.as_str())
        .bind(alert.escalation_level.as_i16())
        .bind(alert.sla_target_minutes)
        .bind(alert.last_escalated_at)
        .bind(alert.auto_escalate)
        .bind(&alert.assigned_responder_id)
        .bind(alert.assigned_at)
        .bind(alert.responder_eta)
        .bind(&alert.acknowledged_by)
        .bind(alert.acknowledged_at)
        .bind(alert.arrived_at)
        .bind(alert.stabilized_at)
        .bind(&alert.resolved_by)
        .bind(alert.resolved_at)
        .bind(&alert.resolution_notes)
        .bind(alert.resolution_type.map(|r| r.as_str()))
        .bind(alert.updated_at)
        .bind(alert.version)
        .bind(expected.status.as_str())
        .bind(expected.escalation_level.as_i16())
        .bind(expected.last_escalated_at)
        .bind(expected.version)
}

#[async_trait]
impl IncidentStore for PgIncidentStore {
    async fn insert_alert(&self, alert: &EmergencyAlert) -> Result<(), StoreError> {
        sqlx::query(queries::INSERT_ALERT)
            .bind(alert.id)
            .bind(&alert.reporter_id)
            .bind(&alert.stand_id)
            .bind(&alert.location)
            .bind(alert.alert_type.as_str())
            .bind(&alert.title)
            .bind(&alert.description)
            .bind(alert.status.as_str())
            .bind(alert.escalation_level.as_i16())
            .bind(alert.sla_target_minutes)
            .bind(alert.last_escalated_at)
            .bind(alert.auto_escalate)
            .bind(&alert.assigned_responder_id)
            .bind(alert.assigned_at)
            .bind(alert.responder_eta)
            .bind(&alert.acknowledged_by)
            .bind(alert.acknowledged_at)
            .bind(alert.arrived_at)
            .bind(alert.stabilized_at)
            .bind(&alert.resolved_by)
            .bind(alert.resolved_at)
            .bind(&alert.resolution_notes)
            .bind(alert.resolution_type.map(|r| r.as_str()))
            .bind(alert.created_at)
            .bind(alert.updated_at)
            .bind(alert.version)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_alert(&self, id: Uuid) -> Result<Option<EmergencyAlert>, StoreError> {
        let row = sqlx::query(queries::SELECT_ALERT)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(alert_from_row).transpose()
    }

    async fn update_alert(
        &self,
        alert: &EmergencyAlert,
        expected: &Precondition,
    ) -> Result<bool, StoreError> {
        let result = conditional_update(alert, expected)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn escalate_alert(
        &self,
        alert: &EmergencyAlert,
        expected: &Precondition,
        event: &EscalationEvent,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = conditional_update(alert, expected)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(queries::INSERT_ESCALATION_EVENT)
            .bind(event.id)
            .bind(event.alert_id)
            .bind(event.from_level.as_i16())
            .bind(event.to_level.as_i16())
            .bind(event.reason.as_str())
            .bind(&event.escalated_by)
            .bind(&event.notified_user_ids)
            .bind(event.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_open_auto_escalating(&self) -> Result<Vec<EmergencyAlert>, StoreError> {
        let rows = sqlx::query(queries::SELECT_OPEN_AUTO_ESCALATING)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(alert_from_row).collect()
    }

    async fn list_active_alerts(&self) -> Result<Vec<EmergencyAlert>, StoreError> {
        let rows = sqlx::query(queries::SELECT_ACTIVE_ALERTS)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(alert_from_row).collect()
    }

    async fn escalation_history(&self, alert_id: Uuid) -> Result<Vec<EscalationEvent>, StoreError> {
        let rows = sqlx::query(queries::SELECT_ESCALATION_HISTORY)
            .bind(alert_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(escalation_from_row).collect()
    }

    async fn insert_notifications(&self, rows: &[AlertNotification]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(queries::INSERT_NOTIFICATION)
                .bind(row.id)
                .bind(row.alert_id)
                .bind(&row.user_id)
                .bind(row.channel.as_str())
                .bind(row.sent_at)
                .bind(row.read_at)
                .bind(row.responded_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn notifications_for_alert(
        &self,
        alert_id: Uuid,
    ) -> Result<Vec<AlertNotification>, StoreError> {
        let rows = sqlx::query(queries::SELECT_NOTIFICATIONS_FOR_ALERT)
            .bind(alert_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn unread_notifications(
        &self,
        user_id: &str,
    ) -> Result<Vec<AlertNotification>, StoreError> {
        let rows = sqlx::query(queries::SELECT_UNREAD_NOTIFICATIONS)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_notification_read(
        &self,
        alert_id: Uuid,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(queries::MARK_NOTIFICATION_READ)
            .bind(alert_id)
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn mark_notification_responded(
        &self,
        alert_id: Uuid,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(queries::MARK_NOTIFICATION_RESPONDED)
            .bind(alert_id)
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn users_with_roles(&self, roles: &[Role]) -> Result<Vec<String>, StoreError> {
        let roles: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
        let rows = sqlx::query(queries::SELECT_USERS_WITH_ROLES)
            .bind(roles)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get("user_id").map_err(StoreError::from))
            .collect()
    }

    async fn list_responders(&self) -> Result<Vec<ResponderRecord>, StoreError> {
        let rows = sqlx::query(queries::SELECT_RESPONDERS)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(responder_from_row).collect()
    }

    async fn upsert_responder(&self, record: &ResponderRecord) -> Result<(), StoreError> {
        let can_respond_to: Vec<&str> = record.can_respond_to.iter().map(|t| t.as_str()).collect();
        sqlx::query(queries::UPSERT_RESPONDER)
            .bind(&record.user_id)
            .bind(&record.responder_type)
            .bind(record.is_on_duty)
            .bind(&record.location)
            .bind(can_respond_to)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_responder_on_duty(
        &self,
        user_id: &str,
        on_duty: bool,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(queries::SET_RESPONDER_ON_DUTY)
            .bind(user_id)
            .bind(on_duty)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_responder_location(
        &self,
        user_id: &str,
        location: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(queries::SET_RESPONDER_LOCATION)
            .bind(user_id)
            .bind(location)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
