pub const INSERT_ALERT: &str = r#"
INSERT INTO emergency_alerts (
    id, reporter_id, stand_id, location, alert_type, title, description,
    status, escalation_level, sla_target_minutes, last_escalated_at, auto_escalate,
    assigned_responder_id, assigned_at, responder_eta,
    acknowledged_by, acknowledged_at, arrived_at, stabilized_at,
    resolved_by, resolved_at, resolution_notes, resolution_type,
    created_at, updated_at, version
) VALUES (
    $1, $2, $3, $4, $5, $6, $7,
    $8, $9, $10, $11, $12,
    $13, $14, $15,
    $16, $17, $18, $19,
    $20, $21, $22, $23,
    $24, $25, $26
);
"#;

pub const SELECT_ALERT: &str = r#"
SELECT * FROM emergency_alerts WHERE id = $1;
"#;

// Compare-and-swap: the WHERE clause carries the precondition read by the caller.
pub const UPDATE_ALERT_IF_UNCHANGED: &str = r#"
UPDATE emergency_alerts
SET status = $2,
    escalation_level = $3,
    sla_target_minutes = $4,
    last_escalated_at = $5,
    auto_escalate = $6,
    assigned_responder_id = $7,
    assigned_at = $8,
    responder_eta = $9,
    acknowledged_by = $10,
    acknowledged_at = $11,
    arrived_at = $12,
    stabilized_at = $13,
    resolved_by = $14,
    resolved_at = $15,
    resolution_notes = $16,
    resolution_type = $17,
    updated_at = $18,
    version = $19
WHERE id = $1
  AND status = $20
  AND escalation_level = $21
  AND last_escalated_at IS NOT DISTINCT FROM $22
  AND version = $23;
"#;

pub const SELECT_OPEN_AUTO_ESCALATING: &str = r#"
SELECT * FROM emergency_alerts
WHERE status <> 'resolved' AND auto_escalate = true
ORDER BY created_at;
"#;

pub const SELECT_ACTIVE_ALERTS: &str = r#"
SELECT * FROM emergency_alerts
WHERE status <> 'resolved'
ORDER BY escalation_level DESC, created_at;
"#;

pub const INSERT_ESCALATION_EVENT: &str = r#"
INSERT INTO escalation_events (
    id, alert_id, from_level, to_level, reason, escalated_by, notified_user_ids, created_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8);
"#;

pub const SELECT_ESCALATION_HISTORY: &str = r#"
SELECT * FROM escalation_events WHERE alert_id = $1 ORDER BY created_at, to_level;
"#;

pub const INSERT_NOTIFICATION: &str = r#"
INSERT INTO alert_notifications (id, alert_id, user_id, channel, sent_at, read_at, responded_at)
VALUES ($1, $2, $3, $4, $5, $6, $7);
"#;

pub const SELECT_NOTIFICATIONS_FOR_ALERT: &str = r#"
SELECT * FROM alert_notifications WHERE alert_id = $1 ORDER BY sent_at, user_id;
"#;

pub const SELECT_UNREAD_NOTIFICATIONS: &str = r#"
SELECT * FROM alert_notifications WHERE user_id = $1 AND read_at IS NULL ORDER BY sent_at;
"#;

pub const MARK_NOTIFICATION_READ: &str = r#"
UPDATE alert_notifications
SET read_at = $3
WHERE alert_id = $1 AND user_id = $2 AND read_at IS NULL;
"#;

pub const MARK_NOTIFICATION_RESPONDED: &str = r#"
UPDATE alert_notifications
SET responded_at = $3,
    read_at = COALESCE(read_at, $3)
WHERE alert_id = $1 AND user_id = $2 AND responded_at IS NULL;
"#;

pub const SELECT_USERS_WITH_ROLES: &str = r#"
SELECT user_id FROM staff_users WHERE role = ANY($1) ORDER BY user_id;
"#;

pub const SELECT_RESPONDERS: &str = r#"
SELECT user_id, responder_type, is_on_duty, location, can_respond_to, updated_at
FROM responders
ORDER BY user_id;
"#;

pub const UPSERT_RESPONDER: &str = r#"
INSERT INTO responders (user_id, responder_type, is_on_duty, location, can_respond_to, updated_at)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (user_id) DO UPDATE
SET responder_type = $2,
    is_on_duty = $3,
    location = $4,
    can_respond_to = $5,
    updated_at = $6;
"#;

pub const SET_RESPONDER_ON_DUTY: &str = r#"
UPDATE responders SET is_on_duty = $2, updated_at = $3 WHERE user_id = $1;
"#;

pub const SET_RESPONDER_LOCATION: &str = r#"
UPDATE responders SET location = $2, updated_at = $3 WHERE user_id = $1;
"#;
