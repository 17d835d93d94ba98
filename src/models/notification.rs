use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::text_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    InApp,
    Push,
    Sms,
}

text_enum!(NotificationChannel {
    InApp => "in_app",
    Push => "push",
    Sms => "sms",
});

/// Durable receipt trail, written whether or not the live push landed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotification {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub user_id: String,
    pub channel: NotificationChannel,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl AlertNotification {
    pub fn in_app(alert_id: Uuid, user_id: String, sent_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_id,
            user_id,
            channel: NotificationChannel::InApp,
            sent_at,
            read_at: None,
            responded_at: None,
        }
    }
}
