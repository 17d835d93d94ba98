use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alert::AlertType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponderRecord {
    pub user_id: String,
    /// Free-form specialisation, e.g. "emt", "security", "facilities".
    pub responder_type: String,
    pub is_on_duty: bool,
    pub location: Option<String>,
    pub can_respond_to: Vec<AlertType>,
    pub updated_at: DateTime<Utc>,
}

impl ResponderRecord {
    pub fn can_take(&self, alert_type: AlertType) -> bool {
        self.is_on_duty && self.can_respond_to.contains(&alert_type)
    }
}
