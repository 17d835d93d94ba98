use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::error;

use crate::error::{AlertError, StoreError};

/// Status plus JSON body returned by every failing handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    pub fn not_found(message: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: json!({ "error": message.to_string() }),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AlertError> for ApiError {
    fn from(err: AlertError) -> Self {
        let message = err.to_string();
        match err {
            AlertError::NotFound(_) => Self::not_found(message),
            AlertError::Validation(_) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: json!({ "error": message }),
            },
            // The caller gets the alert as it stands so it can reconcile.
            AlertError::InvalidTransition { current, .. } => Self {
                status: StatusCode::CONFLICT,
                body: json!({ "error": message, "alert": current }),
            },
            AlertError::StaleWrite(_) => Self {
                status: StatusCode::PRECONDITION_FAILED,
                body: json!({ "error": message }),
            },
            AlertError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        error!("Store failure: {}", err);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({ "error": "internal error" }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertType, EmergencyAlert, NewAlert};
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn alert_errors_map_to_statuses() {
        let id = Uuid::new_v4();
        assert_eq!(ApiError::from(AlertError::NotFound(id)).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(AlertError::validation("title is required")).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(AlertError::StaleWrite(id)).status(),
            StatusCode::PRECONDITION_FAILED
        );
    }

    #[test]
    fn invalid_transition_carries_current_alert() {
        let alert = EmergencyAlert::new(
            NewAlert {
                reporter_id: "u1".to_string(),
                stand_id: None,
                alert_type: AlertType::Crowd,
                title: "Crush at gate".to_string(),
                description: "Gate B turnstiles".to_string(),
                location: None,
                sla_target_minutes: None,
                auto_escalate: None,
            },
            Utc::now(),
        );
        let err = ApiError::from(AlertError::invalid("arrive", &alert));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.body["alert"]["id"], json!(alert.id));
        assert_eq!(err.body["alert"]["status"], json!("reported"));
    }
}
