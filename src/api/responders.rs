use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use super::error::ApiError;
use super::AppState;
use crate::models::message::PresenceEntry;
use crate::models::{AlertType, ResponderRecord};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/responders", get(list_responders))
        .route("/responders/{id}", put(upsert_responder))
        .route("/responders/{id}/duty", put(set_duty))
        .route("/responders/{id}/location", put(update_location))
        .route("/presence", get(presence))
        .route("/presence/{id}", delete(disconnect))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponderRequest {
    pub responder_type: String,
    #[serde(default)]
    pub is_on_duty: bool,
    pub location: Option<String>,
    #[serde(default)]
    pub can_respond_to: Vec<AlertType>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DutyRequest {
    pub is_on_duty: bool,
}

#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    pub location: Option<String>,
}

async fn list_responders(State(state): State<AppState>) -> Json<Vec<ResponderRecord>> {
    Json(state.directory.all())
}

/// PUT /responders/{id} - create or replace a responder record
async fn upsert_responder(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<ResponderRequest>,
) -> Result<Json<ResponderRecord>, ApiError> {
    let record = ResponderRecord {
        user_id,
        responder_type: req.responder_type,
        is_on_duty: req.is_on_duty,
        location: req.location,
        can_respond_to: req.can_respond_to,
        updated_at: Utc::now(),
    };
    Ok(Json(state.directory.upsert(record).await?))
}

async fn set_duty(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<DutyRequest>,
) -> Result<Json<ResponderRecord>, ApiError> {
    state
        .directory
        .set_on_duty(&user_id, req.is_on_duty)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("responder not found: {}", user_id)))
}

async fn update_location(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<LocationRequest>,
) -> Result<Json<ResponderRecord>, ApiError> {
    state
        .directory
        .update_location(&user_id, req.location)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("responder not found: {}", user_id)))
}

/// GET /presence - users with a live authenticated connection
async fn presence(State(state): State<AppState>) -> Json<Vec<PresenceEntry>> {
    Json(state.registry.online_users())
}

/// DELETE /presence/{id} - force a user's connection closed
async fn disconnect(State(state): State<AppState>, Path(user_id): Path<String>) -> StatusCode {
    if state.registry.disconnect(&user_id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
