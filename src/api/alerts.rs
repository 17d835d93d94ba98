use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::error::ApiError;
use super::AppState;
use crate::models::{
    AlertNotification, EmergencyAlert, EscalationEvent, EscalationLevel, EscalationReason,
    NewAlert, ResolutionType,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/alerts", post(create_alert).get(active_alerts))
        .route("/alerts/escalation-queue", get(escalation_queue))
        .route("/alerts/{id}", get(get_alert))
        .route("/alerts/{id}/acknowledge", post(acknowledge))
        .route("/alerts/{id}/assign", post(assign))
        .route("/alerts/{id}/arrive", post(arrive))
        .route("/alerts/{id}/stabilize", post(stabilize))
        .route("/alerts/{id}/escalate", post(escalate))
        .route("/alerts/{id}/resolve", post(resolve))
        .route("/alerts/{id}/escalations", get(escalation_history))
        .route("/alerts/{id}/notifications", get(notifications))
        .route("/alerts/{id}/notifications/read", post(mark_read))
        .route("/alerts/{id}/notifications/respond", post(mark_responded))
        .route("/users/{id}/notifications/unread", get(unread_notifications))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub responder_id: String,
    pub eta_minutes: Option<i32>,
    pub assigned_by: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalateRequest {
    pub to_level: EscalationLevel,
    #[serde(default = "manual")]
    pub reason: EscalationReason,
    pub escalated_by: Option<String>,
}

fn manual() -> EscalationReason {
    EscalationReason::Manual
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub user_id: String,
    pub notes: Option<String>,
    pub resolution_type: ResolutionType,
}

/// POST /alerts
async fn create_alert(
    State(state): State<AppState>,
    Json(input): Json<NewAlert>,
) -> Result<(StatusCode, Json<EmergencyAlert>), ApiError> {
    let alert = state.manager.create(input).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

/// GET /alerts - open alerts, most urgent first
async fn active_alerts(
    State(state): State<AppState>,
) -> Result<Json<Vec<EmergencyAlert>>, ApiError> {
    Ok(Json(state.manager.active_alerts().await?))
}

async fn escalation_queue(
    State(state): State<AppState>,
) -> Result<Json<Vec<EmergencyAlert>>, ApiError> {
    Ok(Json(state.manager.alerts_needing_escalation(Utc::now()).await?))
}

async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EmergencyAlert>, ApiError> {
    Ok(Json(state.manager.get(id).await?))
}

async fn acknowledge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<EmergencyAlert>, ApiError> {
    Ok(Json(state.manager.acknowledge(id, &req.user_id).await?))
}

async fn assign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<EmergencyAlert>, ApiError> {
    let alert = state
        .manager
        .assign(id, &req.responder_id, req.eta_minutes, &req.assigned_by)
        .await?;
    Ok(Json(alert))
}

async fn arrive(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<EmergencyAlert>, ApiError> {
    Ok(Json(state.manager.mark_arrived(id, &req.user_id).await?))
}

async fn stabilize(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<EmergencyAlert>, ApiError> {
    Ok(Json(state.manager.mark_stabilized(id, &req.user_id).await?))
}

async fn escalate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<EscalateRequest>,
) -> Result<Json<EmergencyAlert>, ApiError> {
    let alert = state
        .manager
        .escalate(id, req.to_level, req.reason, req.escalated_by)
        .await?;
    Ok(Json(alert))
}

async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<EmergencyAlert>, ApiError> {
    let alert = state
        .manager
        .resolve(id, &req.user_id, req.notes, req.resolution_type)
        .await?;
    Ok(Json(alert))
}

async fn escalation_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EscalationEvent>>, ApiError> {
    Ok(Json(state.manager.escalation_history(id).await?))
}

async fn notifications(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AlertNotification>>, ApiError> {
    Ok(Json(state.manager.notifications(id).await?))
}

/// POST /alerts/{id}/notifications/read
async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<Value>, ApiError> {
    let updated = state.manager.mark_read(id, &req.user_id).await?;
    Ok(Json(json!({ "updated": updated })))
}

/// POST /alerts/{id}/notifications/respond
async fn mark_responded(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<Value>, ApiError> {
    let updated = state.manager.mark_responded(id, &req.user_id).await?;
    Ok(Json(json!({ "updated": updated })))
}

/// GET /users/{id}/notifications/unread
async fn unread_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<AlertNotification>>, ApiError> {
    Ok(Json(state.manager.unread_notifications(&user_id).await?))
}
