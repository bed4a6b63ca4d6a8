//! Nudge lifecycle handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{require_user, AppError, AppState, MAX_PAGE_LIMIT};
use steer_core::models::NudgeAction;
use steer_core::NudgeMetrics;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Max results (default: 50)
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// Request body for nudge feedback
#[derive(Debug, Deserialize)]
pub struct NudgeFeedbackRequest {
    /// 1-5 rating
    pub rating: Option<i32>,
    pub was_helpful: Option<bool>,
    pub dismiss_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub created: Vec<NudgeAction>,
    /// True when the daily frequency cap suppressed delivery
    pub capped: bool,
}

/// GET /api/nudges - Pending, unexpired nudges by priority
pub async fn list_active_nudges(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<NudgeAction>>, AppError> {
    let user_id = require_user(&headers)?;

    Ok(Json(state.db.list_active_nudges(user_id, Utc::now())?))
}

/// POST /api/nudges/generate - Run the generator and persist what the
/// personalization filter lets through
pub async fn generate_nudges(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<GenerateResponse>, AppError> {
    let user_id = require_user(&headers)?;

    if !state.personalize.should_send_nudge_now(user_id, Utc::now())? {
        return Ok(Json(GenerateResponse {
            created: Vec::new(),
            capped: true,
        }));
    }

    let profile = state.db.get_profile(user_id)?;
    let candidates = state.generator.generate(user_id)?;
    let filtered = state.personalize.filter(candidates, &profile);

    let mut created = Vec::with_capacity(filtered.len());
    for nudge in filtered {
        created.push(state.lifecycle.create(nudge)?);
    }
    state.db.log_audit(
        user_id,
        "generate",
        Some("nudge"),
        None,
        Some(&format!("count={}", created.len())),
    )?;

    Ok(Json(GenerateResponse {
        created,
        capped: false,
    }))
}

/// GET /api/nudges/history - Full nudge history, newest first
pub async fn nudge_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<NudgeAction>>, AppError> {
    let user_id = require_user(&headers)?;
    let limit = params.limit.min(MAX_PAGE_LIMIT);

    Ok(Json(state.db.list_nudge_history(user_id, limit)?))
}

/// GET /api/nudges/metrics - Aggregate acceptance and impact stats
pub async fn nudge_metrics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<NudgeMetrics>, AppError> {
    let user_id = require_user(&headers)?;

    Ok(Json(state.lifecycle.metrics(user_id)?))
}

/// GET /api/nudges/:id - Get one nudge
pub async fn get_nudge(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<NudgeAction>, AppError> {
    let user_id = require_user(&headers)?;

    let nudge = state
        .db
        .get_nudge(user_id, id)?
        .ok_or_else(|| AppError::not_found("nudge not found"))?;

    Ok(Json(nudge))
}

/// POST /api/nudges/:id/accept - Execute a pending nudge
pub async fn accept_nudge(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<NudgeAction>, AppError> {
    let user_id = require_user(&headers)?;

    let nudge = state.lifecycle.accept(user_id, id)?;
    state
        .db
        .log_audit(user_id, "accept", Some("nudge"), Some(id), None)?;

    Ok(Json(nudge))
}

/// POST /api/nudges/:id/reject - Decline a pending nudge
pub async fn reject_nudge(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<NudgeAction>, AppError> {
    let user_id = require_user(&headers)?;

    let nudge = state.lifecycle.reject(user_id, id)?;
    state
        .db
        .log_audit(user_id, "reject", Some("nudge"), Some(id), None)?;

    Ok(Json(nudge))
}

/// POST /api/nudges/:id/feedback - Rate a nudge and fold the signal into
/// the user's personalization profile
pub async fn nudge_feedback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<NudgeFeedbackRequest>,
) -> Result<Json<NudgeAction>, AppError> {
    let user_id = require_user(&headers)?;

    if let Some(rating) = req.rating {
        if !(1..=5).contains(&rating) {
            return Err(AppError::bad_request("rating must be between 1 and 5"));
        }
    }
    if req.rating.is_none() && req.was_helpful.is_none() && req.dismiss_reason.is_none() {
        return Err(AppError::bad_request("feedback body is empty"));
    }

    state.personalize.collect_feedback(
        user_id,
        id,
        req.rating,
        req.was_helpful,
        req.dismiss_reason.as_deref(),
    )?;
    state
        .db
        .log_audit(user_id, "feedback", Some("nudge"), Some(id), None)?;

    let nudge = state
        .db
        .get_nudge(user_id, id)?
        .ok_or_else(|| AppError::not_found("nudge not found"))?;

    Ok(Json(nudge))
}
