//! Agent safety lock handlers

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use serde::Deserialize;

use crate::{require_user, AppError, AppState};
use steer_core::models::AgentSafetyState;

/// Request body for engaging or releasing the autopilot lock
#[derive(Debug, Deserialize)]
pub struct SafetyLockRequest {
    pub locked: bool,
    pub reason: Option<String>,
}

/// GET /api/safety - Current watchdog lock state
pub async fn get_safety_state(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AgentSafetyState>, AppError> {
    let user_id = require_user(&headers)?;

    Ok(Json(state.db.get_safety_state(user_id)?))
}

/// POST /api/safety/lock - Engage or release the autopilot lock.
/// While locked, every automated agent skips this user.
pub async fn set_safety_lock(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SafetyLockRequest>,
) -> Result<Json<AgentSafetyState>, AppError> {
    let user_id = require_user(&headers)?;

    if req.locked && req.reason.as_deref().map_or(true, |r| r.trim().is_empty()) {
        return Err(AppError::bad_request("locking requires a reason"));
    }

    state
        .db
        .set_autopilot_lock(user_id, req.locked, req.reason.as_deref(), Utc::now())?;
    state.db.log_audit(
        user_id,
        if req.locked { "lock" } else { "unlock" },
        Some("autopilot"),
        None,
        req.reason.as_deref(),
    )?;

    Ok(Json(state.db.get_safety_state(user_id)?))
}
