//! Manual agent pass handlers
//!
//! The scheduler drives these in production; the endpoints exist for
//! operational runs and tests.

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};

use crate::{require_user, AppError, AppState};
use steer_core::RunSummary;

/// POST /api/agents/run - One full periodic agent pass over all users
pub async fn run_agents(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RunSummary>, AppError> {
    let user_id = require_user(&headers)?;

    let summary = state.runner.run_all().await;
    state.db.log_audit(
        user_id,
        "run_agents",
        Some("agent"),
        None,
        Some(&format!("nudges={}", summary.nudges_created)),
    )?;

    Ok(Json(summary))
}

/// POST /api/agents/digest - One nightly digest pass over all users
pub async fn run_digest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RunSummary>, AppError> {
    let user_id = require_user(&headers)?;

    let summary = state.runner.run_digest().await;
    state
        .db
        .log_audit(user_id, "run_digest", Some("agent"), None, None)?;

    Ok(Json(summary))
}
