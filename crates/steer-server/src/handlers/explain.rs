//! Explainability handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

use crate::{require_user, AppError, AppState};
use steer_core::{AllowanceExplanation, Explanation, RiskExplanation};

/// GET /api/explain/nudges/:id - Why a nudge was produced
pub async fn explain_nudge(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Explanation>, AppError> {
    let user_id = require_user(&headers)?;

    Ok(Json(state.explain.explain_nudge(user_id, id).await?))
}

/// GET /api/explain/allowance - Daily spending allowance breakdown
pub async fn explain_allowance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AllowanceExplanation>, AppError> {
    let user_id = require_user(&headers)?;

    Ok(Json(state.explain.explain_spending_allowance(user_id)?))
}

/// GET /api/explain/risk - User-facing narrative risk view
pub async fn explain_risk(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RiskExplanation>, AppError> {
    let user_id = require_user(&headers)?;

    Ok(Json(state.explain.explain_risk_score(user_id)?))
}
