//! Budget handlers

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;

use crate::{require_user, AppError, AppState, SuccessResponse};
use steer_core::models::Budget;
use steer_core::money::Money;

/// Request body for setting the monthly budget
#[derive(Debug, Deserialize)]
pub struct UpsertBudgetRequest {
    /// Monthly amount in minor units
    pub amount: Money,
}

#[derive(Debug, Deserialize)]
pub struct BudgetLockRequest {
    pub locked: bool,
}

/// GET /api/budget - The user's monthly budget
pub async fn get_budget(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Budget>, AppError> {
    let user_id = require_user(&headers)?;

    let budget = state
        .db
        .get_budget(user_id)?
        .ok_or_else(|| AppError::not_found("no budget set"))?;

    Ok(Json(budget))
}

/// PUT /api/budget - Create or update the monthly budget
pub async fn upsert_budget(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<UpsertBudgetRequest>,
) -> Result<Json<Budget>, AppError> {
    let user_id = require_user(&headers)?;

    if !req.amount.is_positive() {
        return Err(AppError::bad_request("budget amount must be positive"));
    }

    let id = state.db.upsert_budget(user_id, req.amount)?;
    state
        .db
        .log_audit(user_id, "upsert", Some("budget"), Some(id), None)?;

    let budget = state
        .db
        .get_budget(user_id)?
        .ok_or_else(|| AppError::not_found("no budget set"))?;

    Ok(Json(budget))
}

/// POST /api/budget/lock - Lock or unlock discretionary spend
pub async fn set_budget_lock(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<BudgetLockRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_id = require_user(&headers)?;

    if state.db.get_budget(user_id)?.is_none() {
        return Err(AppError::not_found("no budget set"));
    }

    state.db.set_budget_locked(user_id, req.locked)?;
    state.db.log_audit(
        user_id,
        if req.locked { "lock" } else { "unlock" },
        Some("budget"),
        None,
        None,
    )?;

    Ok(Json(SuccessResponse { success: true }))
}
