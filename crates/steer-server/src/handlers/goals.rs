//! Savings goal handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::{require_user, AppError, AppState, SuccessResponse};
use steer_core::models::{Goal, GoalStatus};
use steer_core::money::Money;

/// Request body for creating a goal
#[derive(Debug, Deserialize)]
pub struct CreateGoalRequest {
    pub name: String,
    /// Target in minor units
    pub target_amount: Money,
    pub target_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ContributeRequest {
    /// Contribution in minor units
    pub amount: Money,
}

#[derive(Debug, Deserialize)]
pub struct GoalStatusRequest {
    pub status: GoalStatus,
}

/// GET /api/goals - Active goals, nearest deadline first
pub async fn list_goals(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Goal>>, AppError> {
    let user_id = require_user(&headers)?;

    Ok(Json(state.db.list_active_goals(user_id)?))
}

/// GET /api/goals/:id - Get one goal
pub async fn get_goal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Goal>, AppError> {
    let user_id = require_user(&headers)?;

    let goal = state
        .db
        .get_goal(user_id, id)?
        .ok_or_else(|| AppError::not_found("goal not found"))?;

    Ok(Json(goal))
}

/// POST /api/goals - Create a goal
pub async fn create_goal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateGoalRequest>,
) -> Result<Json<Goal>, AppError> {
    let user_id = require_user(&headers)?;

    if req.name.trim().is_empty() {
        return Err(AppError::bad_request("goal name is required"));
    }
    if !req.target_amount.is_positive() {
        return Err(AppError::bad_request("target amount must be positive"));
    }
    if req.target_date <= Utc::now().date_naive() {
        return Err(AppError::bad_request("target date must be in the future"));
    }

    let id = state
        .db
        .create_goal(user_id, req.name.trim(), req.target_amount, req.target_date)?;
    state
        .db
        .log_audit(user_id, "create", Some("goal"), Some(id), None)?;

    let goal = state
        .db
        .get_goal(user_id, id)?
        .ok_or_else(|| AppError::not_found("goal not found"))?;

    Ok(Json(goal))
}

/// POST /api/goals/:id/contribute - Add to a goal's saved amount
pub async fn contribute_to_goal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<ContributeRequest>,
) -> Result<Json<Goal>, AppError> {
    let user_id = require_user(&headers)?;

    if !req.amount.is_positive() {
        return Err(AppError::bad_request("amount must be positive"));
    }
    if state.db.get_goal(user_id, id)?.is_none() {
        return Err(AppError::not_found("goal not found"));
    }

    state.db.add_to_goal(id, req.amount)?;
    state.db.log_audit(
        user_id,
        "contribute",
        Some("goal"),
        Some(id),
        Some(&format!("amount={}", req.amount)),
    )?;

    let goal = state
        .db
        .get_goal(user_id, id)?
        .ok_or_else(|| AppError::not_found("goal not found"))?;

    Ok(Json(goal))
}

/// POST /api/goals/:id/status - Complete or abandon a goal
pub async fn set_goal_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<GoalStatusRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_id = require_user(&headers)?;

    state.db.set_goal_status(user_id, id, req.status)?;
    state.db.log_audit(
        user_id,
        "set_status",
        Some("goal"),
        Some(id),
        Some(req.status.as_str()),
    )?;

    Ok(Json(SuccessResponse { success: true }))
}
