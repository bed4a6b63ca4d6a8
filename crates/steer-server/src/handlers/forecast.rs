//! Forecast, risk, and rhythm handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{require_user, AppError, AppState};
use steer_core::models::RiskSnapshot;
use steer_core::rhythm::RhythmProfile;
use steer_core::risk::{EmiRisk, RiskAssessment};
use steer_core::{forecast, rhythm, risk, CashFlowForecast};

/// Enough history for the 120-day rhythm lookback
const HISTORY_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    /// Horizon in days (default: 30, max: 90)
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_days() -> u32 {
    30
}

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    #[serde(default = "default_snapshots")]
    pub limit: u32,
}

fn default_snapshots() -> u32 {
    30
}

#[derive(Debug, Serialize)]
pub struct RiskResponse {
    pub assessment: RiskAssessment,
    pub emi: EmiRisk,
}

/// GET /api/forecast - Daily balance projection over the horizon
pub async fn get_forecast(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ForecastQuery>,
) -> Result<Json<CashFlowForecast>, AppError> {
    let user_id = require_user(&headers)?;

    let days = params.days.clamp(1, 90);
    let balance = state.db.total_balance(user_id)?;
    let transactions = state.db.list_recent_transactions(user_id, HISTORY_LIMIT)?;

    Ok(Json(forecast::project(&transactions, balance, days)))
}

/// GET /api/risk - Current risk assessment plus the 7-day EMI check
pub async fn get_risk(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RiskResponse>, AppError> {
    let user_id = require_user(&headers)?;

    let balance = state.db.total_balance(user_id)?;
    let transactions = state.db.list_recent_transactions(user_id, HISTORY_LIMIT)?;

    let forecast = forecast::project(&transactions, balance, 30);
    let assessment = risk::score_forecast(&forecast, balance);
    let emi = risk::check_emi_at_risk(&transactions, balance);

    // Every scoring leaves an audit trail
    state.db.insert_risk_snapshot(user_id, &assessment)?;

    Ok(Json(RiskResponse { assessment, emi }))
}

/// GET /api/risk/history - Persisted risk snapshots, newest first
pub async fn risk_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<SnapshotQuery>,
) -> Result<Json<Vec<RiskSnapshot>>, AppError> {
    let user_id = require_user(&headers)?;

    Ok(Json(state.db.list_risk_snapshots(user_id, params.limit)?))
}

/// GET /api/rhythm - Income and spending rhythm profile
pub async fn get_rhythm(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RhythmProfile>, AppError> {
    let user_id = require_user(&headers)?;

    let transactions = state.db.list_recent_transactions(user_id, HISTORY_LIMIT)?;

    Ok(Json(rhythm::analyze(&transactions)))
}
