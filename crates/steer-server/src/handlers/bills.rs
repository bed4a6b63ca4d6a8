//! Bill and envelope handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{require_user, AppError, AppState, SuccessResponse};
use steer_core::models::{Bill, BillEnvelope};
use steer_core::money::Money;

/// Request body for creating a bill
#[derive(Debug, Deserialize)]
pub struct CreateBillRequest {
    pub name: String,
    /// Amount in minor units
    pub amount: Money,
    /// Day of month the bill recurs on (1-28)
    pub due_day: u32,
    pub next_due_date: NaiveDate,
    #[serde(default)]
    pub auto_pay_enabled: bool,
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct DueQuery {
    /// Lookahead window (default: 7 days)
    #[serde(default = "default_within")]
    pub within_days: i64,
}

fn default_within() -> i64 {
    7
}

/// Request body for ring-fencing a bill's amount
#[derive(Debug, Deserialize)]
pub struct ProtectBillRequest {
    /// Defaults to the bill's full amount
    pub amount: Option<Money>,
    /// Defaults to the bill's next due date
    pub locked_until: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct ProtectedResponse {
    pub envelope: BillEnvelope,
    /// Total actively protected across all bills
    pub protected_total: Money,
}

/// GET /api/bills - All bills, soonest due first
pub async fn list_bills(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Bill>>, AppError> {
    let user_id = require_user(&headers)?;

    Ok(Json(state.db.list_bills(user_id)?))
}

/// GET /api/bills/due - Unpaid bills due within the window
pub async fn bills_due(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<DueQuery>,
) -> Result<Json<Vec<Bill>>, AppError> {
    let user_id = require_user(&headers)?;

    Ok(Json(state.db.bills_due_within(user_id, params.within_days)?))
}

/// POST /api/bills - Create a bill
pub async fn create_bill(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateBillRequest>,
) -> Result<Json<Bill>, AppError> {
    let user_id = require_user(&headers)?;

    if req.name.trim().is_empty() {
        return Err(AppError::bad_request("bill name is required"));
    }
    if !req.amount.is_positive() {
        return Err(AppError::bad_request("amount must be positive"));
    }
    // 29-31 would skip short months when the due date rolls forward
    if !(1..=28).contains(&req.due_day) {
        return Err(AppError::bad_request("due_day must be between 1 and 28"));
    }

    let id = state.db.create_bill(
        user_id,
        req.name.trim(),
        req.amount,
        req.due_day,
        req.next_due_date,
        req.auto_pay_enabled,
        req.category.trim(),
    )?;
    state
        .db
        .log_audit(user_id, "create", Some("bill"), Some(id), None)?;

    let bill = state
        .db
        .get_bill(user_id, id)?
        .ok_or_else(|| AppError::not_found("bill not found"))?;

    Ok(Json(bill))
}

/// POST /api/bills/:id/pay - Settle a bill, roll it forward, and release
/// its envelope
pub async fn pay_bill(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_id = require_user(&headers)?;

    state.db.mark_bill_paid(user_id, id)?;
    state
        .db
        .log_audit(user_id, "pay", Some("bill"), Some(id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/bills/:id/envelope - The bill's protection envelope
pub async fn get_envelope(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<BillEnvelope>, AppError> {
    let user_id = require_user(&headers)?;

    if state.db.get_bill(user_id, id)?.is_none() {
        return Err(AppError::not_found("bill not found"));
    }
    let envelope = state
        .db
        .get_envelope(id)?
        .ok_or_else(|| AppError::not_found("no envelope for bill"))?;

    Ok(Json(envelope))
}

/// POST /api/bills/:id/envelope - Ring-fence cash for a bill
pub async fn protect_bill(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<ProtectBillRequest>,
) -> Result<Json<ProtectedResponse>, AppError> {
    let user_id = require_user(&headers)?;

    let bill = state
        .db
        .get_bill(user_id, id)?
        .ok_or_else(|| AppError::not_found("bill not found"))?;

    let amount = req.amount.unwrap_or(bill.amount);
    if !amount.is_positive() {
        return Err(AppError::bad_request("amount must be positive"));
    }
    let locked_until = req
        .locked_until
        .unwrap_or_else(|| bill.next_due_date.max(Utc::now().date_naive() + Duration::days(1)));

    state.db.upsert_envelope(id, amount, locked_until)?;
    state.db.log_audit(
        user_id,
        "protect",
        Some("bill"),
        Some(id),
        Some(&format!("amount={}", amount)),
    )?;

    let envelope = state
        .db
        .get_envelope(id)?
        .ok_or_else(|| AppError::not_found("no envelope for bill"))?;

    Ok(Json(ProtectedResponse {
        envelope,
        protected_total: state.db.protected_amount(user_id)?,
    }))
}
