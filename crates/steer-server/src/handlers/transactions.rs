//! Transaction handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{require_user, AppError, AppState, MAX_PAGE_LIMIT};
use steer_core::models::{NewTransaction, RecurringInterval, Transaction, TransactionKind};
use steer_core::money::Money;

/// Query parameters for listing transactions
#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    /// Max results (default: 100)
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

/// Request body for recording a transaction
#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub account_id: i64,
    pub kind: TransactionKind,
    /// Amount in minor units, always positive
    pub amount: Money,
    pub category: String,
    #[serde(default)]
    pub description: String,
    /// Defaults to now when omitted
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurring_interval: Option<RecurringInterval>,
    pub next_recurring_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct CreateTransactionResponse {
    pub id: i64,
    pub balance: Money,
}

/// GET /api/transactions - Recent transactions, newest first
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<TransactionQuery>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let user_id = require_user(&headers)?;
    let limit = params.limit.min(MAX_PAGE_LIMIT);

    let transactions = state.db.list_recent_transactions(user_id, limit)?;

    Ok(Json(transactions))
}

/// POST /api/transactions - Record a transaction and settle the balance
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<Json<CreateTransactionResponse>, AppError> {
    let user_id = require_user(&headers)?;

    if !req.amount.is_positive() {
        return Err(AppError::bad_request("amount must be positive"));
    }
    if req.category.trim().is_empty() {
        return Err(AppError::bad_request("category is required"));
    }
    if req.is_recurring && req.recurring_interval.is_none() {
        return Err(AppError::bad_request(
            "recurring transactions need an interval",
        ));
    }
    if state.db.get_account(user_id, req.account_id)?.is_none() {
        return Err(AppError::not_found("account not found"));
    }

    let new = NewTransaction {
        account_id: req.account_id,
        kind: req.kind,
        amount: req.amount,
        category: req.category.trim().to_string(),
        description: req.description,
        date: req.date.unwrap_or_else(Utc::now),
        is_recurring: req.is_recurring,
        recurring_interval: req.recurring_interval,
        next_recurring_date: req.next_recurring_date,
    };

    let id = state.db.record_transaction(user_id, &new)?;
    state
        .db
        .log_audit(user_id, "create", Some("transaction"), Some(id), None)?;

    Ok(Json(CreateTransactionResponse {
        id,
        balance: state.db.total_balance(user_id)?,
    }))
}

#[derive(Debug, Serialize)]
pub struct ProcessRecurringResponse {
    pub materialized: usize,
}

/// POST /api/transactions/recurring/process - Materialize due recurring
/// templates. Normally scheduler-driven; exposed for manual runs.
pub async fn process_recurring(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ProcessRecurringResponse>, AppError> {
    let user_id = require_user(&headers)?;

    let materialized = state
        .db
        .process_due_recurring(user_id, Utc::now().date_naive())?;
    if materialized > 0 {
        state.db.log_audit(
            user_id,
            "process_recurring",
            Some("transaction"),
            None,
            Some(&format!("materialized={}", materialized)),
        )?;
    }

    Ok(Json(ProcessRecurringResponse { materialized }))
}
