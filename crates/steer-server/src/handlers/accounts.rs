//! Account handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{require_user, AppError, AppState};
use steer_core::models::{Account, AccountKind};
use steer_core::money::Money;

/// Request body for creating an account
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,
    pub kind: AccountKind,
    /// Opening balance in minor units
    #[serde(default)]
    pub balance: Money,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Serialize)]
pub struct AccountsResponse {
    pub accounts: Vec<Account>,
    pub total_balance: Money,
}

/// GET /api/accounts - List accounts with the combined balance
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AccountsResponse>, AppError> {
    let user_id = require_user(&headers)?;

    let accounts = state.db.list_accounts(user_id)?;
    let total_balance = state.db.total_balance(user_id)?;

    Ok(Json(AccountsResponse {
        accounts,
        total_balance,
    }))
}

/// GET /api/accounts/:id - Get one account
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Account>, AppError> {
    let user_id = require_user(&headers)?;

    let account = state
        .db
        .get_account(user_id, id)?
        .ok_or_else(|| AppError::not_found("account not found"))?;

    Ok(Json(account))
}

/// POST /api/accounts - Create an account
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateAccountRequest>,
) -> Result<Json<Account>, AppError> {
    let user_id = require_user(&headers)?;

    if req.name.trim().is_empty() {
        return Err(AppError::bad_request("account name is required"));
    }

    let id = state.db.create_account(
        user_id,
        req.name.trim(),
        req.kind,
        req.balance,
        req.is_default,
    )?;
    state
        .db
        .log_audit(user_id, "create", Some("account"), Some(id), None)?;

    let account = state
        .db
        .get_account(user_id, id)?
        .ok_or_else(|| AppError::not_found("account not found"))?;

    Ok(Json(account))
}
