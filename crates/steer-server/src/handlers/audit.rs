//! Audit log handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use crate::{require_user, AppError, AppState, MAX_PAGE_LIMIT};
use steer_core::AuditEntry;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    /// Max results (default: 100)
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

/// GET /api/audit - The user's audit trail, newest first
pub async fn list_audit_log(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    let user_id = require_user(&headers)?;
    let limit = params.limit.min(MAX_PAGE_LIMIT);

    Ok(Json(state.db.list_audit_entries(user_id, limit)?))
}
