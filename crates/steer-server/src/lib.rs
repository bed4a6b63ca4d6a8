//! Steer Web Server
//!
//! Axum-based REST API for the Steer proactive finance engine.
//!
//! Identity comes from the `X-User-Id` header: the server is designed to
//! sit behind a gateway that authenticates users and injects the header.
//! Requests without it are rejected.

use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use steer_core::{
    AgentRunner, Database, ExplainabilityService, NarrativeClient, NudgeGenerator, NudgeLifecycle,
    PersonalizationFilter,
};

mod handlers;
mod scheduler;

pub use scheduler::{start_agent_scheduler, AgentScheduleConfig};

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: u32 = 500;

/// Gateway-injected user identity header
const USER_ID_HEADER: &str = "x-user-id";

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub generator: NudgeGenerator,
    pub lifecycle: NudgeLifecycle,
    pub personalize: PersonalizationFilter,
    pub explain: ExplainabilityService,
    pub runner: AgentRunner,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        let narrative = NarrativeClient::from_env();
        if narrative.is_some() {
            info!("narrative backend configured");
        } else {
            info!("narrative backend not configured, explanations use the deterministic fallback");
        }

        Self {
            generator: NudgeGenerator::new(db.clone()),
            lifecycle: NudgeLifecycle::new(db.clone()),
            personalize: PersonalizationFilter::new(db.clone()),
            explain: ExplainabilityService::new(db.clone(), narrative),
            runner: AgentRunner::new(db.clone()),
            db,
        }
    }
}

/// Extract the authenticated user from request headers
pub fn require_user(headers: &HeaderMap) -> Result<i64, AppError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::unauthorized("Missing or invalid X-User-Id header"))
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(db: Database) -> Router {
    let state = Arc::new(AppState::new(db));

    let api_routes = Router::new()
        // Accounts
        .route(
            "/accounts",
            get(handlers::list_accounts).post(handlers::create_account),
        )
        .route("/accounts/:id", get(handlers::get_account))
        // Transactions
        .route(
            "/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .route(
            "/transactions/recurring/process",
            post(handlers::process_recurring),
        )
        // Budget
        .route(
            "/budget",
            get(handlers::get_budget).put(handlers::upsert_budget),
        )
        .route("/budget/lock", post(handlers::set_budget_lock))
        // Goals
        .route("/goals", get(handlers::list_goals).post(handlers::create_goal))
        .route("/goals/:id", get(handlers::get_goal))
        .route("/goals/:id/contribute", post(handlers::contribute_to_goal))
        .route("/goals/:id/status", post(handlers::set_goal_status))
        // Bills and envelopes
        .route("/bills", get(handlers::list_bills).post(handlers::create_bill))
        .route("/bills/due", get(handlers::bills_due))
        .route("/bills/:id/pay", post(handlers::pay_bill))
        .route(
            "/bills/:id/envelope",
            get(handlers::get_envelope).post(handlers::protect_bill),
        )
        // Nudges
        .route("/nudges", get(handlers::list_active_nudges))
        .route("/nudges/generate", post(handlers::generate_nudges))
        .route("/nudges/history", get(handlers::nudge_history))
        .route("/nudges/metrics", get(handlers::nudge_metrics))
        .route("/nudges/:id", get(handlers::get_nudge))
        .route("/nudges/:id/accept", post(handlers::accept_nudge))
        .route("/nudges/:id/reject", post(handlers::reject_nudge))
        .route("/nudges/:id/feedback", post(handlers::nudge_feedback))
        // Forecast, risk, rhythm
        .route("/forecast", get(handlers::get_forecast))
        .route("/risk", get(handlers::get_risk))
        .route("/risk/history", get(handlers::risk_history))
        .route("/rhythm", get(handlers::get_rhythm))
        // Explainability
        .route("/explain/nudges/:id", get(handlers::explain_nudge))
        .route("/explain/allowance", get(handlers::explain_allowance))
        .route("/explain/risk", get(handlers::explain_risk))
        // Agent safety
        .route("/safety", get(handlers::get_safety_state))
        .route("/safety/lock", post(handlers::set_safety_lock))
        // Agent passes (manual trigger, normally scheduler-driven)
        .route("/agents/run", post(handlers::run_agents))
        .route("/agents/digest", post(handlers::run_digest))
        // Audit log
        .route("/audit", get(handlers::list_audit_log));

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the server
pub async fn serve(db: Database, host: &str, port: u16) -> anyhow::Result<()> {
    // Finalize any nudges that expired while the server was down
    let lifecycle = NudgeLifecycle::new(db.clone());
    match lifecycle.sweep_expired(chrono::Utc::now()) {
        Ok(swept) if swept > 0 => info!(swept, "finalized expired nudges from previous session"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "startup expiry sweep failed"),
    }

    if let Some(config) = AgentScheduleConfig::from_env() {
        start_agent_scheduler(db.clone(), config);
    }

    let app = create_router(db);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "success": false,
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl From<steer_core::Error> for AppError {
    fn from(err: steer_core::Error) -> Self {
        match err {
            steer_core::Error::NotFound(what) => Self::not_found(&format!("{} not found", what)),
            steer_core::Error::AlreadyProcessed(what) => {
                Self::conflict(&format!("{} was already processed", what))
            }
            steer_core::Error::InvalidData(msg) => Self::bad_request(&msg),
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                // Return generic message to client
                message: "An internal error occurred".to_string(),
                internal: Some(other.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests;
