//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

use axum::Json;

pub mod accounts;
pub mod agents;
pub mod audit;
pub mod bills;
pub mod budgets;
pub mod explain;
pub mod forecast;
pub mod goals;
pub mod nudges;
pub mod safety;
pub mod transactions;

// Re-export all handlers for use in router
pub use accounts::*;
pub use agents::*;
pub use audit::*;
pub use bills::*;
pub use budgets::*;
pub use explain::*;
pub use forecast::*;
pub use goals::*;
pub use nudges::*;
pub use safety::*;
pub use transactions::*;

/// GET /health - liveness probe
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
