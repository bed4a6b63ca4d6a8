//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use steer_core::db::Database;
use steer_core::models::AccountKind;
use steer_core::money::Money;
use tower::ServiceExt;

fn setup_test_app() -> (Database, Router) {
    let db = Database::in_memory().unwrap();
    (db.clone(), create_router(db))
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-user-id", "1")
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-user-id", "1")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_health_needs_no_identity() {
    let (_db, app) = setup_test_app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let (_db, app) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/accounts")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = get_body_json(response).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("X-User-Id"));
}

#[tokio::test]
async fn test_create_and_list_accounts() {
    let (_db, app) = setup_test_app();

    let body = serde_json::json!({
        "name": "Main",
        "kind": "checking",
        "balance": 500_000,
        "is_default": true
    });
    let response = app
        .clone()
        .oneshot(post("/api/accounts", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/api/accounts")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["accounts"].as_array().unwrap().len(), 1);
    assert_eq!(json["total_balance"], 500_000);
}

#[tokio::test]
async fn test_transaction_settles_balance() {
    let (db, app) = setup_test_app();
    db.create_account(1, "Main", AccountKind::Checking, Money::from_major(5000), true)
        .unwrap();

    let body = serde_json::json!({
        "account_id": 1,
        "kind": "expense",
        "amount": 30_000,
        "category": "groceries"
    });
    let response = app.oneshot(post("/api/transactions", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["balance"], 470_000);
    assert_eq!(db.total_balance(1).unwrap(), Money::from_major(4700));
}

#[tokio::test]
async fn test_negative_amount_is_rejected() {
    let (db, app) = setup_test_app();
    db.create_account(1, "Main", AccountKind::Checking, Money::from_major(5000), true)
        .unwrap();

    let body = serde_json::json!({
        "account_id": 1,
        "kind": "expense",
        "amount": -100,
        "category": "groceries"
    });
    let response = app.oneshot(post("/api/transactions", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_nudge_accept_then_reject_conflicts() {
    let (db, app) = setup_test_app();
    db.create_account(1, "Main", AccountKind::Checking, Money::from_major(800), true)
        .unwrap();

    // Generate persists the emergency-buffer nudge for a thin balance
    let response = app
        .clone()
        .oneshot(post("/api/nudges/generate", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    let created = json["created"].as_array().unwrap();
    assert!(!created.is_empty());
    let id = created[0]["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/nudges/{}/accept", id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["status"], "executed");

    // The terminal transition is final
    let response = app
        .oneshot(post(
            &format!("/api/nudges/{}/reject", id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_nudge_is_not_found() {
    let (db, app) = setup_test_app();
    db.create_account(1, "Main", AccountKind::Checking, Money::from_major(5000), true)
        .unwrap();

    let response = app.oneshot(get("/api/nudges/999")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_forecast_and_risk_endpoints() {
    let (db, app) = setup_test_app();
    db.create_account(1, "Main", AccountKind::Checking, Money::from_major(5000), true)
        .unwrap();

    let response = app
        .clone()
        .oneshot(get("/api/forecast?days=7"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["predictions"].as_array().unwrap().len(), 7);

    let response = app.oneshot(get("/api/risk")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert!(json["assessment"]["score"].is_number());

    // Scoring persisted a snapshot
    let snapshots = db.list_risk_snapshots(1, 10).unwrap();
    assert_eq!(snapshots.len(), 1);
}

#[tokio::test]
async fn test_safety_lock_round_trip() {
    let (db, app) = setup_test_app();
    db.create_account(1, "Main", AccountKind::Checking, Money::from_major(5000), true)
        .unwrap();

    // Locking without a reason is invalid
    let response = app
        .clone()
        .oneshot(post("/api/safety/lock", serde_json::json!({ "locked": true })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(post(
            "/api/safety/lock",
            serde_json::json!({ "locked": true, "reason": "manual review" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["autopilot_locked"], true);

    let response = app.oneshot(get("/api/safety")).await.unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["autopilot_locked"], true);
    assert_eq!(json["reason"], "manual review");
}

#[tokio::test]
async fn test_explain_allowance() {
    let (db, app) = setup_test_app();
    db.create_account(1, "Main", AccountKind::Checking, Money::from_major(20_000), true)
        .unwrap();

    let response = app.oneshot(get("/api/explain/allowance")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    // (20000 - 2000 reserve) / 30 days = 600/day
    assert_eq!(json["daily_allowance"], 60_000);
}
