//! CLI command tests

use chrono::{Duration, Utc};
use steer_core::db::Database;
use steer_core::models::{AccountKind, NewNudge, NewTransaction, TransactionKind};
use steer_core::money::Money;
use steer_core::nudge::{NudgeLifecycle, NudgeType};

use crate::commands::{self, truncate};

fn setup_test_db(balance: Money) -> Database {
    let db = Database::in_memory().unwrap();
    db.create_account(1, "Main", AccountKind::Checking, balance, true)
        .unwrap();
    db
}

fn record_expense(db: &Database, amount: Money, days_ago: i64) {
    db.record_transaction(
        1,
        &NewTransaction {
            account_id: 1,
            kind: TransactionKind::Expense,
            amount,
            category: "groceries".into(),
            description: "groceries".into(),
            date: Utc::now() - Duration::days(days_ago),
            is_recurring: false,
            recurring_interval: None,
            next_recurring_date: None,
        },
    )
    .unwrap();
}

// ========== Argument Parsing ==========

#[test]
fn test_cli_parses_db_default_and_override() {
    use clap::Parser;

    let cli = crate::cli::Cli::try_parse_from(["steer", "status"]).unwrap();
    assert!(!cli.db.as_os_str().is_empty());

    let cli = crate::cli::Cli::try_parse_from(["steer", "--db", "custom.db", "status"]).unwrap();
    assert_eq!(cli.db, std::path::PathBuf::from("custom.db"));
}

// ========== Shared Utilities ==========

#[test]
fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
}

#[test]
fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
}

// ========== Core Commands ==========

#[test]
fn test_cmd_status_uninitialized_path() {
    let result = commands::cmd_status(std::path::Path::new("/nonexistent/steer.db"));
    assert!(result.is_ok());
}

#[test]
fn test_cmd_accounts_lists_balance() {
    let db = setup_test_db(Money::from_major(5000));
    let result = commands::cmd_accounts(&db, 1);
    assert!(result.is_ok());
}

#[test]
fn test_cmd_accounts_empty() {
    let db = Database::in_memory().unwrap();
    let result = commands::cmd_accounts(&db, 1);
    assert!(result.is_ok());
}

// ========== Nudge Commands ==========

#[test]
fn test_cmd_nudges_generate_persists_for_thin_balance() {
    let db = setup_test_db(Money::from_major(800));

    commands::cmd_nudges_generate(&db, 1).unwrap();

    let active = db.list_active_nudges(1, Utc::now()).unwrap();
    assert!(!active.is_empty());
    assert_eq!(active[0].nudge_type, NudgeType::EmergencyBuffer);
}

#[test]
fn test_cmd_nudges_accept_moves_money() {
    let db = setup_test_db(Money::from_major(5000));
    let lifecycle = NudgeLifecycle::new(db.clone());
    let nudge = lifecycle
        .create(
            NewNudge::new(
                1,
                NudgeType::AutoSave,
                "save",
                "spare budget",
                5,
                Utc::now() + Duration::hours(48),
            )
            .with_amount(Money::from_major(300)),
        )
        .unwrap();

    commands::cmd_nudges_accept(&db, 1, nudge.id).unwrap();

    assert_eq!(db.total_balance(1).unwrap(), Money::from_major(4700));
}

#[test]
fn test_cmd_nudges_accept_unknown_id_errors() {
    let db = setup_test_db(Money::from_major(5000));
    let result = commands::cmd_nudges_accept(&db, 1, 999);
    assert!(result.is_err());
}

#[test]
fn test_cmd_nudges_reject_then_accept_errors() {
    let db = setup_test_db(Money::from_major(5000));
    let lifecycle = NudgeLifecycle::new(db.clone());
    let nudge = lifecycle
        .create(
            NewNudge::new(
                1,
                NudgeType::AutoSave,
                "save",
                "spare budget",
                5,
                Utc::now() + Duration::hours(48),
            )
            .with_amount(Money::from_major(100)),
        )
        .unwrap();

    commands::cmd_nudges_reject(&db, 1, nudge.id).unwrap();

    let result = commands::cmd_nudges_accept(&db, 1, nudge.id);
    assert!(result.is_err());
    assert_eq!(db.total_balance(1).unwrap(), Money::from_major(5000));
}

#[test]
fn test_cmd_nudges_list_and_metrics() {
    let db = setup_test_db(Money::from_major(800));
    commands::cmd_nudges_generate(&db, 1).unwrap();

    assert!(commands::cmd_nudges_list(&db, 1).is_ok());
    assert!(commands::cmd_nudges_metrics(&db, 1).is_ok());
}

// ========== Insight Commands ==========

#[test]
fn test_cmd_forecast() {
    let db = setup_test_db(Money::from_major(5000));
    record_expense(&db, Money::from_major(200), 3);
    record_expense(&db, Money::from_major(150), 8);

    assert!(commands::cmd_forecast(&db, 1, 30).is_ok());
}

#[test]
fn test_cmd_risk_scores_and_persists_snapshot() {
    let db = setup_test_db(Money::from_major(400));
    record_expense(&db, Money::from_major(200), 2);

    assert!(commands::cmd_risk(&db, 1).is_ok());

    let snapshots = db.list_risk_snapshots(1, 10).unwrap();
    assert_eq!(snapshots.len(), 1);
}

#[test]
fn test_cmd_rhythm() {
    let db = setup_test_db(Money::from_major(5000));
    record_expense(&db, Money::from_major(50), 1);

    assert!(commands::cmd_rhythm(&db, 1).is_ok());
}

// ========== Agent Commands ==========

#[tokio::test]
async fn test_cmd_agents_run() {
    let db = setup_test_db(Money::from_major(2000));
    record_expense(&db, Money::from_major(300), 2);

    assert!(commands::cmd_agents_run(&db).await.is_ok());
}

#[tokio::test]
async fn test_cmd_agents_digest() {
    let db = setup_test_db(Money::from_major(2000));

    assert!(commands::cmd_agents_digest(&db).await.is_ok());
}
