//! Integration tests for steer-core
//!
//! These tests exercise the full generate → personalize → accept/reject
//! workflow and the scheduled agent passes against a real database.

use chrono::{Duration, Utc};
use steer_core::{
    db::Database,
    models::{AccountKind, NewNudge, NewTransaction, NudgeStatus, TransactionKind},
    money::Money,
    nudge::{NudgeGenerator, NudgeLifecycle, NudgeType, PersonalizationFilter},
    AgentRunner, Error,
};

fn seed_user(db: &Database, user_id: i64, balance: i64) {
    db.create_account(user_id, "Main", AccountKind::Checking, Money::from_major(balance), true)
        .unwrap();
}

fn seed_history(db: &Database, user_id: i64) {
    for day in [2, 5, 9] {
        db.record_transaction(
            user_id,
            &NewTransaction {
                account_id: user_id,
                kind: TransactionKind::Expense,
                amount: Money::from_major(200),
                category: "groceries".into(),
                description: "weekly shop".into(),
                date: Utc::now() - Duration::days(day),
                is_recurring: false,
                recurring_interval: None,
                next_recurring_date: None,
            },
        )
        .unwrap();
    }
}

#[test]
fn test_low_balance_generates_emergency_nudge_pipeline() {
    let db = Database::in_memory().unwrap();
    // Three 200 expenses land the balance at exactly 800
    seed_user(&db, 1, 1400);
    seed_history(&db, 1);

    let generator = NudgeGenerator::new(db.clone());
    let candidates = generator.generate(1).unwrap();

    // A balance of 800 must produce exactly one emergency-buffer nudge
    // at top priority asking for the 200 gap
    let emergencies: Vec<_> = candidates
        .iter()
        .filter(|n| n.nudge_type == NudgeType::EmergencyBuffer)
        .collect();
    assert_eq!(emergencies.len(), 1);
    assert_eq!(emergencies[0].priority, 10);
    assert_eq!(emergencies[0].amount, Some(Money::from_major(200)));

    // Priorities come out strictly descending
    for pair in candidates.windows(2) {
        assert!(pair[0].priority >= pair[1].priority);
    }

    // Personalization passes the emergency through for a fresh profile
    let profile = db.get_profile(1).unwrap();
    let filter = PersonalizationFilter::new(db.clone());
    let filtered = filter.filter(candidates, &profile);
    assert!(filtered
        .iter()
        .any(|n| n.nudge_type == NudgeType::EmergencyBuffer));

    // Persist and accept: emergency buffers are advisory, so the
    // transition lands without moving ledger money
    let lifecycle = NudgeLifecycle::new(db.clone());
    let nudge = filtered
        .into_iter()
        .find(|n| n.nudge_type == NudgeType::EmergencyBuffer)
        .unwrap();
    let created = lifecycle.create(nudge).unwrap();
    let executed = lifecycle.accept(1, created.id).unwrap();
    assert_eq!(executed.status, NudgeStatus::Executed);
    assert_eq!(executed.impact, Some(Money::ZERO));
    assert_eq!(db.total_balance(1).unwrap(), Money::from_major(800));
}

#[test]
fn test_concurrent_accept_and_reject_has_one_winner() {
    let db = Database::in_memory().unwrap();
    seed_user(&db, 1, 5000);

    let lifecycle = NudgeLifecycle::new(db.clone());
    let nudge = NewNudge::new(
        1,
        NudgeType::AutoSave,
        "save 300",
        "slack in budget",
        5,
        Utc::now() + Duration::hours(48),
    )
    .with_amount(Money::from_major(300));
    let created = lifecycle.create(nudge).unwrap();

    let accept_side = {
        let lifecycle = NudgeLifecycle::new(db.clone());
        let id = created.id;
        std::thread::spawn(move || lifecycle.accept(1, id))
    };
    let reject_side = {
        let lifecycle = NudgeLifecycle::new(db.clone());
        let id = created.id;
        std::thread::spawn(move || lifecycle.reject(1, id))
    };

    let accept = accept_side.join().unwrap();
    let reject = reject_side.join().unwrap();

    // Exactly one transition wins; the loser sees AlreadyProcessed
    let winners = [accept.is_ok(), reject.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(winners, 1);
    for result in [accept, reject] {
        if let Err(e) = result {
            assert!(matches!(e, Error::AlreadyProcessed(_)));
        }
    }

    // The stored row is terminal and consistent with the winner
    let stored = db.get_nudge(1, created.id).unwrap().unwrap();
    assert_ne!(stored.status, NudgeStatus::Pending);
    if stored.status == NudgeStatus::Executed {
        assert_eq!(db.total_balance(1).unwrap(), Money::from_major(4700));
    } else {
        assert_eq!(db.total_balance(1).unwrap(), Money::from_major(5000));
    }
}

#[test]
fn test_expired_nudge_is_invisible_but_unmutated() {
    let db = Database::in_memory().unwrap();
    seed_user(&db, 1, 5000);

    let lifecycle = NudgeLifecycle::new(db.clone());
    let nudge = NewNudge::new(
        1,
        NudgeType::SpendingAlert,
        "watch dining",
        "category alert",
        3,
        Utc::now() - Duration::hours(1),
    );
    let created = lifecycle.create(nudge).unwrap();

    // Read-time filtering hides it without touching the row
    assert!(db.list_active_nudges(1, Utc::now()).unwrap().is_empty());
    let stored = db.get_nudge(1, created.id).unwrap().unwrap();
    assert_eq!(stored.status, NudgeStatus::Pending);

    // Accepting an expired nudge fails and the sweep finalizes it
    assert!(lifecycle.accept(1, created.id).is_err());
    lifecycle.sweep_expired(Utc::now()).unwrap();
    let stored = db.get_nudge(1, created.id).unwrap().unwrap();
    assert_eq!(stored.status, NudgeStatus::Expired);
}

#[tokio::test]
async fn test_agent_pass_skips_locked_users() {
    let db = Database::in_memory().unwrap();

    // User 1 is heading for a shortfall; user 2 is identical but locked
    for user_id in [1, 2] {
        seed_user(&db, user_id, 2000);
        for day in 1..30 {
            db.record_transaction(
                user_id,
                &NewTransaction {
                    account_id: user_id,
                    kind: TransactionKind::Expense,
                    amount: Money::from_major(300),
                    category: "general".into(),
                    description: "spend".into(),
                    date: Utc::now() - Duration::days(day),
                    is_recurring: false,
                    recurring_interval: None,
                    next_recurring_date: None,
                },
            )
            .unwrap();
        }
    }
    db.set_autopilot_lock(2, true, Some("anomaly review"), Utc::now())
        .unwrap();

    let runner = AgentRunner::new(db.clone());
    let summary = runner.run_all().await;

    assert_eq!(summary.users, 2);
    assert_eq!(summary.skipped_locked, 1);
    assert!(summary.nudges_created >= 1);
    assert_eq!(summary.failures, 0);

    // Only the unlocked user accumulated automated nudges
    assert!(!db.list_nudge_history(1, 10).unwrap().is_empty());
    assert!(db.list_nudge_history(2, 10).unwrap().is_empty());
}

#[tokio::test]
async fn test_digest_pass_skips_locked_users() {
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use steer_core::notify::{Notification, Notifier};

    #[derive(Default)]
    struct CapturingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for CapturingNotifier {
        async fn send(&self, notification: Notification) {
            self.sent.lock().unwrap().push(notification);
        }
    }

    let db = Database::in_memory().unwrap();
    let lifecycle = NudgeLifecycle::new(db.clone());

    // Both users had automated activity in the last day; user 2 is locked
    for user_id in [1, 2] {
        seed_user(&db, user_id, 5000);
        let nudge = NewNudge::new(
            user_id,
            NudgeType::MicroSave,
            "saved for you",
            "autopilot",
            6,
            Utc::now() + Duration::hours(48),
        )
        .with_amount(Money::from_major(100))
        .automated();
        lifecycle.create(nudge).unwrap();
    }
    db.set_autopilot_lock(2, true, Some("anomaly review"), Utc::now())
        .unwrap();

    let notifier = Arc::new(CapturingNotifier::default());
    let runner = AgentRunner::with_notifier(db, notifier.clone());
    let summary = runner.run_digest().await;

    assert_eq!(summary.users, 2);
    assert_eq!(summary.skipped_locked, 1);
    assert_eq!(summary.failures, 0);

    // Only the unlocked user got a digest
    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, 1);
}

#[test]
fn test_metrics_track_the_whole_lifecycle() {
    let db = Database::in_memory().unwrap();
    seed_user(&db, 1, 50_000);
    let lifecycle = NudgeLifecycle::new(db.clone());

    let mut ids = Vec::new();
    for i in 0..5 {
        let nudge = NewNudge::new(
            1,
            NudgeType::AutoSave,
            format!("save round {}", i),
            "slack in budget",
            5,
            Utc::now() + Duration::hours(48),
        )
        .with_amount(Money::from_major(100))
        .with_dedupe_key(format!("itest:{}", i));
        ids.push(lifecycle.create(nudge).unwrap().id);
    }

    lifecycle.accept(1, ids[0]).unwrap();
    lifecycle.accept(1, ids[1]).unwrap();
    lifecycle.accept(1, ids[2]).unwrap();
    lifecycle.reject(1, ids[3]).unwrap();

    let metrics = lifecycle.metrics(1).unwrap();
    assert_eq!(metrics.total, 5);
    assert_eq!(metrics.executed, 3);
    assert_eq!(metrics.rejected, 1);
    assert_eq!(metrics.pending, 1);
    assert_eq!(metrics.acceptance_rate, 60.0);
    // Auto-saves count their full amount as impact
    assert_eq!(metrics.total_impact, Money::from_major(300));
}
