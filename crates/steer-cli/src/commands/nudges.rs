//! Nudge command implementations

use anyhow::Result;
use chrono::Utc;
use steer_core::db::Database;
use steer_core::nudge::{NudgeGenerator, NudgeLifecycle, PersonalizationFilter};

use super::truncate;

pub fn cmd_nudges_list(db: &Database, user_id: i64) -> Result<()> {
    let nudges = db.list_active_nudges(user_id, Utc::now())?;

    if nudges.is_empty() {
        println!("✅ No active nudges. Run 'steer nudges generate' to evaluate the rules now.");
        return Ok(());
    }

    println!();
    println!("💡 Active Nudges");
    println!("   ─────────────────────────────────────────────────────────────");

    for nudge in &nudges {
        let amount_str = nudge
            .amount
            .map(|a| format!(" │ {}", a))
            .unwrap_or_default();
        println!(
            "   [{}] p{} {}{}",
            nudge.id, nudge.priority, nudge.nudge_type, amount_str
        );
        println!("       {}", truncate(&nudge.message, 72));
    }

    println!();
    println!("   Use 'steer nudges accept <id>' or 'steer nudges reject <id>'.");

    Ok(())
}

pub fn cmd_nudges_generate(db: &Database, user_id: i64) -> Result<()> {
    println!("🔍 Evaluating nudge rules...");

    let personalize = PersonalizationFilter::new(db.clone());
    if !personalize.should_send_nudge_now(user_id, Utc::now())? {
        println!("   Daily send cap reached; nothing generated.");
        return Ok(());
    }

    let generator = NudgeGenerator::new(db.clone());
    let lifecycle = NudgeLifecycle::new(db.clone());

    let profile = db.get_profile(user_id)?;
    let candidates = generator.generate(user_id)?;
    let survivors = personalize.filter(candidates, &profile);

    if survivors.is_empty() {
        println!("✅ Nothing to suggest. Your finances look on track.");
        return Ok(());
    }

    println!();
    for new in survivors {
        let nudge = lifecycle.create(new)?;
        println!(
            "   [{}] p{} {} │ {}",
            nudge.id,
            nudge.priority,
            nudge.nudge_type,
            truncate(&nudge.message, 60)
        );
    }

    Ok(())
}

pub fn cmd_nudges_accept(db: &Database, user_id: i64, id: i64) -> Result<()> {
    let lifecycle = NudgeLifecycle::new(db.clone());
    let nudge = lifecycle.accept(user_id, id)?;

    println!("✅ Executed nudge {}: {}", id, truncate(&nudge.message, 60));
    if let Some(impact) = nudge.impact {
        println!("   Measured impact: {}", impact);
    }
    println!("   Balance: {}", db.total_balance(user_id)?);

    Ok(())
}

pub fn cmd_nudges_reject(db: &Database, user_id: i64, id: i64) -> Result<()> {
    let lifecycle = NudgeLifecycle::new(db.clone());
    let nudge = lifecycle.reject(user_id, id)?;

    println!("🚫 Rejected nudge {}: {}", id, truncate(&nudge.message, 60));

    Ok(())
}

pub fn cmd_nudges_metrics(db: &Database, user_id: i64) -> Result<()> {
    let lifecycle = NudgeLifecycle::new(db.clone());
    let metrics = lifecycle.metrics(user_id)?;

    println!();
    println!("📈 Nudge Metrics");
    println!("   ─────────────────────────────");
    println!("   Total: {}", metrics.total);
    println!("   Executed: {}", metrics.executed);
    println!("   Rejected: {}", metrics.rejected);
    println!("   Expired: {}", metrics.expired);
    println!("   Pending: {}", metrics.pending);
    println!("   Acceptance rate: {:.1}%", metrics.acceptance_rate);
    println!("   Total impact: {}", metrics.total_impact);

    Ok(())
}
