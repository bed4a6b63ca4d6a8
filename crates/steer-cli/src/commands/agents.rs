//! Manual agent pass commands

use anyhow::Result;
use steer_core::db::Database;
use steer_core::AgentRunner;

pub async fn cmd_agents_run(db: &Database) -> Result<()> {
    println!("🤖 Running automation agents...");

    let runner = AgentRunner::new(db.clone());
    let summary = runner.run_all().await;

    println!();
    println!("📊 Agent Pass Results");
    println!("   ─────────────────────────────");
    println!("   Users visited: {}", summary.users);
    println!("   Skipped (locked): {}", summary.skipped_locked);
    println!("   Nudges created: {}", summary.nudges_created);
    println!("   Failures: {}", summary.failures);

    if summary.failures > 0 {
        println!();
        println!("⚠️  Some agents failed; check the logs for details.");
    }

    Ok(())
}

pub async fn cmd_agents_digest(db: &Database) -> Result<()> {
    println!("🌙 Running nightly digest...");

    let runner = AgentRunner::new(db.clone());
    let summary = runner.run_digest().await;

    println!("   Users visited: {}", summary.users);
    println!("   Failures: {}", summary.failures);

    Ok(())
}
