//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `cmd_init` - Initialize the database
//! - `cmd_status` - Show database status
//! - `cmd_accounts` - List accounts

use std::path::Path;

use anyhow::{Context, Result};
use steer_core::db::Database;

/// Open the database, running migrations if needed
pub fn open_db(db_path: &Path) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("database path must be valid UTF-8")?;
    Database::new(path_str).context("Failed to open database")
}

pub fn cmd_init(db_path: &Path) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    open_db(db_path)?;

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Record transactions via the API or start the web UI: steer serve");
    println!("  2. Generate suggestions: steer nudges generate");

    Ok(())
}

pub fn cmd_status(db_path: &Path) -> Result<()> {
    use std::fs;

    println!();
    println!("📊 Steer Status");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }

        match open_db(db_path) {
            Ok(db) => match db.list_user_ids() {
                Ok(users) => {
                    println!("   Users: {}", users.len());
                    for user_id in users {
                        let balance = db.total_balance(user_id)?;
                        let active = db.list_active_nudges(user_id, chrono::Utc::now())?;
                        println!(
                            "     user {} │ balance {} │ {} active nudge(s)",
                            user_id,
                            balance,
                            active.len()
                        );
                    }
                }
                Err(e) => println!("   ❌ Error reading users: {}", e),
            },
            Err(e) => println!("   ❌ Error opening database: {}", e),
        }
    } else {
        println!("   Size: (database not initialized)");
        println!();
        println!("   Run 'steer init' to create it.");
    }

    println!();
    Ok(())
}

pub fn cmd_accounts(db: &Database, user_id: i64) -> Result<()> {
    let accounts = db.list_accounts(user_id)?;

    if accounts.is_empty() {
        println!("No accounts found. Create one via the API:");
        println!("  POST /api/accounts");
        return Ok(());
    }

    println!();
    println!("📁 Accounts");
    println!("   ─────────────────────────────────────────────");

    for account in &accounts {
        let default_mark = if account.is_default { " (default)" } else { "" };
        println!(
            "   [{}] {} │ {} │ {}{}",
            account.id,
            account.name,
            account.kind.as_str(),
            account.balance,
            default_mark
        );
    }

    println!("   ─────────────────────────────────────────────");
    println!("   Total: {}", db.total_balance(user_id)?);

    Ok(())
}
