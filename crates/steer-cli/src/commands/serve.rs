//! Server command implementation

use std::path::Path;

use anyhow::Result;

use super::open_db;

pub async fn cmd_serve(db_path: &Path, host: &str, port: u16) -> Result<()> {
    println!("🚀 Starting Steer web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);
    println!("   Identity: X-User-Id header (gateway-injected)");

    if std::env::var("STEER_AGENT_SCHEDULE").is_ok() {
        println!("   🤖 Agent scheduler: enabled (STEER_AGENT_SCHEDULE)");
    } else {
        println!("   💡 Tip: Set STEER_AGENT_SCHEDULE=4 for periodic agent passes");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path)?;
    steer_server::serve(db, host, port).await?;

    Ok(())
}
