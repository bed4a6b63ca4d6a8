//! Steer CLI - Proactive financial autopilot
//!
//! Usage:
//!   steer init                 Initialize database
//!   steer nudges generate      Evaluate nudge rules now
//!   steer forecast --days 30   Project the balance
//!   steer serve --port 3000    Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db),
        Commands::Status => commands::cmd_status(&cli.db),
        Commands::Accounts => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_accounts(&db, cli.user)
        }
        Commands::Nudges { action } => {
            let db = commands::open_db(&cli.db)?;
            match action {
                None | Some(NudgesAction::List) => commands::cmd_nudges_list(&db, cli.user),
                Some(NudgesAction::Generate) => commands::cmd_nudges_generate(&db, cli.user),
                Some(NudgesAction::Accept { id }) => commands::cmd_nudges_accept(&db, cli.user, id),
                Some(NudgesAction::Reject { id }) => commands::cmd_nudges_reject(&db, cli.user, id),
                Some(NudgesAction::Metrics) => commands::cmd_nudges_metrics(&db, cli.user),
            }
        }
        Commands::Forecast { days } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_forecast(&db, cli.user, days)
        }
        Commands::Risk => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_risk(&db, cli.user)
        }
        Commands::Rhythm => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_rhythm(&db, cli.user)
        }
        Commands::Agents { action } => {
            let db = commands::open_db(&cli.db)?;
            match action {
                AgentsAction::Run => commands::cmd_agents_run(&db).await,
                AgentsAction::Digest => commands::cmd_agents_digest(&db).await,
            }
        }
        Commands::Serve { port, host } => commands::cmd_serve(&cli.db, &host, port).await,
    }
}
