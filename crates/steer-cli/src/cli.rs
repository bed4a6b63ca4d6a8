//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

fn default_db() -> PathBuf {
    std::env::var_os("STEER_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("steer.db"))
}

/// Steer - Proactive financial autopilot
#[derive(Parser)]
#[command(name = "steer")]
#[command(about = "Self-hosted financial autopilot with agentic nudges", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path (also via STEER_DB)
    #[arg(long, default_value_os_t = default_db(), global = true)]
    pub db: PathBuf,

    /// User to act as
    #[arg(long, default_value = "1", global = true)]
    pub user: i64,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Show database status
    Status,

    /// List accounts and balances
    Accounts,

    /// Manage nudges (list, generate, accept, reject, metrics)
    Nudges {
        #[command(subcommand)]
        action: Option<NudgesAction>,
    },

    /// Project the balance over the coming days
    Forecast {
        /// Horizon in days (1-90)
        #[arg(long, default_value = "30")]
        days: u32,
    },

    /// Score the current financial risk
    Risk,

    /// Analyze income and spending rhythm
    Rhythm,

    /// Run automation agents
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

#[derive(Subcommand)]
pub enum NudgesAction {
    /// List active nudges, highest priority first
    List,

    /// Evaluate the nudge rules and persist what survives
    Generate,

    /// Accept a nudge (executes its financial action)
    Accept {
        /// Nudge ID
        id: i64,
    },

    /// Reject a nudge
    Reject {
        /// Nudge ID
        id: i64,
    },

    /// Show lifetime nudge metrics
    Metrics,
}

#[derive(Subcommand)]
pub enum AgentsAction {
    /// One full periodic agent pass over all users
    Run,

    /// One nightly digest pass over all users
    Digest,
}
