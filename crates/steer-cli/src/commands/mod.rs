//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `agents` - Manual agent passes (run, digest)
//! - `core` - Core commands (init, status, accounts) and shared utilities (open_db)
//! - `insights` - Read-side insights (forecast, risk, rhythm)
//! - `nudges` - Nudge commands (list, generate, accept, reject, metrics)
//! - `serve` - Web server command

pub mod agents;
pub mod core;
pub mod insights;
pub mod nudges;
pub mod serve;

// Re-export command functions for main.rs
pub use agents::*;
pub use core::*;
pub use insights::*;
pub use nudges::*;
pub use serve::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max.saturating_sub(3)])
    }
}
