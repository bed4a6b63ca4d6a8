//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `accounts` - Ledger account operations
//! - `transactions` - Transaction recording and history queries
//! - `budgets` - Budget and lock-flag operations
//! - `goals` - Savings goal operations
//! - `bills` - Bills and bill envelope reservations
//! - `nudges` - Nudge persistence, CAS transitions, dedupe upserts
//! - `profiles` - Financial profile (learned personalization state)
//! - `safety` - Risk snapshots and the agent safety lock
//! - `audit` - API access audit log

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::Result;

mod accounts;
mod audit;
pub(crate) mod bills;
mod budgets;
pub(crate) mod goals;
mod nudges;
mod profiles;
mod safety;
pub(crate) mod transactions;

pub use audit::AuditEntry;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Format a DateTime<Utc> the way SQLite stores it
pub(crate) fn fmt_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parse a SQLite date string
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool at the given path
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` so that every pooled
    /// connection sees the same database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!(
            "{}/steer_test_{}_{}.db",
            std::env::temp_dir().display(),
            std::process::id(),
            id
        );

        let _ = std::fs::remove_file(&path);

        Self::new(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL mode: better concurrency, readers don't block writers
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Ledger accounts
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                balance INTEGER NOT NULL DEFAULT 0,        -- minor units
                is_default BOOLEAN NOT NULL DEFAULT 0,
                kind TEXT NOT NULL DEFAULT 'checking',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id);

            -- Ledger transactions. Amounts are positive; direction is in kind.
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                account_id INTEGER NOT NULL REFERENCES accounts(id),
                kind TEXT NOT NULL,                        -- income, expense
                amount INTEGER NOT NULL CHECK (amount > 0),
                category TEXT NOT NULL DEFAULT 'general',
                description TEXT NOT NULL,
                date DATETIME NOT NULL,
                is_recurring BOOLEAN NOT NULL DEFAULT 0,
                recurring_interval TEXT,                   -- weekly, monthly, yearly
                next_recurring_date DATE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, date);
            CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id);
            CREATE INDEX IF NOT EXISTS idx_transactions_recurring ON transactions(is_recurring, next_recurring_date);

            -- Budgets. The application assumes one active budget per user.
            CREATE TABLE IF NOT EXISTS budgets (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL UNIQUE,
                amount INTEGER NOT NULL,
                is_locked BOOLEAN NOT NULL DEFAULT 0,
                last_alert_sent DATETIME
            );

            -- Savings goals
            CREATE TABLE IF NOT EXISTS goals (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                target_amount INTEGER NOT NULL,
                saved_amount INTEGER NOT NULL DEFAULT 0,
                target_date DATE NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',     -- active, completed, abandoned
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_goals_user_status ON goals(user_id, status);

            -- Bills
            CREATE TABLE IF NOT EXISTS bills (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                amount INTEGER NOT NULL,
                due_day INTEGER NOT NULL,
                next_due_date DATE NOT NULL,
                is_paid BOOLEAN NOT NULL DEFAULT 0,
                auto_pay_enabled BOOLEAN NOT NULL DEFAULT 0,
                category TEXT NOT NULL DEFAULT 'bills'
            );

            CREATE INDEX IF NOT EXISTS idx_bills_user_due ON bills(user_id, next_due_date);

            -- Bill envelopes: soft reservations, not real sub-accounts
            CREATE TABLE IF NOT EXISTS bill_envelopes (
                id INTEGER PRIMARY KEY,
                bill_id INTEGER NOT NULL REFERENCES bills(id),
                protected_amount INTEGER NOT NULL,
                locked_until DATE NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',     -- active, released
                UNIQUE(bill_id)
            );

            -- Nudges. dedupe_key is the idempotency key for agent
            -- suppression windows; the UNIQUE constraint replaces the
            -- racy check-then-act window queries.
            CREATE TABLE IF NOT EXISTS nudges (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                nudge_type TEXT NOT NULL,
                amount INTEGER,
                message TEXT NOT NULL,
                reason TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',    -- pending, executed, rejected, expired
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                responded_at DATETIME,
                executed_at DATETIME,
                expires_at DATETIME NOT NULL,
                impact INTEGER,
                metadata TEXT NOT NULL DEFAULT 'null',     -- JSON: risk context, automation info
                feedback_rating INTEGER,
                was_helpful BOOLEAN,
                dismiss_reason TEXT,
                automated BOOLEAN NOT NULL DEFAULT 0,
                dedupe_key TEXT UNIQUE
            );

            CREATE INDEX IF NOT EXISTS idx_nudges_user_status ON nudges(user_id, status);
            CREATE INDEX IF NOT EXISTS idx_nudges_user_type ON nudges(user_id, nudge_type, created_at);
            CREATE INDEX IF NOT EXISTS idx_nudges_expires ON nudges(status, expires_at);

            -- Financial profiles: learned per-user personalization state
            CREATE TABLE IF NOT EXISTS financial_profiles (
                user_id INTEGER PRIMARY KEY,
                preferred_nudge_types TEXT NOT NULL DEFAULT '[]',  -- JSON array
                disliked_nudge_types TEXT NOT NULL DEFAULT '[]',   -- JSON array
                frequency_pref TEXT NOT NULL DEFAULT 'normal',     -- low, normal, high
                optimal_nudge_hour INTEGER,
                auto_nudge_enabled BOOLEAN NOT NULL DEFAULT 0,
                prefers_summary BOOLEAN NOT NULL DEFAULT 0,
                priority_threshold INTEGER NOT NULL DEFAULT 0,
                income_rhythm TEXT,                                -- JSON cache
                spend_rhythm TEXT,                                 -- JSON cache
                spending_style TEXT,
                last_personalization_update DATETIME
            );

            -- Risk snapshots: append-only audit of risk computations
            CREATE TABLE IF NOT EXISTS risk_snapshots (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                risk_level TEXT NOT NULL,
                risk_score INTEGER NOT NULL,
                drivers TEXT NOT NULL,                             -- JSON array
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_risk_snapshots_user ON risk_snapshots(user_id, created_at);

            -- Agent safety: the watchdog lock checked by every automated path
            CREATE TABLE IF NOT EXISTS agent_safety (
                user_id INTEGER PRIMARY KEY,
                autopilot_locked BOOLEAN NOT NULL DEFAULT 0,
                reason TEXT,
                locked_at DATETIME
            );

            -- Audit log (tracks API access)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                user_id INTEGER NOT NULL,
                action TEXT NOT NULL,
                entity_type TEXT,
                entity_id INTEGER,
                details TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_log_user ON audit_log(user_id);
            CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log(timestamp);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
