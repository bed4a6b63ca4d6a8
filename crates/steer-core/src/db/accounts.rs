//! Account operations

use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Account, AccountKind};
use crate::money::Money;

fn row_to_account(row: &Row<'_>) -> rusqlite::Result<Account> {
    let kind_str: String = row.get(5)?;
    let created_at_str: String = row.get(6)?;

    Ok(Account {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        balance: Money::from_minor(row.get(3)?),
        is_default: row.get(4)?,
        kind: kind_str.parse().unwrap_or(AccountKind::Checking),
        created_at: parse_datetime(&created_at_str),
    })
}

const ACCOUNT_COLS: &str = "id, user_id, name, balance, is_default, kind, created_at";

impl Database {
    /// Create an account. Marking it default clears any previous default.
    pub fn create_account(
        &self,
        user_id: i64,
        name: &str,
        kind: AccountKind,
        balance: Money,
        is_default: bool,
    ) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if is_default {
            tx.execute(
                "UPDATE accounts SET is_default = 0 WHERE user_id = ?",
                params![user_id],
            )?;
        }

        tx.execute(
            "INSERT INTO accounts (user_id, name, balance, is_default, kind) VALUES (?, ?, ?, ?, ?)",
            params![user_id, name, balance.minor(), is_default, kind.as_str()],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(id)
    }

    /// List a user's accounts
    pub fn list_accounts(&self, user_id: i64) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLS} FROM accounts WHERE user_id = ? ORDER BY is_default DESC, name"
        ))?;

        let accounts = stmt
            .query_map(params![user_id], row_to_account)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(accounts)
    }

    /// Get an account by ID, scoped to the owning user
    pub fn get_account(&self, user_id: i64, id: i64) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLS} FROM accounts WHERE id = ? AND user_id = ?"),
                params![id, user_id],
                row_to_account,
            )
            .ok();

        Ok(account)
    }

    /// The account nudge-driven transfers settle against. Falls back to
    /// the first account when no default is marked.
    pub fn default_account(&self, user_id: i64) -> Result<Account> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                &format!(
                    "SELECT {ACCOUNT_COLS} FROM accounts WHERE user_id = ? \
                     ORDER BY is_default DESC, id LIMIT 1"
                ),
                params![user_id],
                row_to_account,
            )
            .ok();

        account.ok_or_else(|| Error::NotFound(format!("no account for user {}", user_id)))
    }

    /// Sum of balances across the user's accounts
    pub fn total_balance(&self, user_id: i64) -> Result<Money> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(balance), 0) FROM accounts WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;

        Ok(Money::from_minor(total))
    }

    /// All user ids with at least one account, for agent sweeps
    pub fn list_user_ids(&self) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT user_id FROM accounts ORDER BY user_id")?;

        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(ids)
    }
}
