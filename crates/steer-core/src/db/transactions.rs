//! Transaction recording and history queries
//!
//! Account balances are only ever mutated here, inside the same SQLite
//! transaction as the ledger row that explains the change. Nudge
//! executors reuse the `_tx` helpers so their ledger writes share the
//! transition's transaction.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Row};

use super::{fmt_datetime, parse_date, parse_datetime, Database};
use crate::error::Result;
use crate::models::{NewTransaction, RecurringInterval, Transaction, TransactionKind};
use crate::money::Money;

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let kind_str: String = row.get(3)?;
    let date_str: String = row.get(7)?;
    let interval_str: Option<String> = row.get(9)?;
    let next_date_str: Option<String> = row.get(10)?;
    let created_at_str: String = row.get(11)?;

    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_id: row.get(2)?,
        kind: kind_str.parse().unwrap_or(TransactionKind::Expense),
        amount: Money::from_minor(row.get(4)?),
        category: row.get(5)?,
        description: row.get(6)?,
        date: parse_datetime(&date_str),
        is_recurring: row.get(8)?,
        recurring_interval: interval_str.and_then(|s| s.parse::<RecurringInterval>().ok()),
        next_recurring_date: next_date_str.as_deref().and_then(parse_date),
        created_at: parse_datetime(&created_at_str),
    })
}

const TX_COLS: &str = "id, user_id, account_id, kind, amount, category, description, date, \
                       is_recurring, recurring_interval, next_recurring_date, created_at";

/// Insert a ledger row inside an open transaction
pub(crate) fn insert_transaction_tx(
    tx: &rusqlite::Transaction<'_>,
    user_id: i64,
    new: &NewTransaction,
) -> Result<i64> {
    tx.execute(
        "INSERT INTO transactions \
         (user_id, account_id, kind, amount, category, description, date, \
          is_recurring, recurring_interval, next_recurring_date) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            user_id,
            new.account_id,
            new.kind.as_str(),
            new.amount.minor(),
            new.category,
            new.description,
            fmt_datetime(new.date),
            new.is_recurring,
            new.recurring_interval.map(|i| i.as_str()),
            new.next_recurring_date.map(|d| d.to_string()),
        ],
    )?;

    Ok(tx.last_insert_rowid())
}

/// Advance a recurring template's next due date by its interval,
/// inside an open transaction
pub(crate) fn advance_recurring_tx(
    tx: &rusqlite::Transaction<'_>,
    transaction_id: i64,
) -> Result<()> {
    let row: Option<(Option<String>, Option<String>)> = tx
        .query_row(
            "SELECT recurring_interval, next_recurring_date FROM transactions \
             WHERE id = ? AND is_recurring = 1",
            params![transaction_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .ok();

    let Some((Some(interval_str), Some(next_str))) = row else {
        return Ok(());
    };
    let (Ok(interval), Some(next)) = (
        interval_str.parse::<RecurringInterval>(),
        parse_date(&next_str),
    ) else {
        return Ok(());
    };

    let advanced = next + Duration::days(interval.days());
    tx.execute(
        "UPDATE transactions SET next_recurring_date = ? WHERE id = ?",
        params![advanced.to_string(), transaction_id],
    )?;

    Ok(())
}

/// Apply a signed delta to an account balance inside an open transaction
pub(crate) fn adjust_balance_tx(
    tx: &rusqlite::Transaction<'_>,
    account_id: i64,
    delta: Money,
) -> Result<()> {
    tx.execute(
        "UPDATE accounts SET balance = balance + ? WHERE id = ?",
        params![delta.minor(), account_id],
    )?;

    Ok(())
}

impl Database {
    /// Record a transaction and settle it against the account balance,
    /// atomically.
    pub fn record_transaction(&self, user_id: i64, new: &NewTransaction) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let id = insert_transaction_tx(&tx, user_id, new)?;
        let delta = Money::from_minor(new.amount.minor() * new.kind.sign());
        adjust_balance_tx(&tx, new.account_id, delta)?;

        tx.commit()?;
        Ok(id)
    }

    /// Most recent transactions, newest first
    pub fn list_recent_transactions(&self, user_id: i64, limit: u32) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TX_COLS} FROM transactions WHERE user_id = ? ORDER BY date DESC LIMIT ?"
        ))?;

        let txs = stmt
            .query_map(params![user_id, limit], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(txs)
    }

    /// Transactions dated on or after `since`, oldest first
    pub fn list_transactions_since(
        &self,
        user_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TX_COLS} FROM transactions WHERE user_id = ? AND date >= ? ORDER BY date"
        ))?;

        let since_str = format!("{} 00:00:00", since);
        let txs = stmt
            .query_map(params![user_id, since_str], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(txs)
    }

    /// Recurring expenses falling due within the next `within_days`
    pub fn upcoming_recurring_expenses(
        &self,
        user_id: i64,
        within_days: i64,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let today = Utc::now().date_naive();
        let until = today + Duration::days(within_days);

        let mut stmt = conn.prepare(&format!(
            "SELECT {TX_COLS} FROM transactions \
             WHERE user_id = ? AND kind = 'expense' AND is_recurring = 1 \
               AND next_recurring_date IS NOT NULL \
               AND next_recurring_date >= ? AND next_recurring_date <= ? \
             ORDER BY next_recurring_date"
        ))?;

        let txs = stmt
            .query_map(
                params![user_id, today.to_string(), until.to_string()],
                row_to_transaction,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(txs)
    }

    /// Per-category expense totals between two datetimes
    pub fn category_spend_between(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(String, Money)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT category, SUM(amount) FROM transactions \
             WHERE user_id = ? AND kind = 'expense' AND date >= ? AND date < ? \
             GROUP BY category ORDER BY SUM(amount) DESC",
        )?;

        let rows = stmt
            .query_map(
                params![user_id, fmt_datetime(start), fmt_datetime(end)],
                |row| {
                    let category: String = row.get(0)?;
                    let total: i64 = row.get(1)?;
                    Ok((category, Money::from_minor(total)))
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Total expenses between two datetimes
    pub fn spend_between(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Money> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM transactions \
             WHERE user_id = ? AND kind = 'expense' AND date >= ? AND date < ?",
            params![user_id, fmt_datetime(start), fmt_datetime(end)],
            |row| row.get(0),
        )?;

        Ok(Money::from_minor(total))
    }

    /// Total income between two datetimes
    pub fn income_between(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Money> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM transactions \
             WHERE user_id = ? AND kind = 'income' AND date >= ? AND date < ?",
            params![user_id, fmt_datetime(start), fmt_datetime(end)],
            |row| row.get(0),
        )?;

        Ok(Money::from_minor(total))
    }

    /// Materialize recurring transactions whose next due date has passed.
    ///
    /// For each due template, inserts a concrete ledger row, settles the
    /// balance, and advances the template's next date by its interval.
    /// Returns the number of instances created.
    pub fn process_due_recurring(&self, user_id: i64, today: NaiveDate) -> Result<usize> {
        let due: Vec<Transaction> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {TX_COLS} FROM transactions \
                 WHERE user_id = ? AND is_recurring = 1 \
                   AND next_recurring_date IS NOT NULL AND next_recurring_date <= ?"
            ))?;
            let rows = stmt
                .query_map(params![user_id, today.to_string()], row_to_transaction)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        let mut created = 0;
        let mut conn = self.conn()?;
        for template in due {
            let (Some(interval), Some(due_date)) =
                (template.recurring_interval, template.next_recurring_date)
            else {
                continue;
            };

            let tx = conn.transaction()?;
            let instance = NewTransaction {
                account_id: template.account_id,
                kind: template.kind,
                amount: template.amount,
                category: template.category.clone(),
                description: template.description.clone(),
                date: due_date
                    .and_hms_opt(0, 0, 0)
                    .map(|dt| dt.and_utc())
                    .unwrap_or_else(Utc::now),
                is_recurring: false,
                recurring_interval: None,
                next_recurring_date: None,
            };
            insert_transaction_tx(&tx, user_id, &instance)?;
            let delta = Money::from_minor(instance.amount.minor() * instance.kind.sign());
            adjust_balance_tx(&tx, instance.account_id, delta)?;

            let next = due_date + Duration::days(interval.days());
            tx.execute(
                "UPDATE transactions SET next_recurring_date = ? WHERE id = ?",
                params![next.to_string(), template.id],
            )?;
            tx.commit()?;
            created += 1;
        }

        Ok(created)
    }
}
