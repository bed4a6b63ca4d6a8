//! Bill and bill-envelope operations

use chrono::{Duration, NaiveDate, Utc};
use rusqlite::{params, Row};

use super::{parse_date, Database};
use crate::error::{Error, Result};
use crate::models::{Bill, BillEnvelope, EnvelopeStatus};
use crate::money::Money;

fn row_to_bill(row: &Row<'_>) -> rusqlite::Result<Bill> {
    let due_str: String = row.get(5)?;

    Ok(Bill {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        amount: Money::from_minor(row.get(3)?),
        due_day: row.get(4)?,
        next_due_date: parse_date(&due_str).unwrap_or_default(),
        is_paid: row.get(6)?,
        auto_pay_enabled: row.get(7)?,
        category: row.get(8)?,
    })
}

fn row_to_envelope(row: &Row<'_>) -> rusqlite::Result<BillEnvelope> {
    let until_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;

    Ok(BillEnvelope {
        id: row.get(0)?,
        bill_id: row.get(1)?,
        protected_amount: Money::from_minor(row.get(2)?),
        locked_until: parse_date(&until_str).unwrap_or_default(),
        status: status_str.parse().unwrap_or(EnvelopeStatus::Released),
    })
}

const BILL_COLS: &str =
    "id, user_id, name, amount, due_day, next_due_date, is_paid, auto_pay_enabled, category";

/// Mark a bill paid for the current cycle inside an open transaction:
/// roll the due date a month forward and release any active envelope.
pub(crate) fn settle_bill_tx(tx: &rusqlite::Transaction<'_>, bill_id: i64) -> Result<()> {
    let due_str: Option<String> = tx
        .query_row(
            "SELECT next_due_date FROM bills WHERE id = ?",
            params![bill_id],
            |row| row.get(0),
        )
        .ok();
    let Some(due) = due_str.as_deref().and_then(parse_date) else {
        return Err(Error::NotFound(format!("bill {}", bill_id)));
    };

    let next = due
        .checked_add_months(chrono::Months::new(1))
        .unwrap_or(due + Duration::days(30));
    tx.execute(
        "UPDATE bills SET is_paid = 0, next_due_date = ? WHERE id = ?",
        params![next.to_string(), bill_id],
    )?;
    tx.execute(
        "UPDATE bill_envelopes SET status = 'released' WHERE bill_id = ? AND status = 'active'",
        params![bill_id],
    )?;

    Ok(())
}

/// Create or refresh a bill's envelope inside an open transaction
pub(crate) fn upsert_envelope_tx(
    tx: &rusqlite::Transaction<'_>,
    bill_id: i64,
    protected_amount: Money,
    locked_until: NaiveDate,
) -> Result<()> {
    tx.execute(
        "INSERT INTO bill_envelopes (bill_id, protected_amount, locked_until, status) \
         VALUES (?, ?, ?, 'active') \
         ON CONFLICT(bill_id) DO UPDATE SET \
           protected_amount = excluded.protected_amount, \
           locked_until = excluded.locked_until, \
           status = 'active'",
        params![bill_id, protected_amount.minor(), locked_until.to_string()],
    )?;

    Ok(())
}

impl Database {
    pub fn create_bill(
        &self,
        user_id: i64,
        name: &str,
        amount: Money,
        due_day: u32,
        next_due_date: NaiveDate,
        auto_pay_enabled: bool,
        category: &str,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO bills (user_id, name, amount, due_day, next_due_date, auto_pay_enabled, category) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                user_id,
                name,
                amount.minor(),
                due_day,
                next_due_date.to_string(),
                auto_pay_enabled,
                category
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    pub fn get_bill(&self, user_id: i64, id: i64) -> Result<Option<Bill>> {
        let conn = self.conn()?;
        let bill = conn
            .query_row(
                &format!("SELECT {BILL_COLS} FROM bills WHERE id = ? AND user_id = ?"),
                params![id, user_id],
                row_to_bill,
            )
            .ok();

        Ok(bill)
    }

    /// Unpaid bills due within the next `within_days`, soonest first
    pub fn bills_due_within(&self, user_id: i64, within_days: i64) -> Result<Vec<Bill>> {
        let conn = self.conn()?;
        let today = Utc::now().date_naive();
        let until = today + Duration::days(within_days);

        let mut stmt = conn.prepare(&format!(
            "SELECT {BILL_COLS} FROM bills \
             WHERE user_id = ? AND is_paid = 0 AND next_due_date <= ? \
             ORDER BY next_due_date"
        ))?;

        let bills = stmt
            .query_map(params![user_id, until.to_string()], row_to_bill)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(bills)
    }

    pub fn list_bills(&self, user_id: i64) -> Result<Vec<Bill>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {BILL_COLS} FROM bills WHERE user_id = ? ORDER BY next_due_date"
        ))?;

        let bills = stmt
            .query_map(params![user_id], row_to_bill)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(bills)
    }

    /// Mark a bill paid and roll its due date forward a month. Any
    /// active envelope on the bill is released in the same transaction.
    pub fn mark_bill_paid(&self, user_id: i64, bill_id: i64) -> Result<()> {
        if self.get_bill(user_id, bill_id)?.is_none() {
            return Err(Error::NotFound(format!("bill {}", bill_id)));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        settle_bill_tx(&tx, bill_id)?;
        tx.commit()?;

        Ok(())
    }

    /// Create or refresh the envelope protecting cash for a bill
    pub fn upsert_envelope(
        &self,
        bill_id: i64,
        protected_amount: Money,
        locked_until: NaiveDate,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO bill_envelopes (bill_id, protected_amount, locked_until, status) \
             VALUES (?, ?, ?, 'active') \
             ON CONFLICT(bill_id) DO UPDATE SET \
               protected_amount = excluded.protected_amount, \
               locked_until = excluded.locked_until, \
               status = 'active'",
            params![bill_id, protected_amount.minor(), locked_until.to_string()],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM bill_envelopes WHERE bill_id = ?",
            params![bill_id],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    pub fn get_envelope(&self, bill_id: i64) -> Result<Option<BillEnvelope>> {
        let conn = self.conn()?;
        let envelope = conn
            .query_row(
                "SELECT id, bill_id, protected_amount, locked_until, status \
                 FROM bill_envelopes WHERE bill_id = ?",
                params![bill_id],
                row_to_envelope,
            )
            .ok();

        Ok(envelope)
    }

    /// Sum of active envelope reservations across a user's bills.
    /// Subtracted from spendable cash by the allowance calculation.
    pub fn protected_amount(&self, user_id: i64) -> Result<Money> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(e.protected_amount), 0) \
             FROM bill_envelopes e JOIN bills b ON b.id = e.bill_id \
             WHERE b.user_id = ? AND e.status = 'active'",
            params![user_id],
            |row| row.get(0),
        )?;

        Ok(Money::from_minor(total))
    }

    /// Release envelopes whose lock date has passed. Returns how many
    /// were released.
    pub fn release_expired_envelopes(&self, today: NaiveDate) -> Result<usize> {
        let conn = self.conn()?;
        let released = conn.execute(
            "UPDATE bill_envelopes SET status = 'released' \
             WHERE status = 'active' AND locked_until < ?",
            params![today.to_string()],
        )?;

        Ok(released)
    }
}
