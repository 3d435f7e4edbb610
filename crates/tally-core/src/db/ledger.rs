//! The unified transaction ledger
//!
//! Income and expense movements live in one table; each row carries a
//! running-balance snapshot. For a user's rows ordered by (date, id) every
//! snapshot equals the previous one plus the signed amount, with the first
//! entry starting from zero. Writes go through IMMEDIATE transactions so
//! concurrent writers cannot both read the same prior balance, and any
//! mutation that can invalidate later snapshots (edit, delete, backdated
//! insert) recomputes them before committing.

use chrono::{Datelike, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{
    BalanceSummary, EntryKind, NewTransaction, Transaction, TransactionUpdate,
};

/// Maximum number of entries a recent-history query may return
pub const MAX_RECENT_LIMIT: i64 = 1000;

const TX_COLUMNS: &str = "t.id, t.user_id, t.kind, t.amount_cents, t.category_id, c.name, \
     t.description, t.date, t.balance_cents, t.created_at";

fn map_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row
            .get::<_, String>(2)?
            .parse()
            .unwrap_or(EntryKind::Expense),
        amount_cents: row.get(3)?,
        category_id: row.get(4)?,
        category: row.get(5)?,
        description: row.get(6)?,
        date: row
            .get::<_, String>(7)?
            .parse()
            .unwrap_or_else(|_| Utc::now().date_naive()),
        balance_cents: row.get(8)?,
        created_at: parse_datetime(&row.get::<_, String>(9)?),
    })
}

/// Check that a category is visible to the user and matches the entry kind
fn check_category(conn: &Connection, category_id: i64, user_id: i64, kind: EntryKind) -> Result<()> {
    let row: Option<String> = conn
        .query_row(
            "SELECT kind FROM categories WHERE id = ? AND (user_id IS NULL OR user_id = ?)",
            params![category_id, user_id],
            |row| row.get(0),
        )
        .optional()?;

    match row {
        None => Err(Error::not_found(format!(
            "Category {} not found",
            category_id
        ))),
        Some(k) if k != kind.as_str() => Err(Error::validation(format!(
            "Category {} is not an {} category",
            category_id, kind
        ))),
        Some(_) => Ok(()),
    }
}

/// Rewrite every snapshot for a user in (date, id) order
///
/// Runs inside the caller's transaction; only rows whose snapshot actually
/// changed are written.
fn recompute_balances(conn: &Connection, user_id: i64) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, amount_cents, balance_cents FROM transactions \
         WHERE user_id = ? ORDER BY date ASC, id ASC",
    )?;
    let rows: Vec<(i64, String, i64, i64)> = stmt
        .query_map(params![user_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<rusqlite::Result<_>>()?;

    let mut running = 0i64;
    let mut rewritten = 0usize;
    for (id, kind, amount, snapshot) in rows {
        let sign = kind
            .parse::<EntryKind>()
            .unwrap_or(EntryKind::Expense)
            .sign();
        running += sign * amount;
        if snapshot != running {
            conn.execute(
                "UPDATE transactions SET balance_cents = ? WHERE id = ?",
                params![running, id],
            )?;
            rewritten += 1;
        }
    }

    if rewritten > 0 {
        debug!(user_id, rewritten, "Rewrote running-balance snapshots");
    }
    Ok(())
}

impl Database {
    /// Record an income or expense movement and its balance snapshot
    pub fn record_transaction(&self, user_id: i64, new: &NewTransaction) -> Result<Transaction> {
        if new.amount_cents <= 0 {
            return Err(Error::validation("Amount must be a positive number"));
        }
        if new.description.trim().is_empty() {
            return Err(Error::validation("Description must not be empty"));
        }

        let date = new.date.unwrap_or_else(|| Utc::now().date_naive());

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(cat) = new.category_id {
            check_category(&tx, cat, user_id, new.kind)?;
        }

        // Latest prior entry by ledger order; zero when the ledger is empty
        let latest: Option<(i64, String)> = tx
            .query_row(
                "SELECT balance_cents, date FROM transactions \
                 WHERE user_id = ? ORDER BY date DESC, id DESC LIMIT 1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let appending = latest
            .as_ref()
            .map(|(_, latest_date)| {
                latest_date
                    .parse::<NaiveDate>()
                    .map(|d| d <= date)
                    .unwrap_or(true)
            })
            .unwrap_or(true);

        let prior = latest.map(|(balance, _)| balance).unwrap_or(0);
        let balance = prior + new.kind.sign() * new.amount_cents;

        tx.execute(
            r#"
            INSERT INTO transactions (user_id, kind, amount_cents, category_id, description, date, balance_cents)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                user_id,
                new.kind.as_str(),
                new.amount_cents,
                new.category_id,
                new.description,
                date.to_string(),
                balance,
            ],
        )?;
        let id = tx.last_insert_rowid();

        // A backdated entry lands mid-ledger, so later snapshots are stale
        if !appending {
            recompute_balances(&tx, user_id)?;
        }

        let inserted = tx.query_row(
            &format!(
                "SELECT {} FROM transactions t LEFT JOIN categories c ON t.category_id = c.id WHERE t.id = ?",
                TX_COLUMNS
            ),
            params![id],
            map_transaction,
        )?;

        tx.commit()?;
        Ok(inserted)
    }

    /// Fetch one ledger entry scoped to its owner
    pub fn get_transaction(&self, id: i64, user_id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                &format!(
                    "SELECT {} FROM transactions t LEFT JOIN categories c ON t.category_id = c.id \
                     WHERE t.id = ? AND t.user_id = ?",
                    TX_COLUMNS
                ),
                params![id, user_id],
                map_transaction,
            )
            .optional()?;
        Ok(tx)
    }

    /// Most recent entries, newest first
    pub fn recent_transactions(&self, user_id: i64, limit: i64) -> Result<Vec<Transaction>> {
        self.list_transactions(user_id, None, limit)
    }

    /// List entries, optionally filtered to one kind, newest first
    pub fn list_transactions(
        &self,
        user_id: i64,
        kind: Option<EntryKind>,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        let limit = limit.clamp(1, MAX_RECENT_LIMIT);
        let conn = self.conn()?;

        let mut conditions = vec!["t.user_id = ?".to_string()];
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id)];
        if let Some(k) = kind {
            conditions.push("t.kind = ?".to_string());
            values.push(Box::new(k.as_str()));
        }
        values.push(Box::new(limit));

        let sql = format!(
            "SELECT {} FROM transactions t LEFT JOIN categories c ON t.category_id = c.id \
             WHERE {} ORDER BY t.date DESC, t.id DESC LIMIT ?",
            TX_COLUMNS,
            conditions.join(" AND ")
        );
        let refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(refs.as_slice(), map_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Sum of all amounts of one kind for a user
    pub fn kind_total(&self, user_id: i64, kind: EntryKind) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM transactions WHERE user_id = ? AND kind = ?",
            params![user_id, kind.as_str()],
            |row| row.get(0),
        )?)
    }

    /// Balance overview: current balance plus monthly expense comparison
    pub fn get_balance(&self, user_id: i64) -> Result<BalanceSummary> {
        let conn = self.conn()?;

        let balance: i64 = conn
            .query_row(
                "SELECT balance_cents FROM transactions \
                 WHERE user_id = ? ORDER BY date DESC, id DESC LIMIT 1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        let total_income: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM transactions WHERE user_id = ? AND kind = 'income'",
            params![user_id],
            |row| row.get(0),
        )?;

        let today = Utc::now().date_naive();
        let month_start = today.with_day0(0).unwrap_or(today);
        let next_month_start = month_start
            .checked_add_months(chrono::Months::new(1))
            .unwrap_or(month_start);
        let prev_month_start = month_start
            .checked_sub_months(chrono::Months::new(1))
            .unwrap_or(month_start);

        let expense_between = |from: NaiveDate, to: NaiveDate| -> Result<i64> {
            Ok(conn.query_row(
                "SELECT COALESCE(SUM(amount_cents), 0) FROM transactions \
                 WHERE user_id = ? AND kind = 'expense' AND date >= ? AND date < ?",
                params![user_id, from.to_string(), to.to_string()],
                |row| row.get(0),
            )?)
        };

        let current = expense_between(month_start, next_month_start)?;
        let previous = expense_between(prev_month_start, month_start)?;

        // Division-by-zero policy: a month appearing from nothing is +100%
        let change = if previous == 0 {
            if current > 0 {
                100.0
            } else {
                0.0
            }
        } else {
            (current - previous) as f64 / previous as f64 * 100.0
        };

        Ok(BalanceSummary {
            balance_cents: balance,
            total_income_cents: total_income,
            current_month_expense_cents: current,
            previous_month_expense_cents: previous,
            expense_change_pct: change,
        })
    }

    /// Apply a partial update and repair every affected snapshot
    pub fn update_transaction(
        &self,
        id: i64,
        user_id: i64,
        patch: &TransactionUpdate,
    ) -> Result<Transaction> {
        if patch.is_empty() {
            return Err(Error::validation("No fields to update"));
        }
        if let Some(amount) = patch.amount_cents {
            if amount <= 0 {
                return Err(Error::validation("Amount must be a positive number"));
            }
        }
        if let Some(desc) = &patch.description {
            if desc.trim().is_empty() {
                return Err(Error::validation("Description must not be empty"));
            }
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let kind: Option<String> = tx
            .query_row(
                "SELECT kind FROM transactions WHERE id = ? AND user_id = ?",
                params![id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        let kind: EntryKind = kind
            .ok_or_else(|| Error::not_found(format!("Transaction {} not found", id)))?
            .parse()
            .unwrap_or(EntryKind::Expense);

        if let Some(cat) = patch.category_id {
            check_category(&tx, cat, user_id, kind)?;
        }

        let mut sets = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(amount) = patch.amount_cents {
            sets.push("amount_cents = ?");
            values.push(Box::new(amount));
        }
        if let Some(desc) = &patch.description {
            sets.push("description = ?");
            values.push(Box::new(desc.clone()));
        }
        if let Some(cat) = patch.category_id {
            sets.push("category_id = ?");
            values.push(Box::new(cat));
        }
        if let Some(date) = patch.date {
            sets.push("date = ?");
            values.push(Box::new(date.to_string()));
        }
        values.push(Box::new(id));
        values.push(Box::new(user_id));

        let sql = format!(
            "UPDATE transactions SET {} WHERE id = ? AND user_id = ?",
            sets.join(", ")
        );
        let refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        tx.execute(&sql, refs.as_slice())?;

        recompute_balances(&tx, user_id)?;

        let updated = tx.query_row(
            &format!(
                "SELECT {} FROM transactions t LEFT JOIN categories c ON t.category_id = c.id WHERE t.id = ?",
                TX_COLUMNS
            ),
            params![id],
            map_transaction,
        )?;

        tx.commit()?;
        Ok(updated)
    }

    /// Remove an entry and repair every affected snapshot
    pub fn delete_transaction(&self, id: i64, user_id: i64) -> Result<()> {
        self.delete_transaction_impl(id, user_id, None)
    }

    /// Remove an entry, additionally checking its kind
    ///
    /// Backs the /income/:id and /expenses/:id delete routes, which must not
    /// reach across to the other kind.
    pub fn delete_transaction_of_kind(&self, id: i64, user_id: i64, kind: EntryKind) -> Result<()> {
        self.delete_transaction_impl(id, user_id, Some(kind))
    }

    fn delete_transaction_impl(
        &self,
        id: i64,
        user_id: i64,
        kind: Option<EntryKind>,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let deleted = match kind {
            Some(k) => tx.execute(
                "DELETE FROM transactions WHERE id = ? AND user_id = ? AND kind = ?",
                params![id, user_id, k.as_str()],
            )?,
            None => tx.execute(
                "DELETE FROM transactions WHERE id = ? AND user_id = ?",
                params![id, user_id],
            )?,
        };

        if deleted == 0 {
            return Err(Error::not_found(format!("Transaction {} not found", id)));
        }

        recompute_balances(&tx, user_id)?;
        tx.commit()?;
        Ok(())
    }

    /// Count of ledger entries (used by `tally status`)
    pub fn count_transactions(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?)
    }
}
