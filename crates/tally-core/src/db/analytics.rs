//! Read-only analytics over the ledger
//!
//! Pure aggregation queries; nothing here writes.

use chrono::{Datelike, Duration, Months, NaiveDate, Utc};
use rusqlite::params;

use super::Database;
use crate::error::Result;
use crate::models::{CategoryBreakdown, EntryKind, ExportRow, MonthlyRollup, PeriodSummary};

impl Database {
    /// Income/expense totals for the trailing 30 days
    pub fn basic_summary(&self, user_id: i64) -> Result<PeriodSummary> {
        let to = Utc::now().date_naive();
        let from = to - Duration::days(30);
        self.range_summary(user_id, from, to)
    }

    /// Income/expense totals for an arbitrary date range (inclusive)
    pub fn range_summary(&self, user_id: i64, from: NaiveDate, to: NaiveDate) -> Result<PeriodSummary> {
        let conn = self.conn()?;

        let total_for = |kind: EntryKind| -> Result<i64> {
            Ok(conn.query_row(
                "SELECT COALESCE(SUM(amount_cents), 0) FROM transactions \
                 WHERE user_id = ? AND kind = ? AND date BETWEEN ? AND ?",
                params![user_id, kind.as_str(), from.to_string(), to.to_string()],
                |row| row.get(0),
            )?)
        };

        let income = total_for(EntryKind::Income)?;
        let expenses = total_for(EntryKind::Expense)?;

        Ok(PeriodSummary {
            from,
            to,
            income_cents: income,
            expense_cents: expenses,
            net_cents: income - expenses,
        })
    }

    /// Per-month income/expense rollup for the trailing `months` months,
    /// oldest first; months with no activity appear as zeros
    pub fn monthly_rollup(&self, user_id: i64, months: u32) -> Result<Vec<MonthlyRollup>> {
        let conn = self.conn()?;

        let today = Utc::now().date_naive();
        let anchor = today
            .checked_sub_months(Months::new(months.saturating_sub(1)))
            .unwrap_or(today);
        // Snap to the first so the oldest month is counted in full
        let from = anchor.with_day0(0).unwrap_or(anchor);

        let mut stmt = conn.prepare(
            r#"
            SELECT strftime('%Y-%m', date) AS month,
                   COALESCE(SUM(CASE WHEN kind = 'income' THEN amount_cents ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN kind = 'expense' THEN amount_cents ELSE 0 END), 0)
            FROM transactions
            WHERE user_id = ? AND date >= ?
            GROUP BY month
            ORDER BY month
            "#,
        )?;
        let totals: Vec<(String, i64, i64)> = stmt
            .query_map(params![user_id, from.to_string()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<_>>()?;

        // Walk the month labels so empty months still show up
        let mut rollup = Vec::with_capacity(months as usize);
        for i in 0..months {
            let month_date = from
                .checked_add_months(Months::new(i))
                .unwrap_or(from);
            let label = month_date.format("%Y-%m").to_string();
            let (income, expenses) = totals
                .iter()
                .find(|(m, _, _)| *m == label)
                .map(|(_, inc, exp)| (*inc, *exp))
                .unwrap_or((0, 0));

            // Null-safe ratio: no income means no meaningful percentage
            let ratio = if income > 0 {
                Some(expenses as f64 / income as f64 * 100.0)
            } else {
                None
            };

            rollup.push(MonthlyRollup {
                month: label,
                income_cents: income,
                expense_cents: expenses,
                expense_ratio_pct: ratio,
            });
        }
        Ok(rollup)
    }

    /// Expense share per category over a range
    pub fn category_breakdown(
        &self,
        user_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CategoryBreakdown>> {
        let conn = self.conn()?;

        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM transactions \
             WHERE user_id = ? AND kind = 'expense' AND date BETWEEN ? AND ?",
            params![user_id, from.to_string(), to.to_string()],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            r#"
            SELECT COALESCE(c.name, 'Uncategorized'),
                   COALESCE(SUM(t.amount_cents), 0),
                   COUNT(*)
            FROM transactions t
            LEFT JOIN categories c ON t.category_id = c.id
            WHERE t.user_id = ? AND t.kind = 'expense' AND t.date BETWEEN ? AND ?
            GROUP BY c.name
            ORDER BY SUM(t.amount_cents) DESC
            "#,
        )?;
        let rows = stmt
            .query_map(
                params![user_id, from.to_string(), to.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .map(|(category, amount, count)| CategoryBreakdown {
                category,
                amount_cents: amount,
                percentage: if total > 0 {
                    amount as f64 / total as f64 * 100.0
                } else {
                    0.0
                },
                transaction_count: count,
            })
            .collect())
    }

    /// Every transaction flattened for export, tagged with its report kind,
    /// oldest first
    pub fn export_rows(&self, user_id: i64) -> Result<Vec<ExportRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT t.id, t.date, t.kind, t.amount_cents, c.name, t.description, t.balance_cents
            FROM transactions t
            LEFT JOIN categories c ON t.category_id = c.id
            WHERE t.user_id = ?
            ORDER BY t.date ASC, t.id ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                let kind: String = row.get(2)?;
                let kind = kind.parse().unwrap_or(EntryKind::Expense);
                Ok(ExportRow {
                    report: format!("{}_report", kind.as_str()),
                    id: row.get(0)?,
                    date: row
                        .get::<_, String>(1)?
                        .parse()
                        .unwrap_or_else(|_| Utc::now().date_naive()),
                    kind,
                    amount_cents: row.get(3)?,
                    category: row.get(4)?,
                    description: row.get(5)?,
                    balance_cents: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
