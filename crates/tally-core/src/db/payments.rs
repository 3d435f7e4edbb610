//! Payment bridge
//!
//! Applies a verified external payment: optionally creates the account
//! inline, records the payment for the audit trail, and upserts the
//! subscription to pro with a one-month window. Everything runs in one
//! SQLite transaction; a failure at any step leaves nothing behind.

use rusqlite::{params, Row, TransactionBehavior};
use tracing::info;

use super::subscriptions::set_subscription_tier;
use super::users::insert_user_row;
use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{NewUser, Payment, PaymentOrder, Subscription, Tier};

/// The provider status required before anything is written
const COMPLETED_STATUS: &str = "COMPLETED";

fn map_payment(row: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount_cents: row.get(2)?,
        method: row.get(3)?,
        external_id: row.get(4)?,
        status: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

impl Database {
    /// Apply a verified payment order
    ///
    /// `user_id` is the authenticated caller, if any; `registration` is used
    /// to create an account inline when there is none. Returns the resolved
    /// user id, the recorded payment, and the resulting subscription.
    pub fn apply_payment(
        &self,
        user_id: Option<i64>,
        order: &PaymentOrder,
        registration: Option<&NewUser>,
    ) -> Result<(i64, Payment, Subscription)> {
        if !order.status.eq_ignore_ascii_case(COMPLETED_STATUS) {
            return Err(Error::PaymentVerification {
                status: order.status.clone(),
            });
        }
        if order.amount_cents <= 0 {
            return Err(Error::validation(
                "Payment amount must be a positive number",
            ));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let user_id = match (user_id, registration) {
            (Some(id), _) => id,
            (None, Some(new)) => insert_user_row(&tx, new)?.0,
            (None, None) => {
                return Err(Error::validation(
                    "Payment requires an authenticated user or registration details",
                ));
            }
        };

        tx.execute(
            r#"
            INSERT INTO payments (user_id, amount_cents, method, external_id, status, metadata)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                user_id,
                order.amount_cents,
                order.method,
                order.external_id,
                order.status,
                serde_json::to_string(&order.metadata)?,
            ],
        )?;
        let payment_id = tx.last_insert_rowid();

        let subscription = set_subscription_tier(&tx, user_id, Tier::Pro)?;

        let payment = tx.query_row(
            "SELECT id, user_id, amount_cents, method, external_id, status, created_at \
             FROM payments WHERE id = ?",
            params![payment_id],
            map_payment,
        )?;

        tx.commit()?;

        info!(
            user_id,
            external_id = %order.external_id,
            "Payment applied, subscription upgraded to pro"
        );
        Ok((user_id, payment, subscription))
    }

    /// Payment history for a user, newest first
    pub fn list_payments(&self, user_id: i64) -> Result<Vec<Payment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, amount_cents, method, external_id, status, created_at \
             FROM payments WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], map_payment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Count of payment records (used by `tally status`)
    pub fn count_payments(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM payments", [], |row| row.get(0))?)
    }
}
