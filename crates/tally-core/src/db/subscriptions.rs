//! Subscription rows and feature access

use chrono::{Months, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use super::{format_datetime, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::features::tier_allows;
use crate::models::{Subscription, Tier};

fn map_subscription(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        tier: row.get::<_, String>(2)?.parse().unwrap_or(Tier::Free),
        started_at: parse_datetime(&row.get::<_, String>(3)?),
        ends_at: row.get::<_, Option<String>>(4)?.map(|s| parse_datetime(&s)),
        active: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

const SUB_COLUMNS: &str = "id, user_id, tier, started_at, ends_at, active, created_at";

/// Shared lookup so the lazy-create path works inside larger transactions
pub(crate) fn get_or_create_subscription(conn: &Connection, user_id: i64) -> Result<Subscription> {
    let existing = conn
        .query_row(
            &format!("SELECT {} FROM subscriptions WHERE user_id = ?", SUB_COLUMNS),
            params![user_id],
            map_subscription,
        )
        .optional()?;

    if let Some(sub) = existing {
        return Ok(sub);
    }

    conn.execute(
        "INSERT INTO subscriptions (user_id, tier) VALUES (?, 'free')",
        params![user_id],
    )?;
    let id = conn.last_insert_rowid();

    let sub = conn.query_row(
        &format!("SELECT {} FROM subscriptions WHERE id = ?", SUB_COLUMNS),
        params![id],
        map_subscription,
    )?;
    Ok(sub)
}

/// Upsert a subscription to the given tier; paid tiers get a fresh
/// one-month window
pub(crate) fn set_subscription_tier(
    conn: &Connection,
    user_id: i64,
    tier: Tier,
) -> Result<Subscription> {
    let now = Utc::now();
    let ends = if tier.is_paid() {
        Some(format_datetime(
            now.checked_add_months(Months::new(1)).unwrap_or(now),
        ))
    } else {
        None
    };

    conn.execute(
        r#"
        INSERT INTO subscriptions (user_id, tier, started_at, ends_at, active)
        VALUES (?, ?, ?, ?, 1)
        ON CONFLICT(user_id) DO UPDATE SET
            tier = excluded.tier,
            started_at = excluded.started_at,
            ends_at = excluded.ends_at,
            active = 1
        "#,
        params![user_id, tier.as_str(), format_datetime(now), ends],
    )?;

    let sub = conn.query_row(
        &format!("SELECT {} FROM subscriptions WHERE user_id = ?", SUB_COLUMNS),
        params![user_id],
        map_subscription,
    )?;
    Ok(sub)
}

impl Database {
    /// The user's subscription, created lazily as free
    pub fn get_or_create_subscription(&self, user_id: i64) -> Result<Subscription> {
        let conn = self.conn()?;
        get_or_create_subscription(&conn, user_id)
    }

    /// Move a user to a tier, refreshing the paid window
    pub fn set_subscription_tier(&self, user_id: i64, tier: &str) -> Result<Subscription> {
        let tier: Tier = tier
            .parse()
            .map_err(|e: String| Error::validation(e))?;

        let conn = self.conn()?;
        let sub = set_subscription_tier(&conn, user_id, tier)?;
        info!(user_id, tier = %tier, "Subscription tier updated");
        Ok(sub)
    }

    /// Whether the user's tier grants a named feature
    ///
    /// Users without a subscription row get a free row on first query, so
    /// repeated calls answer consistently.
    pub fn has_feature_access(&self, user_id: i64, feature: &str) -> Result<bool> {
        let sub = self.get_or_create_subscription(user_id)?;
        Ok(tier_allows(sub.tier, feature))
    }

    /// Like [`Self::has_feature_access`] but errors when the tier denies
    /// the feature, carrying the feature name for the caller
    pub fn require_feature_access(&self, user_id: i64, feature: &str) -> Result<()> {
        if self.has_feature_access(user_id, feature)? {
            Ok(())
        } else {
            info!(user_id, feature, "Feature denied for current tier");
            Err(Error::Authorization {
                feature: feature.to_string(),
            })
        }
    }
}
