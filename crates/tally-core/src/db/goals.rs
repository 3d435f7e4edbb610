//! Savings goal operations

use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_datetime, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Goal, GoalUpdate, NewGoal};

/// Default target window when no target date is supplied
const DEFAULT_TARGET_DAYS: i64 = 30;

fn map_goal(row: &Row<'_>) -> rusqlite::Result<Goal> {
    Ok(Goal {
        id: row.get(0)?,
        user_id: row.get(1)?,
        target_cents: row.get(2)?,
        description: row.get(3)?,
        target_date: row
            .get::<_, String>(4)?
            .parse()
            .unwrap_or_else(|_| Utc::now().date_naive()),
        is_completed: row.get(5)?,
        completed_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

const GOAL_COLUMNS: &str =
    "id, user_id, target_cents, description, target_date, completed, completed_at, created_at";

impl Database {
    /// Create a goal; target date defaults to 30 days out
    pub fn create_goal(&self, user_id: i64, new: &NewGoal) -> Result<Goal> {
        if new.target_cents <= 0 {
            return Err(Error::validation("Goal amount must be a positive number"));
        }
        if new.description.trim().is_empty() {
            return Err(Error::validation("Goal description must not be empty"));
        }

        let target_date = new
            .target_date
            .unwrap_or_else(|| Utc::now().date_naive() + Duration::days(DEFAULT_TARGET_DAYS));

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO goals (user_id, target_cents, description, target_date) VALUES (?, ?, ?, ?)",
            params![
                user_id,
                new.target_cents,
                new.description,
                target_date.to_string()
            ],
        )?;
        let id = conn.last_insert_rowid();

        let goal = conn.query_row(
            &format!("SELECT {} FROM goals WHERE id = ?", GOAL_COLUMNS),
            params![id],
            map_goal,
        )?;
        Ok(goal)
    }

    /// All goals for a user, newest first
    pub fn list_goals(&self, user_id: i64) -> Result<Vec<Goal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM goals WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            GOAL_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![user_id], map_goal)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// The primary goal: most recently created, not yet completed
    pub fn primary_goal(&self, user_id: i64) -> Result<Option<Goal>> {
        let conn = self.conn()?;
        let goal = conn
            .query_row(
                &format!(
                    "SELECT {} FROM goals WHERE user_id = ? AND completed = 0 \
                     ORDER BY created_at DESC, id DESC LIMIT 1",
                    GOAL_COLUMNS
                ),
                params![user_id],
                map_goal,
            )
            .optional()?;
        Ok(goal)
    }

    /// Apply a partial goal update
    pub fn update_goal(&self, id: i64, user_id: i64, patch: &GoalUpdate) -> Result<Goal> {
        if patch.is_empty() {
            return Err(Error::validation("No fields to update"));
        }
        if let Some(amount) = patch.target_cents {
            if amount <= 0 {
                return Err(Error::validation("Goal amount must be a positive number"));
            }
        }

        let conn = self.conn()?;

        let mut sets = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(amount) = patch.target_cents {
            sets.push("target_cents = ?");
            values.push(Box::new(amount));
        }
        if let Some(desc) = &patch.description {
            sets.push("description = ?");
            values.push(Box::new(desc.clone()));
        }
        if let Some(date) = patch.target_date {
            sets.push("target_date = ?");
            values.push(Box::new(date.to_string()));
        }
        values.push(Box::new(id));
        values.push(Box::new(user_id));

        let sql = format!(
            "UPDATE goals SET {} WHERE id = ? AND user_id = ?",
            sets.join(", ")
        );
        let refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let updated = conn.execute(&sql, refs.as_slice())?;
        if updated == 0 {
            return Err(Error::not_found(format!("Goal {} not found", id)));
        }

        let goal = conn.query_row(
            &format!("SELECT {} FROM goals WHERE id = ?", GOAL_COLUMNS),
            params![id],
            map_goal,
        )?;
        Ok(goal)
    }

    /// Mark a goal complete, stamping the completion time
    pub fn complete_goal(&self, id: i64, user_id: i64) -> Result<Goal> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE goals SET completed = 1, completed_at = ? WHERE id = ? AND user_id = ? AND completed = 0",
            params![format_datetime(Utc::now()), id, user_id],
        )?;
        if updated == 0 {
            return Err(Error::not_found(format!(
                "Goal {} not found or already completed",
                id
            )));
        }

        let goal = conn.query_row(
            &format!("SELECT {} FROM goals WHERE id = ?", GOAL_COLUMNS),
            params![id],
            map_goal,
        )?;
        Ok(goal)
    }

    /// Delete a goal scoped to its owner
    pub fn delete_goal(&self, id: i64, user_id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM goals WHERE id = ? AND user_id = ?",
            params![id, user_id],
        )?;
        if deleted == 0 {
            return Err(Error::not_found(format!("Goal {} not found", id)));
        }
        Ok(())
    }
}
