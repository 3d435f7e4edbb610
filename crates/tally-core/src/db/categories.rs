//! Category operations
//!
//! Categories are either shared defaults (user_id NULL, seeded at migration
//! time, never user-deletable) or owned by a single user.

use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Category, EntryKind};

fn map_category(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row
            .get::<_, String>(2)?
            .parse()
            .unwrap_or(EntryKind::Expense),
        user_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

impl Database {
    /// Categories visible to a user: shared defaults plus their own
    pub fn list_categories(&self, user_id: i64) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, kind, user_id, created_at FROM categories \
             WHERE user_id IS NULL OR user_id = ? \
             ORDER BY kind, name",
        )?;
        let rows = stmt
            .query_map(params![user_id], map_category)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Create a user-owned category
    pub fn create_category(&self, user_id: i64, name: &str, kind: EntryKind) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("Category name must not be empty"));
        }

        let conn = self.conn()?;

        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM categories WHERE name = ? AND kind = ? AND (user_id IS NULL OR user_id = ?)",
                params![name, kind.as_str(), user_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(Error::Conflict(format!(
                "Category '{}' already exists",
                name
            )));
        }

        conn.execute(
            "INSERT INTO categories (name, kind, user_id) VALUES (?, ?, ?)",
            params![name, kind.as_str(), user_id],
        )?;
        let id = conn.last_insert_rowid();

        let category = conn.query_row(
            "SELECT id, name, kind, user_id, created_at FROM categories WHERE id = ?",
            params![id],
            map_category,
        )?;
        Ok(category)
    }

    /// Delete a category owned by the caller
    ///
    /// Defaults (user_id NULL) and other users' categories both surface as
    /// NotFound with nothing written. On success the caller's ledger entries
    /// referencing the category keep their rows and lose the reference, in
    /// the same transaction as the delete.
    pub fn delete_category(&self, id: i64, user_id: i64) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let deleted = tx.execute(
            "DELETE FROM categories WHERE id = ? AND user_id = ?",
            params![id, user_id],
        )?;
        if deleted == 0 {
            return Err(Error::not_found(format!("Category {} not found", id)));
        }

        tx.execute(
            "UPDATE transactions SET category_id = NULL WHERE category_id = ? AND user_id = ?",
            params![id, user_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}
