//! Account store: identity, credentials, verification and reset flows
//!
//! Every query that serves an authenticated caller filters on the user id;
//! soft-deleted users (status = 'deleted') fail all lookups used by auth.

use chrono::{Duration, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};
use subtle::ConstantTimeEq;
use tracing::info;

use super::{format_datetime, parse_datetime, Database};
use crate::auth::{
    generate_code, generate_token, hash_password, is_valid_email, verify_password,
    MIN_PASSWORD_LEN, MIN_USERNAME_LEN,
};
use crate::error::{Error, Result};
use crate::models::{NewUser, ProfileUpdate, User, UserStatus};

/// How long a verification token stays valid
const VERIFY_TOKEN_HOURS: i64 = 24;

/// How long a password reset token stays valid
const RESET_TOKEN_HOURS: i64 = 1;

/// How long an email-change code stays valid
const EMAIL_CODE_MINUTES: i64 = 15;

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        password_hash: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        display_name: row.get(6)?,
        status: row
            .get::<_, String>(7)?
            .parse()
            .unwrap_or(UserStatus::Active),
        email_verified: row.get(8)?,
        verify_token: row.get(9)?,
        verify_token_expires: row
            .get::<_, Option<String>>(10)?
            .map(|s| parse_datetime(&s)),
        reset_token: row.get(11)?,
        reset_token_expires: row
            .get::<_, Option<String>>(12)?
            .map(|s| parse_datetime(&s)),
        balance_alert_cents: row.get(13)?,
        created_at: parse_datetime(&row.get::<_, String>(14)?),
    })
}

const USER_COLUMNS: &str = "id, email, username, password_hash, first_name, last_name, \
     display_name, status, email_verified, verify_token, verify_token_expires, \
     reset_token, reset_token_expires, balance_alert_cents, created_at";

/// Validate registration input and insert the user row
///
/// Connection-scoped so the payment bridge can create an account inside its
/// own transaction. Returns (user id, verification token).
pub(crate) fn insert_user_row(
    conn: &rusqlite::Connection,
    new: &NewUser,
) -> Result<(i64, String)> {
    if !is_valid_email(&new.email) {
        return Err(Error::validation("Invalid email address"));
    }
    if new.username.trim().len() < MIN_USERNAME_LEN {
        return Err(Error::validation(format!(
            "Username must be at least {} characters",
            MIN_USERNAME_LEN
        )));
    }
    if new.password.len() < MIN_PASSWORD_LEN {
        return Err(Error::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let taken: Option<i64> = conn
        .query_row(
            "SELECT id FROM users WHERE email = ? OR username = ?",
            params![new.email, new.username],
            |row| row.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(Error::Conflict(
            "An account with this email or username already exists".to_string(),
        ));
    }

    let hash = hash_password(&new.password)?;
    let token = generate_token(&new.email);
    let expires = Utc::now() + Duration::hours(VERIFY_TOKEN_HOURS);

    conn.execute(
        r#"
        INSERT INTO users (email, username, password_hash, first_name, last_name,
                           email_verified, verify_token, verify_token_expires)
        VALUES (?, ?, ?, ?, ?, 0, ?, ?)
        "#,
        params![
            new.email,
            new.username,
            hash,
            new.first_name,
            new.last_name,
            token,
            format_datetime(expires),
        ],
    )?;

    Ok((conn.last_insert_rowid(), token))
}

impl Database {
    /// Create a new unverified user; returns (user id, verification token)
    pub fn create_user(&self, new: &NewUser) -> Result<(i64, String)> {
        let conn = self.conn()?;
        let (id, token) = insert_user_row(&conn, new)?;
        // Email delivery is out of scope; surface the token for the caller
        info!(user_id = id, "Created user, verification token issued");
        Ok((id, token))
    }

    /// Fetch a user regardless of status
    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
                params![id],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Fetch an active user (used by the access control middleware)
    pub fn get_active_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!(
                    "SELECT {} FROM users WHERE id = ? AND status = 'active'",
                    USER_COLUMNS
                ),
                params![id],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Fetch an active user by email
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!(
                    "SELECT {} FROM users WHERE email = ? AND status = 'active'",
                    USER_COLUMNS
                ),
                params![email],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Check credentials and verification state; returns the user on success
    pub fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let user = self
            .get_user_by_email(email)?
            .ok_or_else(|| Error::Authentication("Invalid email or password".to_string()))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(Error::Authentication(
                "Invalid email or password".to_string(),
            ));
        }
        if !user.email_verified {
            return Err(Error::Authentication(
                "Please verify your email before logging in".to_string(),
            ));
        }
        Ok(user)
    }

    /// Mark an email verified via its token
    pub fn verify_email(&self, token: &str) -> Result<i64> {
        let conn = self.conn()?;

        let row: Option<(i64, Option<String>)> = conn
            .query_row(
                "SELECT id, verify_token_expires FROM users WHERE verify_token = ? AND status = 'active'",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (id, expires) =
            row.ok_or_else(|| Error::not_found("Invalid or already used verification token"))?;

        if let Some(exp) = expires {
            if parse_datetime(&exp) < Utc::now() {
                return Err(Error::Authentication(
                    "Verification token has expired".to_string(),
                ));
            }
        }

        conn.execute(
            "UPDATE users SET email_verified = 1, verify_token = NULL, verify_token_expires = NULL WHERE id = ?",
            params![id],
        )?;

        info!(user_id = id, "Email verified");
        Ok(id)
    }

    /// Apply a partial profile update; only supplied fields are written
    pub fn update_profile(&self, user_id: i64, patch: &ProfileUpdate) -> Result<()> {
        if patch.is_empty() {
            return Err(Error::validation("No fields to update"));
        }

        let conn = self.conn()?;

        // Typed patch translated to parameterized SET fragments
        let mut sets = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(first) = &patch.first_name {
            sets.push("first_name = ?");
            values.push(Box::new(first.clone()));
        }
        if let Some(last) = &patch.last_name {
            sets.push("last_name = ?");
            values.push(Box::new(last.clone()));
        }
        if let Some(display) = &patch.display_name {
            sets.push("display_name = ?");
            values.push(Box::new(display.clone()));
        }
        if let Some(alert) = patch.balance_alert {
            sets.push("balance_alert_cents = ?");
            values.push(Box::new(alert));
        }

        values.push(Box::new(user_id));
        let sql = format!(
            "UPDATE users SET {} WHERE id = ? AND status = 'active'",
            sets.join(", ")
        );
        let refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let updated = conn.execute(&sql, refs.as_slice())?;

        if updated == 0 {
            return Err(Error::not_found(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    /// Change password after checking the current one
    pub fn change_password(&self, user_id: i64, current: &str, new_password: &str) -> Result<()> {
        if new_password.len() < MIN_PASSWORD_LEN {
            return Err(Error::validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let user = self
            .get_active_user(user_id)?
            .ok_or_else(|| Error::not_found(format!("User {} not found", user_id)))?;

        if !verify_password(current, &user.password_hash)? {
            return Err(Error::Authentication(
                "Current password is incorrect".to_string(),
            ));
        }

        let hash = hash_password(new_password)?;
        let conn = self.conn()?;
        conn.execute(
            "UPDATE users SET password_hash = ? WHERE id = ?",
            params![hash, user_id],
        )?;
        Ok(())
    }

    /// Issue a password reset token; None when the email is unknown
    /// (callers reply identically either way to avoid account enumeration)
    pub fn create_reset_token(&self, email: &str) -> Result<Option<String>> {
        let user = match self.get_user_by_email(email)? {
            Some(u) => u,
            None => return Ok(None),
        };

        let token = generate_token(email);
        let expires = Utc::now() + Duration::hours(RESET_TOKEN_HOURS);

        let conn = self.conn()?;
        conn.execute(
            "UPDATE users SET reset_token = ?, reset_token_expires = ? WHERE id = ?",
            params![token, format_datetime(expires), user.id],
        )?;

        info!(user_id = user.id, "Password reset token issued");
        Ok(Some(token))
    }

    /// Reset a password via its token
    pub fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        if new_password.len() < MIN_PASSWORD_LEN {
            return Err(Error::validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let conn = self.conn()?;
        let row: Option<(i64, Option<String>)> = conn
            .query_row(
                "SELECT id, reset_token_expires FROM users WHERE reset_token = ? AND status = 'active'",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (id, expires) = row.ok_or_else(|| Error::not_found("Invalid reset token"))?;

        if let Some(exp) = expires {
            if parse_datetime(&exp) < Utc::now() {
                return Err(Error::Authentication("Reset token has expired".to_string()));
            }
        }

        let hash = hash_password(new_password)?;
        conn.execute(
            "UPDATE users SET password_hash = ?, reset_token = NULL, reset_token_expires = NULL WHERE id = ?",
            params![hash, id],
        )?;

        info!(user_id = id, "Password reset");
        Ok(())
    }

    /// Start an email change; returns the confirmation code
    ///
    /// A second request for the same user overwrites the pending email and
    /// code and resets the verified flag (upsert-on-conflict semantics).
    pub fn request_email_change(&self, user_id: i64, new_email: &str) -> Result<String> {
        if !is_valid_email(new_email) {
            return Err(Error::validation("Invalid email address"));
        }

        let conn = self.conn()?;

        let taken: Option<i64> = conn
            .query_row(
                "SELECT id FROM users WHERE email = ?",
                params![new_email],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(Error::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }

        let code = generate_code(new_email);
        let expires = Utc::now() + Duration::minutes(EMAIL_CODE_MINUTES);

        conn.execute(
            r#"
            INSERT INTO email_change_codes (user_id, kind, pending_email, code, expires_at, verified)
            VALUES (?, 'email_change', ?, ?, ?, 0)
            ON CONFLICT(user_id, kind) DO UPDATE SET
                pending_email = excluded.pending_email,
                code = excluded.code,
                expires_at = excluded.expires_at,
                verified = 0,
                created_at = CURRENT_TIMESTAMP
            "#,
            params![user_id, new_email, code, format_datetime(expires)],
        )?;

        info!(user_id, "Email change code issued");
        Ok(code)
    }

    /// Confirm a pending email change; returns the new email
    pub fn confirm_email_change(&self, user_id: i64, code: &str) -> Result<String> {
        let conn = self.conn()?;

        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT pending_email, code, expires_at FROM email_change_codes \
                 WHERE user_id = ? AND kind = 'email_change' AND verified = 0",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (pending_email, stored_code, expires) =
            row.ok_or_else(|| Error::not_found("No pending email change"))?;

        if parse_datetime(&expires) < Utc::now() {
            return Err(Error::Authentication(
                "Confirmation code has expired".to_string(),
            ));
        }

        // Constant-time comparison; codes are attacker-guessable otherwise
        let matches: bool = stored_code.as_bytes().ct_eq(code.as_bytes()).into();
        if !matches {
            return Err(Error::Authentication(
                "Incorrect confirmation code".to_string(),
            ));
        }

        conn.execute(
            "UPDATE email_change_codes SET verified = 1 WHERE user_id = ? AND kind = 'email_change'",
            params![user_id],
        )?;
        conn.execute(
            "UPDATE users SET email = ? WHERE id = ?",
            params![pending_email, user_id],
        )?;

        info!(user_id, "Email changed");
        Ok(pending_email)
    }

    /// Soft-delete an account (status = deleted, row retained)
    pub fn soft_delete_user(&self, user_id: i64) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE users SET status = 'deleted' WHERE id = ? AND status = 'active'",
            params![user_id],
        )?;
        if updated == 0 {
            return Err(Error::not_found(format!("User {} not found", user_id)));
        }
        info!(user_id, "Account soft-deleted");
        Ok(())
    }

    /// Count of active users (used by `tally status`)
    pub fn count_active_users(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM users WHERE status = 'active'",
            [],
            |row| row.get(0),
        )?)
    }

    /// Earliest transaction date for a user, if any (used by `tally status`)
    pub fn first_transaction_date(&self, user_id: i64) -> Result<Option<NaiveDate>> {
        let conn = self.conn()?;
        let date: Option<String> = conn
            .query_row(
                "SELECT MIN(date) FROM transactions WHERE user_id = ?",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(date.and_then(|s| s.parse().ok()))
    }
}
