//! Command implementations

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use tally_core::models::NewUser;
use tally_core::Database;

/// Open the database, encrypted unless --no-encrypt was given
pub fn open_db(path: &Path, no_encrypt: bool) -> Result<Database> {
    let path = path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    let db = if no_encrypt {
        Database::new_unencrypted(path)?
    } else {
        Database::new(path)?
    };
    Ok(db)
}

/// `tally init`
pub fn cmd_init(path: &Path, no_encrypt: bool) -> Result<()> {
    let db = open_db(path, no_encrypt)?;
    let encrypted = db.is_encrypted()?;
    println!("Initialized database at {}", db.path());
    println!(
        "Encryption: {}",
        if encrypted { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// `tally serve`
pub async fn cmd_serve(
    path: &Path,
    host: &str,
    port: u16,
    no_encrypt: bool,
    static_dir: Option<&str>,
) -> Result<()> {
    let db = open_db(path, no_encrypt)?;
    tally_server::serve(db, host, port, static_dir).await
}

/// `tally status`
pub fn cmd_status(path: &Path, no_encrypt: bool) -> Result<()> {
    let db = open_db(path, no_encrypt)?;

    println!("Database: {}", db.path());
    println!(
        "Encryption: {}",
        if db.is_encrypted()? {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("Active users: {}", db.count_active_users()?);
    println!("Ledger entries: {}", db.count_transactions()?);
    println!("Payments recorded: {}", db.count_payments()?);
    Ok(())
}

/// `tally seed` - create a verified account without the email round trip
pub fn cmd_seed(
    path: &Path,
    email: &str,
    username: &str,
    password: &str,
    pro: bool,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(path, no_encrypt)?;

    let (user_id, token) = db.create_user(&NewUser {
        email: email.to_string(),
        username: username.to_string(),
        password: password.to_string(),
        first_name: None,
        last_name: None,
    })?;
    db.verify_email(&token)?;

    if pro {
        db.set_subscription_tier(user_id, "pro")?;
    }

    info!(user_id, "Seeded account");
    println!(
        "Created verified user {} ({}){}",
        username,
        email,
        if pro { " on the pro tier" } else { "" }
    );
    Ok(())
}
