//! Tally Core Library
//!
//! Shared functionality for the Tally personal finance tracker:
//! - Database access and migrations (SQLite with optional encryption)
//! - User accounts, credentials, and verification flows
//! - The unified income/expense ledger with running-balance snapshots
//! - Savings goals
//! - Tiered subscriptions and the static feature map
//! - Payment bridge (verified orders applied transactionally)
//! - Read-only analytics aggregation and CSV export

pub mod auth;
pub mod db;
pub mod error;
pub mod export;
pub mod features;
pub mod models;

pub use db::Database;
pub use error::{Error, Result};
pub use features::{tier_allows, tier_features};
