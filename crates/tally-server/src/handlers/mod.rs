//! HTTP request handlers

mod analytics;
mod auth;
mod categories;
mod goals;
mod ledger;
mod payments;
mod subscriptions;

pub use analytics::*;
pub use auth::*;
pub use categories::*;
pub use goals::*;
pub use ledger::*;
pub use payments::*;
pub use subscriptions::*;
