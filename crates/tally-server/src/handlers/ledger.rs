//! Ledger handlers
//!
//! /transactions is the unified ledger; /income and /expenses are
//! kind-filtered views over the same rows.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;

use tally_core::models::{EntryKind, NewTransaction, TransactionUpdate};

use crate::{ok, ok_message, ok_with_message, AppError, AppState, AuthUser};

/// Default page size for history queries
const DEFAULT_LIMIT: i64 = 50;

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// Request body for the kind-fixed creation routes, where the path
/// already says whether this is income or an expense.
#[derive(Deserialize)]
pub struct EntryRequest {
    #[serde(rename = "amount", with = "tally_core::models::money")]
    pub amount_cents: i64,
    pub category_id: Option<i64>,
    pub description: String,
    pub date: Option<chrono::NaiveDate>,
}

impl EntryRequest {
    fn into_new(self, kind: EntryKind) -> NewTransaction {
        NewTransaction {
            kind,
            amount_cents: self.amount_cents,
            category_id: self.category_id,
            description: self.description,
            date: self.date,
        }
    }
}

/// GET /api/balance
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let summary = state.db.get_balance(user.id)?;
    Ok(ok(summary))
}

/// GET /api/transactions
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let transactions = state.db.recent_transactions(user.id, limit)?;
    Ok(ok(transactions))
}

/// POST /api/transactions
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(new): Json<NewTransaction>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state.db.record_transaction(user.id, &new)?;
    Ok(ok_with_message("Transaction recorded.", transaction))
}

/// GET /api/transactions/:id
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state
        .db
        .get_transaction(id, user.id)?
        .ok_or_else(|| AppError::not_found(format!("Transaction {} not found", id)))?;
    Ok(ok(transaction))
}

/// PUT /api/transactions/:id
pub async fn update_transaction(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(patch): Json<TransactionUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state.db.update_transaction(id, user.id, &patch)?;
    Ok(ok_with_message("Transaction updated.", transaction))
}

/// DELETE /api/transactions/:id
pub async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.db.delete_transaction(id, user.id)?;
    Ok(ok_message("Transaction deleted."))
}

/// GET /api/income
pub async fn list_income(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let entries = state
        .db
        .list_transactions(user.id, Some(EntryKind::Income), limit)?;
    Ok(ok(entries))
}

/// POST /api/income
pub async fn create_income(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(entry): Json<EntryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state
        .db
        .record_transaction(user.id, &entry.into_new(EntryKind::Income))?;
    Ok(ok_with_message("Income recorded.", transaction))
}

/// DELETE /api/income/:id
pub async fn delete_income(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state
        .db
        .delete_transaction_of_kind(id, user.id, EntryKind::Income)?;
    Ok(ok_message("Income entry deleted."))
}

/// GET /api/expenses
pub async fn list_expenses(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let entries = state
        .db
        .list_transactions(user.id, Some(EntryKind::Expense), limit)?;
    Ok(ok(entries))
}

/// POST /api/expenses
pub async fn create_expense(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(entry): Json<EntryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state
        .db
        .record_transaction(user.id, &entry.into_new(EntryKind::Expense))?;
    Ok(ok_with_message("Expense recorded.", transaction))
}

/// DELETE /api/expenses/:id
pub async fn delete_expense(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state
        .db
        .delete_transaction_of_kind(id, user.id, EntryKind::Expense)?;
    Ok(ok_message("Expense entry deleted."))
}
