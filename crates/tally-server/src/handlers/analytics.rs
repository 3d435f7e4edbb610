//! Analytics and export handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Extension,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;

use crate::{ok, AppError, AppState, AuthUser};

/// Months covered by the advanced rollup when the client does not say
const DEFAULT_ROLLUP_MONTHS: u32 = 6;

/// Upper bound on the rollup window
const MAX_ROLLUP_MONTHS: u32 = 36;

#[derive(Deserialize)]
pub struct SummaryQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct AdvancedQuery {
    pub months: Option<u32>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// GET /api/analytics/basic (every tier)
pub async fn basic_analytics(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(query): Query<SummaryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let summary = match (query.from, query.to) {
        (Some(from), Some(to)) => {
            if from > to {
                return Err(AppError::bad_request("'from' must not be after 'to'"));
            }
            state.db.range_summary(user.id, from, to)?
        }
        (None, None) => state.db.basic_summary(user.id)?,
        _ => return Err(AppError::bad_request("'from' and 'to' must be given together")),
    };
    Ok(ok(summary))
}

/// GET /api/analytics/advanced (pro feature, gated by middleware)
pub async fn advanced_analytics(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(query): Query<AdvancedQuery>,
) -> Result<impl IntoResponse, AppError> {
    let months = query
        .months
        .unwrap_or(DEFAULT_ROLLUP_MONTHS)
        .clamp(1, MAX_ROLLUP_MONTHS);

    let to = query.to.unwrap_or_else(|| Utc::now().date_naive());
    let from = query.from.unwrap_or_else(|| to - Duration::days(30));
    if from > to {
        return Err(AppError::bad_request("'from' must not be after 'to'"));
    }

    let monthly = state.db.monthly_rollup(user.id, months)?;
    let categories = state.db.category_breakdown(user.id, from, to)?;

    Ok(ok(serde_json::json!({
        "monthly": monthly,
        "categories": categories,
    })))
}

/// GET /api/analytics/export (pro feature, gated by middleware)
///
/// Returns raw CSV rather than the JSON envelope.
pub async fn export_transactions(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let csv = state.db.export_transactions_csv(user.id)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"transactions.csv\"",
            ),
        ],
        csv,
    ))
}
