//! Subscription handlers

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Extension};

use tally_core::tier_features;

use crate::{ok, AppError, AppState, AuthUser};

/// GET /api/subscriptions
///
/// The subscription row plus the feature set its tier grants.
pub async fn get_subscription(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let subscription = state.db.get_or_create_subscription(user.id)?;
    let features = tier_features(subscription.tier);

    Ok(ok(serde_json::json!({
        "subscription": subscription,
        "features": features,
    })))
}
