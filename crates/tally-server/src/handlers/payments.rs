//! Payment bridge handlers
//!
//! /payments/verify-paypal is public so a checkout can pay and register in
//! one step; an Authorization header, when present, ties the payment to the
//! existing account instead.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use tracing::warn;

use tally_core::models::{money, NewUser, PaymentOrder};

use crate::{ok, ok_with_message, token, AppError, AppState, AuthUser};

#[derive(Deserialize)]
pub struct VerifyPaymentRequest {
    pub order_id: String,
    /// Status as reported by the client; ignored when provider lookup is on
    pub status: Option<String>,
    /// Amount as reported by the client; ignored when provider lookup is on
    #[serde(default, with = "money::option")]
    pub amount: Option<i64>,
    /// Account details for pay-and-register checkouts
    pub registration: Option<NewUser>,
}

/// POST /api/payments/verify-paypal
pub async fn verify_paypal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Optional bearer: a present-but-invalid token is an error, not anonymity
    let user_id = match headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
    {
        Some(bearer) => match token::verify(&state.config.jwt_secret, bearer) {
            Ok(claims) => Some(claims.sub),
            Err(token::TokenError::Expired) => {
                return Err(AppError::unauthorized("Session has expired"));
            }
            Err(token::TokenError::Invalid) => {
                return Err(AppError::unauthorized("Invalid authentication token"));
            }
        },
        None => None,
    };

    let order = match &state.paypal {
        Some(client) => client
            .fetch_order(&req.order_id)
            .await
            .map_err(AppError::internal)?,
        None => {
            // No provider credentials; fall back to the reported payload
            let status = req
                .status
                .ok_or_else(|| AppError::bad_request("Missing payment status"))?;
            let amount_cents = req
                .amount
                .ok_or_else(|| AppError::bad_request("Missing payment amount"))?;
            warn!(order_id = %req.order_id, "Applying payment without provider verification");
            PaymentOrder {
                external_id: req.order_id,
                status,
                amount_cents,
                method: "paypal".to_string(),
                metadata: serde_json::Value::Null,
            }
        }
    };

    let (user_id, payment, subscription) =
        state
            .db
            .apply_payment(user_id, &order, req.registration.as_ref())?;

    Ok(ok_with_message(
        "Payment verified; subscription upgraded to pro.",
        serde_json::json!({
            "user_id": user_id,
            "payment": payment,
            "subscription": subscription,
        }),
    ))
}

/// GET /api/payments
pub async fn list_payments(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let payments = state.db.list_payments(user.id)?;
    Ok(ok(payments))
}
