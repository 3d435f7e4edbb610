//! Account handlers: registration, sessions, and profile management
//!
//! Email delivery is not wired up; verification tokens, reset tokens, and
//! confirmation codes are written to the log for the operator to relay.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use tracing::info;

use tally_core::models::{NewUser, Profile, ProfileUpdate};

use crate::{ok, ok_message, ok_with_message, token, AppError, AppState, AuthUser};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct ConfirmEmailChangeRequest {
    pub code: String,
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(new_user): Json<NewUser>,
) -> Result<impl IntoResponse, AppError> {
    let (user_id, _token) = state.db.create_user(&new_user)?;

    let user = state
        .db
        .get_user(user_id)?
        .ok_or_else(|| AppError::not_found("User not found after registration"))?;

    Ok((
        StatusCode::CREATED,
        ok_with_message(
            "Registration successful. Please verify your email before logging in.",
            Profile::from(user),
        ),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.db.authenticate(&req.email, &req.password)?;

    let token = token::issue(
        &state.config.jwt_secret,
        user.id,
        state.config.token_ttl_hours,
    )
    .map_err(|_| AppError::internal(anyhow::anyhow!("Failed to issue session token")))?;

    info!(user_id = user.id, "User logged in");

    Ok(ok(serde_json::json!({
        "token": token,
        "user": Profile::from(user),
    })))
}

/// GET /api/auth/verify-email/:token
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.db.verify_email(&token)?;
    Ok(ok_message("Email verified. You can now log in."))
}

/// POST /api/auth/forgot-password
///
/// Replies identically whether or not the email exists.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.db.create_reset_token(&req.email)?;
    Ok(ok_message(
        "If an account exists for that email, a reset link has been sent.",
    ))
}

/// POST /api/auth/reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.db.reset_password(&req.token, &req.password)?;
    Ok(ok_message("Password has been reset. You can now log in."))
}

/// GET /api/auth/profile
pub async fn get_profile(
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(Profile::from(user)))
}

/// PUT /api/auth/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(patch): Json<ProfileUpdate>,
) -> Result<impl IntoResponse, AppError> {
    state.db.update_profile(user.id, &patch)?;

    let updated = state
        .db
        .get_active_user(user.id)?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(ok(Profile::from(updated)))
}

/// POST /api/auth/change-password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .db
        .change_password(user.id, &req.current_password, &req.new_password)?;
    Ok(ok_message("Password updated."))
}

/// POST /api/auth/change-email
pub async fn request_email_change(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(req): Json<EmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.db.request_email_change(user.id, &req.email)?;
    Ok(ok_message(
        "A confirmation code has been sent to the new address.",
    ))
}

/// POST /api/auth/confirm-email
pub async fn confirm_email_change(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(req): Json<ConfirmEmailChangeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let new_email = state.db.confirm_email_change(user.id, &req.code)?;
    Ok(ok_with_message(
        "Email address updated.",
        serde_json::json!({ "email": new_email }),
    ))
}

/// DELETE /api/auth/delete-account
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    state.db.soft_delete_user(user.id)?;
    Ok(ok_message("Account deleted."))
}
