//! Category handlers
//!
//! Listing is open to every tier; creating custom categories is a pro
//! feature, checked here because GET and POST share the route.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;

use tally_core::models::EntryKind;

use crate::{ok, ok_message, ok_with_message, AppError, AppState, AuthUser};

#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub kind: EntryKind,
}

/// GET /api/categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let categories = state.db.list_categories(user.id)?;
    Ok(ok(categories))
}

/// POST /api/categories
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.ensure_feature(user.id, "custom_categories")?;

    let category = state.db.create_category(user.id, &req.name, req.kind)?;
    Ok(ok_with_message("Category created.", category))
}

/// DELETE /api/categories/:id
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.db.delete_category(id, user.id)?;
    Ok(ok_message("Category deleted."))
}
