//! Savings goal handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};

use tally_core::models::{GoalUpdate, NewGoal};

use crate::{ok, ok_message, ok_with_message, AppError, AppState, AuthUser};

/// GET /api/goals
pub async fn list_goals(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let goals = state.db.list_goals(user.id)?;
    Ok(ok(goals))
}

/// POST /api/goals (pro feature; listing stays open)
pub async fn create_goal(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(new): Json<NewGoal>,
) -> Result<impl IntoResponse, AppError> {
    state.ensure_feature(user.id, "budget_goals")?;

    let goal = state.db.create_goal(user.id, &new)?;
    Ok(ok_with_message("Goal created.", goal))
}

/// GET /api/goals/primary
pub async fn primary_goal(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let goal = state.db.primary_goal(user.id)?;
    Ok(ok(goal))
}

/// PUT /api/goals/:id
pub async fn update_goal(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(patch): Json<GoalUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let goal = state.db.update_goal(id, user.id, &patch)?;
    Ok(ok_with_message("Goal updated.", goal))
}

/// POST /api/goals/:id/complete
pub async fn complete_goal(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let goal = state.db.complete_goal(id, user.id)?;
    Ok(ok_with_message("Goal completed.", goal))
}

/// DELETE /api/goals/:id
pub async fn delete_goal(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.db.delete_goal(id, user.id)?;
    Ok(ok_message("Goal deleted."))
}
