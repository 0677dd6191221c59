//! User management handlers: registration, stats, listing, deletion (GDPR)

use axum::{
    extract::{Path, State},
    response::Json,
};

use super::router::AppState;
use super::types::{DeleteUserResponse, RegisterUserRequest, UserResponse, UserStatsResponse};
use crate::errors::{AppError, ValidationErrorExt};
use crate::validation;

/// POST /api/users - Register a user or rename an existing one
pub async fn register_user(
    State(state): State<AppState>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    validation::validate_user_id(&req.user_id)
        .map_err(|e| AppError::InvalidUserId(e.to_string()))?;
    validation::validate_username(&req.username).map_validation_err("username")?;

    let record = state.register_user(&req.user_id, &req.username)?;

    Ok(Json(UserResponse {
        user_id: record.user_id,
        username: record.username,
        registered_at: record.registered_at,
    }))
}

/// GET /api/users - List registered users
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    let users = state
        .list_users()?
        .into_iter()
        .map(|r| UserResponse {
            user_id: r.user_id,
            username: r.username,
            registered_at: r.registered_at,
        })
        .collect();
    Ok(Json(users))
}

/// GET /api/users/{user_id}/stats - Mention counter and identity
pub async fn get_user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserStatsResponse>, AppError> {
    let Some((record, count)) = state.user_stats(&user_id)? else {
        return Err(AppError::UserNotFound(user_id));
    };

    Ok(Json(UserStatsResponse {
        user_id: record.user_id,
        username: record.username,
        mention_count: count,
    }))
}

/// DELETE /api/users/{user_id} - Remove the user, their rows and counter
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<DeleteUserResponse>, AppError> {
    let Some(removed) = state.delete_user(&user_id)? else {
        return Err(AppError::UserNotFound(user_id));
    };

    Ok(Json(DeleteUserResponse {
        success: true,
        user_id,
        mentions_removed: removed,
    }))
}
