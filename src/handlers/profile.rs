//! Profile feed handlers: paginated mention listing and the pager total

use axum::{extract::State, response::Json};

use super::router::AppState;
use super::types::{FeedCountRequest, FeedCountResponse, FeedPageRequest};
use crate::errors::{AppError, ValidationErrorExt};
use crate::mentions::FeedPage;
use crate::validation;

/// POST /api/mentions/page - One page of a user's mentions, newest first
pub async fn mention_page(
    State(state): State<AppState>,
    Json(req): Json<FeedPageRequest>,
) -> Result<Json<FeedPage>, AppError> {
    validation::validate_user_id(&req.user_id)
        .map_err(|e| AppError::InvalidUserId(e.to_string()))?;

    let limit = req.limit.unwrap_or(state.config.page_size);
    let offset = req.offset.unwrap_or(0);
    validation::validate_page(limit, offset).map_validation_err("page")?;

    let page = state
        .feed
        .page(&req.user_id, req.visible_categories.as_deref(), limit, offset)?;

    Ok(Json((*page).clone()))
}

/// POST /api/mentions/count - Permission-filtered total for the pager
pub async fn mention_count(
    State(state): State<AppState>,
    Json(req): Json<FeedCountRequest>,
) -> Result<Json<FeedCountResponse>, AppError> {
    validation::validate_user_id(&req.user_id)
        .map_err(|e| AppError::InvalidUserId(e.to_string()))?;

    let total = state
        .feed
        .count(&req.user_id, req.visible_categories.as_deref())?;

    Ok(Json(FeedCountResponse {
        user_id: req.user_id,
        total,
    }))
}
