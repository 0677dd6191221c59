//! Lifecycle event handlers
//!
//! The host forum calls these webhooks when posts are created or deleted.

use axum::{extract::State, response::Json};
use tracing::debug;

use super::router::AppState;
use super::state::post_from_payload;
use super::types::{
    PostCreatedRequest, PostCreatedResponse, PostDeletedRequest, PostDeletedResponse,
};
use crate::errors::{AppError, ValidationErrorExt};
use crate::validation;

/// POST /api/events/post-created - Record a new post's mentions
pub async fn post_created(
    State(state): State<AppState>,
    Json(req): Json<PostCreatedRequest>,
) -> Result<Json<PostCreatedResponse>, AppError> {
    validation::validate_post_id(req.post_id)
        .map_err(|e| AppError::InvalidPostId(e.to_string()))?;
    validation::validate_user_id(&req.author_id)
        .map_err(|e| AppError::InvalidUserId(e.to_string()))?;
    validation::validate_title(&req.title).map_validation_err("title")?;

    validation::validate_body(&req.body).map_err(|_| AppError::BodyTooLarge {
        size: req.body.len(),
        max: validation::MAX_BODY_LENGTH,
    })?;

    let post = post_from_payload(
        req.post_type,
        req.post_id,
        req.discussion_id,
        req.category_id,
        req.author_id,
        req.title,
        req.body,
        req.inserted_at,
    );
    let outcome = state.ingest_post(&post, req.mentioned_usernames.as_deref())?;

    debug!(
        post = %format!("{}/{}", post.post_type, post.post_id),
        recorded = outcome.inserted.len(),
        duplicates = outcome.duplicates,
        unresolved = outcome.unresolved.len(),
        "Post ingested"
    );

    Ok(Json(PostCreatedResponse {
        post_type: post.post_type,
        post_id: post.post_id,
        recorded: outcome.inserted.len(),
        duplicates: outcome.duplicates,
        unresolved: outcome.unresolved,
    }))
}

/// POST /api/events/post-deleted - Purge a post's ledger rows
pub async fn post_deleted(
    State(state): State<AppState>,
    Json(req): Json<PostDeletedRequest>,
) -> Result<Json<PostDeletedResponse>, AppError> {
    validation::validate_post_id(req.post_id)
        .map_err(|e| AppError::InvalidPostId(e.to_string()))?;

    let affected = state.delete_post(req.post_type, req.post_id)?;

    Ok(Json(PostDeletedResponse {
        post_type: req.post_type,
        post_id: req.post_id,
        affected_users: affected,
    }))
}
