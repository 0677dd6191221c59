//! Backfill and ledger repair handlers (admin key required)

use axum::{extract::State, response::Json};

use super::router::AppState;
use super::types::{
    BackfillRequest, BackfillResetRequest, BackfillResetResponse, RecountRequest, RecountResponse,
};
use crate::errors::{AppError, ValidationErrorExt};
use crate::mentions::backfill::BackfillStatus;
use crate::mentions::{BackfillReport, PostType};
use crate::validation;

async fn run_batch(
    state: AppState,
    post_type: PostType,
    req: BackfillRequest,
) -> Result<Json<BackfillReport>, AppError> {
    let batch_size = req
        .batch_size
        .unwrap_or(state.config.backfill_batch_size);
    validation::validate_batch_size(batch_size).map_validation_err("batch_size")?;

    match state.backfill.run_batch(post_type, batch_size)? {
        Some(report) => Ok(Json(report)),
        None => Err(AppError::BackfillBusy(post_type.tag().to_string())),
    }
}

/// POST /api/backfill/discussions - Run one batch over historical discussions
pub async fn backfill_discussions(
    State(state): State<AppState>,
    Json(req): Json<BackfillRequest>,
) -> Result<Json<BackfillReport>, AppError> {
    run_batch(state, PostType::Discussion, req).await
}

/// POST /api/backfill/comments - Run one batch over historical comments
pub async fn backfill_comments(
    State(state): State<AppState>,
    Json(req): Json<BackfillRequest>,
) -> Result<Json<BackfillReport>, AppError> {
    run_batch(state, PostType::Comment, req).await
}

/// GET /api/backfill/status - Checkpoint positions and the running flag
pub async fn backfill_status(
    State(state): State<AppState>,
) -> Result<Json<BackfillStatus>, AppError> {
    Ok(Json(state.backfill.status()?))
}

/// POST /api/backfill/reset - Restart a scan from the beginning
pub async fn backfill_reset(
    State(state): State<AppState>,
    Json(req): Json<BackfillResetRequest>,
) -> Result<Json<BackfillResetResponse>, AppError> {
    state.backfill.reset(req.post_type)?;
    Ok(Json(BackfillResetResponse {
        success: true,
        post_type: req.post_type,
    }))
}

/// POST /api/ledger/recount - Recompute counters by aggregation
pub async fn recount(
    State(state): State<AppState>,
    Json(req): Json<RecountRequest>,
) -> Result<Json<RecountResponse>, AppError> {
    let user_ids = req.user_ids.unwrap_or_default();
    for user_id in &user_ids {
        validation::validate_user_id(user_id)
            .map_err(|e| AppError::InvalidUserId(e.to_string()))?;
    }

    let recounted = state.recount(&user_ids)?;
    Ok(Json(RecountResponse { recounted }))
}
