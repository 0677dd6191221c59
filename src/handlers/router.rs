//! Router configuration - centralized route definitions
//!
//! Routes are split into public (no auth), protected (API key) and admin
//! (admin API key) groups. Auth middleware and rate limiting are applied by
//! the caller (main.rs) so the test harness can exercise the same layering.

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use super::state::MentionService;
use super::{backfill, events, health, profile, users};

/// Application state type alias
pub type AppState = Arc<MentionService>;

/// Build the public routes (no authentication required)
///
/// Always reachable for Kubernetes probes and Prometheus scraping.
pub fn build_public_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::health_live))
        .route("/health/ready", get(health::health_ready))
        .route("/metrics", get(health::metrics_endpoint))
        .with_state(state)
}

/// Build the protected API routes (API key required)
pub fn build_protected_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // USER MANAGEMENT
        // =================================================================
        .route("/api/users", post(users::register_user))
        .route("/api/users", get(users::list_users))
        .route("/api/users/{user_id}/stats", get(users::get_user_stats))
        .route("/api/users/{user_id}", delete(users::delete_user))
        // =================================================================
        // LIFECYCLE EVENTS
        // =================================================================
        .route("/api/events/post-created", post(events::post_created))
        .route("/api/events/post-deleted", post(events::post_deleted))
        // =================================================================
        // PROFILE FEED
        // =================================================================
        .route("/api/mentions/page", post(profile::mention_page))
        .route("/api/mentions/count", post(profile::mention_count))
        .with_state(state)
}

/// Build the admin routes (admin API key required)
pub fn build_admin_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // BACKFILL
        // =================================================================
        .route(
            "/api/backfill/discussions",
            post(backfill::backfill_discussions),
        )
        .route("/api/backfill/comments", post(backfill::backfill_comments))
        .route("/api/backfill/status", get(backfill::backfill_status))
        .route("/api/backfill/reset", post(backfill::backfill_reset))
        // =================================================================
        // LEDGER REPAIR
        // =================================================================
        .route("/api/ledger/recount", post(backfill::recount))
        .with_state(state)
}

/// Build the complete router with all route groups
///
/// Note: does NOT apply auth middleware or rate limiting; the caller layers
/// those per group.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(build_public_routes(state.clone()))
        .merge(build_protected_routes(state.clone()))
        .merge(build_admin_routes(state))
}
