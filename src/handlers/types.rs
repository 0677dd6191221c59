//! Request and response bodies for the HTTP API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mentions::PostType;

// =============================================================================
// USERS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user_id: String,
    pub username: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserStatsResponse {
    pub user_id: String,
    pub username: String,
    pub mention_count: u64,
}

#[derive(Debug, Serialize)]
pub struct DeleteUserResponse {
    pub success: bool,
    pub user_id: String,
    /// Ledger rows removed along with the account
    pub mentions_removed: usize,
}

// =============================================================================
// LIFECYCLE EVENTS
// =============================================================================

/// Payload of `post-created`: the full post as the host saved it
#[derive(Debug, Deserialize)]
pub struct PostCreatedRequest {
    pub post_type: PostType,
    pub post_id: i64,
    /// Parent discussion; defaults to post_id for discussions
    pub discussion_id: Option<i64>,
    pub category_id: i64,
    pub author_id: String,
    /// Discussion name (comments carry their parent discussion's name)
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Host-side creation time; defaults to now
    pub inserted_at: Option<DateTime<Utc>>,
    /// When the host resolves mentions itself this list overrides extraction
    pub mentioned_usernames: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct PostCreatedResponse {
    pub post_type: PostType,
    pub post_id: i64,
    /// New ledger rows written
    pub recorded: usize,
    /// Mentions already in the ledger
    pub duplicates: usize,
    /// Usernames that did not resolve to a registered user
    pub unresolved: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostDeletedRequest {
    pub post_type: PostType,
    pub post_id: i64,
}

#[derive(Debug, Serialize)]
pub struct PostDeletedResponse {
    pub post_type: PostType,
    pub post_id: i64,
    /// Users whose counters were refreshed
    pub affected_users: Vec<String>,
}

// =============================================================================
// PROFILE FEED
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct FeedPageRequest {
    pub user_id: String,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Categories the viewer may see; absent means unrestricted
    pub visible_categories: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
pub struct FeedCountRequest {
    pub user_id: String,
    pub visible_categories: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
pub struct FeedCountResponse {
    pub user_id: String,
    pub total: usize,
}

// =============================================================================
// BACKFILL & REPAIR
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct BackfillRequest {
    pub batch_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct BackfillResetRequest {
    pub post_type: PostType,
}

#[derive(Debug, Serialize)]
pub struct BackfillResetResponse {
    pub success: bool,
    pub post_type: PostType,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecountRequest {
    /// Empty or absent recounts every tracked user
    pub user_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct RecountResponse {
    pub recounted: usize,
}
