//! mentiond - Mention ledger sidecar for forum platforms
//!
//! Tracks which users are @mentioned in discussions and comments, keeps a
//! per-user mention counter consistent with the ledger, and serves the
//! paginated "Mentioned" profile feed.
//!
//! # Key properties
//! - Embedded RocksDB storage (no external database)
//! - Idempotent ledger writes: one row per (user, post type, post id)
//! - Counters incremented on insert, recomputed by aggregation on delete
//! - Checkpointed, resumable backfill over historical posts
//! - Permission-filtered feed pages cached with a short TTL

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod mentions;
pub mod metrics;
pub mod middleware;
pub mod validation;

// Re-export so integration tests and downstream callers use the same version
pub use chrono;
