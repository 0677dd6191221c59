//! Mention ledger core
//!
//! The ledger maps (mentioned user, post type, post id) to a mention record
//! and keeps a per-user counter equal to that user's row count. Submodules:
//! - `types`: records and identifiers shared across the crate
//! - `extract`: @mention extraction from post bodies
//! - `store`: RocksDB-backed ledger with the counter cache
//! - `directory`: local copy of host posts (hook payloads), scanned by backfill
//! - `registry`: username -> user id resolution
//! - `backfill`: checkpointed batch reindexing of historical posts
//! - `feed`: the paginated, permission-filtered profile listing

pub mod backfill;
pub mod directory;
pub mod extract;
pub mod feed;
pub mod registry;
pub mod store;
pub mod types;

pub use backfill::{BackfillReport, BackfillRunner};
pub use directory::PostDirectory;
pub use extract::extract_mentions;
pub use feed::{FeedItem, FeedPage, MentionFeed};
pub use registry::{UserRecord, UserRegistry};
pub use store::{LedgerStats, MentionStore, ReplaceOutcome};
pub use types::{MentionRecord, PostRecord, PostType};
