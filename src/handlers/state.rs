//! Central service state
//!
//! Wires the ledger, post directory, user registry, feed and backfill runner
//! together and exposes the high-level operations the handlers call. Shared
//! across requests behind an `Arc`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::config::ServerConfig;
use crate::mentions::{
    extract_mentions, BackfillRunner, MentionFeed, MentionRecord, MentionStore, PostDirectory,
    PostRecord, PostType, UserRecord, UserRegistry,
};
use crate::metrics::{MENTION_RECORD_TOTAL, MENTION_REMOVE_TOTAL};

/// Outcome of ingesting one post's mentions
#[derive(Debug, Default)]
pub struct IngestOutcome {
    /// User ids that gained a new ledger row
    pub inserted: Vec<String>,
    /// Mentions already recorded for this post
    pub duplicates: usize,
    /// Usernames with no registered user
    pub unresolved: Vec<String>,
}

pub struct MentionService {
    pub store: Arc<MentionStore>,
    pub directory: Arc<PostDirectory>,
    pub registry: Arc<UserRegistry>,
    pub feed: Arc<MentionFeed>,
    pub backfill: Arc<BackfillRunner>,
    pub config: ServerConfig,
}

impl MentionService {
    pub fn new(config: ServerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.storage_path)?;

        let store = Arc::new(MentionStore::new(&config.storage_path)?);
        let directory = Arc::new(PostDirectory::new(&config.storage_path)?);
        let registry = Arc::new(UserRegistry::new(&config.storage_path)?);
        info!("Stores initialized at {:?}", config.storage_path);

        let feed = Arc::new(MentionFeed::new(
            store.clone(),
            directory.clone(),
            config.feed_cache_ttl_secs,
            config.feed_cache_max_pages,
        ));

        let backfill = Arc::new(BackfillRunner::new(
            store.clone(),
            directory.clone(),
            registry.clone(),
            feed.clone(),
            config.backfill_checkpoint_interval,
            config.max_mentions_per_post,
        ));

        Ok(Self {
            store,
            directory,
            registry,
            feed,
            backfill,
            config,
        })
    }

    // =========================================================================
    // USERS
    // =========================================================================

    pub fn register_user(&self, user_id: &str, username: &str) -> Result<UserRecord> {
        let record = self.registry.upsert(user_id, username)?;
        info!(user_id = %user_id, username = %username, "User registered");
        Ok(record)
    }

    pub fn list_users(&self) -> Result<Vec<UserRecord>> {
        self.registry.list()
    }

    pub fn user_stats(&self, user_id: &str) -> Result<Option<(UserRecord, u64)>> {
        let Some(record) = self.registry.get(user_id)? else {
            return Ok(None);
        };
        let count = self.store.mention_count(user_id)?;
        Ok(Some((record, count)))
    }

    /// Delete a user's registry entry, ledger rows and counter (GDPR path)
    ///
    /// Returns None when the user is unknown and has no ledger rows.
    pub fn delete_user(&self, user_id: &str) -> Result<Option<usize>> {
        let registered = self.registry.remove(user_id)?;
        let removed = self.store.remove_user(user_id)?;
        self.feed.invalidate_user(user_id);

        if !registered && removed == 0 {
            return Ok(None);
        }

        MENTION_REMOVE_TOTAL
            .with_label_values(&["user_deleted"])
            .inc_by(removed as u64);
        info!(user_id = %user_id, mentions_removed = removed, "User deleted");
        Ok(Some(removed))
    }

    // =========================================================================
    // LIFECYCLE EVENTS
    // =========================================================================

    /// Handle a post-created event: store the post and record its mentions
    ///
    /// `explicit_mentions` (host-resolved usernames) overrides extraction
    /// when present.
    pub fn ingest_post(
        &self,
        post: &PostRecord,
        explicit_mentions: Option<&[String]>,
    ) -> Result<IngestOutcome> {
        self.directory.upsert(post)?;

        let names: Vec<String> = match explicit_mentions {
            Some(list) => list
                .iter()
                .take(self.config.max_mentions_per_post)
                .cloned()
                .collect(),
            None => extract_mentions(&post.body, self.config.max_mentions_per_post),
        };

        let mut outcome = IngestOutcome::default();
        let now = Utc::now();

        for name in names {
            let Some(user) = self.registry.resolve(&name)? else {
                MENTION_RECORD_TOTAL
                    .with_label_values(&["unresolved"])
                    .inc();
                outcome.unresolved.push(name);
                continue;
            };

            let inserted = self.store.record_mention(&MentionRecord {
                user_id: user.user_id.clone(),
                post_type: post.post_type,
                post_id: post.post_id,
                discussion_id: post.discussion_id,
                category_id: post.category_id,
                mentioned_by: post.author_id.clone(),
                post_inserted_at: post.inserted_at,
                recorded_at: now,
            })?;

            if inserted {
                MENTION_RECORD_TOTAL.with_label_values(&["inserted"]).inc();
                self.feed.invalidate_user(&user.user_id);
                outcome.inserted.push(user.user_id);
            } else {
                MENTION_RECORD_TOTAL.with_label_values(&["duplicate"]).inc();
                outcome.duplicates += 1;
            }
        }

        Ok(outcome)
    }

    /// Handle a post-deleted event: purge rows, refresh counters, drop caches
    pub fn delete_post(&self, post_type: PostType, post_id: i64) -> Result<Vec<String>> {
        let affected = self.store.remove_post(post_type, post_id)?;
        self.directory.remove(post_type, post_id)?;

        MENTION_REMOVE_TOTAL
            .with_label_values(&["post_deleted"])
            .inc_by(affected.len() as u64);
        for user_id in &affected {
            self.feed.invalidate_user(user_id);
        }

        Ok(affected)
    }

    // =========================================================================
    // REPAIR
    // =========================================================================

    /// Recount counters by aggregation; empty list means every tracked user
    pub fn recount(&self, user_ids: &[String]) -> Result<usize> {
        let recounted = self.store.recount(user_ids)?;
        if user_ids.is_empty() {
            // Every feed page may be stale after a full recount
            for user in self.store.tracked_users()? {
                self.feed.invalidate_user(&user);
            }
        } else {
            for user in user_ids {
                self.feed.invalidate_user(user);
            }
        }
        Ok(recounted)
    }

    // =========================================================================
    // SHUTDOWN
    // =========================================================================

    pub fn flush_all_databases(&self) -> Result<()> {
        info!("Flushing all databases to disk...");
        self.store.flush().context("ledger flush")?;
        self.directory.flush().context("post directory flush")?;
        self.registry.flush().context("user registry flush")?;
        info!("All databases flushed");
        Ok(())
    }
}

/// Build a PostRecord from a post-created payload
pub fn post_from_payload(
    post_type: PostType,
    post_id: i64,
    discussion_id: Option<i64>,
    category_id: i64,
    author_id: String,
    title: String,
    body: String,
    inserted_at: Option<DateTime<Utc>>,
) -> PostRecord {
    PostRecord {
        post_type,
        post_id,
        discussion_id: discussion_id.unwrap_or(post_id),
        category_id,
        author_id,
        title,
        body,
        inserted_at: inserted_at.unwrap_or_else(Utc::now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (MentionService, TempDir) {
        let temp = TempDir::new().unwrap();
        let config = ServerConfig {
            storage_path: temp.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let service = MentionService::new(config).unwrap();
        (service, temp)
    }

    fn discussion(post_id: i64, body: &str) -> PostRecord {
        PostRecord {
            post_type: PostType::Discussion,
            post_id,
            discussion_id: post_id,
            category_id: 1,
            author_id: "author".to_string(),
            title: "A discussion".to_string(),
            body: body.to_string(),
            inserted_at: Utc::now(),
        }
    }

    #[test]
    fn test_ingest_records_discussion_mentions() {
        let (service, _temp) = setup();
        service.register_user("u-alice", "alice").unwrap();

        let outcome = service
            .ingest_post(&discussion(1, "hello @alice and @ghost"), None)
            .unwrap();

        assert_eq!(outcome.inserted, vec!["u-alice"]);
        assert_eq!(outcome.unresolved, vec!["ghost"]);
        assert_eq!(service.store.mention_count("u-alice").unwrap(), 1);

        // Discussions land under the discussion type, not comment
        assert!(service
            .store
            .get_mention("u-alice", PostType::Discussion, 1)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_explicit_mentions_override_extraction() {
        let (service, _temp) = setup();
        service.register_user("u-bob", "bob").unwrap();

        let outcome = service
            .ingest_post(
                &discussion(2, "body says @alice"),
                Some(&["bob".to_string()]),
            )
            .unwrap();

        assert_eq!(outcome.inserted, vec!["u-bob"]);
        assert_eq!(service.store.mention_count("u-bob").unwrap(), 1);
    }

    #[test]
    fn test_reingest_is_idempotent() {
        let (service, _temp) = setup();
        service.register_user("u-alice", "alice").unwrap();

        let post = discussion(3, "@alice");
        service.ingest_post(&post, None).unwrap();
        let second = service.ingest_post(&post, None).unwrap();

        assert!(second.inserted.is_empty());
        assert_eq!(second.duplicates, 1);
        assert_eq!(service.store.mention_count("u-alice").unwrap(), 1);
    }

    #[test]
    fn test_delete_post_refreshes_counters_and_directory() {
        let (service, _temp) = setup();
        service.register_user("u-alice", "alice").unwrap();
        service.ingest_post(&discussion(4, "@alice"), None).unwrap();

        let affected = service.delete_post(PostType::Discussion, 4).unwrap();
        assert_eq!(affected, vec!["u-alice"]);
        assert_eq!(service.store.mention_count("u-alice").unwrap(), 0);
        assert!(service
            .directory
            .get(PostType::Discussion, 4)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_delete_user_removes_everything() {
        let (service, _temp) = setup();
        service.register_user("u-alice", "alice").unwrap();
        service.ingest_post(&discussion(5, "@alice"), None).unwrap();

        let removed = service.delete_user("u-alice").unwrap();
        assert_eq!(removed, Some(1));
        assert!(service.registry.get("u-alice").unwrap().is_none());
        assert_eq!(service.store.mention_count("u-alice").unwrap(), 0);

        assert_eq!(service.delete_user("u-alice").unwrap(), None);
    }
}
