//! RocksDB-backed mention ledger with the counter cache
//!
//! Three databases, mirroring the host's table/index/counter split:
//! - items:  `user:{user_id}:{type}:{post_id:020}` -> MentionRecord (JSON)
//! - index:  `post:{type}:{post_id:020}:{user_id}` -> `1` (delete-by-post)
//! - meta:   `count:{user_id}` -> u64 LE, `checkpoint:{type}` -> i64 LE
//!
//! Invariant: `count:{user}` equals the number of item rows with that user's
//! prefix. The whole insert (dedupe check, row write, increment) runs under
//! a lock; deletes recount by aggregation.

use anyhow::{anyhow, Context, Result};
use rocksdb::{Options, WriteBatch, DB};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use super::types::{MentionRecord, PostType};

/// Outcome of replacing a post's mention set (backfill path)
#[derive(Debug, Clone, Default)]
pub struct ReplaceOutcome {
    /// Rows written for the new mention set
    pub inserted: usize,
    /// Old rows removed before the write
    pub removed: usize,
    /// Users whose counters were recomputed
    pub touched_users: Vec<String>,
}

/// Aggregate ledger statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct LedgerStats {
    pub total_rows: u64,
    pub tracked_users: usize,
}

/// Storage engine for the mention ledger
pub struct MentionStore {
    item_db: Arc<DB>,
    index_db: Arc<DB>,
    meta_db: Arc<DB>,
    /// Serializes inserts and counter rewrites against each other
    count_lock: parking_lot::Mutex<()>,
}

fn item_key(user_id: &str, post_type: PostType, post_id: i64) -> String {
    format!("user:{}:{}:{:020}", user_id, post_type.tag(), post_id)
}

fn user_prefix(user_id: &str) -> String {
    format!("user:{}:", user_id)
}

fn index_key(post_type: PostType, post_id: i64, user_id: &str) -> String {
    format!("post:{}:{:020}:{}", post_type.tag(), post_id, user_id)
}

fn post_prefix(post_type: PostType, post_id: i64) -> String {
    format!("post:{}:{:020}:", post_type.tag(), post_id)
}

fn count_key(user_id: &str) -> String {
    format!("count:{}", user_id)
}

fn checkpoint_key(post_type: PostType) -> String {
    format!("checkpoint:{}", post_type.tag())
}

impl MentionStore {
    /// Open (or create) the ledger under `storage_path/ledger`
    pub fn new(storage_path: &Path) -> Result<Self> {
        let ledger_path = storage_path.join("ledger");
        std::fs::create_dir_all(&ledger_path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_max_write_buffer_number(2);
        opts.set_write_buffer_size(32 * 1024 * 1024); // 32MB

        let item_db = Arc::new(
            DB::open(&opts, ledger_path.join("items")).context("Failed to open ledger items DB")?,
        );
        let index_db = Arc::new(
            DB::open(&opts, ledger_path.join("index")).context("Failed to open ledger index DB")?,
        );
        let meta_db = Arc::new(
            DB::open(&opts, ledger_path.join("meta")).context("Failed to open ledger meta DB")?,
        );

        tracing::info!("Mention ledger initialized");

        Ok(Self {
            item_db,
            index_db,
            meta_db,
            count_lock: parking_lot::Mutex::new(()),
        })
    }

    // =========================================================================
    // LEDGER WRITES
    // =========================================================================

    /// Record one mention; returns true if a new row was inserted
    ///
    /// Idempotent per (user, type, post id): a duplicate leaves the ledger
    /// and the counter untouched. A fresh insert increments the counter.
    pub fn record_mention(&self, record: &MentionRecord) -> Result<bool> {
        let key = item_key(&record.user_id, record.post_type, record.post_id);

        // The existence check, row write and increment must not interleave
        // with a concurrent insert of the same key (webhook retries), or the
        // counter advances twice for one row
        let _guard = self.count_lock.lock();

        if self.item_db.get(key.as_bytes())?.is_some() {
            return Ok(false);
        }

        let value = serde_json::to_vec(record).context("Failed to serialize mention record")?;
        self.item_db
            .put(key.as_bytes(), &value)
            .context("Failed to store mention record")?;

        let idx = index_key(record.post_type, record.post_id, &record.user_id);
        self.index_db.put(idx.as_bytes(), b"1")?;

        let next = self.mention_count(&record.user_id)? + 1;
        self.put_count(&record.user_id, next)?;

        tracing::debug!(
            user_id = %record.user_id,
            post = %format!("{}/{}", record.post_type, record.post_id),
            mentioned_by = %record.mentioned_by,
            "Recorded mention"
        );

        Ok(true)
    }

    /// Fetch one row, if present
    pub fn get_mention(
        &self,
        user_id: &str,
        post_type: PostType,
        post_id: i64,
    ) -> Result<Option<MentionRecord>> {
        let key = item_key(user_id, post_type, post_id);
        match self.item_db.get(key.as_bytes())? {
            Some(value) => {
                let record = serde_json::from_slice(&value)
                    .context("Failed to deserialize mention record")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Users with a ledger row for the given post
    pub fn users_mentioned_in(&self, post_type: PostType, post_id: i64) -> Result<Vec<String>> {
        let prefix = post_prefix(post_type, post_id);
        let mut users = Vec::new();

        let iter = self.index_db.prefix_iterator(prefix.as_bytes());
        for item in iter {
            let (key, _) = item?;
            let key_str = String::from_utf8_lossy(&key);

            if !key_str.starts_with(&prefix) {
                break;
            }

            if let Some(user_id) = key_str.strip_prefix(&prefix) {
                users.push(user_id.to_string());
            }
        }

        Ok(users)
    }

    /// Purge all rows for a deleted post and recount affected users
    ///
    /// Counters are recomputed by aggregation, never decremented, so a
    /// counter that drifted (host bug, partial write) self-heals here.
    pub fn remove_post(&self, post_type: PostType, post_id: i64) -> Result<Vec<String>> {
        let users = self.users_mentioned_in(post_type, post_id)?;
        if users.is_empty() {
            return Ok(users);
        }

        let mut item_batch = WriteBatch::default();
        let mut index_batch = WriteBatch::default();
        for user_id in &users {
            item_batch.delete(item_key(user_id, post_type, post_id).as_bytes());
            index_batch.delete(index_key(post_type, post_id, user_id).as_bytes());
        }
        self.item_db
            .write(item_batch)
            .context("Failed to delete ledger rows")?;
        self.index_db
            .write(index_batch)
            .context("Failed to delete ledger index rows")?;

        for user_id in &users {
            self.recount_user(user_id)?;
        }

        tracing::debug!(
            post = %format!("{}/{}", post_type, post_id),
            affected = users.len(),
            "Removed post from ledger"
        );

        Ok(users)
    }

    /// Replace a post's mention set (backfill path)
    ///
    /// Deletes the old rows, writes the new set, then recounts every user
    /// touched by either side. Running twice with the same input yields the
    /// same ledger and the same counters.
    pub fn replace_post_mentions(
        &self,
        post_type: PostType,
        post_id: i64,
        records: &[MentionRecord],
    ) -> Result<ReplaceOutcome> {
        let old_users = self.users_mentioned_in(post_type, post_id)?;

        let mut item_batch = WriteBatch::default();
        let mut index_batch = WriteBatch::default();
        for user_id in &old_users {
            item_batch.delete(item_key(user_id, post_type, post_id).as_bytes());
            index_batch.delete(index_key(post_type, post_id, user_id).as_bytes());
        }

        for record in records {
            debug_assert_eq!(record.post_type, post_type);
            debug_assert_eq!(record.post_id, post_id);

            let key = item_key(&record.user_id, post_type, post_id);
            let value =
                serde_json::to_vec(record).context("Failed to serialize mention record")?;
            item_batch.put(key.as_bytes(), &value);
            index_batch.put(
                index_key(post_type, post_id, &record.user_id).as_bytes(),
                b"1",
            );
        }

        self.item_db
            .write(item_batch)
            .context("Failed to replace ledger rows")?;
        self.index_db
            .write(index_batch)
            .context("Failed to replace ledger index rows")?;

        let mut touched: BTreeSet<String> = old_users.iter().cloned().collect();
        touched.extend(records.iter().map(|r| r.user_id.clone()));
        for user_id in &touched {
            self.recount_user(user_id)?;
        }

        Ok(ReplaceOutcome {
            inserted: records.len(),
            removed: old_users.len(),
            touched_users: touched.into_iter().collect(),
        })
    }

    /// Remove every ledger row and the counter for a user (GDPR path)
    ///
    /// Returns the number of rows removed.
    pub fn remove_user(&self, user_id: &str) -> Result<usize> {
        let records = self.mentions_for_user(user_id)?;

        let mut item_batch = WriteBatch::default();
        let mut index_batch = WriteBatch::default();
        for record in &records {
            item_batch.delete(item_key(user_id, record.post_type, record.post_id).as_bytes());
            index_batch.delete(index_key(record.post_type, record.post_id, user_id).as_bytes());
        }
        self.item_db.write(item_batch)?;
        self.index_db.write(index_batch)?;
        self.meta_db.delete(count_key(user_id).as_bytes())?;

        Ok(records.len())
    }

    // =========================================================================
    // COUNTER CACHE
    // =========================================================================

    /// Cached mention count for a user (0 when never mentioned)
    pub fn mention_count(&self, user_id: &str) -> Result<u64> {
        match self.meta_db.get(count_key(user_id).as_bytes())? {
            Some(value) => {
                let bytes: [u8; 8] = value
                    .as_slice()
                    .try_into()
                    .map_err(|_| anyhow!("Corrupt counter for user {user_id}"))?;
                Ok(u64::from_le_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    fn put_count(&self, user_id: &str, count: u64) -> Result<()> {
        self.meta_db
            .put(count_key(user_id).as_bytes(), count.to_le_bytes())
            .context("Failed to write mention counter")?;
        Ok(())
    }

    /// Recompute one user's counter from their ledger rows
    pub fn recount_user(&self, user_id: &str) -> Result<u64> {
        let prefix = user_prefix(user_id);
        let mut count: u64 = 0;

        let iter = self.item_db.prefix_iterator(prefix.as_bytes());
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            count += 1;
        }

        let _guard = self.count_lock.lock();
        if count == 0 {
            // Drop zero counters so tracked_users reflects reality
            self.meta_db.delete(count_key(user_id).as_bytes())?;
        } else {
            self.put_count(user_id, count)?;
        }

        Ok(count)
    }

    /// Recompute counters by aggregation (admin repair)
    ///
    /// With an empty user list, every tracked user is recounted - the
    /// equivalent of the host's unscoped counter refresh.
    pub fn recount(&self, user_ids: &[String]) -> Result<usize> {
        let targets: Vec<String> = if user_ids.is_empty() {
            self.tracked_users()?
        } else {
            user_ids.to_vec()
        };

        for user_id in &targets {
            self.recount_user(user_id)?;
        }

        tracing::info!(users = targets.len(), "Recounted mention counters");
        Ok(targets.len())
    }

    /// Users that currently have a counter entry
    pub fn tracked_users(&self) -> Result<Vec<String>> {
        let mut users = Vec::new();
        let iter = self.meta_db.prefix_iterator(b"count:");
        for item in iter {
            let (key, _) = item?;
            let key_str = String::from_utf8_lossy(&key);
            if !key_str.starts_with("count:") {
                break;
            }
            if let Some(user_id) = key_str.strip_prefix("count:") {
                users.push(user_id.to_string());
            }
        }
        Ok(users)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// All ledger rows for a user, unsorted
    pub fn mentions_for_user(&self, user_id: &str) -> Result<Vec<MentionRecord>> {
        let prefix = user_prefix(user_id);
        let mut records = Vec::new();

        let iter = self.item_db.prefix_iterator(prefix.as_bytes());
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }

            let record: MentionRecord = serde_json::from_slice(&value)
                .context("Failed to deserialize mention record")?;
            records.push(record);
        }

        Ok(records)
    }

    /// Aggregate ledger stats (full scan of the meta DB, used by /metrics)
    pub fn stats(&self) -> Result<LedgerStats> {
        let mut stats = LedgerStats::default();

        let iter = self.meta_db.prefix_iterator(b"count:");
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(b"count:") {
                break;
            }
            stats.tracked_users += 1;
            if let Ok(bytes) = <[u8; 8]>::try_from(value.as_ref()) {
                stats.total_rows += u64::from_le_bytes(bytes);
            }
        }

        Ok(stats)
    }

    // =========================================================================
    // BACKFILL CHECKPOINTS
    // =========================================================================

    /// Last processed post id for a backfill scan, if any
    pub fn checkpoint(&self, post_type: PostType) -> Result<Option<i64>> {
        match self.meta_db.get(checkpoint_key(post_type).as_bytes())? {
            Some(value) => {
                let bytes: [u8; 8] = value
                    .as_slice()
                    .try_into()
                    .map_err(|_| anyhow!("Corrupt checkpoint for {post_type}"))?;
                Ok(Some(i64::from_le_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    /// Persist the last processed post id
    pub fn set_checkpoint(&self, post_type: PostType, post_id: i64) -> Result<()> {
        self.meta_db
            .put(checkpoint_key(post_type).as_bytes(), post_id.to_le_bytes())
            .context("Failed to write backfill checkpoint")?;
        Ok(())
    }

    /// Reset a backfill scan to the beginning
    pub fn reset_checkpoint(&self, post_type: PostType) -> Result<()> {
        self.meta_db
            .delete(checkpoint_key(post_type).as_bytes())?;
        tracing::info!(post_type = %post_type, "Backfill checkpoint reset");
        Ok(())
    }

    /// Flush all databases (called on shutdown)
    pub fn flush(&self) -> Result<()> {
        self.item_db.flush().context("Failed to flush items DB")?;
        self.index_db.flush().context("Failed to flush index DB")?;
        self.meta_db.flush().context("Failed to flush meta DB")?;
        Ok(())
    }
}
