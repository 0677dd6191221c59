//! Username resolution
//!
//! Mentions arrive as display names; the ledger stores user ids. The
//! registry keeps the forward record under `user:{user_id}` and a
//! case-folded name index under `name:{lowercase}` so `@Alice` and
//! `@alice` resolve to the same account.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rocksdb::{Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub username: String,
    pub registered_at: DateTime<Utc>,
}

pub struct UserRegistry {
    db: Arc<DB>,
}

fn user_key(user_id: &str) -> String {
    format!("user:{user_id}")
}

fn name_key(username: &str) -> String {
    format!("name:{}", username.to_lowercase())
}

impl UserRegistry {
    pub fn new(storage_path: &Path) -> Result<Self> {
        let path = storage_path.join("users");
        std::fs::create_dir_all(&path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = Arc::new(DB::open(&opts, path).context("Failed to open user registry DB")?);

        Ok(Self { db })
    }

    /// Register or rename a user
    ///
    /// A rename drops the old name index entry so the stale name stops
    /// resolving.
    pub fn upsert(&self, user_id: &str, username: &str) -> Result<UserRecord> {
        let existing = self.get(user_id)?;

        let record = UserRecord {
            user_id: user_id.to_string(),
            username: username.to_string(),
            registered_at: existing
                .as_ref()
                .map(|r| r.registered_at)
                .unwrap_or_else(Utc::now),
        };

        let mut batch = WriteBatch::default();
        if let Some(old) = &existing {
            if !old.username.eq_ignore_ascii_case(username) {
                batch.delete(name_key(&old.username).as_bytes());
            }
        }
        let value = serde_json::to_vec(&record).context("Failed to serialize user record")?;
        batch.put(user_key(user_id).as_bytes(), &value);
        batch.put(name_key(username).as_bytes(), user_id.as_bytes());
        self.db.write(batch).context("Failed to store user record")?;

        Ok(record)
    }

    pub fn get(&self, user_id: &str) -> Result<Option<UserRecord>> {
        match self.db.get(user_key(user_id).as_bytes())? {
            Some(value) => {
                let record =
                    serde_json::from_slice(&value).context("Failed to deserialize user record")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Resolve a display name (case-insensitive) to a user record
    pub fn resolve(&self, username: &str) -> Result<Option<UserRecord>> {
        match self.db.get(name_key(username).as_bytes())? {
            Some(user_id) => {
                let user_id = String::from_utf8_lossy(&user_id).to_string();
                self.get(&user_id)
            }
            None => Ok(None),
        }
    }

    /// All registered users, sorted by user id
    pub fn list(&self) -> Result<Vec<UserRecord>> {
        let mut users = Vec::new();

        let iter = self.db.prefix_iterator(b"user:");
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(b"user:") {
                break;
            }
            let record: UserRecord =
                serde_json::from_slice(&value).context("Failed to deserialize user record")?;
            users.push(record);
        }

        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(users)
    }

    /// Delete a user and their name index entry; returns true if they existed
    pub fn remove(&self, user_id: &str) -> Result<bool> {
        let Some(record) = self.get(user_id)? else {
            return Ok(false);
        };

        let mut batch = WriteBatch::default();
        batch.delete(user_key(user_id).as_bytes());
        batch.delete(name_key(&record.username).as_bytes());
        self.db.write(batch)?;

        Ok(true)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().context("Failed to flush user registry")?;
        Ok(())
    }
}
