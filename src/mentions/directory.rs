//! Local copy of host posts
//!
//! Hook payloads are stored here on ingest so backfill can rescan bodies and
//! the feed can render titles, excerpts and URLs without calling back into
//! the host. Keys are `{type}:{post_id:020}`; the zero padding keeps a plain
//! iterator in ascending post-id order, which is what backfill scans.

use anyhow::{Context, Result};
use rocksdb::{Options, DB};
use std::path::Path;
use std::sync::Arc;

use super::types::{PostRecord, PostType};

pub struct PostDirectory {
    db: Arc<DB>,
}

fn post_key(post_type: PostType, post_id: i64) -> String {
    format!("{}:{:020}", post_type.tag(), post_id)
}

impl PostDirectory {
    pub fn new(storage_path: &Path) -> Result<Self> {
        let path = storage_path.join("posts");
        std::fs::create_dir_all(&path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = Arc::new(DB::open(&opts, path).context("Failed to open post directory DB")?);

        Ok(Self { db })
    }

    /// Insert or overwrite the local copy of a post
    pub fn upsert(&self, post: &PostRecord) -> Result<()> {
        let key = post_key(post.post_type, post.post_id);
        let value = serde_json::to_vec(post).context("Failed to serialize post record")?;
        self.db
            .put(key.as_bytes(), &value)
            .context("Failed to store post record")?;
        Ok(())
    }

    pub fn get(&self, post_type: PostType, post_id: i64) -> Result<Option<PostRecord>> {
        let key = post_key(post_type, post_id);
        match self.db.get(key.as_bytes())? {
            Some(value) => {
                let post =
                    serde_json::from_slice(&value).context("Failed to deserialize post record")?;
                Ok(Some(post))
            }
            None => Ok(None),
        }
    }

    pub fn remove(&self, post_type: PostType, post_id: i64) -> Result<()> {
        self.db.delete(post_key(post_type, post_id).as_bytes())?;
        Ok(())
    }

    /// Posts of one type with id >= `from_id`, ascending, at most `limit`
    ///
    /// Backfill resumes from its checkpoint inclusively; re-scanning the
    /// checkpointed post is safe because the ledger write is a replace.
    pub fn scan_from(
        &self,
        post_type: PostType,
        from_id: i64,
        limit: usize,
    ) -> Result<Vec<PostRecord>> {
        let start = post_key(post_type, from_id.max(0));
        let type_prefix = format!("{}:", post_type.tag());
        let mut posts = Vec::new();

        let iter = self.db.iterator(rocksdb::IteratorMode::From(
            start.as_bytes(),
            rocksdb::Direction::Forward,
        ));

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(type_prefix.as_bytes()) {
                break;
            }

            let post: PostRecord =
                serde_json::from_slice(&value).context("Failed to deserialize post record")?;
            posts.push(post);

            if posts.len() >= limit {
                break;
            }
        }

        Ok(posts)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().context("Failed to flush post directory")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn post(post_type: PostType, post_id: i64) -> PostRecord {
        PostRecord {
            post_type,
            post_id,
            discussion_id: post_id,
            category_id: 1,
            author_id: "alice".to_string(),
            title: format!("Post {post_id}"),
            body: "hello @bob".to_string(),
            inserted_at: Utc::now(),
        }
    }

    #[test]
    fn test_upsert_get_remove() {
        let temp = TempDir::new().unwrap();
        let dir = PostDirectory::new(temp.path()).unwrap();

        dir.upsert(&post(PostType::Discussion, 5)).unwrap();
        let fetched = dir.get(PostType::Discussion, 5).unwrap().unwrap();
        assert_eq!(fetched.post_id, 5);

        // Same id, different type is a distinct key
        assert!(dir.get(PostType::Comment, 5).unwrap().is_none());

        dir.remove(PostType::Discussion, 5).unwrap();
        assert!(dir.get(PostType::Discussion, 5).unwrap().is_none());
    }

    #[test]
    fn test_scan_ascending_with_limit() {
        let temp = TempDir::new().unwrap();
        let dir = PostDirectory::new(temp.path()).unwrap();

        for id in [30, 10, 20, 40] {
            dir.upsert(&post(PostType::Comment, id)).unwrap();
        }
        dir.upsert(&post(PostType::Discussion, 15)).unwrap();

        let batch = dir.scan_from(PostType::Comment, 0, 3).unwrap();
        let ids: Vec<i64> = batch.iter().map(|p| p.post_id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn test_scan_from_is_inclusive() {
        let temp = TempDir::new().unwrap();
        let dir = PostDirectory::new(temp.path()).unwrap();

        for id in [10, 20, 30] {
            dir.upsert(&post(PostType::Discussion, id)).unwrap();
        }

        let batch = dir.scan_from(PostType::Discussion, 20, 10).unwrap();
        let ids: Vec<i64> = batch.iter().map(|p| p.post_id).collect();
        assert_eq!(ids, vec![20, 30]);
    }

    #[test]
    fn test_scan_does_not_cross_type() {
        let temp = TempDir::new().unwrap();
        let dir = PostDirectory::new(temp.path()).unwrap();

        dir.upsert(&post(PostType::Comment, 1)).unwrap();
        dir.upsert(&post(PostType::Discussion, 2)).unwrap();

        let comments = dir.scan_from(PostType::Comment, 0, 10).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].post_type, PostType::Comment);
    }
}
