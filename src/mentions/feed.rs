//! Profile mention feed
//!
//! Joins a user's ledger rows against the post directory and serves them
//! newest-post-first, filtered to the categories the viewer may see. The
//! category filter runs before pagination so page boundaries and totals
//! agree for every viewer.
//!
//! Pages are cached with a short TTL. The cache key carries the visible
//! category set (viewers with different permissions must never share a
//! page) and a per-user generation counter that is bumped whenever the
//! user's ledger changes, so writes invalidate without enumerating keys.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::directory::PostDirectory;
use super::store::MentionStore;
use super::types::{MentionRecord, PostType};
use crate::metrics::{FEED_CACHE_TOTAL, FEED_PAGE_DURATION, Timer};

const EXCERPT_CHARS: usize = 250;

/// One rendered feed entry
#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub post_type: PostType,
    pub post_id: i64,
    pub discussion_id: i64,
    pub category_id: i64,
    /// Discussion title (comments show their parent discussion's title)
    pub title: String,
    /// Author of the mentioning post
    pub mentioned_by: String,
    pub inserted_at: DateTime<Utc>,
    pub excerpt: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    /// Permission-filtered total, for the pager
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

pub struct MentionFeed {
    store: Arc<MentionStore>,
    directory: Arc<PostDirectory>,
    cache: moka::sync::Cache<String, Arc<FeedPage>>,
    /// Per-user cache generation, bumped on any ledger change for that user
    generations: DashMap<String, u64>,
}

impl MentionFeed {
    pub fn new(
        store: Arc<MentionStore>,
        directory: Arc<PostDirectory>,
        ttl_secs: u64,
        max_pages: u64,
    ) -> Self {
        let cache = moka::sync::Cache::builder()
            .max_capacity(max_pages)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            store,
            directory,
            cache,
            generations: DashMap::new(),
        }
    }

    /// Drop every cached page for a user
    pub fn invalidate_user(&self, user_id: &str) {
        *self.generations.entry(user_id.to_string()).or_insert(0) += 1;
    }

    fn generation(&self, user_id: &str) -> u64 {
        self.generations.get(user_id).map(|g| *g).unwrap_or(0)
    }

    fn cache_key(
        &self,
        user_id: &str,
        visible_categories: Option<&[i64]>,
        limit: usize,
        offset: usize,
    ) -> String {
        let cats = match visible_categories {
            None => "*".to_string(),
            Some(ids) => {
                let mut sorted = ids.to_vec();
                sorted.sort_unstable();
                sorted.dedup();
                sorted
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            }
        };
        format!(
            "{}:{}:{}:{}:{}",
            user_id,
            self.generation(user_id),
            limit,
            offset,
            cats
        )
    }

    /// One page of a user's mentions, newest post first
    ///
    /// `visible_categories` of None means the viewer sees everything.
    pub fn page(
        &self,
        user_id: &str,
        visible_categories: Option<&[i64]>,
        limit: usize,
        offset: usize,
    ) -> anyhow::Result<Arc<FeedPage>> {
        let key = self.cache_key(user_id, visible_categories, limit, offset);

        if let Some(page) = self.cache.get(&key) {
            FEED_CACHE_TOTAL.with_label_values(&["hit"]).inc();
            return Ok(page);
        }
        FEED_CACHE_TOTAL.with_label_values(&["miss"]).inc();

        let _timer = Timer::new(FEED_PAGE_DURATION.clone());
        let page = Arc::new(self.build_page(user_id, visible_categories, limit, offset)?);
        self.cache.insert(key, page.clone());
        Ok(page)
    }

    /// Permission-filtered mention total for the pager
    pub fn count(&self, user_id: &str, visible_categories: Option<&[i64]>) -> anyhow::Result<usize> {
        let rows = self.filtered_rows(user_id, visible_categories)?;
        Ok(rows.len())
    }

    fn filtered_rows(
        &self,
        user_id: &str,
        visible_categories: Option<&[i64]>,
    ) -> anyhow::Result<Vec<MentionRecord>> {
        let mut rows = self.store.mentions_for_user(user_id)?;

        if let Some(visible) = visible_categories {
            rows.retain(|r| visible.contains(&r.category_id));
        }

        // Newest post first, post id breaks timestamp ties
        rows.sort_by(|a, b| {
            b.post_inserted_at
                .cmp(&a.post_inserted_at)
                .then(b.post_id.cmp(&a.post_id))
        });

        Ok(rows)
    }

    fn build_page(
        &self,
        user_id: &str,
        visible_categories: Option<&[i64]>,
        limit: usize,
        offset: usize,
    ) -> anyhow::Result<FeedPage> {
        let rows = self.filtered_rows(user_id, visible_categories)?;
        let total = rows.len();

        let mut items = Vec::new();
        for row in rows.into_iter().skip(offset).take(limit) {
            // Post deleted out-of-band: keep paging stable, skip the row
            let Some(post) = self.directory.get(row.post_type, row.post_id)? else {
                tracing::debug!(
                    post = %format!("{}/{}", row.post_type, row.post_id),
                    "Feed row references a missing post, skipping"
                );
                continue;
            };

            items.push(FeedItem {
                post_type: row.post_type,
                post_id: row.post_id,
                discussion_id: row.discussion_id,
                category_id: row.category_id,
                title: post.title.clone(),
                mentioned_by: row.mentioned_by,
                inserted_at: row.post_inserted_at,
                excerpt: excerpt(&post.body),
                url: post.url(),
            });
        }

        Ok(FeedPage {
            items,
            total,
            limit,
            offset,
        })
    }
}

/// Body excerpt capped at 250 characters, cut on a char boundary
fn excerpt(body: &str) -> String {
    if body.chars().count() <= EXCERPT_CHARS {
        return body.to_string();
    }
    let mut out: String = body.chars().take(EXCERPT_CHARS).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mentions::types::PostRecord;
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct Fixture {
        feed: MentionFeed,
        store: Arc<MentionStore>,
        directory: Arc<PostDirectory>,
        _temp: TempDir,
    }

    fn setup() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MentionStore::new(temp.path()).unwrap());
        let directory = Arc::new(PostDirectory::new(temp.path()).unwrap());
        let feed = MentionFeed::new(store.clone(), directory.clone(), 120, 1000);
        Fixture {
            feed,
            store,
            directory,
            _temp: temp,
        }
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 12, 0, 0).unwrap()
    }

    fn seed(fx: &Fixture, post_id: i64, category_id: i64, day: u32, body: &str) {
        let post = PostRecord {
            post_type: PostType::Comment,
            post_id,
            discussion_id: 1,
            category_id,
            author_id: "author".to_string(),
            title: "Thread".to_string(),
            body: body.to_string(),
            inserted_at: ts(day),
        };
        fx.directory.upsert(&post).unwrap();
        fx.store
            .record_mention(&MentionRecord {
                user_id: "alice".to_string(),
                post_type: post.post_type,
                post_id,
                discussion_id: post.discussion_id,
                category_id,
                mentioned_by: post.author_id.clone(),
                post_inserted_at: post.inserted_at,
                recorded_at: Utc::now(),
            })
            .unwrap();
    }

    #[test]
    fn test_newest_first_with_pagination() {
        let fx = setup();
        seed(&fx, 1, 1, 1, "oldest @alice");
        seed(&fx, 2, 1, 3, "newest @alice");
        seed(&fx, 3, 1, 2, "middle @alice");

        let page = fx.feed.page("alice", None, 2, 0).unwrap();
        assert_eq!(page.total, 3);
        let ids: Vec<i64> = page.items.iter().map(|i| i.post_id).collect();
        assert_eq!(ids, vec![2, 3]);

        let page2 = fx.feed.page("alice", None, 2, 2).unwrap();
        let ids: Vec<i64> = page2.items.iter().map(|i| i.post_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_category_filter_applies_before_pagination() {
        let fx = setup();
        seed(&fx, 1, 5, 1, "@alice"); // hidden category
        seed(&fx, 2, 1, 2, "@alice");
        seed(&fx, 3, 1, 3, "@alice");

        let page = fx.feed.page("alice", Some(&[1]), 10, 0).unwrap();
        assert_eq!(page.total, 2);
        let ids: Vec<i64> = page.items.iter().map(|i| i.post_id).collect();
        assert_eq!(ids, vec![3, 2]);

        assert_eq!(fx.feed.count("alice", Some(&[1])).unwrap(), 2);
        assert_eq!(fx.feed.count("alice", None).unwrap(), 3);
    }

    #[test]
    fn test_viewers_with_different_permissions_get_different_pages() {
        let fx = setup();
        seed(&fx, 1, 5, 1, "@alice");
        seed(&fx, 2, 1, 2, "@alice");

        let unrestricted = fx.feed.page("alice", None, 10, 0).unwrap();
        let restricted = fx.feed.page("alice", Some(&[1]), 10, 0).unwrap();

        assert_eq!(unrestricted.total, 2);
        assert_eq!(restricted.total, 1);
        assert_eq!(restricted.items[0].post_id, 2);
    }

    #[test]
    fn test_invalidation_after_ledger_change() {
        let fx = setup();
        seed(&fx, 1, 1, 1, "@alice");

        let before = fx.feed.page("alice", None, 10, 0).unwrap();
        assert_eq!(before.total, 1);

        seed(&fx, 2, 1, 2, "@alice");
        // Still the cached page until the writer invalidates
        assert_eq!(fx.feed.page("alice", None, 10, 0).unwrap().total, 1);

        fx.feed.invalidate_user("alice");
        assert_eq!(fx.feed.page("alice", None, 10, 0).unwrap().total, 2);
    }

    #[test]
    fn test_missing_post_is_skipped_but_counted() {
        let fx = setup();
        seed(&fx, 1, 1, 1, "@alice");
        seed(&fx, 2, 1, 2, "@alice");
        fx.directory.remove(PostType::Comment, 2).unwrap();

        let page = fx.feed.page("alice", None, 10, 0).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].post_id, 1);
    }

    #[test]
    fn test_excerpt_and_url() {
        let fx = setup();
        let long_body = format!("@alice {}", "x".repeat(400));
        seed(&fx, 1, 1, 1, &long_body);

        let page = fx.feed.page("alice", None, 10, 0).unwrap();
        let item = &page.items[0];
        assert_eq!(item.excerpt.chars().count(), 251); // 250 + ellipsis
        assert_eq!(item.url, "/discussion/comment/1#Comment_1");
        assert_eq!(item.title, "Thread");
    }

    #[test]
    fn test_excerpt_short_body_untouched() {
        assert_eq!(excerpt("hello"), "hello");
    }
}
