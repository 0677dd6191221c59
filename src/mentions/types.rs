//! Records and identifiers shared across the ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of post a mention occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    Discussion,
    Comment,
}

impl PostType {
    /// Stable tag used in storage keys and metric labels
    pub fn tag(&self) -> &'static str {
        match self {
            PostType::Discussion => "discussion",
            PostType::Comment => "comment",
        }
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One ledger row: a user was mentioned in a post
///
/// Rows carry the category id and the post's insertion time so the feed can
/// permission-filter and sort without touching the post directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionRecord {
    /// The mentioned user
    pub user_id: String,
    pub post_type: PostType,
    pub post_id: i64,
    /// Parent discussion (equals post_id for discussions)
    pub discussion_id: i64,
    pub category_id: i64,
    /// The post author who wrote the mention
    pub mentioned_by: String,
    /// When the mentioning post was created
    pub post_inserted_at: DateTime<Utc>,
    /// When this row was written
    pub recorded_at: DateTime<Utc>,
}

/// Local copy of a host post, written on ingest and scanned by backfill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub post_type: PostType,
    pub post_id: i64,
    /// Parent discussion (equals post_id for discussions)
    pub discussion_id: i64,
    pub category_id: i64,
    /// Post author
    pub author_id: String,
    /// Discussion name; for comments, the parent discussion's name
    pub title: String,
    pub body: String,
    pub inserted_at: DateTime<Utc>,
}

impl PostRecord {
    /// Forum-style URL for this post
    ///
    /// Discussions link to `/discussion/{id}/{slug}#latest`, comments to
    /// `/discussion/comment/{id}#Comment_{id}`, matching the host's routes.
    pub fn url(&self) -> String {
        match self.post_type {
            PostType::Discussion => {
                format!("/discussion/{}/{}#latest", self.post_id, slug(&self.title))
            }
            PostType::Comment => format!(
                "/discussion/comment/{}#Comment_{}",
                self.post_id, self.post_id
            ),
        }
    }
}

/// URL slug from a title: lowercase, non-alphanumerics collapsed to dashes
pub fn slug(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_dash = true; // suppress leading dash

    for c in title.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }

    while out.ends_with('-') {
        out.pop();
    }

    if out.is_empty() {
        out.push('x');
    }

    out
}
