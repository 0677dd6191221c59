//! Input validation for the HTTP surface
//! Keeps hostile payloads out of the ledger and bounds every request

use anyhow::{anyhow, Result};

/// Maximum lengths for security
pub const MAX_USER_ID_LENGTH: usize = 128;
pub const MAX_USERNAME_LENGTH: usize = 64;
pub const MAX_TITLE_LENGTH: usize = 512;
pub const MAX_BODY_LENGTH: usize = 65_535; // forum post text column size
pub const MAX_PAGE_SIZE: usize = 100;
pub const MAX_BACKFILL_BATCH: usize = 10_000;

/// Validate user_id
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(anyhow!("user_id cannot be empty"));
    }

    if user_id.len() > MAX_USER_ID_LENGTH {
        return Err(anyhow!(
            "user_id too long: {} chars (max: {})",
            user_id.len(),
            MAX_USER_ID_LENGTH
        ));
    }

    // Only allow alphanumeric, dash, underscore, dot
    if !user_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(anyhow!(
            "user_id contains invalid characters (allowed: alphanumeric, -, _, .)"
        ));
    }

    Ok(())
}

/// Validate a display username (the token matched by @mentions)
pub fn validate_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(anyhow!("username cannot be empty"));
    }

    if username.len() > MAX_USERNAME_LENGTH {
        return Err(anyhow!(
            "username too long: {} chars (max: {})",
            username.len(),
            MAX_USERNAME_LENGTH
        ));
    }

    if username.chars().any(|c| c.is_control()) {
        return Err(anyhow!("username contains control characters"));
    }

    // '@' and '"' would break mention extraction round-trips
    if username.contains('@') || username.contains('"') {
        return Err(anyhow!("username may not contain '@' or '\"'"));
    }

    Ok(())
}

/// Validate a forum post id (host ids are positive integers)
pub fn validate_post_id(post_id: i64) -> Result<()> {
    if post_id <= 0 {
        return Err(anyhow!("post id must be positive, got: {post_id}"));
    }
    Ok(())
}

/// Validate post body content
pub fn validate_body(body: &str) -> Result<()> {
    if body.len() > MAX_BODY_LENGTH {
        return Err(anyhow!(
            "body too long: {} bytes (max: {})",
            body.len(),
            MAX_BODY_LENGTH
        ));
    }
    Ok(())
}

/// Validate title (discussion name)
pub fn validate_title(title: &str) -> Result<()> {
    if title.len() > MAX_TITLE_LENGTH {
        return Err(anyhow!(
            "title too long: {} chars (max: {})",
            title.len(),
            MAX_TITLE_LENGTH
        ));
    }
    Ok(())
}

/// Validate feed pagination parameters
pub fn validate_page(limit: usize, offset: usize) -> Result<()> {
    if limit == 0 {
        return Err(anyhow!("limit must be greater than 0"));
    }

    if limit > MAX_PAGE_SIZE {
        return Err(anyhow!("limit too large: {limit} (max: {MAX_PAGE_SIZE})"));
    }

    // Offsets beyond any plausible feed are a client bug, not a deep page
    if offset > 1_000_000 {
        return Err(anyhow!("offset too large: {offset}"));
    }

    Ok(())
}

/// Validate a backfill batch size
///
/// Resume rescans the checkpointed post, so a batch of 1 never advances
/// past it; 2 is the smallest size that makes progress.
pub fn validate_batch_size(batch_size: usize) -> Result<()> {
    if batch_size < 2 {
        return Err(anyhow!("batch_size must be at least 2, got: {batch_size}"));
    }

    if batch_size > MAX_BACKFILL_BATCH {
        return Err(anyhow!(
            "batch_size too large: {batch_size} (max: {MAX_BACKFILL_BATCH})"
        ));
    }

    Ok(())
}
