use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::env;

/// API Key authentication errors
#[derive(Debug)]
pub enum AuthError {
    MissingApiKey,
    InvalidApiKey,
    NotConfigured,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingApiKey => (StatusCode::UNAUTHORIZED, "Missing X-API-Key header"),
            AuthError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "Invalid API key"),
            AuthError::NotConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                "API keys not configured. Set MENTIOND_API_KEYS environment variable.",
            ),
        };

        (status, message).into_response()
    }
}

/// Constant-time string comparison to prevent timing attacks
///
/// Note: This leaks the length of the shorter string, but that's acceptable
/// for API keys where lengths are not secret.
fn constant_time_compare(a: &str, b: &str) -> bool {
    let mut result = (a.len() ^ b.len()) as u8;

    let min_len = std::cmp::min(a.len(), b.len());
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    for i in 0..min_len {
        result |= a_bytes[i] ^ b_bytes[i];
    }

    result == 0
}

fn is_production() -> bool {
    env::var("MENTIOND_ENV")
        .map(|v| v.to_lowercase() == "production" || v.to_lowercase() == "prod")
        .unwrap_or(false)
}

/// Validate a provided key against a comma-separated key list from `env_var`
fn validate_key_against_env(
    provided_key: &str,
    env_var: &str,
    dev_fallback: &str,
) -> Result<(), AuthError> {
    let valid_keys = match env::var(env_var) {
        Ok(keys) if !keys.trim().is_empty() => keys,
        _ => {
            // In production, refuse to serve without configured keys
            if is_production() {
                tracing::error!("{env_var} not set in production mode");
                return Err(AuthError::NotConfigured);
            }

            // Development mode: warn but allow default key
            tracing::warn!("{env_var} not set - using development key (not for production!)");
            dev_fallback.to_string()
        }
    };

    let keys: Vec<&str> = valid_keys.split(',').map(|k| k.trim()).collect();

    // Constant-time comparison; no early break to keep timing flat
    let mut found = false;
    for key in &keys {
        if constant_time_compare(key, provided_key) {
            found = true;
        }
    }

    if found {
        Ok(())
    } else {
        Err(AuthError::InvalidApiKey)
    }
}

/// Validate API key against configured keys
pub fn validate_api_key(provided_key: &str) -> Result<(), AuthError> {
    validate_key_against_env(
        provided_key,
        "MENTIOND_API_KEYS",
        "mentiond-dev-key-change-in-production",
    )
}

/// Validate admin key (backfill and ledger repair routes)
///
/// Falls back to the regular API key list when MENTIOND_ADMIN_KEYS is unset,
/// so small deployments don't need two key sets.
pub fn validate_admin_key(provided_key: &str) -> Result<(), AuthError> {
    match env::var("MENTIOND_ADMIN_KEYS") {
        Ok(keys) if !keys.trim().is_empty() => {
            validate_key_against_env(provided_key, "MENTIOND_ADMIN_KEYS", "")
        }
        _ => validate_api_key(provided_key),
    }
}

fn extract_api_key(request: &Request) -> Option<String> {
    request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Authentication middleware for protected routes
pub async fn auth_middleware(request: Request, next: Next) -> Response {
    let api_key = match extract_api_key(&request) {
        Some(key) => key,
        None => return AuthError::MissingApiKey.into_response(),
    };

    if let Err(e) = validate_api_key(&api_key) {
        return e.into_response();
    }

    next.run(request).await
}

/// Authentication middleware for admin routes (backfill, recount)
pub async fn admin_middleware(request: Request, next: Next) -> Response {
    let api_key = match extract_api_key(&request) {
        Some(key) => key,
        None => return AuthError::MissingApiKey.into_response(),
    };

    if let Err(e) = validate_admin_key(&api_key) {
        return e.into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test so parallel execution never races on the env vars
    #[test]
    fn test_key_validation() {
        env::set_var("MENTIOND_API_KEYS", "key1,key2,key3");
        env::remove_var("MENTIOND_ADMIN_KEYS");

        assert!(validate_api_key("key1").is_ok());
        assert!(validate_api_key("key2").is_ok());
        assert!(validate_api_key("key3").is_ok());
        assert!(validate_api_key("invalid").is_err());

        // Admin validation falls back to the API key list when unset
        assert!(validate_admin_key("key1").is_ok());
        assert!(validate_admin_key("wrong").is_err());

        env::set_var("MENTIOND_ADMIN_KEYS", "admin-only");
        assert!(validate_admin_key("admin-only").is_ok());
        assert!(validate_admin_key("key1").is_err());

        env::remove_var("MENTIOND_API_KEYS");
        env::remove_var("MENTIOND_ADMIN_KEYS");
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
