//! Configuration management for mentiond
//!
//! All configurable parameters in one place with environment variable
//! overrides. Sensible defaults, configurable in production.

use std::env;
use std::path::PathBuf;
use tracing::info;

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins (empty = allow all)
    pub allowed_origins: Vec<String>,
    /// Allowed HTTP methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Max age for preflight cache (seconds)
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(), // Empty = allow all origins
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "DELETE".to_string(),
                "OPTIONS".to_string(),
            ],
            allowed_headers: vec![
                "Content-Type".to_string(),
                "X-API-Key".to_string(),
            ],
            max_age_seconds: 86400, // 24 hours
        }
    }
}

impl CorsConfig {
    /// Load from environment variables with production safety checks
    ///
    /// In production mode (MENTIOND_ENV=production), warns if CORS origins
    /// are not configured.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(origins) = env::var("MENTIOND_CORS_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(methods) = env::var("MENTIOND_CORS_METHODS") {
            config.allowed_methods = methods
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(headers) = env::var("MENTIOND_CORS_HEADERS") {
            config.allowed_headers = headers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(val) = env::var("MENTIOND_CORS_MAX_AGE") {
            if let Ok(n) = val.parse() {
                config.max_age_seconds = n;
            }
        }

        let is_production = is_production_env();
        if is_production && config.allowed_origins.is_empty() {
            tracing::warn!(
                "PRODUCTION WARNING: CORS allows all origins. Set MENTIOND_CORS_ORIGINS for security."
            );
        }

        config
    }

    /// Check if any origin restrictions are configured
    pub fn is_restricted(&self) -> bool {
        !self.allowed_origins.is_empty()
    }

    /// Convert to tower-http CorsLayer
    pub fn to_layer(&self) -> tower_http::cors::CorsLayer {
        use tower_http::cors::{AllowOrigin, Any, CorsLayer};

        let mut layer = CorsLayer::new();

        if self.allowed_origins.is_empty() {
            // Intentionally permissive - no origins configured
            layer = layer.allow_origin(Any);
        } else {
            let mut valid_origins = Vec::new();
            for origin_str in &self.allowed_origins {
                match origin_str.parse::<axum::http::HeaderValue>() {
                    Ok(origin) => valid_origins.push(origin),
                    Err(_) => {
                        tracing::warn!("CORS: Invalid origin '{}' - skipping", origin_str)
                    }
                }
            }

            if valid_origins.is_empty() {
                // All configured origins failed to parse - deny all rather
                // than fall back to permissive
                tracing::error!(
                    "CORS: All {} configured origin(s) failed to parse. \
                     Rejecting all cross-origin requests. Fix MENTIOND_CORS_ORIGINS.",
                    self.allowed_origins.len()
                );
                layer =
                    layer.allow_origin(AllowOrigin::list(Vec::<axum::http::HeaderValue>::new()));
            } else {
                layer = layer.allow_origin(AllowOrigin::list(valid_origins));
            }
        }

        let methods: Vec<axum::http::Method> = self
            .allowed_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();
        if methods.is_empty() {
            layer = layer.allow_methods(Any);
        } else {
            layer = layer.allow_methods(methods);
        }

        let headers: Vec<axum::http::HeaderName> = self
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        if headers.is_empty() {
            layer = layer.allow_headers(Any);
        } else {
            layer = layer.allow_headers(headers);
        }

        layer = layer.max_age(std::time::Duration::from_secs(self.max_age_seconds));

        layer
    }
}

fn is_production_env() -> bool {
    env::var("MENTIOND_ENV")
        .map(|v| {
            let v = v.to_lowercase();
            v == "production" || v == "prod"
        })
        .unwrap_or(false)
}

/// Server configuration loaded from environment with defaults
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host address (default: 127.0.0.1)
    /// Set to 0.0.0.0 for Docker or network-accessible deployments
    pub host: String,

    /// Server port (default: 3034)
    pub port: u16,

    /// Storage path for RocksDB (default: ./mentiond_data)
    pub storage_path: PathBuf,

    /// Default feed page size (default: 30, the forum's posts-per-page)
    pub page_size: usize,

    /// Feed page cache TTL in seconds (default: 120)
    pub feed_cache_ttl_secs: u64,

    /// Maximum cached feed pages across all users (default: 10000)
    pub feed_cache_max_pages: u64,

    /// Maximum mentions recorded per post (default: 25)
    /// Caps pathological posts that @-mention half the forum
    pub max_mentions_per_post: usize,

    /// Default backfill batch size per request (default: 500)
    pub backfill_batch_size: usize,

    /// Posts between backfill checkpoint writes (default: 10)
    /// A timeout mid-batch loses at most this much progress
    pub backfill_checkpoint_interval: usize,

    /// Rate limit: requests per second (default: 1000)
    pub rate_limit_per_second: u64,

    /// Rate limit: burst size (default: 2000)
    pub rate_limit_burst: u32,

    /// Maximum concurrent requests (default: 200)
    pub max_concurrent_requests: usize,

    /// Whether running in production mode
    pub is_production: bool,

    /// CORS configuration
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3034,
            storage_path: PathBuf::from("./mentiond_data"),
            page_size: 30,
            feed_cache_ttl_secs: 120,
            feed_cache_max_pages: 10_000,
            max_mentions_per_post: 25,
            backfill_batch_size: 500,
            backfill_checkpoint_interval: 10,
            rate_limit_per_second: 1000,
            rate_limit_burst: 2000,
            max_concurrent_requests: 200,
            is_production: false,
            cors: CorsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    #[allow(clippy::field_reassign_with_default)] // Environment overrides require mutable config
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.is_production = is_production_env();

        if let Ok(val) = env::var("MENTIOND_HOST") {
            config.host = val;
        }

        if let Ok(val) = env::var("MENTIOND_PORT") {
            if let Ok(port) = val.parse() {
                config.port = port;
            }
        }

        if let Ok(val) = env::var("MENTIOND_DATA_PATH") {
            config.storage_path = PathBuf::from(val);
        }

        if let Ok(val) = env::var("MENTIOND_PAGE_SIZE") {
            if let Ok(n) = val.parse::<usize>() {
                config.page_size = n.clamp(1, crate::validation::MAX_PAGE_SIZE);
            }
        }

        if let Ok(val) = env::var("MENTIOND_FEED_CACHE_TTL") {
            if let Ok(n) = val.parse() {
                config.feed_cache_ttl_secs = n;
            }
        }

        if let Ok(val) = env::var("MENTIOND_FEED_CACHE_PAGES") {
            if let Ok(n) = val.parse() {
                config.feed_cache_max_pages = n;
            }
        }

        if let Ok(val) = env::var("MENTIOND_MAX_MENTIONS") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_mentions_per_post = n.clamp(1, 100);
            }
        }

        if let Ok(val) = env::var("MENTIOND_BACKFILL_BATCH") {
            if let Ok(n) = val.parse::<usize>() {
                config.backfill_batch_size = n.clamp(2, crate::validation::MAX_BACKFILL_BATCH);
            }
        }

        if let Ok(val) = env::var("MENTIOND_RATE_LIMIT") {
            if let Ok(n) = val.parse() {
                config.rate_limit_per_second = n;
            }
        }

        if let Ok(val) = env::var("MENTIOND_RATE_BURST") {
            if let Ok(n) = val.parse() {
                config.rate_limit_burst = n;
            }
        }

        if let Ok(val) = env::var("MENTIOND_MAX_CONCURRENT") {
            if let Ok(n) = val.parse() {
                config.max_concurrent_requests = n;
            }
        }

        config.cors = CorsConfig::from_env();

        config
    }

    /// Log the current configuration
    pub fn log(&self) {
        info!("Configuration:");
        info!(
            "   Mode: {}",
            if self.is_production {
                "PRODUCTION"
            } else {
                "Development"
            }
        );
        info!("   Listen: {}:{}", self.host, self.port);
        info!("   Storage: {:?}", self.storage_path);
        info!("   Feed page size: {}", self.page_size);
        info!(
            "   Feed cache: {} pages, ttl {}s",
            self.feed_cache_max_pages, self.feed_cache_ttl_secs
        );
        info!("   Max mentions per post: {}", self.max_mentions_per_post);
        info!(
            "   Backfill: batch {}, checkpoint every {}",
            self.backfill_batch_size, self.backfill_checkpoint_interval
        );
        if self.rate_limit_per_second > 0 {
            info!(
                "   Rate limit: {} req/sec (burst: {})",
                self.rate_limit_per_second, self.rate_limit_burst
            );
        } else {
            info!("   Rate limit: disabled");
        }
        info!("   Max concurrent: {}", self.max_concurrent_requests);
        if self.cors.is_restricted() {
            info!("   CORS origins: {:?}", self.cors.allowed_origins);
        } else {
            info!("   CORS: Permissive (all origins allowed)");
        }
    }
}

/// Environment variable documentation
#[allow(unused)] // Public API - available for CLI help output
pub fn print_env_help() {
    println!("mentiond Configuration Environment Variables:");
    println!();
    println!("  MENTIOND_ENV             - Set to 'production' or 'prod' for production mode");
    println!("  MENTIOND_HOST            - Bind address (default: 127.0.0.1)");
    println!("  MENTIOND_PORT            - Server port (default: 3034)");
    println!("  MENTIOND_DATA_PATH       - Storage directory (default: ./mentiond_data)");
    println!("  MENTIOND_API_KEYS        - Comma-separated API keys (required in production)");
    println!("  MENTIOND_ADMIN_KEYS      - Comma-separated admin keys for backfill/repair routes");
    println!("  MENTIOND_PAGE_SIZE       - Default feed page size (default: 30)");
    println!("  MENTIOND_FEED_CACHE_TTL  - Feed page cache TTL seconds (default: 120)");
    println!("  MENTIOND_MAX_MENTIONS    - Max mentions recorded per post (default: 25)");
    println!("  MENTIOND_BACKFILL_BATCH  - Default backfill batch size (default: 500)");
    println!("  MENTIOND_RATE_LIMIT      - Requests per second (default: 1000)");
    println!("  MENTIOND_RATE_BURST      - Burst size (default: 2000)");
    println!("  MENTIOND_MAX_CONCURRENT  - Max concurrent requests (default: 200)");
    println!();
    println!("CORS Configuration:");
    println!("  MENTIOND_CORS_ORIGINS    - Comma-separated allowed origins (default: all)");
    println!("  MENTIOND_CORS_METHODS    - Comma-separated allowed methods");
    println!("  MENTIOND_CORS_HEADERS    - Comma-separated allowed headers");
    println!("  MENTIOND_CORS_MAX_AGE    - Preflight cache seconds (default: 86400)");
    println!();
    println!("  RUST_LOG                 - Log level (e.g., info, debug, trace)");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3034);
        assert_eq!(config.page_size, 30);
        assert_eq!(config.feed_cache_ttl_secs, 120);
        assert_eq!(config.backfill_checkpoint_interval, 10);
        assert!(!config.is_production);
    }

    #[test]
    fn test_cors_default_is_permissive() {
        let cors = CorsConfig::default();
        assert!(!cors.is_restricted());
        assert!(cors.allowed_origins.is_empty());
        assert!(!cors.allowed_methods.is_empty());
        assert!(!cors.allowed_headers.is_empty());
    }

    #[test]
    fn test_cors_with_origins_is_restricted() {
        let cors = CorsConfig {
            allowed_origins: vec!["https://forum.example.com".to_string()],
            ..Default::default()
        };
        assert!(cors.is_restricted());
    }

    #[test]
    fn test_cors_to_layer_permissive() {
        let cors = CorsConfig::default();
        let _layer = cors.to_layer(); // Should not panic
    }

    #[test]
    fn test_cors_to_layer_restricted() {
        let cors = CorsConfig {
            allowed_origins: vec!["https://forum.example.com".to_string()],
            ..Default::default()
        };
        let _layer = cors.to_layer(); // Should not panic
    }
}
