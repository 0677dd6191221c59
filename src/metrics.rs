//! Operational metrics with Prometheus
//!
//! Exposes key metrics for monitoring and alerting:
//! - Request rates and latencies
//! - Ledger write outcomes (inserted / duplicate / unresolved)
//! - Feed cache effectiveness
//! - Backfill progress
//!
//! NOTE: We intentionally avoid user_id in metric labels to prevent
//! high-cardinality explosion that can crash Prometheus.

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Request Metrics
    // ============================================================================

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "mentiond_http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["method", "endpoint", "status"]
    ).unwrap();

    /// Total HTTP requests
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mentiond_http_requests_total", "Total HTTP requests"),
        &["method", "endpoint", "status"]
    ).unwrap();

    // ============================================================================
    // Ledger Metrics
    // ============================================================================

    /// Mention record attempts by outcome
    /// result: "inserted" (new row), "duplicate" (already recorded),
    /// "unresolved" (username not in registry)
    pub static ref MENTION_RECORD_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mentiond_mention_record_total", "Mention record attempts"),
        &["result"]
    ).unwrap();

    /// Ledger rows removed by post deletion or replacement
    pub static ref MENTION_REMOVE_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mentiond_mention_remove_total", "Ledger rows removed"),
        &["reason"]  // "post_deleted", "backfill_replace", "user_deleted"
    ).unwrap();

    /// Total ledger rows (refreshed when /metrics is scraped)
    pub static ref LEDGER_ROWS: IntGauge = IntGauge::new(
        "mentiond_ledger_rows",
        "Total mention rows in the ledger"
    ).unwrap();

    /// Users with at least one counter entry
    pub static ref TRACKED_USERS: IntGauge = IntGauge::new(
        "mentiond_tracked_users",
        "Users with a mention counter"
    ).unwrap();

    // ============================================================================
    // Feed Metrics
    // ============================================================================

    /// Feed page build duration (cache misses only)
    pub static ref FEED_PAGE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "mentiond_feed_page_duration_seconds",
            "Feed page assembly duration"
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25])
    ).unwrap();

    /// Feed cache lookups
    pub static ref FEED_CACHE_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mentiond_feed_cache_total", "Feed cache lookups"),
        &["result"]  // "hit", "miss"
    ).unwrap();

    // ============================================================================
    // Backfill Metrics
    // ============================================================================

    /// Posts scanned by backfill batches
    pub static ref BACKFILL_POSTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mentiond_backfill_posts_total", "Posts scanned by backfill"),
        &["post_type"]
    ).unwrap();

    /// Mentions recorded by backfill batches
    pub static ref BACKFILL_MENTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mentiond_backfill_mentions_total", "Mentions recorded by backfill"),
        &["post_type"]
    ).unwrap();
}

/// Register all metrics with the global registry
pub fn register_metrics() -> Result<(), prometheus::Error> {
    METRICS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;

    METRICS_REGISTRY.register(Box::new(MENTION_RECORD_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(MENTION_REMOVE_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(LEDGER_ROWS.clone()))?;
    METRICS_REGISTRY.register(Box::new(TRACKED_USERS.clone()))?;

    METRICS_REGISTRY.register(Box::new(FEED_PAGE_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(FEED_CACHE_TOTAL.clone()))?;

    METRICS_REGISTRY.register(Box::new(BACKFILL_POSTS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(BACKFILL_MENTIONS_TOTAL.clone()))?;

    Ok(())
}

/// Helper to time operations with histogram (RAII pattern)
/// Usage: let _timer = Timer::new(SOME_HISTOGRAM.clone());
pub struct Timer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl Timer {
    /// Create timer that records duration to histogram on drop
    pub fn new(histogram: Histogram) -> Self {
        Self {
            histogram,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
