//! Prometheus metrics for the hoard engine.
//!
//! Labels never carry content hashes or URLs; only bounded sets such as
//! location kinds, cache tiers and outcomes.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Content store
pub static CONTENT_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("hoard_content_stored_total", "Total store calls that succeeded")
        .expect("metric creation failed")
});

pub static BYTES_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hoard_bytes_stored_total",
        "Total bytes written to the local content store (new objects only)",
    )
    .expect("metric creation failed")
});

// Replication
pub static REPLICATION_JOBS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "hoard_replication_jobs_total",
            "Replication job attempts by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static REPLICATION_QUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "hoard_replication_queue_depth",
        "Replication jobs that are pending or in progress",
    )
    .expect("metric creation failed")
});

// Verification
pub static VERIFICATION_RUNS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "hoard_verification_runs_total",
            "Quorum verification runs by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

// Routing and reads
pub static ROUTING_DECISIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "hoard_routing_decisions_total",
            "Routing decisions by selected location kind",
        ),
        &["location"],
    )
    .expect("metric creation failed")
});

pub static RESOLVE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "hoard_resolve_duration_seconds",
            "Time taken to resolve content, cache hits included",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("metric creation failed")
});

// Cache
pub static CACHE_HITS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("hoard_cache_hits_total", "Cache hits by tier"),
        &["tier"],
    )
    .expect("metric creation failed")
});

pub static CACHE_MISSES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("hoard_cache_misses_total", "Cache misses by tier"),
        &["tier"],
    )
    .expect("metric creation failed")
});

pub static CACHE_EVICTIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("hoard_cache_evictions_total", "Cache evictions by tier"),
        &["tier"],
    )
    .expect("metric creation failed")
});

// Advertisements
pub static ADVERTISEMENTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "hoard_advertisements_total",
            "Storage advertisements by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register every engine metric with [`REGISTRY`].
///
/// Safe to call more than once.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(CONTENT_STORED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_STORED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REPLICATION_JOBS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REPLICATION_QUEUE_DEPTH.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(VERIFICATION_RUNS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ROUTING_DECISIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RESOLVE_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_HITS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_MISSES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_EVICTIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ADVERTISEMENTS.clone()))
            .expect("metric registration failed");
    });
}

/// Encode the registry in the Prometheus text format.
pub fn encode_text() -> prometheus::Result<Vec<u8>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

pub fn record_replication(outcome: &str) {
    REPLICATION_JOBS.with_label_values(&[outcome]).inc();
}

pub fn record_advertisement(outcome: &str) {
    ADVERTISEMENTS.with_label_values(&[outcome]).inc();
}
