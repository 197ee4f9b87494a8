//! Engine counters.
//!
//! Process-wide tallies shared by every concurrent exchange. Increments are
//! relaxed atomics: counts must never tear, but cross-counter ordering is not
//! a correctness requirement.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineCounters {
    requests: AtomicU64,
    errors: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    remote_calls: AtomicU64,
    remote_failures: AtomicU64,
}

/// Point-in-time copy of the counters, served by the admin endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CounterSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub remote_calls: u64,
    pub remote_failures: u64,
}

impl EngineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_call(&self) {
        self.remote_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_failure(&self) {
        self.remote_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            remote_calls: self.remote_calls.load(Ordering::Relaxed),
            remote_failures: self.remote_failures.load(Ordering::Relaxed),
        }
    }

    /// One-line aggregate for the periodic summary log.
    pub fn log_summary(&self) {
        let s = self.snapshot();
        let lookups = s.cache_hits + s.cache_misses;
        let hit_rate = if lookups > 0 {
            (s.cache_hits as f64 / lookups as f64) * 100.0
        } else {
            0.0
        };

        tracing::info!("=== COUNTERS ===");
        tracing::info!("Exchanges: {} | Errors: {}", s.requests, s.errors);
        tracing::info!(
            "Cache: {} hits / {} misses ({:.1}% hit rate)",
            s.cache_hits,
            s.cache_misses,
            hit_rate
        );
        tracing::info!(
            "Remote: {} calls | {} failures",
            s.remote_calls,
            s.remote_failures
        );
        tracing::info!("================");
    }
}
