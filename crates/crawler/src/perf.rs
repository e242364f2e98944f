// perf.rs - Timing and counters for the crawler pipeline
//
// Controlled via the CRAWLER_PERF environment variable.
//
// Usage:
//   CRAWLER_PERF=1        # Log flush, diff and search timings
//   CRAWLER_PERF=verbose  # Also warn when a timed section exceeds its threshold

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

static PERF_ENABLED: OnceLock<bool> = OnceLock::new();
static PERF_VERBOSE: OnceLock<bool> = OnceLock::new();

/// Check if performance timing is enabled
pub fn is_enabled() -> bool {
    *PERF_ENABLED.get_or_init(|| {
        std::env::var("CRAWLER_PERF")
            .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
            .unwrap_or(false)
    })
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    *PERF_VERBOSE.get_or_init(|| {
        std::env::var("CRAWLER_PERF")
            .map(|v| v.to_lowercase() == "verbose")
            .unwrap_or(false)
    })
}

/// RAII timing guard that logs duration on drop
///
/// ```
/// use crawler::perf::TimingGuard;
///
/// let _guard = TimingGuard::new("solution_diff");
/// // ... do work ...
/// ```
pub struct TimingGuard {
    start: Instant,
    name: &'static str,
    threshold_warn_ms: Option<u64>,
    enabled: bool,
}

impl TimingGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
            threshold_warn_ms: None,
            enabled: is_enabled(),
        }
    }

    /// Create a timing guard that warns (in verbose mode) past `threshold_ms`
    pub fn with_threshold(name: &'static str, threshold_ms: u64) -> Self {
        Self {
            threshold_warn_ms: Some(threshold_ms),
            ..Self::new(name)
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Complete the timing without logging
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        std::mem::forget(self);
        elapsed
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }

        let elapsed = self.start.elapsed();
        log::info!("[PERF] {} completed in {:?}", self.name, elapsed);

        if let Some(threshold) = self.threshold_warn_ms {
            if elapsed.as_millis() > threshold as u128 && is_verbose() {
                log::warn!(
                    "[PERF] {} exceeded threshold ({}ms > {}ms)",
                    self.name,
                    elapsed.as_millis(),
                    threshold
                );
            }
        }
    }
}

/// Process-wide pipeline counters
#[derive(Debug, Default)]
pub struct PipelineCounters {
    pub batches_flushed: AtomicUsize,
    pub batches_failed: AtomicUsize,
    pub work_items_sent: AtomicUsize,
    pub batches_not_delegated: AtomicUsize,
    pub remote_searches: AtomicUsize,
    pub local_searches: AtomicUsize,
}

/// Point-in-time copy of [`PipelineCounters`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub batches_flushed: usize,
    pub batches_failed: usize,
    pub work_items_sent: usize,
    pub batches_not_delegated: usize,
    pub remote_searches: usize,
    pub local_searches: usize,
}

impl PipelineCounters {
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            work_items_sent: self.work_items_sent.load(Ordering::Relaxed),
            batches_not_delegated: self.batches_not_delegated.load(Ordering::Relaxed),
            remote_searches: self.remote_searches.load(Ordering::Relaxed),
            local_searches: self.local_searches.load(Ordering::Relaxed),
        }
    }

    /// Log a summary of the counters
    pub fn log_summary(&self) {
        if !is_enabled() {
            return;
        }
        let s = self.snapshot();
        log::info!("[PERF] === Crawler Pipeline Summary ===");
        log::info!(
            "[PERF] Batches: {} flushed, {} failed, {} not delegated",
            s.batches_flushed,
            s.batches_failed,
            s.batches_not_delegated
        );
        log::info!("[PERF] Work items sent: {}", s.work_items_sent);
        log::info!(
            "[PERF] Searches: {} remote, {} local",
            s.remote_searches,
            s.local_searches
        );
    }
}

static COUNTERS: OnceLock<PipelineCounters> = OnceLock::new();

/// Get the global pipeline counters
pub fn counters() -> &'static PipelineCounters {
    COUNTERS.get_or_init(PipelineCounters::default)
}

pub(crate) fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}
