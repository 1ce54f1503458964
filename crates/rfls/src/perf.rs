// perf.rs - Timing instrumentation for rfls
//
// Controlled via the RFLS_PERF environment variable.
//
// Usage:
//   RFLS_PERF=1 rfls --stdio        # Log durations of namespace builds and requests
//   RFLS_PERF=verbose rfls --stdio  # Also warn when an operation exceeds its threshold

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

static PERF_ENABLED: OnceLock<bool> = OnceLock::new();
static PERF_VERBOSE: OnceLock<bool> = OnceLock::new();

pub fn is_enabled() -> bool {
    *PERF_ENABLED.get_or_init(|| {
        std::env::var("RFLS_PERF")
            .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
            .unwrap_or(false)
    })
}

pub fn is_verbose() -> bool {
    *PERF_VERBOSE.get_or_init(|| {
        std::env::var("RFLS_PERF")
            .map(|v| v.to_lowercase() == "verbose")
            .unwrap_or(false)
    })
}

/// RAII timing guard that logs duration on drop
///
/// ```
/// use rfls::perf::TimingGuard;
///
/// let _guard = TimingGuard::new("namespace_build");
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

    /// Warn (in verbose mode) when the scope takes longer than `threshold_ms`.
    pub fn with_threshold(name: &'static str, threshold_ms: u64) -> Self {
        Self {
            threshold_warn_ms: Some(threshold_ms),
            ..Self::new(name)
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop timing without logging.
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

static NAMESPACE_BUILDS: AtomicUsize = AtomicUsize::new(0);
static CATALOG_LOADS: AtomicUsize = AtomicUsize::new(0);

pub fn record_namespace_build() {
    NAMESPACE_BUILDS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_catalog_load() {
    CATALOG_LOADS.fetch_add(1, Ordering::Relaxed);
}

/// Counters since process start.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionMetrics {
    pub namespace_builds: usize,
    pub catalog_loads: usize,
}

pub fn resolution_metrics() -> ResolutionMetrics {
    ResolutionMetrics {
        namespace_builds: NAMESPACE_BUILDS.load(Ordering::Relaxed),
        catalog_loads: CATALOG_LOADS.load(Ordering::Relaxed),
    }
}

/// Log the counters, when timing is enabled.
pub fn log_summary() {
    if !is_enabled() {
        return;
    }
    let metrics = resolution_metrics();
    log::info!(
        "[PERF] {} namespace builds, {} library catalogs loaded",
        metrics.namespace_builds,
        metrics.catalog_loads
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_guard_elapsed() {
        let guard = TimingGuard::new("test");
        std::thread::sleep(Duration::from_millis(10));
        assert!(guard.elapsed().as_millis() >= 10);
    }

    #[test]
    fn test_timing_guard_finish() {
        let guard = TimingGuard::with_threshold("test", 1);
        std::thread::sleep(Duration::from_millis(10));
        assert!(guard.finish().as_millis() >= 10);
    }

    #[test]
    fn test_counters_only_grow() {
        let before = resolution_metrics();
        record_namespace_build();
        record_catalog_load();
        let after = resolution_metrics();
        assert!(after.namespace_builds > before.namespace_builds);
        assert!(after.catalog_loads > before.catalog_loads);
    }
}
