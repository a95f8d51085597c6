//! Metrics for provider fetches, caching and the evaluation pass.
//!
//! Everything goes through the `metrics` facade; the library never installs
//! an exporter, so these are no-ops unless the host process installs one.

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// Full evaluation pass latency metric name.
pub const METRIC_EVALUATION_LATENCY: &str = "evaluation_latency_ms";
/// Provider fetch latency metric name.
pub const METRIC_FETCH_LATENCY: &str = "provider_fetch_latency_ms";
/// Provider fetch attempts counter metric name.
pub const METRIC_FETCH_ATTEMPTS: &str = "provider_fetch_attempts_total";
/// Provider fetch retries counter metric name.
pub const METRIC_FETCH_RETRIES: &str = "provider_fetch_retries_total";
/// Fetches that gave up and degraded to empty.
pub const METRIC_FETCH_EXHAUSTED: &str = "provider_fetch_exhausted_total";
/// Cache hits counter metric name.
pub const METRIC_CACHE_HITS: &str = "cache_hits_total";
/// Cache misses counter metric name.
pub const METRIC_CACHE_MISSES: &str = "cache_misses_total";
/// Accepted opportunities counter metric name.
pub const METRIC_OPPORTUNITIES_ACCEPTED: &str = "opportunities_accepted_total";
/// Rejected candidates counter metric name.
pub const METRIC_OPPORTUNITIES_REJECTED: &str = "opportunities_rejected_total";
/// Multiples found counter metric name.
pub const METRIC_MULTIPLES_FOUND: &str = "multiples_found_total";
/// Passes that ran on the substitute dataset.
pub const METRIC_SUBSTITUTE_RUNS: &str = "substitute_data_runs_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_EVALUATION_LATENCY,
        "Full evaluation pass latency in milliseconds"
    );
    describe_histogram!(
        METRIC_FETCH_LATENCY,
        "Provider fetch latency in milliseconds"
    );

    describe_counter!(METRIC_FETCH_ATTEMPTS, "Total provider fetch attempts");
    describe_counter!(METRIC_FETCH_RETRIES, "Total provider fetch retries");
    describe_counter!(
        METRIC_FETCH_EXHAUSTED,
        "Fetches that failed after all retries and returned no data"
    );
    describe_counter!(METRIC_CACHE_HITS, "Cache lookups served from cache");
    describe_counter!(METRIC_CACHE_MISSES, "Cache lookups that went to the provider");
    describe_counter!(
        METRIC_OPPORTUNITIES_ACCEPTED,
        "Total value opportunities accepted"
    );
    describe_counter!(
        METRIC_OPPORTUNITIES_REJECTED,
        "Total candidates rejected, by reason"
    );
    describe_counter!(METRIC_MULTIPLES_FOUND, "Total multiples suggested");
    describe_counter!(
        METRIC_SUBSTITUTE_RUNS,
        "Evaluation passes that ran on substitute data"
    );

    debug!("Metrics initialized");
}

/// Record provider fetch latency.
pub fn record_fetch_latency(start: Instant, provider: &str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_FETCH_LATENCY, "provider" => provider.to_string()).record(latency_ms);
}

/// Increment fetch attempts counter.
pub fn inc_fetch_attempts(provider: &str) {
    counter!(METRIC_FETCH_ATTEMPTS, "provider" => provider.to_string()).increment(1);
}

/// Increment fetch retries counter.
pub fn inc_fetch_retries(provider: &str) {
    counter!(METRIC_FETCH_RETRIES, "provider" => provider.to_string()).increment(1);
}

/// Increment exhausted fetches counter.
pub fn inc_fetch_exhausted(provider: &str) {
    counter!(METRIC_FETCH_EXHAUSTED, "provider" => provider.to_string()).increment(1);
}

/// Increment cache hit counter.
pub fn inc_cache_hit(kind: &'static str) {
    counter!(METRIC_CACHE_HITS, "kind" => kind).increment(1);
}

/// Increment cache miss counter.
pub fn inc_cache_miss(kind: &'static str) {
    counter!(METRIC_CACHE_MISSES, "kind" => kind).increment(1);
}

/// Increment accepted opportunities counter.
pub fn inc_opportunities_accepted() {
    counter!(METRIC_OPPORTUNITIES_ACCEPTED).increment(1);
}

/// Increment rejected candidates counter.
pub fn inc_opportunities_rejected(reason: &'static str) {
    counter!(METRIC_OPPORTUNITIES_REJECTED, "reason" => reason).increment(1);
}

/// Add to multiples found counter.
pub fn add_multiples_found(count: usize) {
    counter!(METRIC_MULTIPLES_FOUND).increment(count as u64);
}

/// Increment substitute data runs counter.
pub fn inc_substitute_runs() {
    counter!(METRIC_SUBSTITUTE_RUNS).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(self.elapsed_ms());
    }
}

/// Create a latency timer for a full evaluation pass.
pub fn timer_evaluation() -> LatencyTimer {
    LatencyTimer::new(METRIC_EVALUATION_LATENCY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn latency_timer_measures_time() {
        let timer = timer_evaluation();
        sleep(Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 9.0);
    }

    #[test]
    fn recording_without_exporter_is_a_no_op() {
        init_metrics();
        inc_cache_hit("odds");
        inc_opportunities_rejected("daily_cap");
        add_multiples_found(2);
        record_fetch_latency(Instant::now(), "mock");
    }
}
