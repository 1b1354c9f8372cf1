//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Build pipeline
    pub purchase_tx_created: IntCounter,
    pub purchase_tx_fallback: IntCounter,
    pub build_failures: IntCounterVec,
    pub concurrent_same_wallet_builds: IntCounter,
    pub builds_in_flight: IntGauge,

    // Completion
    pub purchases_recorded: IntCounter,
    pub ledger_write_failures: IntCounter,

    // Client side
    pub submissions: IntCounter,
    pub submission_failures: IntCounter,
    pub confirmations: IntCounterVec,

    // Histograms
    pub build_latency: Histogram,
    pub confirmation_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let purchase_tx_created = IntCounter::with_opts(Opts::new(
            "purchase_tx_created_total",
            "Partially signed purchase transactions handed to clients",
        ))?;

        let purchase_tx_fallback = IntCounter::with_opts(Opts::new(
            "purchase_tx_fallback_total",
            "Purchase transactions built as a plain transfer instead of a program call",
        ))?;

        let build_failures = IntCounterVec::new(
            Opts::new("purchase_build_failures_total", "Rejected build requests"),
            &["category"],
        )?;

        let concurrent_same_wallet_builds = IntCounter::with_opts(Opts::new(
            "concurrent_same_wallet_builds_total",
            "Builds started while another build for the same wallet was in flight",
        ))?;

        let builds_in_flight = IntGauge::with_opts(Opts::new(
            "builds_in_flight",
            "Purchase builds currently in progress",
        ))?;

        let purchases_recorded = IntCounter::with_opts(Opts::new(
            "purchases_recorded_total",
            "Purchase records appended to the ledger",
        ))?;

        let ledger_write_failures = IntCounter::with_opts(Opts::new(
            "ledger_write_failures_total",
            "Confirmed purchases that could not be written to the ledger",
        ))?;

        let submissions = IntCounter::with_opts(Opts::new(
            "submissions_total",
            "Fully signed transactions relayed to the network",
        ))?;

        let submission_failures = IntCounter::with_opts(Opts::new(
            "submission_failures_total",
            "Submissions that failed after exhausting retries",
        ))?;

        let confirmations = IntCounterVec::new(
            Opts::new("confirmations_total", "Confirmation poll outcomes"),
            &["outcome"],
        )?;

        let build_latency = Histogram::with_opts(
            HistogramOpts::new("build_latency_seconds", "Transaction build latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
        )?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "confirmation_latency_seconds",
                "Time from submission to observed confirmation",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(purchase_tx_created.clone()))?;
        registry.register(Box::new(purchase_tx_fallback.clone()))?;
        registry.register(Box::new(build_failures.clone()))?;
        registry.register(Box::new(concurrent_same_wallet_builds.clone()))?;
        registry.register(Box::new(builds_in_flight.clone()))?;
        registry.register(Box::new(purchases_recorded.clone()))?;
        registry.register(Box::new(ledger_write_failures.clone()))?;
        registry.register(Box::new(submissions.clone()))?;
        registry.register(Box::new(submission_failures.clone()))?;
        registry.register(Box::new(confirmations.clone()))?;
        registry.register(Box::new(build_latency.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;

        Ok(Self {
            registry,
            purchase_tx_created,
            purchase_tx_fallback,
            build_failures,
            concurrent_same_wallet_builds,
            builds_in_flight,
            purchases_recorded,
            ledger_write_failures,
            submissions,
            submission_failures,
            confirmations,
            build_latency,
            confirmation_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
