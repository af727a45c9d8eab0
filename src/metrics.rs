//! Metrics collection and export module
//!
//! Observation only: nothing in the delivery pipeline reads these values
//! back, so the engine stays free of shared mutable state.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub deliveries_total: IntCounter,
    pub deliveries_confirmed: IntCounterVec,
    pub deliveries_failed: IntCounterVec,
    pub fallbacks_total: IntCounter,
    pub broadcast_attempts_total: IntCounter,
    pub submission_errors: IntCounterVec,
    pub poll_timeouts_total: IntCounter,
    pub cancellations_total: IntCounter,

    // Gauges
    pub inflight_deliveries: IntGauge,

    // Histograms
    pub delivery_latency: Histogram,
    pub priority_fee: Histogram,
    pub compute_unit_limit: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let deliveries_total = IntCounter::with_opts(Opts::new(
            "deliveries_total",
            "Total number of deliver calls",
        ))?;

        let deliveries_confirmed = IntCounterVec::new(
            Opts::new(
                "deliveries_confirmed_total",
                "Confirmed deliveries by send path",
            ),
            &["path"],
        )?;

        let deliveries_failed = IntCounterVec::new(
            Opts::new(
                "deliveries_failed_total",
                "Failed deliveries by error category",
            ),
            &["category"],
        )?;

        let fallbacks_total = IntCounter::with_opts(Opts::new(
            "fallbacks_total",
            "Number of times the validated fallback path ran",
        ))?;

        let broadcast_attempts_total = IntCounter::with_opts(Opts::new(
            "broadcast_attempts_total",
            "Fast-path submissions of signed bytes",
        ))?;

        let submission_errors = IntCounterVec::new(
            Opts::new(
                "submission_errors_total",
                "Swallowed fast-path submission errors by class",
            ),
            &["class"],
        )?;

        let poll_timeouts_total = IntCounter::with_opts(Opts::new(
            "poll_timeouts_total",
            "Confirmation poll windows that elapsed unconfirmed",
        ))?;

        let cancellations_total = IntCounter::with_opts(Opts::new(
            "cancellations_total",
            "Deliveries aborted by external cancellation",
        ))?;

        let inflight_deliveries = IntGauge::with_opts(Opts::new(
            "inflight_deliveries",
            "Deliveries currently in progress",
        ))?;

        let delivery_latency = Histogram::with_opts(
            HistogramOpts::new("delivery_latency_seconds", "End-to-end deliver latency")
                .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 15.0, 30.0, 60.0, 90.0, 120.0]),
        )?;

        let priority_fee = Histogram::with_opts(
            HistogramOpts::new(
                "priority_fee_micro_lamports",
                "Resolved compute-unit price",
            )
            .buckets(vec![
                0.0, 100.0, 1_000.0, 10_000.0, 50_000.0, 100_000.0, 500_000.0, 1_000_000.0,
            ]),
        )?;

        let compute_unit_limit = Histogram::with_opts(
            HistogramOpts::new("compute_unit_limit", "Resolved compute-unit limit").buckets(vec![
                50_000.0, 100_000.0, 200_000.0, 300_000.0, 600_000.0, 1_000_000.0, 1_400_000.0,
            ]),
        )?;

        // Register all metrics
        registry.register(Box::new(deliveries_total.clone()))?;
        registry.register(Box::new(deliveries_confirmed.clone()))?;
        registry.register(Box::new(deliveries_failed.clone()))?;
        registry.register(Box::new(fallbacks_total.clone()))?;
        registry.register(Box::new(broadcast_attempts_total.clone()))?;
        registry.register(Box::new(submission_errors.clone()))?;
        registry.register(Box::new(poll_timeouts_total.clone()))?;
        registry.register(Box::new(cancellations_total.clone()))?;
        registry.register(Box::new(inflight_deliveries.clone()))?;
        registry.register(Box::new(delivery_latency.clone()))?;
        registry.register(Box::new(priority_fee.clone()))?;
        registry.register(Box::new(compute_unit_limit.clone()))?;

        Ok(Self {
            registry,
            deliveries_total,
            deliveries_confirmed,
            deliveries_failed,
            fallbacks_total,
            broadcast_attempts_total,
            submission_errors,
            poll_timeouts_total,
            cancellations_total,
            inflight_deliveries,
            delivery_latency,
            priority_fee,
            compute_unit_limit,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn gather_text(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    pub fn record_submission_error(&self, class: &str) {
        self.submission_errors.with_label_values(&[class]).inc();
    }

    pub fn record_confirmed(&self, path: &str) {
        self.deliveries_confirmed.with_label_values(&[path]).inc();
    }

    pub fn record_failure(&self, category: &str) {
        self.deliveries_failed.with_label_values(&[category]).inc();
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
        histogram.observe(self.start.elapsed().as_secs_f64());
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
