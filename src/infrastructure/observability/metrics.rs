//! Prometheus metrics for the trigger engine.
//!
//! All metrics use the `trigger_engine_` prefix. Trimmed from the teacher's
//! portfolio/sentiment/win-rate set down to what the scheduler and
//! dispatcher actually emit.

use prometheus::{
    core::{AtomicF64, GenericGauge},
    Counter, CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Count of conditional, stop, and trailing orders currently active.
    pub active_orders: GenericGauge<AtomicF64>,
    /// Total successful fires (TRIGGERED -> EXECUTED).
    pub fires_total: Counter,
    /// Total risk-gate rejections at dispatch time.
    pub risk_rejections_total: Counter,
    /// Total HTTP 429 responses observed by the rate limiter.
    pub rate_limit_hits_total: Counter,
    /// Exchange call latency by venue and endpoint.
    pub exchange_call_latency_seconds: HistogramVec,
    /// Scheduler ticks by outcome (ok, panic_recovered).
    pub scheduler_ticks_total: CounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let active_orders = Gauge::with_opts(Opts::new(
            "trigger_engine_active_orders",
            "Conditional, stop, and trailing orders currently active",
        ))?;
        registry.register(Box::new(active_orders.clone()))?;

        let fires_total = Counter::with_opts(Opts::new(
            "trigger_engine_fires_total",
            "Total conditional orders successfully executed",
        ))?;
        registry.register(Box::new(fires_total.clone()))?;

        let risk_rejections_total = Counter::with_opts(Opts::new(
            "trigger_engine_risk_rejections_total",
            "Total dispatch attempts rejected by the risk gate",
        ))?;
        registry.register(Box::new(risk_rejections_total.clone()))?;

        let rate_limit_hits_total = Counter::with_opts(Opts::new(
            "trigger_engine_rate_limit_hits_total",
            "Total HTTP 429 responses observed",
        ))?;
        registry.register(Box::new(rate_limit_hits_total.clone()))?;

        let exchange_call_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "trigger_engine_exchange_call_latency_seconds",
                "Exchange HTTP call latency in seconds",
            )
            .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["venue", "endpoint"],
        )?;
        registry.register(Box::new(exchange_call_latency_seconds.clone()))?;

        let scheduler_ticks_total = CounterVec::new(
            Opts::new("trigger_engine_scheduler_ticks_total", "Scheduler ticks by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(scheduler_ticks_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            active_orders,
            fires_total,
            risk_rejections_total,
            rate_limit_hits_total,
            exchange_call_latency_seconds,
            scheduler_ticks_total,
        })
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families).unwrap_or_default()
    }

    pub fn record_fire(&self) {
        self.fires_total.inc();
    }

    pub fn record_risk_rejection(&self) {
        self.risk_rejections_total.inc();
    }

    pub fn record_rate_limit_hit(&self) {
        self.rate_limit_hits_total.inc();
    }

    pub fn set_active_orders(&self, count: usize) {
        self.active_orders.set(count as f64);
    }

    pub fn observe_exchange_call(&self, venue: &str, endpoint: &str, latency_secs: f64) {
        self.exchange_call_latency_seconds
            .with_label_values(&[venue, endpoint])
            .observe(latency_secs);
    }

    pub fn record_tick(&self, outcome: &str) {
        self.scheduler_ticks_total.with_label_values(&[outcome]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("failed to construct default Metrics")
    }
}
