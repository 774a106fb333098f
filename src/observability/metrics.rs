use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Aggregation metrics
    pub static ref AGGREGATION_CYCLES: IntCounter = IntCounter::new(
        "aggregation_cycles_total",
        "Total number of aggregation cycles"
    ).expect("metric can be created");

    pub static ref SOURCE_ERRORS: IntCounter = IntCounter::new(
        "source_errors_total",
        "Total number of per-source error records"
    ).expect("metric can be created");

    pub static ref OVERALL_TIMEOUTS: IntCounter = IntCounter::new(
        "aggregation_overall_timeouts_total",
        "Aggregation cycles cut short by the overall deadline"
    ).expect("metric can be created");

    pub static ref AGGREGATION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "aggregation_duration_seconds",
            "Wall-clock duration of one aggregation cycle"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0])
    ).expect("metric can be created");

    // Cache metrics
    pub static ref CACHE_POLLS: IntCounter = IntCounter::new(
        "cache_polls_total",
        "Total number of slow-source cache polls"
    ).expect("metric can be created");

    pub static ref CACHE_POLL_FAILURES: IntCounter = IntCounter::new(
        "cache_poll_failures_total",
        "Cache polls that produced no valid ticker"
    ).expect("metric can be created");

    // Broadcast metrics
    pub static ref TICKS_BROADCAST: IntCounter = IntCounter::new(
        "ticks_broadcast_total",
        "Non-empty ticks pushed to subscribers"
    ).expect("metric can be created");

    pub static ref SUBSCRIBERS_PRUNED: IntCounter = IntCounter::new(
        "subscribers_pruned_total",
        "Subscribers removed after a failed send or missed heartbeat"
    ).expect("metric can be created");

    pub static ref ACTIVE_SUBSCRIBERS: IntGauge = IntGauge::new(
        "active_subscribers",
        "Currently connected WebSocket subscribers"
    ).expect("metric can be created");
}

pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(AGGREGATION_CYCLES.clone()),
        Box::new(SOURCE_ERRORS.clone()),
        Box::new(OVERALL_TIMEOUTS.clone()),
        Box::new(AGGREGATION_DURATION.clone()),
        Box::new(CACHE_POLLS.clone()),
        Box::new(CACHE_POLL_FAILURES.clone()),
        Box::new(TICKS_BROADCAST.clone()),
        Box::new(SUBSCRIBERS_PRUNED.clone()),
        Box::new(ACTIVE_SUBSCRIBERS.clone()),
    ];

    for collector in collectors {
        if let Err(e) = REGISTRY.register(collector) {
            tracing::warn!("Metric registration skipped: {}", e);
        }
    }
}

/// Prometheus text exposition of everything in [`REGISTRY`].
pub fn render() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
