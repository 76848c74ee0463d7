use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref READINGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "sensor_readings_total",
        "Total readings accepted and stored"
    ))
    .unwrap();
    pub static ref INVALID_READINGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "sensor_invalid_readings_total",
        "Total readings rejected before reaching the store"
    ))
    .unwrap();
    pub static ref STORE_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "sensor_store_failures_total",
        "Total failed requests against the remote store"
    ))
    .unwrap();
    pub static ref PRUNED_READINGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "sensor_pruned_readings_total",
        "Total readings deleted by the retention manager"
    ))
    .unwrap();
    pub static ref STORE_SIZE_BYTES: Gauge = Gauge::with_opts(Opts::new(
        "sensor_store_size_bytes",
        "Serialized size of the stored collection at the last retention check"
    ))
    .unwrap();
    pub static ref INGEST_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "sensor_ingest_latency_seconds",
            "Time taken to store a reading and run the retention check"
        )
        .buckets(vec![
            0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0
        ])
    )
    .unwrap();
}

pub fn init_metrics() {
    REGISTRY.register(Box::new(READINGS_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(INVALID_READINGS_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(STORE_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(PRUNED_READINGS_TOTAL.clone()))
        .unwrap();
    REGISTRY.register(Box::new(STORE_SIZE_BYTES.clone())).unwrap();
    REGISTRY
        .register(Box::new(INGEST_LATENCY_SECONDS.clone()))
        .unwrap();
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
