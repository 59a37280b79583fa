use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "locator_requests_total",
            "Total requests sent to the location service"
        ),
        &["action"]
    )
    .unwrap();
    pub static ref REQUEST_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "locator_request_failures_total",
            "Total failed requests to the location service"
        ),
        &["action"]
    )
    .unwrap();
    pub static ref REQUEST_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "locator_request_latency_seconds",
            "Round trip time of location service requests"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
    )
    .unwrap();
    pub static ref PUBLISHED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "locator_published_total",
        "Total location messages handed to the broker"
    ))
    .unwrap();
    pub static ref PUBLISH_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "locator_publish_failures_total",
        "Total location messages the broker client refused"
    ))
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEST_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEST_LATENCY_SECONDS.clone()))?;
    REGISTRY.register(Box::new(PUBLISHED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PUBLISH_FAILURES_TOTAL.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
