use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, register_int_counter,
    CounterVec, Encoder, Histogram, HistogramVec, IntCounter, TextEncoder,
};

lazy_static! {
    // Ingestion metrics
    pub static ref CONSUMED_COUNTER: CounterVec = register_counter_vec!(
        "orders_consumed_total",
        "Total number of order messages handled by the consumer",
        &["outcome"]
    )
    .expect("metric cannot be created");

    pub static ref MESSAGE_DURATION: Histogram = register_histogram!(
        "orders_message_duration_seconds",
        "Time spent handling a single order message",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("metric cannot be created");

    pub static ref COMMIT_COUNTER: IntCounter = register_int_counter!(
        "orders_consumer_commits_total",
        "Total number of offset commits issued by the consumer"
    )
    .expect("metric cannot be created");

    // Cache metrics
    pub static ref CACHE_REQUEST_COUNTER: CounterVec = register_counter_vec!(
        "orders_cache_requests_total",
        "Total number of order cache lookups",
        &["status"]
    )
    .expect("metric cannot be created");

    // Repository metrics
    pub static ref REPOSITORY_OPERATIONS: CounterVec = register_counter_vec!(
        "orders_repository_operations_total",
        "Total number of order repository operations",
        &["operation", "status"]
    )
    .expect("metric cannot be created");

    pub static ref REPOSITORY_DURATION: HistogramVec = register_histogram_vec!(
        "orders_repository_duration_seconds",
        "Order repository operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("metric cannot be created");
}

/// What happened to a consumed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Persisted,
    Malformed,
    Transient,
    Cancelled,
    Timeout,
}

impl MessageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageOutcome::Persisted => "persisted",
            MessageOutcome::Malformed => "malformed",
            MessageOutcome::Transient => "transient",
            MessageOutcome::Cancelled => "cancelled",
            MessageOutcome::Timeout => "timeout",
        }
    }
}

/// Get all metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Helper function to record a handled message
pub fn record_message(outcome: MessageOutcome, duration_secs: f64) {
    CONSUMED_COUNTER
        .with_label_values(&[outcome.as_str()])
        .inc();
    MESSAGE_DURATION.observe(duration_secs);
}

/// Helper function to record an offset commit
pub fn record_commit() {
    COMMIT_COUNTER.inc();
}

/// Helper function to record cache hit/miss
pub fn record_cache_request(hit: bool) {
    let status = if hit { "hit" } else { "miss" };
    CACHE_REQUEST_COUNTER.with_label_values(&[status]).inc();
}

/// Helper function to record a repository operation
pub fn record_repository_operation(operation: &str, success: bool, duration_secs: f64) {
    let status = if success { "success" } else { "error" };
    REPOSITORY_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
    REPOSITORY_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}
