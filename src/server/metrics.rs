use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for the exporter's own metrics
const PREFIX: &str = "github_exporter";

lazy_static! {
    // Global Prometheus registry. The GitHub collector is registered here too.
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Refresh Job Metrics
    pub static ref JOB_EXECUTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_job_executions_total"), "Refresh job executions by target and outcome"),
        &["target", "outcome"]
    ).expect("Failed to create job_executions_total metric");

    pub static ref JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_job_duration_seconds"),
            "Refresh job duration in seconds"
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["target"]
    ).expect("Failed to create job_duration_seconds metric");

    pub static ref JOBS_IN_FLIGHT: IntGauge = IntGauge::new(
        format!("{PREFIX}_jobs_in_flight"),
        "Refresh jobs currently executing"
    ).expect("Failed to create jobs_in_flight metric");

    // Scheduler Metrics
    pub static ref REFRESH_CYCLES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_refresh_cycles_total"), "Refresh cycles submitted"),
        &["trigger"]
    ).expect("Failed to create refresh_cycles_total metric");

    pub static ref REFRESH_CYCLE_OVERLAPS_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_refresh_cycle_overlaps_total"),
        "Cycles started while the previous one was still draining"
    ).expect("Failed to create refresh_cycle_overlaps_total metric");

    pub static ref SUBMISSION_BLOCKED_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_submission_blocked_seconds"),
            "Time a refresh cycle spent waiting for queue capacity"
        )
        .buckets(vec![0.001, 0.01, 0.1, 1.0, 10.0, 60.0, 300.0])
    ).expect("Failed to create submission_blocked_seconds metric");

    // Cache Metrics
    pub static ref CACHE_LOOKUPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_cache_lookups_total"), "Cache reads by resource and result"),
        &["resource", "result"]
    ).expect("Failed to create cache_lookups_total metric");

    pub static ref CACHE_EVICTIONS_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_cache_evictions_total"),
        "Expired cache entries removed by the purge task"
    ).expect("Failed to create cache_evictions_total metric");

    // Upstream Metrics
    pub static ref UPSTREAM_RATE_LIMIT_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_upstream_rate_limit_hits_total"), "GitHub rate limit rejections"),
        &["target"]
    ).expect("Failed to create upstream_rate_limit_hits_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_IN_FLIGHT.clone()));
    let _ = REGISTRY.register(Box::new(REFRESH_CYCLES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(REFRESH_CYCLE_OVERLAPS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SUBMISSION_BLOCKED_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(CACHE_LOOKUPS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CACHE_EVICTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(UPSTREAM_RATE_LIMIT_HITS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record the end of a refresh job
pub fn record_job_execution(target: &str, outcome: &str, duration: Duration) {
    JOB_EXECUTIONS_TOTAL
        .with_label_values(&[target, outcome])
        .inc();

    JOB_DURATION_SECONDS
        .with_label_values(&[target])
        .observe(duration.as_secs_f64());
}

pub fn job_started() {
    JOBS_IN_FLIGHT.inc();
}

pub fn job_finished() {
    JOBS_IN_FLIGHT.dec();
}

/// Record a submitted refresh cycle; `trigger` is `startup` or `interval`
pub fn record_refresh_cycle(trigger: &str, blocked: Duration) {
    REFRESH_CYCLES_TOTAL.with_label_values(&[trigger]).inc();
    SUBMISSION_BLOCKED_SECONDS.observe(blocked.as_secs_f64());
}

pub fn record_cycle_overlap() {
    REFRESH_CYCLE_OVERLAPS_TOTAL.inc();
}

/// Record a cache read
pub fn record_cache_lookup(resource: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    CACHE_LOOKUPS_TOTAL
        .with_label_values(&[resource, result])
        .inc();
}

pub fn record_cache_evictions(count: usize) {
    CACHE_EVICTIONS_TOTAL.inc_by(count as u64);
}

/// Record GitHub rejecting a request for `target` with a rate limit
pub fn record_rate_limit_hit(target: &str) {
    UPSTREAM_RATE_LIMIT_HITS_TOTAL
        .with_label_values(&[target])
        .inc();
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
