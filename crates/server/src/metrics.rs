//! Prometheus registry for the server.
//!
//! Holds the API and socket metrics plus two gauges mirrored from the job
//! controller. The job, item and conversion counters from `listgrab_core`
//! are registered into the same registry so one scrape returns everything.

use once_cell::sync::Lazy;
use prometheus::core::Collector;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use tracing::error;

use listgrab_core::JobController;

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

const HTTP_LABELS: &[&str] = &["method", "path", "status"];

pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "listgrab_http_request_duration_seconds",
        "Time spent answering API requests",
    )
    .buckets(prometheus::exponential_buckets(0.001, 4.0, 8).unwrap());
    HistogramVec::new(opts, HTTP_LABELS).unwrap()
});

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("listgrab_http_requests_total", "API requests answered"),
        HTTP_LABELS,
    )
    .unwrap()
});

pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> =
    Lazy::new(|| gauge("listgrab_http_requests_in_flight", "API requests being answered"));

pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> =
    Lazy::new(|| gauge("listgrab_ws_connections_active", "Open progress sockets"));

pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "listgrab_ws_connections_total",
        "Progress sockets opened since startup",
    )
    .unwrap()
});

/// Messages pushed to sockets, by `WsMessage` kind.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("listgrab_ws_messages_sent_total", "Progress socket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// A socket fell behind the broadcast buffer and skipped events.
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "listgrab_ws_lag_events_total",
        "Times a progress socket skipped events",
    )
    .unwrap()
});

// Refreshed from the controller on every scrape
pub static JOB_RUNNING: Lazy<IntGauge> =
    Lazy::new(|| gauge("listgrab_job_running", "1 while a job is active"));

pub static JOB_OUTCOMES: Lazy<IntGauge> = Lazy::new(|| {
    gauge(
        "listgrab_job_outcomes",
        "Item outcomes recorded for the latest job",
    )
});

fn gauge(name: &str, help: &str) -> IntGauge {
    IntGauge::new(name, help).unwrap()
}

fn register_metrics(registry: &Registry) {
    let server: Vec<Box<dyn Collector>> = vec![
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
        Box::new(WS_CONNECTIONS_ACTIVE.clone()),
        Box::new(WS_CONNECTIONS_TOTAL.clone()),
        Box::new(WS_MESSAGES_SENT.clone()),
        Box::new(WS_LAG_EVENTS.clone()),
        Box::new(JOB_RUNNING.clone()),
        Box::new(JOB_OUTCOMES.clone()),
    ];
    for metric in server
        .into_iter()
        .chain(listgrab_core::metrics::all_metrics())
    {
        registry.register(metric).unwrap();
    }
}

/// Renders the registry in the Prometheus text exposition format.
pub fn encode_metrics() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub async fn collect_dynamic_metrics(controller: &JobController) {
    JOB_RUNNING.set(i64::from(controller.is_busy().await));
    let outcomes = controller
        .current()
        .await
        .map_or(0, |job| job.outcomes.len() as i64);
    JOB_OUTCOMES.set(outcomes);
}

/// Collapses job ids in a request path so label cardinality stays bounded.
pub fn normalize_path(path: &str) -> String {
    static UUID: Lazy<regex_lite::Regex> = Lazy::new(|| {
        regex_lite::Regex::new(
            r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
        )
        .unwrap()
    });
    static NUMERIC: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

    let result = UUID.replace_all(path, "{id}");
    let result = NUMERIC.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/jobs/550e8400-e29b-41d4-a716-446655440000/cancel";
        assert_eq!(normalize_path(path), "/api/v1/jobs/{id}/cancel");
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/jobs/42"), "/api/v1/jobs/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/jobs/current";
        assert_eq!(normalize_path(path), "/api/v1/jobs/current");
    }

    #[test]
    fn test_registry_contains_core_and_server_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        WS_CONNECTIONS_TOTAL.inc();
        JOB_RUNNING.set(0);
        listgrab_core::metrics::JOBS_TOTAL
            .with_label_values(&["completed"])
            .inc();

        let output = encode_metrics();

        assert!(output.contains("# HELP"));
        assert!(output.contains("listgrab_http_requests_total"));
        assert!(output.contains("listgrab_ws_connections_total"));
        assert!(output.contains("listgrab_job_running"));
        assert!(output.contains("listgrab_jobs_total"));
    }
}
