use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metric registration so series show up on /metrics before the
/// first lookup touches them.
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("lookup_requests_total", "Lookup requests received.");
        describe_counter!(
            "lookup_cache_hits_total",
            "Lookups served from the value cache."
        );
        describe_counter!(
            "lookup_cache_misses_total",
            "Lookups that had to resolve upstream."
        );
        describe_counter!(
            "lookup_upstream_exhausted_total",
            "Lookups where every endpoint failed."
        );
        describe_counter!("endpoint_attempts_total", "Upstream fetch attempts.");
        describe_counter!("endpoint_errors_total", "Upstream transport failures.");
        describe_counter!(
            "extract_candidates_total",
            "Candidates pooled across extraction strategies."
        );
        describe_histogram!(
            "extract_parse_ms",
            "Body parse plus candidate search time in milliseconds."
        );
        describe_gauge!("value_cache_ttl_secs", "Configured cache TTL in seconds.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize the Prometheus recorder and pin the static TTL gauge.
    pub fn init(ttl_secs: u64) -> Self {
        let builder = PrometheusBuilder::new();

        let handle = builder
            .install_recorder()
            .expect("prometheus: install recorder");

        ensure_described();
        gauge!("value_cache_ttl_secs").set(ttl_secs as f64);

        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
