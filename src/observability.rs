use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "marquee_bookings_total";

/// Counter: transfer attempts. Labels: outcome.
pub const TRANSFERS_TOTAL: &str = "marquee_transfers_total";

/// Counter: conditional writes retried after an ambiguous outcome.
pub const CAS_RETRIES_TOTAL: &str = "marquee_cas_retries_total";

/// Counter: transfer compensation deletes that failed or stayed ambiguous.
pub const COMPENSATION_FAILURES_TOTAL: &str = "marquee_compensation_failures_total";

// ── Harness metrics ─────────────────────────────────────────────

/// Histogram: stress scenario wall time in seconds. Labels: scenario.
pub const SCENARIO_DURATION_SECONDS: &str = "marquee_scenario_duration_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
