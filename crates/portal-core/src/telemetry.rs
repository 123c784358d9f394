use std::time::Duration;

use metrics::{counter, histogram};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global JSON subscriber. Fails if one is already installed.
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .try_init()?;
    Ok(())
}

pub fn record_upstream_request(operation: &str, result: &str, duration: Duration) {
    counter!(
        "portal_upstream_requests_total",
        "op" => operation.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
    histogram!(
        "portal_upstream_duration_ms",
        "op" => operation.to_string()
    )
    .record(duration.as_secs_f64() * 1000.0);
}

pub fn record_listing_result(result: &str) {
    counter!(
        "portal_listing_total",
        "result" => result.to_string()
    )
    .increment(1);
}

pub fn record_skipped_app() {
    counter!("portal_listing_skipped_apps_total").increment(1);
}

pub fn record_mutation_result(operation: &str, result: &str) {
    counter!(
        "portal_mutations_total",
        "op" => operation.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}
