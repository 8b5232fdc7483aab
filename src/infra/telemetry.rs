use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global tracing subscriber and register metric descriptions.
///
/// `RUST_LOG` directives, when present, refine the configured level.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "folio_listing_cache_hit_total",
            Unit::Count,
            "Listing requests served from a fresh cache entry."
        );
        describe_counter!(
            "folio_listing_cache_miss_total",
            Unit::Count,
            "Listing requests that computed the page themselves."
        );
        describe_counter!(
            "folio_listing_cache_wait_hit_total",
            Unit::Count,
            "Listing requests served by another request's in-flight computation."
        );
        describe_counter!(
            "folio_cache_sweep_removed_total",
            Unit::Count,
            "Expired entries reclaimed by periodic sweeps, labelled by store."
        );
        describe_counter!(
            "folio_auth_tokens_issued_total",
            Unit::Count,
            "Session tokens issued after a successful admin check."
        );
        describe_counter!(
            "folio_auth_tokens_rejected_total",
            Unit::Count,
            "Session verifications rejected as missing, mismatched or expired."
        );
    });
}
