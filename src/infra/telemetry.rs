use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
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
            "curio_cache_hit_total",
            Unit::Count,
            "Total number of listing cache hits."
        );
        describe_counter!(
            "curio_cache_miss_total",
            Unit::Count,
            "Total number of listing cache misses."
        );
        describe_counter!(
            "curio_cache_bypass_total",
            Unit::Count,
            "Total number of fetches that ran without the populate lock after waiting."
        );
        describe_counter!(
            "curio_cache_degraded_total",
            Unit::Count,
            "Total number of cache store failures absorbed by falling back to storage."
        );
        describe_counter!(
            "curio_cache_invalidated_keys_total",
            Unit::Count,
            "Total number of cache keys deleted by invalidation."
        );
        describe_counter!(
            "curio_membership_cache_hit_total",
            Unit::Count,
            "Total number of group membership cache hits."
        );
        describe_counter!(
            "curio_membership_cache_miss_total",
            Unit::Count,
            "Total number of group membership cache misses."
        );
        describe_histogram!(
            "curio_repository_fetch_ms",
            Unit::Milliseconds,
            "Listing repository fetch latency in milliseconds."
        );
    });
}
