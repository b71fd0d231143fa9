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
            "tplstore_cache_hit_total",
            Unit::Count,
            "Resolves answered from a live compiled entry."
        );
        describe_counter!(
            "tplstore_cache_miss_total",
            Unit::Count,
            "Resolves that found no live compiled entry."
        );
        describe_counter!(
            "tplstore_cache_compile_total",
            Unit::Count,
            "Source fetches followed by a compile attempt."
        );
        describe_counter!(
            "tplstore_cache_invalidate_total",
            Unit::Count,
            "Names invalidated by writes and deletes."
        );
        describe_counter!(
            "tplstore_cache_evict_total",
            Unit::Count,
            "Expired entries dropped by the sweeper."
        );
        describe_histogram!(
            "tplstore_cache_fill_ms",
            Unit::Milliseconds,
            "Fetch plus compile latency of a cache fill in milliseconds."
        );
    });
}
