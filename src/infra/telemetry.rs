use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};
use crate::idempotency::{
    METRIC_CACHE_ERRORS_TOTAL, METRIC_CACHE_GET_MS, METRIC_CACHE_PUT_MS, METRIC_REQUESTS_TOTAL,
};

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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_REQUESTS_TOTAL,
            Unit::Count,
            "Idempotent requests by outcome (hit, miss, key_not_set, key_too_long, mismatch)."
        );
        describe_histogram!(
            METRIC_CACHE_GET_MS,
            Unit::Milliseconds,
            "Snapshot lookup latency in milliseconds."
        );
        describe_histogram!(
            METRIC_CACHE_PUT_MS,
            Unit::Milliseconds,
            "Snapshot store latency in milliseconds."
        );
        describe_counter!(
            METRIC_CACHE_ERRORS_TOTAL,
            Unit::Count,
            "Snapshot cache failures by operation."
        );
    });
}
