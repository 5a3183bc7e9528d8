use std::{io, sync::Once};

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

/// Install the global tracing subscriber and describe the pipeline metrics.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    // Pipeline output goes to stdout; logs stay on stderr.
    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_target(false)
            .boxed(),
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
            "trellis_pipeline_cache_hit_total",
            Unit::Count,
            "Total number of pipeline cache hits, labelled by kind (complete|partial)."
        );
        describe_counter!(
            "trellis_pipeline_cache_miss_total",
            Unit::Count,
            "Total number of cacheable requests without a usable cached prefix."
        );
        describe_counter!(
            "trellis_pipeline_cache_invalid_total",
            Unit::Count,
            "Total number of cache entries discarded because a validity no longer held."
        );
        describe_counter!(
            "trellis_pipeline_cache_store_total",
            Unit::Count,
            "Total number of entries written to the cache store."
        );
        describe_counter!(
            "trellis_cache_store_evict_total",
            Unit::Count,
            "Total number of in-memory cache store evictions due to capacity."
        );
        describe_histogram!(
            "trellis_pipeline_process_ms",
            Unit::Milliseconds,
            "Pipeline processing latency in milliseconds."
        );
    });
}
