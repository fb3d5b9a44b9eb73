//! Observability features: metrics and tracing.
//!
//! - **Metrics**: Counters and histograms via `metrics-rs`
//! - **Tracing**: Structured logging and spans via `tracing`
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `extractor_buffers_read` | Counter | Buffers returned by track reads |
//! | `extractor_bytes_read` | Counter | Bytes returned by track reads |
//! | `extractor_read_errors` | Counter | Failed reads (faults only) |
//! | `extractor_read_time_ns` | Histogram | Time spent per read |
//! | `extractor_plugins_freed` | Counter | Plugin handles released |
//! | `extractor_plugin_buffers_released` | Counter | Plugin buffers handed back |
//! | `extractor_format_fields_dropped` | Counter | Untranslatable format fields |
//!
//! Nothing is recorded unless the application installs a metrics recorder.

mod metrics;
mod tracing_support;

pub use self::metrics::{
    TimerGuard, TrackMetrics, init_metrics, record_buffer_released, record_format_field_dropped,
    record_plugin_freed,
};
pub use tracing_support::{
    TracingConfig, span_extractor, span_track, trace_plugin_freed, trace_read, trace_read_error,
    trace_track_state,
};
