//! Metrics collection using metrics-rs.

use metrics::{Counter, Histogram, Unit, counter, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const BUFFERS_READ: &str = "extractor_buffers_read";
const BYTES_READ: &str = "extractor_bytes_read";
const READ_ERRORS: &str = "extractor_read_errors";
const READ_TIME_NS: &str = "extractor_read_time_ns";
const PLUGINS_FREED: &str = "extractor_plugins_freed";
const BUFFERS_RELEASED: &str = "extractor_plugin_buffers_released";
const FORMAT_FIELDS_DROPPED: &str = "extractor_format_fields_dropped";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(BUFFERS_READ, Unit::Count, "Buffers returned by track reads");
    metrics::describe_counter!(BYTES_READ, Unit::Bytes, "Bytes returned by track reads");
    metrics::describe_counter!(
        READ_ERRORS,
        Unit::Count,
        "Track reads that failed with a fault (end of stream excluded)"
    );
    metrics::describe_histogram!(READ_TIME_NS, Unit::Nanoseconds, "Time spent in a track read");
    metrics::describe_counter!(PLUGINS_FREED, Unit::Count, "Plugin handles released");
    metrics::describe_counter!(
        BUFFERS_RELEASED,
        Unit::Count,
        "Plugin-owned buffers handed back to their plugin"
    );
    metrics::describe_counter!(
        FORMAT_FIELDS_DROPPED,
        Unit::Count,
        "Format fields dropped during translation"
    );
}

/// Record a plugin handle being freed.
#[inline]
pub fn record_plugin_freed(abi: &'static str) {
    counter!(PLUGINS_FREED, "abi" => abi).increment(1);
}

/// Record a plugin-owned buffer being released.
#[inline]
pub fn record_buffer_released() {
    counter!(BUFFERS_RELEASED).increment(1);
}

/// Record a format field dropped during translation.
#[inline]
pub fn record_format_field_dropped() {
    counter!(FORMAT_FIELDS_DROPPED).increment(1);
}

/// Metrics for one track, with labels resolved once.
#[derive(Clone)]
pub struct TrackMetrics {
    extractor: String,
    track: usize,
    buffers: Counter,
    bytes: Counter,
    errors: Counter,
    read_time: Histogram,
}

impl TrackMetrics {
    /// Create a metrics collector for track `track` of `extractor`.
    pub fn new(extractor: &str, track: usize) -> Self {
        let index = track.to_string();
        Self {
            extractor: extractor.to_string(),
            track,
            buffers: counter!(
                BUFFERS_READ,
                "extractor" => extractor.to_string(),
                "track" => index.clone()
            ),
            bytes: counter!(
                BYTES_READ,
                "extractor" => extractor.to_string(),
                "track" => index.clone()
            ),
            errors: counter!(
                READ_ERRORS,
                "extractor" => extractor.to_string(),
                "track" => index.clone()
            ),
            read_time: histogram!(
                READ_TIME_NS,
                "extractor" => extractor.to_string(),
                "track" => index
            ),
        }
    }

    /// Record a successful read.
    #[inline]
    pub fn record_buffer(&self, bytes: usize) {
        self.buffers.increment(1);
        self.bytes.increment(bytes as u64);
    }

    /// Record a failed read.
    #[inline]
    pub fn record_error(&self) {
        self.errors.increment(1);
    }

    /// Record read time.
    #[inline]
    pub fn record_time(&self, duration: Duration) {
        self.read_time.record(duration.as_nanos() as f64);
    }

    /// Start a timer and return a guard that records on drop.
    pub fn start_timer(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            metrics: self,
        }
    }

    /// Extractor label.
    pub fn extractor(&self) -> &str {
        &self.extractor
    }

    /// Track index label.
    pub fn track(&self) -> usize {
        self.track
    }
}

impl std::fmt::Debug for TrackMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackMetrics")
            .field("extractor", &self.extractor)
            .field("track", &self.track)
            .finish()
    }
}

/// Guard that records read time when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    metrics: &'a TrackMetrics,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.metrics.record_time(self.start.elapsed());
    }
}
