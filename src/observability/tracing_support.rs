//! Tracing integration for structured logging and spans.

use crate::error::Error;
use tracing::{Level, Span, span};

/// Configuration for tracing behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracingConfig {
    /// Whether to create a span around every extractor call.
    pub extractor_spans: bool,
    /// Whether to emit an event for every buffer read.
    pub read_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            extractor_spans: true,
            read_events: false, // one event per buffer is noisy
        }
    }
}

impl TracingConfig {
    /// Spans and per-read events.
    pub fn all() -> Self {
        Self {
            extractor_spans: true,
            read_events: true,
        }
    }

    /// Disable everything optional. Warnings and lifecycle events remain.
    pub fn none() -> Self {
        Self {
            extractor_spans: false,
            read_events: false,
        }
    }
}

/// Create a span for calls into an extractor.
#[inline]
pub fn span_extractor(name: &str, abi: &'static str) -> Span {
    span!(Level::DEBUG, "extractor", name = %name, abi = abi)
}

/// Create a span for calls into one track.
#[inline]
pub fn span_track(extractor: &str, abi: &'static str, track: usize) -> Span {
    span!(
        Level::DEBUG,
        "track",
        extractor = %extractor,
        abi = abi,
        track = track
    )
}

/// Log a buffer read.
#[inline]
pub fn trace_read(track: usize, size: usize, time_us: i64) {
    tracing::trace!(track = track, size = size, time_us = time_us, "buffer read");
}

/// Log a failed read. End of stream and other informational outcomes go to
/// debug, faults to warn.
#[inline]
pub fn trace_read_error(track: usize, error: &Error) {
    if error.is_fault() {
        tracing::warn!(track = track, error = %error, "track read failed");
    } else {
        tracing::debug!(track = track, outcome = %error, "track read ended");
    }
}

/// Log a track state change.
#[inline]
pub fn trace_track_state(track: usize, from: &str, to: &str) {
    tracing::debug!(track = track, from = %from, to = %to, "track state changed");
}

/// Log a plugin handle being freed.
#[inline]
pub fn trace_plugin_freed(name: &str, abi: &'static str) {
    tracing::debug!(extractor = %name, abi = abi, "plugin handle freed");
}
