//! Lifecycle gate and instrumentation shared by the track bridges.

use crate::buffer::Buffer;
use crate::error::{Error, Result, Status};
use crate::observability::{self, TracingConfig, TrackMetrics};
use crate::track::TrackState;
use tracing::Span;

/// Tracks the lifecycle of a bridged track so reads fail fast with
/// `NotInitialized` before `start` and after `stop`, whatever the plugin
/// itself would do.
pub(super) struct TrackGate {
    index: usize,
    state: TrackState,
    span: Span,
    metrics: TrackMetrics,
    read_events: bool,
}

impl TrackGate {
    pub(super) fn new(extractor: &str, abi: &'static str, index: usize, tracing: TracingConfig) -> Self {
        let span = if tracing.extractor_spans {
            observability::span_track(extractor, abi, index)
        } else {
            Span::none()
        };
        Self {
            index,
            state: TrackState::Created,
            span,
            metrics: TrackMetrics::new(extractor, index),
            read_events: tracing.read_events,
        }
    }

    pub(super) fn span(&self) -> &Span {
        &self.span
    }

    #[cfg(test)]
    pub(super) fn state(&self) -> TrackState {
        self.state
    }

    fn transition(&mut self, to: TrackState) {
        if self.state != to {
            observability::trace_track_state(
                self.index,
                &format!("{:?}", self.state),
                &format!("{:?}", to),
            );
            self.state = to;
        }
    }

    /// Apply the plugin's `start` status. The state only changes on success.
    pub(super) fn started(&mut self, status: Status) -> Result<()> {
        Error::check(status)?;
        self.transition(TrackState::Started);
        Ok(())
    }

    /// Apply the plugin's `stop` status. Reads are closed either way.
    pub(super) fn stopped(&mut self, status: Status) -> Result<()> {
        self.transition(TrackState::Stopped);
        Error::check(status)
    }

    pub(super) fn ensure_readable(&self) -> Result<()> {
        self.state.ensure_readable()
    }

    /// Time a plugin read and record its outcome.
    pub(super) fn read(&self, read: impl FnOnce() -> Result<Buffer>) -> Result<Buffer> {
        let result = {
            let _timer = self.metrics.start_timer();
            read()
        };
        match &result {
            Ok(buffer) => {
                self.metrics.record_buffer(buffer.len());
                if self.read_events {
                    observability::trace_read(self.index, buffer.len(), buffer.time_us());
                }
            }
            Err(err) => {
                if err.is_fault() {
                    self.metrics.record_error();
                }
                observability::trace_read_error(self.index, err);
            }
        }
        result
    }
}
