//! The track interface: a reader over one elementary stream.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::metadata::MetaData;
use crate::read_options::ReadOptions;

/// Lifecycle state of a track.
///
/// `Created → Started → Stopped`, and a stopped track may be started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrackState {
    /// Constructed, `start` not called yet.
    #[default]
    Created,
    /// Reads are allowed.
    Started,
    /// Reads fail with [`Error::NotInitialized`].
    Stopped,
}

impl TrackState {
    /// Whether `read` may proceed in this state.
    pub fn is_readable(&self) -> bool {
        matches!(self, TrackState::Started)
    }

    /// Fail fast with `NotInitialized` unless the track is started.
    pub fn ensure_readable(&self) -> Result<()> {
        if self.is_readable() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }
}

/// A reader over one audio, video or text stream of a container.
///
/// Implemented by native readers and by the plugin bridges; callers only
/// ever see `dyn MediaTrack`.
pub trait MediaTrack: Send {
    /// Prepare the track for reading.
    ///
    /// Must be called before [`read`](Self::read). `params` carries optional
    /// start parameters. Starting an already started track must not corrupt
    /// its state.
    fn start(&mut self, params: Option<&MetaData>) -> Result<()>;

    /// Stop the track.
    ///
    /// After this returns, any `read` fails immediately with
    /// [`Error::NotInitialized`] instead of blocking or returning stale data.
    ///
    /// The caller must have dropped every buffer previously returned by
    /// `read`. Stopping with live buffers is undefined: the implementation
    /// may release the memory they point into.
    fn stop(&mut self) -> Result<()>;

    /// Describe the data produced by this track.
    ///
    /// Callable before `start`. `format` is filled with the track format;
    /// implementations may leave partial contents in it on error.
    fn get_format(&mut self, format: &mut MetaData) -> Result<()>;

    /// Read the next buffer.
    ///
    /// Blocks until data is available unless non-blocking mode is both
    /// requested in `options` and [supported](Self::supports_nonblocking_read),
    /// in which case [`Error::WouldBlock`] means "nothing yet".
    ///
    /// Returns [`Error::EndOfStream`] once exhausted and
    /// [`Error::FormatChanged`] when the output format changed; the caller
    /// must then re-query [`get_format`](Self::get_format).
    fn read(&mut self, options: Option<&ReadOptions>) -> Result<Buffer>;

    /// Whether `read` honours the non-blocking option.
    fn supports_nonblocking_read(&self) -> bool {
        false
    }
}
