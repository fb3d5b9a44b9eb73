//! Per-read directives passed to [`MediaTrack::read`](crate::track::MediaTrack::read).
//!
//! `ReadOptions` crosses the plugin ABI by value, so it has a fixed packed
//! layout with no padding: 17 bytes, alignment 1.

/// Seek behaviour requested alongside a read.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SeekMode {
    /// Seek to the sync sample at or before the requested time.
    PreviousSync = 0,
    /// Seek to the sync sample at or after the requested time.
    NextSync = 1,
    /// Seek to the sync sample nearest to the requested time.
    #[default]
    ClosestSync = 2,
    /// Seek to the sample nearest to the requested time.
    Closest = 3,
    /// Interpret the requested time as a frame index.
    FrameIndex = 4,
}

impl SeekMode {
    /// Decode a wire value. Unknown values fall back to `ClosestSync`.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => SeekMode::PreviousSync,
            1 => SeekMode::NextSync,
            3 => SeekMode::Closest,
            4 => SeekMode::FrameIndex,
            _ => SeekMode::ClosestSync,
        }
    }
}

const SEEK_TO_OPTION: u32 = 1;

/// Options that modify `read()` behaviour.
///
/// The default requests no seek and a blocking read.
///
/// # Example
///
/// ```rust
/// use extractor_bridge::read_options::{ReadOptions, SeekMode};
///
/// let mut options = ReadOptions::new();
/// options.set_seek_to(1_000_000, SeekMode::PreviousSync);
/// assert_eq!(options.seek_to(), Some((1_000_000, SeekMode::PreviousSync)));
///
/// // A follow-up read of the same request must not seek again.
/// options.clear_non_persistent();
/// assert_eq!(options.seek_to(), None);
/// ```
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct ReadOptions {
    options: u32,
    seek_time_us: i64,
    seek_mode: i32,
    non_blocking: bool,
}

impl ReadOptions {
    /// Create options with no seek and blocking mode.
    pub const fn new() -> Self {
        Self {
            options: 0,
            seek_time_us: 0,
            seek_mode: SeekMode::ClosestSync as i32,
            non_blocking: false,
        }
    }

    /// Reset everything back to defaults.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Request a one-shot seek.
    pub fn set_seek_to(&mut self, time_us: i64, mode: SeekMode) {
        self.options |= SEEK_TO_OPTION;
        self.seek_time_us = time_us;
        self.seek_mode = mode as i32;
    }

    /// Request a one-shot seek to the closest sync sample.
    pub fn set_seek_to_closest_sync(&mut self, time_us: i64) {
        self.set_seek_to(time_us, SeekMode::ClosestSync);
    }

    /// Remove the pending seek request.
    pub fn clear_seek_to(&mut self) {
        self.options &= !SEEK_TO_OPTION;
        self.seek_time_us = 0;
        self.seek_mode = SeekMode::ClosestSync as i32;
    }

    /// The pending seek request, if any.
    pub fn seek_to(&self) -> Option<(i64, SeekMode)> {
        if self.options & SEEK_TO_OPTION != 0 {
            Some((self.seek_time_us, self.seek_mode()))
        } else {
            None
        }
    }

    /// The stored seek mode, `ClosestSync` when no seek was requested.
    pub fn seek_mode(&self) -> SeekMode {
        SeekMode::from_raw(self.seek_mode)
    }

    /// Ask for a non-blocking read.
    pub fn set_non_blocking(&mut self) {
        self.non_blocking = true;
    }

    /// Go back to blocking reads.
    pub fn clear_non_blocking(&mut self) {
        self.non_blocking = false;
    }

    /// Whether a non-blocking read was requested.
    pub fn non_blocking(&self) -> bool {
        self.non_blocking
    }

    /// Clear options that apply to a single read only.
    ///
    /// Used when one logical request spans several reads: blocking mode
    /// persists, the seek does not fire again.
    pub fn clear_non_persistent(&mut self) {
        self.clear_seek_to();
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ReadOptions {
    fn eq(&self, other: &Self) -> bool {
        self.seek_to() == other.seek_to() && self.non_blocking() == other.non_blocking()
    }
}

impl Eq for ReadOptions {}

impl std::fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOptions")
            .field("seek_to", &self.seek_to())
            .field("non_blocking", &self.non_blocking())
            .finish()
    }
}
