//! The extractor interface: container-level access to tracks and metadata.

use crate::error::{Error, Result};
use crate::metadata::MetaData;
use crate::track::MediaTrack;
use bitflags::bitflags;

bitflags! {
    /// Capabilities of an extractor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExtractorFlags: u32 {
        /// Can seek backwards.
        const CAN_SEEK_BACKWARD = 1;
        /// Can seek forwards.
        const CAN_SEEK_FORWARD = 2;
        /// Can pause.
        const CAN_PAUSE = 4;
        /// Can seek at all.
        const CAN_SEEK = 8;
    }
}

impl Default for ExtractorFlags {
    fn default() -> Self {
        Self::all()
    }
}

bitflags! {
    /// Options for [`MediaExtractor::track_metadata`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TrackMetaDataFlags: u32 {
        /// Include metadata that is expensive to compute (e.g. thumbnail time).
        const INCLUDE_EXTENSIVE_METADATA = 1;
    }
}

/// A container-level demultiplexer.
///
/// Tracks returned by [`track`](Self::track) borrow the extractor, so they
/// cannot outlive the state they read from.
pub trait MediaExtractor: Send {
    /// Number of tracks in the container.
    fn count_tracks(&self) -> usize;

    /// Open a reader for track `index`.
    ///
    /// Returns [`Error::InvalidArgument`] when `index >= count_tracks()`.
    fn track(&self, index: usize) -> Result<Box<dyn MediaTrack + '_>>;

    /// Fill `meta` with the metadata of track `index`.
    fn track_metadata(
        &self,
        meta: &mut MetaData,
        index: usize,
        flags: TrackMetaDataFlags,
    ) -> Result<()>;

    /// Fill `meta` with container-level metadata.
    fn metadata(&self, meta: &mut MetaData) -> Result<()>;

    /// Name of the extractor implementation.
    fn name(&self) -> &str;

    /// Capabilities. Defaults to all of them.
    fn flags(&self) -> ExtractorFlags {
        ExtractorFlags::all()
    }

    /// Install a conditional-access token.
    ///
    /// Extractors without conditional-access support return
    /// [`Error::NotSupported`] so a token is never silently discarded.
    fn set_media_cas(&mut self, token: &[u8]) -> Result<()> {
        let _ = token;
        Err(Error::NotSupported)
    }
}

/// Check a track index against the track count.
pub(crate) fn check_track_index(index: usize, count: usize) -> Result<()> {
    if index < count {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "track index {} out of range ({} tracks)",
            index, count
        )))
    }
}
