//! # extractor-bridge
//!
//! Media extractor and track interfaces, with bridges that present
//! plugin-supplied extractors of either ABI generation through them.
//!
//! An extractor demultiplexes a container into tracks; a track yields
//! timestamped [`Buffer`](buffer::Buffer)s and describes its format as
//! [`MetaData`](metadata::MetaData). Plugins hand out C-compatible function
//! tables, and the bridges in [`plugin`] make them look exactly like any
//! other [`MediaExtractor`](extractor::MediaExtractor).
//!
//! ## Features
//!
//! - **Two plugin generations**: native objects behind `c_void` (v1), or a
//!   format handle plus plugin-owned buffer memory (v2)
//! - **Single release**: plugin state and plugin buffers are handed back
//!   exactly once, from `Drop`
//! - **Lifecycle gate**: reads before `start` or after `stop` fail fast
//! - **rkyv serialization**: metadata round-trips through aligned bytes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use extractor_bridge::prelude::*;
//!
//! let handle = unsafe { PluginHandle::from_raw_v2(table) }.ok_or(Error::NotInitialized)?;
//! let extractor = handle.into_extractor(BridgeConfig::default());
//!
//! let mut track = extractor.track(0)?;
//! track.start(None)?;
//! loop {
//!     match track.read(None) {
//!         Ok(buffer) => consume(buffer.as_bytes()),
//!         Err(Error::EndOfStream) => break,
//!         Err(e) => return Err(e),
//!     }
//! }
//! track.stop()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod buffer;
pub mod error;
pub mod extractor;
pub mod format;
pub mod memory;
pub mod metadata;
pub mod observability;
pub mod plugin;
pub mod read_options;
pub mod track;
pub mod translate;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::{Buffer, BufferFlags};
    pub use crate::error::{Error, Result, Status};
    pub use crate::extractor::{ExtractorFlags, MediaExtractor, TrackMetaDataFlags};
    pub use crate::memory::{MemorySegment, MemoryType};
    pub use crate::metadata::{MetaData, MetaValue};
    pub use crate::plugin::{BridgeConfig, PluginHandle};
    pub use crate::read_options::{ReadOptions, SeekMode};
    pub use crate::track::{MediaTrack, TrackState};
    pub use crate::translate::TranslationPolicy;
}

pub use error::{Error, Result};
