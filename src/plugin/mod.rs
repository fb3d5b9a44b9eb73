//! Plugin bridges for extractors built against either ABI generation.
//!
//! A plugin hands out a C-compatible function table with an opaque `data`
//! pointer. The bridge takes ownership of that table, forwards every
//! [`MediaExtractor`]/[`MediaTrack`](crate::track::MediaTrack) call to it
//! and calls the table's `free` exactly once when dropped.
//!
//! # Generations
//!
//! | ABI | Metadata | Buffers |
//! |-----|----------|---------|
//! | [`EXTRACTOR_ABI_V1`] | native [`MetaData`](crate::metadata::MetaData) behind `c_void` | boxed [`Buffer`](crate::buffer::Buffer) |
//! | [`EXTRACTOR_ABI_V2`] | written through a [`CFormatHandle`](crate::format::CFormatHandle), then translated | plugin memory described by [`CMediaBufferV2`] |
//!
//! Callers see no difference between the two.
//!
//! # Example Plugin (Rust)
//!
//! ```ignore
//! use extractor_bridge::plugin::{CMediaExtractorV1, PluginHandle, BridgeConfig};
//!
//! unsafe extern "C" fn free_state(data: *mut c_void) {
//!     drop(unsafe { Box::from_raw(data as *mut MyState) });
//! }
//!
//! let table = CMediaExtractorV1 {
//!     data: Box::into_raw(Box::new(MyState::open(source)?)) as *mut c_void,
//!     free: free_state,
//!     // ...
//! };
//!
//! let handle = unsafe { PluginHandle::from_raw_v1(table.into_raw()) }.unwrap();
//! let extractor = handle.into_extractor(BridgeConfig::default());
//! ```

mod gate;
mod v1;
mod v2;

pub use v1::{
    CMediaExtractorV1, CMediaTrackV1, EXTRACTOR_ABI_V1, ExtractorBridgeV1, TrackBridgeV1,
    buffer_from_raw, buffer_into_raw, metadata_from_raw, params_from_raw,
};
pub use v2::{
    CMediaBufferV2, CMediaExtractorV2, CMediaTrackV2, EXTRACTOR_ABI_V2, ExtractorBridgeV2,
    TrackBridgeV2,
};

use crate::extractor::MediaExtractor;
use crate::observability::TracingConfig;
use crate::translate::TranslationPolicy;

/// Settings applied to every call through a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BridgeConfig {
    /// How generation-2 format values without a native form are handled.
    pub translation: TranslationPolicy,
    /// Spans and per-read events.
    pub tracing: TracingConfig,
}

impl BridgeConfig {
    /// Fail metadata calls that would drop any format value.
    pub fn strict() -> Self {
        Self {
            translation: TranslationPolicy::Strict,
            ..Default::default()
        }
    }

    /// No spans and no per-read events.
    pub fn quiet() -> Self {
        Self {
            tracing: TracingConfig::none(),
            ..Default::default()
        }
    }
}

enum Generation {
    V1(v1::OwnedExtractorV1),
    V2(v2::OwnedExtractorV2),
}

/// Ownership of a plugin extractor table, of either generation.
///
/// The table is freed exactly once: by the bridge returned from
/// [`into_extractor`](Self::into_extractor), or by the handle itself if it
/// is dropped unconverted.
pub struct PluginHandle {
    generation: Generation,
}

impl PluginHandle {
    /// Take ownership of a generation-1 table.
    ///
    /// Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// - `table` must come from [`CMediaExtractorV1::into_raw`]
    /// - every entry point must accept the table's `data` until `free`
    ///   has been called on it
    pub unsafe fn from_raw_v1(table: *mut CMediaExtractorV1) -> Option<Self> {
        // SAFETY: Forwarded from the caller.
        let owned = unsafe { v1::OwnedExtractorV1::from_raw(table) }?;
        Some(Self {
            generation: Generation::V1(owned),
        })
    }

    /// Take ownership of a generation-2 table.
    ///
    /// Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// - `table` must come from [`CMediaExtractorV2::into_raw`]
    /// - every entry point must accept the table's `data` until `free`
    ///   has been called on it
    pub unsafe fn from_raw_v2(table: *mut CMediaExtractorV2) -> Option<Self> {
        // SAFETY: Forwarded from the caller.
        let owned = unsafe { v2::OwnedExtractorV2::from_raw(table) }?;
        Some(Self {
            generation: Generation::V2(owned),
        })
    }

    /// ABI generation of the table.
    pub fn abi_version(&self) -> u32 {
        match self.generation {
            Generation::V1(_) => EXTRACTOR_ABI_V1,
            Generation::V2(_) => EXTRACTOR_ABI_V2,
        }
    }

    /// Name reported by the plugin.
    pub fn name(&self) -> &str {
        match &self.generation {
            Generation::V1(table) => table.name(),
            Generation::V2(table) => table.name(),
        }
    }

    /// Wrap the table in the bridge for its generation.
    pub fn into_extractor(self, config: BridgeConfig) -> Box<dyn MediaExtractor> {
        match self.generation {
            Generation::V1(table) => Box::new(ExtractorBridgeV1::new(table, config)),
            Generation::V2(table) => Box::new(ExtractorBridgeV2::new(table, config)),
        }
    }
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("name", &self.name())
            .field("abi_version", &self.abi_version())
            .finish()
    }
}
