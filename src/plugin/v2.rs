//! Generation-2 plugin ABI.
//!
//! Metadata is written by the plugin through a [`CFormatHandle`] and
//! translated into [`MetaData`] afterwards. Buffers stay in plugin memory:
//! the plugin fills a [`CMediaBufferV2`] descriptor and gets its `release`
//! entry point called once the last [`Buffer`] referring to it is dropped.

use super::BridgeConfig;
use super::gate::TrackGate;
use crate::buffer::{Buffer, BufferFlags, MemoryHandle};
use crate::error::{Error, Result, Status};
use crate::extractor::{ExtractorFlags, MediaExtractor, TrackMetaDataFlags, check_track_index};
use crate::format::{CFormatHandle, FormatSession};
use crate::memory::{PluginSegment, ReleaseFn};
use crate::metadata::{MetaData, keys};
use crate::observability;
use crate::read_options::ReadOptions;
use crate::track::MediaTrack;
use crate::translate::{TranslationPolicy, translate};
use std::ffi::{CStr, c_char, c_void};
use std::marker::PhantomData;
use std::ptr;
use std::sync::Arc;
use tracing::Span;

/// ABI generation number of [`CMediaExtractorV2`].
pub const EXTRACTOR_ABI_V2: u32 = 2;

const ABI: &str = "v2";

/// Buffer descriptor filled by a generation-2 `read`.
///
/// This struct is `#[repr(C)]` for C ABI compatibility. `data` must stay
/// valid for `size` bytes until `release(opaque)` is called.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CMediaBufferV2 {
    /// Passed back to `release`.
    pub opaque: *mut c_void,
    /// Start of the plugin's memory.
    pub data: *const u8,
    /// Size of the memory at `data`.
    pub size: usize,
    /// Start of the valid range within `data`.
    pub range_offset: usize,
    /// Length of the valid range.
    pub range_length: usize,
    /// Presentation time in microseconds.
    pub time_us: i64,
    /// Sample duration in microseconds. Negative when unknown.
    pub duration_us: i64,
    /// [`BufferFlags`] bits.
    pub flags: u32,
    /// Hand the memory back to the plugin. Absent for static memory.
    ///
    /// Called exactly once, from whichever thread drops the last [`Buffer`]
    /// sharing the memory. That need not be the thread that called `read`,
    /// so the function must be callable from any thread.
    pub release: Option<ReleaseFn>,
}

impl CMediaBufferV2 {
    /// An unfilled descriptor.
    pub const fn empty() -> Self {
        Self {
            opaque: ptr::null_mut(),
            data: ptr::null(),
            size: 0,
            range_offset: 0,
            range_length: 0,
            time_us: 0,
            duration_us: -1,
            flags: 0,
            release: None,
        }
    }

    fn is_filled(&self) -> bool {
        !self.data.is_null() || self.release.is_some()
    }

    /// Take ownership of the described memory.
    ///
    /// The memory is released on every exit path, including a bad range.
    ///
    /// # Safety
    ///
    /// The descriptor must come from the plugin's `read` and not have been
    /// converted before.
    unsafe fn into_buffer(self) -> Result<Buffer> {
        // SAFETY: The ABI requires `data` to be valid for `size` bytes
        // until `release(opaque)`, which the segment calls once on drop.
        let segment = unsafe { PluginSegment::new(self.data, self.size, self.opaque, self.release) };
        if self.data.is_null() && self.size != 0 {
            return Err(Error::ExtractionFailure(format!(
                "plugin buffer of {} bytes has no data",
                self.size
            )));
        }
        let memory = MemoryHandle::with_range(Arc::new(segment), self.range_offset, self.range_length)
            .map_err(|e| Error::ExtractionFailure(format!("plugin buffer range: {}", e)))?;

        let mut buffer = Buffer::new(memory);
        buffer.set_time_us(self.time_us);
        buffer.set_flags(BufferFlags::from_bits_retain(self.flags));
        buffer.meta_mut().set_int64(keys::TIME_US, self.time_us);
        if self.duration_us >= 0 {
            buffer.set_duration_us(Some(self.duration_us));
            buffer.meta_mut().set_int64(keys::DURATION_US, self.duration_us);
        }
        Ok(buffer)
    }
}

impl Default for CMediaBufferV2 {
    fn default() -> Self {
        Self::empty()
    }
}

/// Track function table, generation 2.
///
/// This struct is `#[repr(C)]` for C ABI compatibility.
#[repr(C)]
pub struct CMediaTrackV2 {
    /// Plugin state passed as the first argument of every call.
    pub data: *mut c_void,
    /// Release `data`.
    pub free: unsafe extern "C" fn(*mut c_void),
    /// Start the track.
    pub start: unsafe extern "C" fn(*mut c_void) -> Status,
    /// Stop the track.
    pub stop: unsafe extern "C" fn(*mut c_void) -> Status,
    /// Write the track format through the handle.
    pub get_format: unsafe extern "C" fn(*mut c_void, *mut CFormatHandle) -> Status,
    /// Fill the descriptor with one buffer.
    pub read: unsafe extern "C" fn(*mut c_void, *mut CMediaBufferV2, ReadOptions) -> Status,
    /// Whether non-blocking reads are supported. Absent means no.
    pub supports_nonblocking_read: Option<unsafe extern "C" fn(*mut c_void) -> bool>,
}

impl CMediaTrackV2 {
    /// Move the table to the heap and hand out ownership.
    pub fn into_raw(self) -> *mut CMediaTrackV2 {
        Box::into_raw(Box::new(self))
    }
}

/// Extractor function table, generation 2.
///
/// This struct is `#[repr(C)]` for C ABI compatibility.
#[repr(C)]
pub struct CMediaExtractorV2 {
    /// Plugin state passed as the first argument of every call.
    pub data: *mut c_void,
    /// Release `data`.
    pub free: unsafe extern "C" fn(*mut c_void),
    /// Number of tracks.
    pub count_tracks: unsafe extern "C" fn(*mut c_void) -> usize,
    /// Create track `index`, transferring ownership of the returned table
    /// (see [`CMediaTrackV2::into_raw`]). Null on failure.
    pub get_track: unsafe extern "C" fn(*mut c_void, usize) -> *mut CMediaTrackV2,
    /// Write the metadata of track `index` through the handle.
    pub get_track_metadata:
        unsafe extern "C" fn(*mut c_void, *mut CFormatHandle, usize, u32) -> Status,
    /// Write container metadata through the handle.
    pub get_metadata: unsafe extern "C" fn(*mut c_void, *mut CFormatHandle) -> Status,
    /// Null-terminated name, valid while `data` is alive.
    pub name: unsafe extern "C" fn(*mut c_void) -> *const c_char,
    /// Capability bits. Absent means all capabilities.
    pub flags: Option<unsafe extern "C" fn(*mut c_void) -> u32>,
    /// Install a conditional-access token. Absent means unsupported.
    pub set_media_cas: Option<unsafe extern "C" fn(*mut c_void, *const u8, usize) -> Status>,
}

impl CMediaExtractorV2 {
    /// Move the table to the heap and hand out ownership.
    pub fn into_raw(self) -> *mut CMediaExtractorV2 {
        Box::into_raw(Box::new(self))
    }
}

/// Run one metadata-producing plugin call through a fresh format session.
///
/// The translated metadata is assigned to `out` even when the plugin
/// fails. A plugin failure wins over a translation failure.
fn fetch_format(
    policy: TranslationPolicy,
    out: &mut MetaData,
    call: impl FnOnce(*mut CFormatHandle) -> Status,
) -> Result<()> {
    let mut session = FormatSession::new();
    let status = call(session.handle());
    let translation = translate(session.carrier());
    drop(session);

    let translated = translation.check(policy);
    *out = translation.metadata;
    Error::check(status)?;
    translated
}

// ============================================================================
// Owned tables
// ============================================================================

struct OwnedTrackV2(Box<CMediaTrackV2>);

// SAFETY: The ABI requires track state to be usable from whichever single
// thread currently owns it. The bridge is not `Sync`.
unsafe impl Send for OwnedTrackV2 {}

impl OwnedTrackV2 {
    fn start(&self) -> Status {
        // SAFETY: `data` is live until Drop.
        unsafe { (self.0.start)(self.0.data) }
    }

    fn stop(&self) -> Status {
        // SAFETY: `data` is live until Drop.
        unsafe { (self.0.stop)(self.0.data) }
    }

    fn get_format(&self, policy: TranslationPolicy, format: &mut MetaData) -> Result<()> {
        fetch_format(policy, format, |handle| {
            // SAFETY: `data` is live until Drop; the handle outlives the call.
            unsafe { (self.0.get_format)(self.0.data, handle) }
        })
    }

    fn read(&self, options: ReadOptions) -> Result<Buffer> {
        let mut raw = CMediaBufferV2::empty();
        // SAFETY: `data` is live until Drop; `raw` outlives the call.
        let status = unsafe { (self.0.read)(self.0.data, &mut raw, options) };
        if let Err(err) = Error::check(status) {
            if raw.is_filled() {
                // SAFETY: Filled by this read and not converted yet.
                drop(unsafe { raw.into_buffer() });
            }
            return Err(err);
        }
        if !raw.is_filled() {
            return Err(Error::ExtractionFailure(
                "plugin reported success without a buffer".into(),
            ));
        }
        // SAFETY: Filled by this read and not converted yet.
        unsafe { raw.into_buffer() }
    }

    fn supports_nonblocking_read(&self) -> bool {
        match self.0.supports_nonblocking_read {
            // SAFETY: `data` is live until Drop.
            Some(supports) => unsafe { supports(self.0.data) },
            None => false,
        }
    }
}

impl Drop for OwnedTrackV2 {
    fn drop(&mut self) {
        // SAFETY: Called once; the table box is dropped right after.
        unsafe { (self.0.free)(self.0.data) };
    }
}

pub(super) struct OwnedExtractorV2(Box<CMediaExtractorV2>);

// SAFETY: See OwnedTrackV2.
unsafe impl Send for OwnedExtractorV2 {}

impl OwnedExtractorV2 {
    /// # Safety
    ///
    /// `table` must come from [`CMediaExtractorV2::into_raw`] and satisfy
    /// the table contract.
    pub(super) unsafe fn from_raw(table: *mut CMediaExtractorV2) -> Option<Self> {
        if table.is_null() {
            return None;
        }
        // SAFETY: Caller guarantees the table was boxed by into_raw.
        Some(Self(unsafe { Box::from_raw(table) }))
    }

    pub(super) fn name(&self) -> &str {
        // SAFETY: `data` is live until Drop.
        let name = unsafe { (self.0.name)(self.0.data) };
        if name.is_null() {
            return "unknown";
        }
        // SAFETY: The ABI requires a null-terminated string that lives as
        // long as `data`.
        unsafe { CStr::from_ptr(name).to_str().unwrap_or("unknown") }
    }

    fn count_tracks(&self) -> usize {
        // SAFETY: `data` is live until Drop.
        unsafe { (self.0.count_tracks)(self.0.data) }
    }
}

impl Drop for OwnedExtractorV2 {
    fn drop(&mut self) {
        let name = self.name().to_string();
        // SAFETY: Called once; the table box is dropped right after.
        unsafe { (self.0.free)(self.0.data) };
        observability::record_plugin_freed(ABI);
        observability::trace_plugin_freed(&name, ABI);
    }
}

// ============================================================================
// Bridges
// ============================================================================

/// Presents a generation-2 track as a [`MediaTrack`].
pub struct TrackBridgeV2<'a> {
    table: OwnedTrackV2,
    gate: TrackGate,
    translation: TranslationPolicy,
    _extractor: PhantomData<&'a ()>,
}

impl MediaTrack for TrackBridgeV2<'_> {
    fn start(&mut self, params: Option<&MetaData>) -> Result<()> {
        let _span = self.gate.span().clone().entered();
        if params.is_some() {
            tracing::debug!("generation-2 tracks take no start parameters, ignoring them");
        }
        let status = self.table.start();
        self.gate.started(status)
    }

    fn stop(&mut self) -> Result<()> {
        let _span = self.gate.span().clone().entered();
        let status = self.table.stop();
        self.gate.stopped(status)
    }

    fn get_format(&mut self, format: &mut MetaData) -> Result<()> {
        let _span = self.gate.span().enter();
        self.table.get_format(self.translation, format)
    }

    fn read(&mut self, options: Option<&ReadOptions>) -> Result<Buffer> {
        let _span = self.gate.span().enter();
        self.gate.ensure_readable()?;
        let options = options.copied().unwrap_or_default();
        let table = &self.table;
        self.gate.read(|| table.read(options))
    }

    fn supports_nonblocking_read(&self) -> bool {
        self.table.supports_nonblocking_read()
    }
}

/// Presents a generation-2 extractor as a [`MediaExtractor`].
///
/// Dropping the bridge calls the plugin's `free` exactly once.
pub struct ExtractorBridgeV2 {
    table: OwnedExtractorV2,
    config: BridgeConfig,
    span: Span,
}

impl ExtractorBridgeV2 {
    pub(super) fn new(table: OwnedExtractorV2, config: BridgeConfig) -> Self {
        let span = if config.tracing.extractor_spans {
            observability::span_extractor(table.name(), ABI)
        } else {
            Span::none()
        };
        tracing::debug!(extractor = %table.name(), abi = ABI, "plugin extractor bridged");
        Self {
            table,
            config,
            span,
        }
    }

    fn raw(&self) -> &CMediaExtractorV2 {
        &self.table.0
    }
}

impl MediaExtractor for ExtractorBridgeV2 {
    fn count_tracks(&self) -> usize {
        self.table.count_tracks()
    }

    fn track(&self, index: usize) -> Result<Box<dyn MediaTrack + '_>> {
        let _span = self.span.enter();
        check_track_index(index, self.count_tracks())?;

        // SAFETY: `data` is live until Drop.
        let raw = unsafe { (self.raw().get_track)(self.raw().data, index) };
        if raw.is_null() {
            return Err(Error::ExtractionFailure(format!(
                "plugin could not create track {}",
                index
            )));
        }
        // SAFETY: The ABI requires get_track to return a table boxed by
        // CMediaTrackV2::into_raw, owned by us from here on.
        let table = OwnedTrackV2(unsafe { Box::from_raw(raw) });
        tracing::debug!(track = index, "track created");

        Ok(Box::new(TrackBridgeV2 {
            table,
            gate: TrackGate::new(self.table.name(), ABI, index, self.config.tracing),
            translation: self.config.translation,
            _extractor: PhantomData,
        }))
    }

    fn track_metadata(
        &self,
        meta: &mut MetaData,
        index: usize,
        flags: TrackMetaDataFlags,
    ) -> Result<()> {
        let _span = self.span.enter();
        check_track_index(index, self.count_tracks())?;
        fetch_format(self.config.translation, meta, |handle| {
            // SAFETY: `data` is live until Drop; the handle outlives the call.
            unsafe { (self.raw().get_track_metadata)(self.raw().data, handle, index, flags.bits()) }
        })
    }

    fn metadata(&self, meta: &mut MetaData) -> Result<()> {
        let _span = self.span.enter();
        fetch_format(self.config.translation, meta, |handle| {
            // SAFETY: `data` is live until Drop; the handle outlives the call.
            unsafe { (self.raw().get_metadata)(self.raw().data, handle) }
        })
    }

    fn name(&self) -> &str {
        self.table.name()
    }

    fn flags(&self) -> ExtractorFlags {
        match self.raw().flags {
            // SAFETY: `data` is live until Drop.
            Some(flags) => ExtractorFlags::from_bits_retain(unsafe { flags(self.raw().data) }),
            None => ExtractorFlags::all(),
        }
    }

    fn set_media_cas(&mut self, token: &[u8]) -> Result<()> {
        let _span = self.span.enter();
        let Some(set_media_cas) = self.raw().set_media_cas else {
            return Err(Error::NotSupported);
        };
        // SAFETY: `data` is live until Drop; `token` outlives the call.
        let status = unsafe { set_media_cas(self.raw().data, token.as_ptr(), token.len()) };
        Error::check(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::status;
    use crate::memory::MemoryType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static RELEASED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn release_vec(opaque: *mut c_void) {
        // SAFETY: opaque is the Box<Vec<u8>> leaked by `descriptor`.
        drop(unsafe { Box::from_raw(opaque as *mut Vec<u8>) });
        RELEASED.fetch_add(1, Ordering::SeqCst);
    }

    fn descriptor(bytes: Vec<u8>, range_offset: usize, range_length: usize) -> CMediaBufferV2 {
        let size = bytes.len();
        let boxed = Box::new(bytes);
        let data = boxed.as_ptr();
        CMediaBufferV2 {
            opaque: Box::into_raw(boxed) as *mut c_void,
            data,
            size,
            range_offset,
            range_length,
            time_us: 1_000,
            duration_us: 500,
            flags: BufferFlags::SYNC_FRAME.bits(),
            release: Some(release_vec),
        }
    }

    // Both cases share the RELEASED counter, so they run in one test.
    #[test]
    fn test_descriptor_conversion_and_release() {
        let before = RELEASED.load(Ordering::SeqCst);

        let buffer = unsafe { descriptor(vec![0, 1, 2, 3, 4], 1, 3).into_buffer() }.unwrap();
        assert_eq!(buffer.as_bytes(), &[1, 2, 3]);
        assert_eq!(buffer.time_us(), 1_000);
        assert_eq!(buffer.duration_us(), Some(500));
        assert_eq!(buffer.meta().find_int64(keys::TIME_US), Some(1_000));
        assert_eq!(buffer.meta().find_int64(keys::DURATION_US), Some(500));
        assert!(buffer.is_sync_frame());
        assert_eq!(buffer.memory().memory_type(), MemoryType::Plugin);

        let clone = buffer.clone();
        drop(buffer);
        assert_eq!(RELEASED.load(Ordering::SeqCst), before);
        drop(clone);
        assert_eq!(RELEASED.load(Ordering::SeqCst), before + 1);

        // A bad range is rejected and still released
        let result = unsafe { descriptor(vec![0; 4], 2, 8).into_buffer() };
        assert!(matches!(result, Err(Error::ExtractionFailure(_))));
        assert_eq!(RELEASED.load(Ordering::SeqCst), before + 2);
    }

    #[test]
    fn test_empty_descriptor() {
        let raw = CMediaBufferV2::default();
        assert!(!raw.is_filled());
        let buffer = unsafe { raw.into_buffer() }.unwrap();
        assert!(buffer.is_empty());
        // Unknown duration stays unset
        assert_eq!(buffer.duration_us(), None);
        assert!(!buffer.meta().contains(keys::DURATION_US));
    }

    #[test]
    fn test_fetch_format_assigns_on_plugin_failure() {
        let mut meta = MetaData::new();
        meta.set_int32("stale", 1);

        let result = fetch_format(TranslationPolicy::Lenient, &mut meta, |handle| {
            unsafe { (*handle).put_int32(c"sample-rate", 44100) };
            status::MALFORMED
        });

        assert_eq!(result.unwrap_err().status(), status::MALFORMED);
        assert_eq!(meta.find_int32("sample-rate"), Some(44100));
        assert!(!meta.contains("stale"));
    }

    #[test]
    fn test_fetch_format_status_wins_over_malformed() {
        let mut meta = MetaData::new();
        let write_null_key = |handle: *mut CFormatHandle| {
            let handle = unsafe { &*handle };
            unsafe { (handle.set_string)(handle.carrier, ptr::null(), c"x".as_ptr()) };
        };

        let result = fetch_format(TranslationPolicy::Lenient, &mut meta, |handle| {
            write_null_key(handle);
            status::OK
        });
        assert!(matches!(result, Err(Error::ExtractionFailure(_))));

        let result = fetch_format(TranslationPolicy::Lenient, &mut meta, |handle| {
            write_null_key(handle);
            status::BAD_VALUE
        });
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
