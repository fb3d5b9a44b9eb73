//! Generation-1 plugin ABI.
//!
//! Metadata and buffers cross the boundary as native objects erased to
//! `*mut c_void`: a `*mut MetaData` for metadata and a boxed [`Buffer`]
//! (see [`buffer_into_raw`]) for read results. Every call forwards to the
//! plugin with `data` as the first argument and passes its status through.

use super::BridgeConfig;
use super::gate::TrackGate;
use crate::buffer::Buffer;
use crate::error::{Error, Result, Status};
use crate::extractor::{ExtractorFlags, MediaExtractor, TrackMetaDataFlags, check_track_index};
use crate::metadata::MetaData;
use crate::observability;
use crate::read_options::ReadOptions;
use crate::track::MediaTrack;
use std::ffi::{CStr, c_char, c_void};
use std::marker::PhantomData;
use std::ptr;
use tracing::Span;

/// ABI generation number of [`CMediaExtractorV1`].
pub const EXTRACTOR_ABI_V1: u32 = 1;

const ABI: &str = "v1";

/// Track function table, generation 1.
///
/// This struct is `#[repr(C)]` for C ABI compatibility. Tables are handed
/// out by [`CMediaExtractorV1::get_track`] and owned by the bridge from
/// then on; `free(data)` is called exactly once when the bridge is dropped.
#[repr(C)]
pub struct CMediaTrackV1 {
    /// Plugin state passed as the first argument of every call.
    pub data: *mut c_void,
    /// Release `data`.
    pub free: unsafe extern "C" fn(*mut c_void),
    /// Start the track. The second argument is a `*const MetaData` or null.
    pub start: unsafe extern "C" fn(*mut c_void, *const c_void) -> Status,
    /// Stop the track.
    pub stop: unsafe extern "C" fn(*mut c_void) -> Status,
    /// Fill the `*mut MetaData` with the track format.
    pub get_format: unsafe extern "C" fn(*mut c_void, *mut c_void) -> Status,
    /// Read one buffer into the out pointer (see [`buffer_into_raw`]).
    pub read: unsafe extern "C" fn(*mut c_void, *mut *mut c_void, ReadOptions) -> Status,
    /// Whether non-blocking reads are supported. Absent means no.
    pub supports_nonblocking_read: Option<unsafe extern "C" fn(*mut c_void) -> bool>,
}

impl CMediaTrackV1 {
    /// Move the table to the heap and hand out ownership.
    ///
    /// This is what `get_track` must return.
    pub fn into_raw(self) -> *mut CMediaTrackV1 {
        Box::into_raw(Box::new(self))
    }
}

/// Extractor function table, generation 1.
///
/// This struct is `#[repr(C)]` for C ABI compatibility.
#[repr(C)]
pub struct CMediaExtractorV1 {
    /// Plugin state passed as the first argument of every call.
    pub data: *mut c_void,
    /// Release `data`.
    pub free: unsafe extern "C" fn(*mut c_void),
    /// Number of tracks.
    pub count_tracks: unsafe extern "C" fn(*mut c_void) -> usize,
    /// Create track `index`, transferring ownership of the returned table
    /// (see [`CMediaTrackV1::into_raw`]). Null on failure.
    pub get_track: unsafe extern "C" fn(*mut c_void, usize) -> *mut CMediaTrackV1,
    /// Fill the `*mut MetaData` with the metadata of track `index`.
    pub get_track_metadata: unsafe extern "C" fn(*mut c_void, *mut c_void, usize, u32) -> Status,
    /// Fill the `*mut MetaData` with container metadata.
    pub get_metadata: unsafe extern "C" fn(*mut c_void, *mut c_void) -> Status,
    /// Null-terminated name, valid while `data` is alive.
    pub name: unsafe extern "C" fn(*mut c_void) -> *const c_char,
    /// Capability bits. Absent means all capabilities.
    pub flags: Option<unsafe extern "C" fn(*mut c_void) -> u32>,
    /// Install a conditional-access token. Absent means unsupported.
    pub set_media_cas: Option<unsafe extern "C" fn(*mut c_void, *const u8, usize) -> Status>,
}

impl CMediaExtractorV1 {
    /// Move the table to the heap and hand out ownership.
    pub fn into_raw(self) -> *mut CMediaExtractorV1 {
        Box::into_raw(Box::new(self))
    }
}

// ============================================================================
// Object erasure helpers
// ============================================================================

/// Erase a buffer for the `read` out pointer.
///
/// Ownership passes to whoever calls [`buffer_from_raw`].
pub fn buffer_into_raw(buffer: Buffer) -> *mut c_void {
    Box::into_raw(Box::new(buffer)) as *mut c_void
}

/// Reclaim a buffer erased by [`buffer_into_raw`].
///
/// # Safety
///
/// `ptr` must come from [`buffer_into_raw`] and not have been reclaimed.
pub unsafe fn buffer_from_raw(ptr: *mut c_void) -> Buffer {
    // SAFETY: Caller guarantees ptr came from buffer_into_raw.
    *unsafe { Box::from_raw(ptr as *mut Buffer) }
}

/// View the metadata argument of `get_format`, `get_metadata` or
/// `get_track_metadata`.
///
/// # Safety
///
/// `ptr` must be null or the pointer the bridge passed for this call.
pub unsafe fn metadata_from_raw<'a>(ptr: *mut c_void) -> Option<&'a mut MetaData> {
    // SAFETY: Caller guarantees ptr is null or a live, unaliased MetaData.
    unsafe { (ptr as *mut MetaData).as_mut() }
}

/// View the parameter argument of `start`.
///
/// # Safety
///
/// `ptr` must be null or the pointer the bridge passed for this call.
pub unsafe fn params_from_raw<'a>(ptr: *const c_void) -> Option<&'a MetaData> {
    // SAFETY: Caller guarantees ptr is null or a live MetaData.
    unsafe { (ptr as *const MetaData).as_ref() }
}

fn metadata_as_raw(meta: &mut MetaData) -> *mut c_void {
    meta as *mut MetaData as *mut c_void
}

// ============================================================================
// Owned tables
// ============================================================================

/// A track table owned by the bridge.
struct OwnedTrackV1(Box<CMediaTrackV1>);

// SAFETY: The ABI requires track state to be usable from whichever single
// thread currently owns it. The bridge is not `Sync`.
unsafe impl Send for OwnedTrackV1 {}

impl OwnedTrackV1 {
    fn start(&self, params: Option<&MetaData>) -> Status {
        let params = params.map_or(ptr::null(), |p| p as *const MetaData as *const c_void);
        // SAFETY: `data` is live until Drop; `params` outlives the call.
        unsafe { (self.0.start)(self.0.data, params) }
    }

    fn stop(&self) -> Status {
        // SAFETY: `data` is live until Drop.
        unsafe { (self.0.stop)(self.0.data) }
    }

    fn get_format(&self, format: &mut MetaData) -> Status {
        // SAFETY: `data` is live until Drop; `format` outlives the call.
        unsafe { (self.0.get_format)(self.0.data, metadata_as_raw(format)) }
    }

    fn read(&self, options: ReadOptions) -> Result<Buffer> {
        let mut out: *mut c_void = ptr::null_mut();
        // SAFETY: `data` is live until Drop; `out` outlives the call.
        let status = unsafe { (self.0.read)(self.0.data, &mut out, options) };
        // Reclaim whatever the plugin handed over, even on failure.
        let buffer = if out.is_null() {
            None
        } else {
            // SAFETY: The ABI requires `out` to come from buffer_into_raw.
            Some(unsafe { buffer_from_raw(out) })
        };
        Error::check(status)?;
        buffer.ok_or_else(|| {
            Error::ExtractionFailure("plugin reported success without a buffer".into())
        })
    }

    fn supports_nonblocking_read(&self) -> bool {
        match self.0.supports_nonblocking_read {
            // SAFETY: `data` is live until Drop.
            Some(supports) => unsafe { supports(self.0.data) },
            None => false,
        }
    }
}

impl Drop for OwnedTrackV1 {
    fn drop(&mut self) {
        // SAFETY: Called once; the table box is dropped right after.
        unsafe { (self.0.free)(self.0.data) };
    }
}

/// An extractor table owned by a [`PluginHandle`](super::PluginHandle) or
/// a bridge.
pub(super) struct OwnedExtractorV1(Box<CMediaExtractorV1>);

// SAFETY: See OwnedTrackV1.
unsafe impl Send for OwnedExtractorV1 {}

impl OwnedExtractorV1 {
    /// # Safety
    ///
    /// `table` must come from [`CMediaExtractorV1::into_raw`] and satisfy
    /// the table contract.
    pub(super) unsafe fn from_raw(table: *mut CMediaExtractorV1) -> Option<Self> {
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

impl Drop for OwnedExtractorV1 {
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

/// Presents a generation-1 track as a [`MediaTrack`].
pub struct TrackBridgeV1<'a> {
    table: OwnedTrackV1,
    gate: TrackGate,
    _extractor: PhantomData<&'a ()>,
}

impl MediaTrack for TrackBridgeV1<'_> {
    fn start(&mut self, params: Option<&MetaData>) -> Result<()> {
        let _span = self.gate.span().clone().entered();
        let status = self.table.start(params);
        self.gate.started(status)
    }

    fn stop(&mut self) -> Result<()> {
        let _span = self.gate.span().clone().entered();
        let status = self.table.stop();
        self.gate.stopped(status)
    }

    fn get_format(&mut self, format: &mut MetaData) -> Result<()> {
        let _span = self.gate.span().enter();
        Error::check(self.table.get_format(format))
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

/// Presents a generation-1 extractor as a [`MediaExtractor`].
///
/// Dropping the bridge calls the plugin's `free` exactly once.
pub struct ExtractorBridgeV1 {
    table: OwnedExtractorV1,
    config: BridgeConfig,
    span: Span,
}

impl ExtractorBridgeV1 {
    pub(super) fn new(table: OwnedExtractorV1, config: BridgeConfig) -> Self {
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

    fn raw(&self) -> &CMediaExtractorV1 {
        &self.table.0
    }
}

impl MediaExtractor for ExtractorBridgeV1 {
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
        // CMediaTrackV1::into_raw, owned by us from here on.
        let table = OwnedTrackV1(unsafe { Box::from_raw(raw) });
        tracing::debug!(track = index, "track created");

        Ok(Box::new(TrackBridgeV1 {
            table,
            gate: TrackGate::new(self.table.name(), ABI, index, self.config.tracing),
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
        // SAFETY: `data` is live until Drop; `meta` outlives the call.
        let status = unsafe {
            (self.raw().get_track_metadata)(self.raw().data, metadata_as_raw(meta), index, flags.bits())
        };
        Error::check(status)
    }

    fn metadata(&self, meta: &mut MetaData) -> Result<()> {
        let _span = self.span.enter();
        // SAFETY: `data` is live until Drop; `meta` outlives the call.
        let status = unsafe { (self.raw().get_metadata)(self.raw().data, metadata_as_raw(meta)) };
        Error::check(status)
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

    #[test]
    fn test_buffer_erasure() {
        let mut buffer = Buffer::from_vec(vec![1, 2, 3]);
        buffer.set_time_us(42);

        let raw = buffer_into_raw(buffer);
        let buffer = unsafe { buffer_from_raw(raw) };
        assert_eq!(buffer.as_bytes(), &[1, 2, 3]);
        assert_eq!(buffer.time_us(), 42);
    }

    #[test]
    fn test_metadata_views() {
        let mut meta = MetaData::new();
        let raw = metadata_as_raw(&mut meta);
        unsafe { metadata_from_raw(raw) }
            .unwrap()
            .set_int32("channel-count", 2);
        assert_eq!(meta.find_int32("channel-count"), Some(2));

        assert!(unsafe { metadata_from_raw(ptr::null_mut()) }.is_none());
        assert!(unsafe { params_from_raw(ptr::null()) }.is_none());
    }

    unsafe extern "C" fn noop_free(_: *mut c_void) {}

    unsafe extern "C" fn start_with_params(_: *mut c_void, params: *const c_void) -> Status {
        match unsafe { params_from_raw(params) } {
            Some(meta) if meta.find_int64("start-time") == Some(5) => status::OK,
            Some(_) => status::BAD_VALUE,
            None => status::NO_INIT,
        }
    }

    unsafe extern "C" fn stop_ok(_: *mut c_void) -> Status {
        status::OK
    }

    unsafe extern "C" fn format_unsupported(_: *mut c_void, _: *mut c_void) -> Status {
        status::UNSUPPORTED
    }

    unsafe extern "C" fn read_without_buffer(
        _: *mut c_void,
        _: *mut *mut c_void,
        _: ReadOptions,
    ) -> Status {
        status::OK
    }

    fn table() -> OwnedTrackV1 {
        OwnedTrackV1(Box::new(CMediaTrackV1 {
            data: ptr::null_mut(),
            free: noop_free,
            start: start_with_params,
            stop: stop_ok,
            get_format: format_unsupported,
            read: read_without_buffer,
            supports_nonblocking_read: None,
        }))
    }

    #[test]
    fn test_start_params_reach_plugin() {
        let table = table();
        let mut params = MetaData::new();
        params.set_int64("start-time", 5);

        assert_eq!(table.start(Some(&params)), status::OK);
        assert_eq!(table.start(None), status::NO_INIT);
    }

    #[test]
    fn test_success_without_buffer_is_a_failure() {
        let table = table();
        assert!(matches!(
            table.read(ReadOptions::new()),
            Err(Error::ExtractionFailure(_))
        ));
        assert!(!table.supports_nonblocking_read());

        let mut format = MetaData::new();
        assert_eq!(table.get_format(&mut format), status::UNSUPPORTED);
    }
}
