//! Stub plugins of both ABI generations.
//!
//! Each stub serves the same container: `tracks` audio tracks with format
//! `{mime: audio/test, sample-rate: 48000, channel-count: 2}` and a short
//! list of samples. Every entry point the tests care about is counted.

#![allow(dead_code)]

use extractor_bridge::buffer::{Buffer, BufferFlags};
use extractor_bridge::error::{Status, status};
use extractor_bridge::format::CFormatHandle;
use extractor_bridge::metadata::{MetaData, keys};
use extractor_bridge::plugin::{
    CMediaBufferV2, CMediaExtractorV1, CMediaExtractorV2, CMediaTrackV1, CMediaTrackV2,
    PluginHandle, buffer_into_raw, metadata_from_raw,
};
use extractor_bridge::read_options::ReadOptions;
use std::ffi::{CString, c_char, c_void};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const MIME: &str = "audio/test";
pub const SAMPLE_RATE: i32 = 48000;
pub const CHANNEL_COUNT: i32 = 2;
pub const CONTAINER_MIME: &str = "audio/x-stub";
pub const DURATION_US: i64 = 40_000;
pub const SAMPLE_DURATION_US: i64 = 20_000;

/// What a stub plugin serves.
#[derive(Debug, Clone)]
pub struct StubSpec {
    pub name: &'static str,
    pub tracks: usize,
    pub samples: Vec<(i64, Vec<u8>)>,
    /// Capability bits; `None` leaves the entry point out of the table.
    pub flags: Option<u32>,
    /// Whether the table has a `set_media_cas` entry point.
    pub cas: bool,
    /// Whether tracks support non-blocking reads. The first non-blocking
    /// read then reports `WOULD_BLOCK`.
    pub nonblocking: bool,
    /// Status returned by container-level `get_metadata`.
    pub metadata_status: Status,
    /// Status returned by `get_track_metadata`.
    pub track_metadata_status: Status,
    /// Generation 2: add a process-local pointer to the track format.
    pub vendor_pointer: bool,
    /// Generation 2: write a value with a null key into the track format.
    pub malformed_format: bool,
    /// `get_track` returns null.
    pub null_track: bool,
    /// `read` reports success without handing out a buffer.
    pub read_without_buffer: bool,
    /// `read` hands out a buffer and then reports this status.
    pub read_failure: Option<Status>,
}

impl Default for StubSpec {
    fn default() -> Self {
        Self {
            name: "stub",
            tracks: 1,
            samples: vec![(0, vec![1, 2, 3]), (20_000, vec![4, 5]), (40_000, vec![6])],
            flags: None,
            cas: false,
            nonblocking: false,
            metadata_status: status::OK,
            track_metadata_status: status::OK,
            vendor_pointer: false,
            malformed_format: false,
            null_track: false,
            read_without_buffer: false,
            read_failure: None,
        }
    }
}

/// Entry point invocation counts, shared between a stub and its test.
#[derive(Debug, Default)]
pub struct Counters {
    pub extractor_frees: AtomicUsize,
    pub track_frees: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub reads: AtomicUsize,
    pub releases: AtomicUsize,
    pub seeks: Mutex<Vec<i64>>,
    pub cas_token: Mutex<Option<Vec<u8>>>,
}

impl Counters {
    pub fn extractor_frees(&self) -> usize {
        self.extractor_frees.load(Ordering::SeqCst)
    }

    pub fn track_frees(&self) -> usize {
        self.track_frees.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn seeks(&self) -> Vec<i64> {
        self.seeks.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn cas_token(&self) -> Option<Vec<u8>> {
        self.cas_token.lock().ok().and_then(|t| t.clone())
    }
}

/// Generation-1 stub extractor.
pub fn stub_v1(spec: StubSpec) -> (PluginHandle, Arc<Counters>) {
    let (data, counters) = extractor_state(&spec);
    let table = CMediaExtractorV1 {
        data,
        free: extractor_free,
        count_tracks,
        get_track: v1_get_track,
        get_track_metadata: v1_get_track_metadata,
        get_metadata: v1_get_metadata,
        name: extractor_name,
        flags: spec.flags.map(|_| extractor_flags as FlagsFn),
        set_media_cas: spec.cas.then_some(set_media_cas as CasFn),
    };
    let handle = unsafe { PluginHandle::from_raw_v1(table.into_raw()) };
    (handle.expect("non-null table"), counters)
}

/// Generation-2 stub extractor.
pub fn stub_v2(spec: StubSpec) -> (PluginHandle, Arc<Counters>) {
    let (data, counters) = extractor_state(&spec);
    let table = CMediaExtractorV2 {
        data,
        free: extractor_free,
        count_tracks,
        get_track: v2_get_track,
        get_track_metadata: v2_get_track_metadata,
        get_metadata: v2_get_metadata,
        name: extractor_name,
        flags: spec.flags.map(|_| extractor_flags as FlagsFn),
        set_media_cas: spec.cas.then_some(set_media_cas as CasFn),
    };
    let handle = unsafe { PluginHandle::from_raw_v2(table.into_raw()) };
    (handle.expect("non-null table"), counters)
}

/// The reference track format, built natively.
pub fn reference_format() -> MetaData {
    let mut meta = MetaData::new();
    fill_format(&mut meta);
    meta
}

// ============================================================================
// Shared state
// ============================================================================

type FlagsFn = unsafe extern "C" fn(*mut c_void) -> u32;
type CasFn = unsafe extern "C" fn(*mut c_void, *const u8, usize) -> Status;

struct ExtractorState {
    spec: StubSpec,
    name: CString,
    counters: Arc<Counters>,
}

struct TrackData {
    samples: Vec<(i64, Vec<u8>)>,
    next: usize,
    nonblocking: bool,
    blocked: bool,
    vendor_pointer: bool,
    malformed_format: bool,
    read_without_buffer: bool,
    read_failure: Option<Status>,
    counters: Arc<Counters>,
}

/// Plugin memory lent out through a generation-2 buffer.
struct Lent {
    bytes: Vec<u8>,
    counters: Arc<Counters>,
}

fn extractor_state(spec: &StubSpec) -> (*mut c_void, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let state = ExtractorState {
        spec: spec.clone(),
        name: CString::new(spec.name).expect("name without interior nul"),
        counters: Arc::clone(&counters),
    };
    (Box::into_raw(Box::new(state)) as *mut c_void, counters)
}

unsafe fn state<'a, T>(data: *mut c_void) -> &'a mut T {
    unsafe { &mut *(data as *mut T) }
}

fn new_track(state: &ExtractorState) -> *mut c_void {
    let track = TrackData {
        samples: state.spec.samples.clone(),
        next: 0,
        nonblocking: state.spec.nonblocking,
        blocked: false,
        vendor_pointer: state.spec.vendor_pointer,
        malformed_format: state.spec.malformed_format,
        read_without_buffer: state.spec.read_without_buffer,
        read_failure: state.spec.read_failure,
        counters: Arc::clone(&state.counters),
    };
    Box::into_raw(Box::new(track)) as *mut c_void
}

fn fill_format(meta: &mut MetaData) {
    meta.set_string(keys::MIME, MIME);
    meta.set_int32(keys::SAMPLE_RATE, SAMPLE_RATE);
    meta.set_int32(keys::CHANNEL_COUNT, CHANNEL_COUNT);
}

/// Status a read reports once it has a sample to hand out.
fn filled_status(track: &TrackData) -> Status {
    track.read_failure.unwrap_or(status::OK)
}

fn sample_flags(time_us: i64) -> BufferFlags {
    if time_us == 0 {
        BufferFlags::SYNC_FRAME
    } else {
        BufferFlags::empty()
    }
}

/// Next sample for a read, honoring seek and non-blocking options.
fn next_sample(track: &mut TrackData, options: ReadOptions) -> Result<(i64, Vec<u8>), Status> {
    track.counters.reads.fetch_add(1, Ordering::SeqCst);
    if let Some((time_us, _mode)) = options.seek_to() {
        if let Ok(mut seeks) = track.counters.seeks.lock() {
            seeks.push(time_us);
        }
        track.next = track
            .samples
            .iter()
            .position(|(t, _)| *t >= time_us)
            .unwrap_or(track.samples.len());
    }
    if options.non_blocking() && track.nonblocking && !track.blocked {
        track.blocked = true;
        return Err(status::WOULD_BLOCK);
    }
    match track.samples.get(track.next) {
        Some(sample) => {
            track.next += 1;
            Ok(sample.clone())
        }
        None => Err(status::END_OF_STREAM),
    }
}

// ============================================================================
// Entry points shared by both generations
// ============================================================================

unsafe extern "C" fn extractor_free(data: *mut c_void) {
    let state = unsafe { Box::from_raw(data as *mut ExtractorState) };
    state.counters.extractor_frees.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn count_tracks(data: *mut c_void) -> usize {
    unsafe { state::<ExtractorState>(data) }.spec.tracks
}

unsafe extern "C" fn extractor_name(data: *mut c_void) -> *const c_char {
    unsafe { state::<ExtractorState>(data) }.name.as_ptr()
}

unsafe extern "C" fn extractor_flags(data: *mut c_void) -> u32 {
    unsafe { state::<ExtractorState>(data) }.spec.flags.unwrap_or(0)
}

unsafe extern "C" fn set_media_cas(data: *mut c_void, token: *const u8, len: usize) -> Status {
    let state = unsafe { state::<ExtractorState>(data) };
    let token = if len == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(token, len) }.to_vec()
    };
    if let Ok(mut slot) = state.counters.cas_token.lock() {
        *slot = Some(token);
    }
    status::OK
}

unsafe extern "C" fn track_free(data: *mut c_void) {
    let track = unsafe { Box::from_raw(data as *mut TrackData) };
    track.counters.track_frees.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn track_stop(data: *mut c_void) -> Status {
    let track = unsafe { state::<TrackData>(data) };
    track.counters.stops.fetch_add(1, Ordering::SeqCst);
    status::OK
}

unsafe extern "C" fn track_supports_nonblocking(data: *mut c_void) -> bool {
    unsafe { state::<TrackData>(data) }.nonblocking
}

// ============================================================================
// Generation 1
// ============================================================================

unsafe extern "C" fn v1_get_track(data: *mut c_void, _index: usize) -> *mut CMediaTrackV1 {
    let state = unsafe { state::<ExtractorState>(data) };
    if state.spec.null_track {
        return ptr::null_mut();
    }
    CMediaTrackV1 {
        data: new_track(state),
        free: track_free,
        start: v1_start,
        stop: track_stop,
        get_format: v1_get_format,
        read: v1_read,
        supports_nonblocking_read: Some(track_supports_nonblocking),
    }
    .into_raw()
}

unsafe extern "C" fn v1_get_track_metadata(
    data: *mut c_void,
    meta: *mut c_void,
    _index: usize,
    flags: u32,
) -> Status {
    let Some(meta) = (unsafe { metadata_from_raw(meta) }) else {
        return status::BAD_VALUE;
    };
    fill_format(meta);
    if flags & 1 != 0 {
        meta.set_int64(keys::DURATION_US, DURATION_US);
    }
    unsafe { state::<ExtractorState>(data) }.spec.track_metadata_status
}

unsafe extern "C" fn v1_get_metadata(data: *mut c_void, meta: *mut c_void) -> Status {
    let state = unsafe { state::<ExtractorState>(data) };
    let Some(meta) = (unsafe { metadata_from_raw(meta) }) else {
        return status::BAD_VALUE;
    };
    meta.set_string(keys::MIME, CONTAINER_MIME);
    state.spec.metadata_status
}

unsafe extern "C" fn v1_start(data: *mut c_void, _params: *const c_void) -> Status {
    let track = unsafe { state::<TrackData>(data) };
    track.counters.starts.fetch_add(1, Ordering::SeqCst);
    status::OK
}

unsafe extern "C" fn v1_get_format(_data: *mut c_void, meta: *mut c_void) -> Status {
    match unsafe { metadata_from_raw(meta) } {
        Some(meta) => {
            fill_format(meta);
            status::OK
        }
        None => status::BAD_VALUE,
    }
}

unsafe extern "C" fn v1_read(data: *mut c_void, out: *mut *mut c_void, options: ReadOptions) -> Status {
    let track = unsafe { state::<TrackData>(data) };
    match next_sample(track, options) {
        Ok(_) if track.read_without_buffer => status::OK,
        Ok((time_us, bytes)) => {
            let mut buffer = Buffer::from_vec(bytes);
            buffer.set_time_us(time_us);
            buffer.set_duration_us(Some(SAMPLE_DURATION_US));
            buffer.set_flags(sample_flags(time_us));
            buffer.meta_mut().set_int64(keys::TIME_US, time_us);
            buffer.meta_mut().set_int64(keys::DURATION_US, SAMPLE_DURATION_US);
            unsafe { *out = buffer_into_raw(buffer) };
            filled_status(track)
        }
        Err(code) => code,
    }
}

// ============================================================================
// Generation 2
// ============================================================================

unsafe fn write_format(handle: *mut CFormatHandle) {
    let handle = unsafe { &*handle };
    unsafe {
        handle.put_string(c"mime", c"audio/test");
        handle.put_int32(c"sample-rate", SAMPLE_RATE);
        handle.put_int32(c"channel-count", CHANNEL_COUNT);
    }
}

unsafe extern "C" fn v2_get_track(data: *mut c_void, _index: usize) -> *mut CMediaTrackV2 {
    let state = unsafe { state::<ExtractorState>(data) };
    if state.spec.null_track {
        return ptr::null_mut();
    }
    CMediaTrackV2 {
        data: new_track(state),
        free: track_free,
        start: v2_start,
        stop: track_stop,
        get_format: v2_get_format,
        read: v2_read,
        supports_nonblocking_read: Some(track_supports_nonblocking),
    }
    .into_raw()
}

unsafe extern "C" fn v2_get_track_metadata(
    data: *mut c_void,
    handle: *mut CFormatHandle,
    _index: usize,
    flags: u32,
) -> Status {
    unsafe { write_format(handle) };
    if flags & 1 != 0 {
        unsafe { (*handle).put_int64(c"durationUs", DURATION_US) };
    }
    unsafe { state::<ExtractorState>(data) }.spec.track_metadata_status
}

unsafe extern "C" fn v2_get_metadata(data: *mut c_void, handle: *mut CFormatHandle) -> Status {
    let state = unsafe { state::<ExtractorState>(data) };
    unsafe { (*handle).put_string(c"mime", c"audio/x-stub") };
    state.spec.metadata_status
}

unsafe extern "C" fn v2_start(data: *mut c_void) -> Status {
    let track = unsafe { state::<TrackData>(data) };
    track.counters.starts.fetch_add(1, Ordering::SeqCst);
    status::OK
}

unsafe extern "C" fn v2_get_format(data: *mut c_void, handle: *mut CFormatHandle) -> Status {
    let track = unsafe { state::<TrackData>(data) };
    unsafe { write_format(handle) };
    let handle = unsafe { &*handle };
    if track.vendor_pointer {
        unsafe { (handle.set_pointer)(handle.carrier, c"vendor.context".as_ptr(), data) };
    }
    if track.malformed_format {
        unsafe { (handle.set_int32)(handle.carrier, ptr::null(), 1) };
    }
    status::OK
}

unsafe extern "C" fn release_lent(opaque: *mut c_void) {
    let lent = unsafe { Box::from_raw(opaque as *mut Lent) };
    lent.counters.releases.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn v2_read(
    data: *mut c_void,
    out: *mut CMediaBufferV2,
    options: ReadOptions,
) -> Status {
    let track = unsafe { state::<TrackData>(data) };
    match next_sample(track, options) {
        Ok(_) if track.read_without_buffer => status::OK,
        Ok((time_us, bytes)) => {
            let lent = Box::new(Lent {
                bytes,
                counters: Arc::clone(&track.counters),
            });
            let out = unsafe { &mut *out };
            out.data = lent.bytes.as_ptr();
            out.size = lent.bytes.len();
            out.range_offset = 0;
            out.range_length = lent.bytes.len();
            out.time_us = time_us;
            out.duration_us = SAMPLE_DURATION_US;
            out.flags = sample_flags(time_us).bits();
            out.release = Some(release_lent);
            out.opaque = Box::into_raw(lent) as *mut c_void;
            filled_status(track)
        }
        Err(code) => code,
    }
}
