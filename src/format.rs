//! Format carrier and the opaque format handle used by generation-2 plugins.
//!
//! Generation-2 plugins never see [`MetaData`](crate::metadata::MetaData).
//! They describe formats by calling setters through a [`CFormatHandle`],
//! a small C-compatible function table bound to a [`FormatCarrier`]. The
//! carrier accumulates whatever the plugin wrote; the
//! [translator](crate::translate) then turns it into native metadata.
//!
//! # Protocol
//!
//! ```text
//! FormatSession::new()        carrier + handle bound to it
//!        │
//!        ▼
//! plugin(data, handle)        plugin calls handle->set_*(carrier, key, ...)
//!        │
//!        ▼
//! translate(session.carrier()) → MetaData
//!        │
//!        ▼
//! drop(session)               handle and carrier released
//! ```

use crate::metadata::Rect;
use std::ffi::{CStr, c_char, c_void};

/// Version of the [`CFormatHandle`] layout.
pub const FORMAT_HANDLE_VERSION: u32 = 1;

/// A value written into a carrier.
///
/// The carrier accepts more kinds than native metadata can represent;
/// the translator drops the ones it cannot convert.
#[derive(Debug, Clone, PartialEq)]
pub enum CarrierValue {
    /// 32-bit integer.
    Int32(i32),
    /// 64-bit integer.
    Int64(i64),
    /// Platform size value.
    Size(usize),
    /// Single-precision float.
    Float(f32),
    /// Double-precision float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Byte blob.
    Buffer(Vec<u8>),
    /// Rectangle.
    Rect(Rect),
    /// Nested message.
    Message(FormatCarrier),
    /// Process-local pointer, meaningless outside the plugin.
    Pointer(usize),
}

impl CarrierValue {
    /// Short name of the value's kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            CarrierValue::Int32(_) => "int32",
            CarrierValue::Int64(_) => "int64",
            CarrierValue::Size(_) => "size",
            CarrierValue::Float(_) => "float",
            CarrierValue::Double(_) => "double",
            CarrierValue::String(_) => "string",
            CarrierValue::Buffer(_) => "buffer",
            CarrierValue::Rect(_) => "rect",
            CarrierValue::Message(_) => "message",
            CarrierValue::Pointer(_) => "pointer",
        }
    }
}

/// Key/value pairs accumulated from a plugin's format writes.
///
/// Besides the values, the carrier records malformed writes (null or
/// non-UTF-8 keys, null or non-UTF-8 strings) so the conversion step can
/// report them instead of guessing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatCarrier {
    entries: Vec<(String, CarrierValue)>,
    malformed: Vec<String>,
}

impl FormatCarrier {
    /// Create an empty carrier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous value for the key.
    pub fn set(&mut self, key: impl Into<String>, value: CarrierValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Set a 32-bit integer.
    pub fn set_int32(&mut self, key: impl Into<String>, value: i32) {
        self.set(key, CarrierValue::Int32(value));
    }

    /// Set a 64-bit integer.
    pub fn set_int64(&mut self, key: impl Into<String>, value: i64) {
        self.set(key, CarrierValue::Int64(value));
    }

    /// Set a string.
    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set(key, CarrierValue::String(value.into()));
    }

    /// Set a byte blob.
    pub fn set_buffer(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.set(key, CarrierValue::Buffer(value.into()));
    }

    /// Set a nested message.
    pub fn set_message(&mut self, key: impl Into<String>, value: FormatCarrier) {
        self.set(key, CarrierValue::Message(value));
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&CarrierValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterate over entries in write order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CarrierValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptions of malformed writes, in order.
    pub fn malformed(&self) -> &[String] {
        &self.malformed
    }

    /// Record a malformed write.
    pub fn record_malformed(&mut self, what: impl Into<String>) {
        self.malformed.push(what.into());
    }
}

/// Opaque format handle passed to generation-2 plugins.
///
/// This struct is `#[repr(C)]` for C ABI compatibility. A plugin writes a
/// value with e.g. `(handle.set_int32)(handle.carrier, key, value)`; keys
/// and strings are null-terminated UTF-8 and copied before the setter
/// returns. The handle is only valid for the duration of the plugin call
/// it was passed to.
#[repr(C)]
pub struct CFormatHandle {
    /// Layout version, [`FORMAT_HANDLE_VERSION`].
    pub version: u32,
    /// Opaque carrier the setters write into.
    pub carrier: *mut c_void,
    /// Write a 32-bit integer.
    pub set_int32: unsafe extern "C" fn(*mut c_void, *const c_char, i32),
    /// Write a 64-bit integer.
    pub set_int64: unsafe extern "C" fn(*mut c_void, *const c_char, i64),
    /// Write a size value.
    pub set_size: unsafe extern "C" fn(*mut c_void, *const c_char, usize),
    /// Write a float.
    pub set_float: unsafe extern "C" fn(*mut c_void, *const c_char, f32),
    /// Write a double.
    pub set_double: unsafe extern "C" fn(*mut c_void, *const c_char, f64),
    /// Write a null-terminated string.
    pub set_string: unsafe extern "C" fn(*mut c_void, *const c_char, *const c_char),
    /// Write a byte blob of the given length.
    pub set_buffer: unsafe extern "C" fn(*mut c_void, *const c_char, *const u8, usize),
    /// Write a rectangle (left, top, right, bottom).
    pub set_rect: unsafe extern "C" fn(*mut c_void, *const c_char, i32, i32, i32, i32),
    /// Write a process-local pointer.
    pub set_pointer: unsafe extern "C" fn(*mut c_void, *const c_char, *mut c_void),
}

impl CFormatHandle {
    fn bind(carrier: *mut FormatCarrier) -> Self {
        Self {
            version: FORMAT_HANDLE_VERSION,
            carrier: carrier as *mut c_void,
            set_int32: carrier_set_int32,
            set_int64: carrier_set_int64,
            set_size: carrier_set_size,
            set_float: carrier_set_float,
            set_double: carrier_set_double,
            set_string: carrier_set_string,
            set_buffer: carrier_set_buffer,
            set_rect: carrier_set_rect,
            set_pointer: carrier_set_pointer,
        }
    }

    /// Write a 32-bit integer through the handle.
    ///
    /// Convenience for plugins written in Rust.
    ///
    /// # Safety
    ///
    /// The handle must be one passed in by the bridge for the current call.
    pub unsafe fn put_int32(&self, key: &CStr, value: i32) {
        // SAFETY: Caller guarantees the handle is live.
        unsafe { (self.set_int32)(self.carrier, key.as_ptr(), value) }
    }

    /// Write a 64-bit integer through the handle.
    ///
    /// # Safety
    ///
    /// The handle must be one passed in by the bridge for the current call.
    pub unsafe fn put_int64(&self, key: &CStr, value: i64) {
        // SAFETY: Caller guarantees the handle is live.
        unsafe { (self.set_int64)(self.carrier, key.as_ptr(), value) }
    }

    /// Write a string through the handle.
    ///
    /// # Safety
    ///
    /// The handle must be one passed in by the bridge for the current call.
    pub unsafe fn put_string(&self, key: &CStr, value: &CStr) {
        // SAFETY: Caller guarantees the handle is live.
        unsafe { (self.set_string)(self.carrier, key.as_ptr(), value.as_ptr()) }
    }

    /// Write a byte blob through the handle.
    ///
    /// # Safety
    ///
    /// The handle must be one passed in by the bridge for the current call.
    pub unsafe fn put_buffer(&self, key: &CStr, value: &[u8]) {
        // SAFETY: Caller guarantees the handle is live.
        unsafe { (self.set_buffer)(self.carrier, key.as_ptr(), value.as_ptr(), value.len()) }
    }
}

/// A carrier with a handle bound to it, for the duration of one plugin call.
///
/// Dropping the session releases both the handle and the carrier, on every
/// exit path.
pub struct FormatSession {
    /// Owned; reclaimed in `Drop`. Kept as a raw pointer because the
    /// handle aliases it while the plugin runs.
    carrier: *mut FormatCarrier,
    handle: Box<CFormatHandle>,
}

impl FormatSession {
    /// Allocate an empty carrier and bind a fresh handle to it.
    pub fn new() -> Self {
        let carrier = Box::into_raw(Box::new(FormatCarrier::new()));
        Self {
            carrier,
            handle: Box::new(CFormatHandle::bind(carrier)),
        }
    }

    /// Pointer to pass to the plugin.
    pub fn handle(&mut self) -> *mut CFormatHandle {
        &mut *self.handle
    }

    /// What the plugin wrote so far.
    pub fn carrier(&self) -> &FormatCarrier {
        // SAFETY: `carrier` came from `Box::into_raw` in `new` and is only
        // freed in `Drop`. No plugin call is in flight while `&self` is held.
        unsafe { &*self.carrier }
    }
}

impl Default for FormatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FormatSession {
    fn drop(&mut self) {
        // SAFETY: Allocated by `Box::into_raw` in `new`, freed only here.
        unsafe { drop(Box::from_raw(self.carrier)) };
    }
}

impl std::fmt::Debug for FormatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatSession")
            .field("carrier", self.carrier())
            .finish()
    }
}

// ============================================================================
// Setter entry points
// ============================================================================

/// Resolve the carrier and key of a setter call and apply `write`.
///
/// Null carriers are ignored; bad keys are recorded as malformed.
///
/// # Safety
///
/// `carrier` must be null or point to a live `FormatCarrier`; `key` must be
/// null or a null-terminated string.
unsafe fn with_carrier(
    carrier: *mut c_void,
    key: *const c_char,
    write: impl FnOnce(&mut FormatCarrier, String),
) {
    if carrier.is_null() {
        return;
    }
    // SAFETY: Caller guarantees a non-null carrier is live and unaliased
    // for the duration of the call.
    let carrier = unsafe { &mut *(carrier as *mut FormatCarrier) };
    if key.is_null() {
        carrier.record_malformed("null key");
        return;
    }
    // SAFETY: Caller guarantees `key` is null-terminated.
    let key = unsafe { CStr::from_ptr(key) };
    match key.to_str() {
        Ok(key) => write(carrier, key.to_string()),
        Err(_) => carrier.record_malformed(format!(
            "non-UTF-8 key {:?}",
            key.to_string_lossy()
        )),
    }
}

unsafe extern "C" fn carrier_set_int32(carrier: *mut c_void, key: *const c_char, value: i32) {
    // SAFETY: Pointers come from a live CFormatHandle.
    unsafe { with_carrier(carrier, key, |c, k| c.set(k, CarrierValue::Int32(value))) }
}

unsafe extern "C" fn carrier_set_int64(carrier: *mut c_void, key: *const c_char, value: i64) {
    // SAFETY: Pointers come from a live CFormatHandle.
    unsafe { with_carrier(carrier, key, |c, k| c.set(k, CarrierValue::Int64(value))) }
}

unsafe extern "C" fn carrier_set_size(carrier: *mut c_void, key: *const c_char, value: usize) {
    // SAFETY: Pointers come from a live CFormatHandle.
    unsafe { with_carrier(carrier, key, |c, k| c.set(k, CarrierValue::Size(value))) }
}

unsafe extern "C" fn carrier_set_float(carrier: *mut c_void, key: *const c_char, value: f32) {
    // SAFETY: Pointers come from a live CFormatHandle.
    unsafe { with_carrier(carrier, key, |c, k| c.set(k, CarrierValue::Float(value))) }
}

unsafe extern "C" fn carrier_set_double(carrier: *mut c_void, key: *const c_char, value: f64) {
    // SAFETY: Pointers come from a live CFormatHandle.
    unsafe { with_carrier(carrier, key, |c, k| c.set(k, CarrierValue::Double(value))) }
}

unsafe extern "C" fn carrier_set_string(
    carrier: *mut c_void,
    key: *const c_char,
    value: *const c_char,
) {
    // SAFETY: Pointers come from a live CFormatHandle; `value` is null or
    // null-terminated per the ABI contract.
    unsafe {
        with_carrier(carrier, key, |c, k| {
            if value.is_null() {
                c.record_malformed(format!("null string for key {:?}", k));
                return;
            }
            match CStr::from_ptr(value).to_str() {
                Ok(s) => c.set(k, CarrierValue::String(s.to_string())),
                Err(_) => c.record_malformed(format!("non-UTF-8 string for key {:?}", k)),
            }
        })
    }
}

unsafe extern "C" fn carrier_set_buffer(
    carrier: *mut c_void,
    key: *const c_char,
    data: *const u8,
    len: usize,
) {
    // SAFETY: Pointers come from a live CFormatHandle; `data` is valid for
    // `len` bytes per the ABI contract.
    unsafe {
        with_carrier(carrier, key, |c, k| {
            let bytes = if len == 0 {
                Vec::new()
            } else if data.is_null() {
                c.record_malformed(format!("null buffer for key {:?}", k));
                return;
            } else {
                std::slice::from_raw_parts(data, len).to_vec()
            };
            c.set(k, CarrierValue::Buffer(bytes));
        })
    }
}

unsafe extern "C" fn carrier_set_rect(
    carrier: *mut c_void,
    key: *const c_char,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
) {
    let rect = Rect {
        left,
        top,
        right,
        bottom,
    };
    // SAFETY: Pointers come from a live CFormatHandle.
    unsafe { with_carrier(carrier, key, |c, k| c.set(k, CarrierValue::Rect(rect))) }
}

unsafe extern "C" fn carrier_set_pointer(carrier: *mut c_void, key: *const c_char, value: *mut c_void) {
    // SAFETY: Pointers come from a live CFormatHandle.
    unsafe {
        with_carrier(carrier, key, |c, k| {
            c.set(k, CarrierValue::Pointer(value as usize))
        })
    }
}
