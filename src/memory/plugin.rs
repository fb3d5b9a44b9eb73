//! Plugin-owned memory segment.

use super::{MemorySegment, MemoryType};
use crate::observability;
use std::ffi::c_void;

/// Release entry point for plugin-owned buffer memory.
///
/// # Safety
///
/// Called exactly once with the opaque pointer the plugin handed out.
pub type ReleaseFn = unsafe extern "C" fn(*mut c_void);

/// A memory segment whose bytes belong to a plugin.
///
/// The plugin keeps the bytes alive until `release(opaque)` is called,
/// which happens exactly once when the segment is dropped, i.e. after the
/// last [`Buffer`](crate::buffer::Buffer) referring to it is gone.
pub struct PluginSegment {
    ptr: *const u8,
    len: usize,
    opaque: *mut c_void,
    release: Option<ReleaseFn>,
}

// SAFETY: The plugin ABI requires buffer memory to be immutable once handed
// out and its release entry point to be callable from any thread.
unsafe impl Send for PluginSegment {}
unsafe impl Sync for PluginSegment {}

impl PluginSegment {
    /// Wrap plugin-owned memory.
    ///
    /// # Safety
    ///
    /// - `ptr` must be valid for reads of `len` bytes until `release` is
    ///   called (it may be null only when `len` is 0)
    /// - `release`, when present, must accept `opaque` exactly once
    pub unsafe fn new(
        ptr: *const u8,
        len: usize,
        opaque: *mut c_void,
        release: Option<ReleaseFn>,
    ) -> Self {
        Self {
            ptr,
            len,
            opaque,
            release,
        }
    }
}

impl MemorySegment for PluginSegment {
    fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    fn len(&self) -> usize {
        self.len
    }

    fn memory_type(&self) -> MemoryType {
        MemoryType::Plugin
    }
}

impl Drop for PluginSegment {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            // SAFETY: `new` requires `release` to accept `opaque` once, and
            // `take()` guarantees this is the only call.
            unsafe { release(self.opaque) };
            observability::record_buffer_released();
        }
    }
}

impl std::fmt::Debug for PluginSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSegment")
            .field("len", &self.len)
            .field("has_release", &self.release.is_some())
            .finish()
    }
}
