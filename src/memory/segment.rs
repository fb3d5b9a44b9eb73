//! Memory segment trait and types.

/// Who owns the memory backing a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryType {
    /// Heap memory allocated by this crate.
    Heap,
    /// Memory owned by a plugin, returned through its release entry point.
    Plugin,
}

/// Trait for memory segment backends.
///
/// A memory segment is a contiguous, immutable-once-published region that
/// buffers point into. Segments are shared through `Arc`, so the memory
/// is released when the last buffer referring to it is dropped.
///
/// # Safety
///
/// Implementations must ensure that:
/// - The pointer stays valid for `len()` bytes for the lifetime of the segment
/// - The bytes are not mutated while the segment is shared
pub trait MemorySegment: Send + Sync {
    /// Get a raw pointer to the start of this segment.
    fn as_ptr(&self) -> *const u8;

    /// Total size of the segment in bytes.
    fn len(&self) -> usize;

    /// Returns true if the segment has zero length.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The owner of the memory backing this segment.
    fn memory_type(&self) -> MemoryType;

    /// Get the segment as a byte slice.
    fn as_slice(&self) -> &[u8] {
        if self.len() == 0 {
            return &[];
        }
        // SAFETY: Implementations guarantee `as_ptr()` is valid for `len()`
        // bytes while `self` is alive and the bytes are not mutated.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len()) }
    }
}
