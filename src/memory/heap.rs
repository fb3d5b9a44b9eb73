//! Heap-backed memory segment.

use super::{MemorySegment, MemoryType};

/// A memory segment backed by a heap allocation.
///
/// Used for buffers produced in-process, e.g. by generation-1 plugins that
/// build native [`Buffer`](crate::buffer::Buffer)s directly.
///
/// # Example
///
/// ```rust
/// use extractor_bridge::memory::{HeapSegment, MemorySegment};
///
/// let segment = HeapSegment::from_vec(vec![1, 2, 3]);
/// assert_eq!(segment.len(), 3);
/// assert_eq!(segment.as_slice(), &[1, 2, 3]);
/// ```
pub struct HeapSegment {
    /// Using a boxed slice ensures the memory is contiguous and won't be reallocated.
    data: Box<[u8]>,
}

impl HeapSegment {
    /// Create a zero-initialized segment of the given size.
    pub fn zeroed(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
        }
    }

    /// Take ownership of an existing allocation.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data: data.into_boxed_slice(),
        }
    }

    /// Copy bytes into a new segment.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }
}

impl MemorySegment for HeapSegment {
    fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn memory_type(&self) -> MemoryType {
        MemoryType::Heap
    }

    fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for HeapSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapSegment")
            .field("len", &self.data.len())
            .finish()
    }
}
