//! Reference-counted media buffers returned by track reads.
//!
//! A [`Buffer`] is a view into a shared [`MemorySegment`] plus side
//! metadata (timestamp, flags, extra keys). Cloning only bumps the segment's
//! reference count; the backing memory is freed, or handed back to the
//! plugin that lent it, when the last clone is dropped.
//!
//! Buffers read from a track must all be dropped before that track is
//! stopped. This is a caller obligation the library does not check.

use crate::error::{Error, Result};
use crate::memory::{HeapSegment, MemorySegment, MemoryType};
use crate::metadata::MetaData;
use bitflags::bitflags;
use std::sync::Arc;

bitflags! {
    /// Flags describing a buffer's contents.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        /// Buffer starts at a sync sample (keyframe).
        const SYNC_FRAME = 1 << 0;
        /// Buffer holds codec configuration data rather than media.
        const CODEC_CONFIG = 1 << 1;
        /// Last buffer of the stream.
        const END_OF_STREAM = 1 << 2;
        /// Buffer contents are encrypted.
        const ENCRYPTED = 1 << 3;
    }
}

/// Handle to a memory region within a segment.
///
/// This is cheap to clone (just Arc increment + copy of offset/len).
#[derive(Clone)]
pub struct MemoryHandle {
    /// The backing memory segment.
    segment: Arc<dyn MemorySegment>,
    /// Offset within the segment.
    offset: usize,
    /// Length of this handle's data.
    len: usize,
}

impl MemoryHandle {
    /// Create a memory handle covering an entire segment.
    pub fn from_segment(segment: Arc<dyn MemorySegment>) -> Self {
        let len = segment.len();
        Self {
            segment,
            offset: 0,
            len,
        }
    }

    /// Create a handle over `[offset, offset + len)` of a segment.
    ///
    /// Returns `InvalidArgument` if the range exceeds the segment.
    pub fn with_range(segment: Arc<dyn MemorySegment>, offset: usize, len: usize) -> Result<Self> {
        check_range(offset, len, segment.len())?;
        Ok(Self {
            segment,
            offset,
            len,
        })
    }

    /// Length of this handle's data.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if this handle has zero length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset within the segment.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// This handle's data as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.segment.as_slice()[self.offset..self.offset + self.len]
    }

    /// Owner of the backing memory.
    pub fn memory_type(&self) -> MemoryType {
        self.segment.memory_type()
    }

    /// The backing segment.
    pub fn segment(&self) -> &Arc<dyn MemorySegment> {
        &self.segment
    }

    /// Number of handles currently sharing the backing segment.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.segment)
    }
}

impl std::fmt::Debug for MemoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHandle")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("memory_type", &self.memory_type())
            .finish()
    }
}

fn check_range(offset: usize, len: usize, capacity: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(Error::InvalidArgument(format!(
            "range {}+{} exceeds {} bytes",
            offset, len, capacity
        ))),
    }
}

/// A buffer of demultiplexed media data.
///
/// # Example
///
/// ```rust
/// use extractor_bridge::buffer::{Buffer, BufferFlags};
///
/// let mut buffer = Buffer::from_vec(vec![0, 0, 0, 1, 0x65]);
/// buffer.set_time_us(40_000);
/// buffer.set_flags(BufferFlags::SYNC_FRAME);
///
/// // Clone is O(1), both share the same memory
/// let other = buffer.clone();
/// assert_eq!(other.as_bytes().as_ptr(), buffer.as_bytes().as_ptr());
/// ```
#[derive(Clone)]
pub struct Buffer {
    memory: MemoryHandle,
    time_us: i64,
    duration_us: Option<i64>,
    flags: BufferFlags,
    meta: MetaData,
}

impl Buffer {
    /// Create a buffer over a memory handle.
    pub fn new(memory: MemoryHandle) -> Self {
        Self {
            memory,
            time_us: 0,
            duration_us: None,
            flags: BufferFlags::empty(),
            meta: MetaData::new(),
        }
    }

    /// Create a heap-backed buffer that owns `data`.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self::new(MemoryHandle::from_segment(Arc::new(HeapSegment::from_vec(
            data,
        ))))
    }

    /// The buffer data within the current range.
    pub fn as_bytes(&self) -> &[u8] {
        self.memory.as_slice()
    }

    /// Length of the current range.
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Whether the current range is empty.
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Offset of the current range within the backing memory.
    pub fn range_offset(&self) -> usize {
        self.memory.offset()
    }

    /// Total size of the backing memory.
    pub fn capacity(&self) -> usize {
        self.memory.segment().len()
    }

    /// Narrow or move the valid range within the backing memory.
    ///
    /// Offsets are relative to the start of the backing memory, not to the
    /// current range.
    pub fn set_range(&mut self, offset: usize, len: usize) -> Result<()> {
        check_range(offset, len, self.capacity())?;
        self.memory.offset = offset;
        self.memory.len = len;
        Ok(())
    }

    /// The memory handle.
    pub fn memory(&self) -> &MemoryHandle {
        &self.memory
    }

    /// Presentation time in microseconds.
    pub fn time_us(&self) -> i64 {
        self.time_us
    }

    /// Set the presentation time in microseconds.
    pub fn set_time_us(&mut self, time_us: i64) {
        self.time_us = time_us;
    }

    /// Duration in microseconds, if known.
    pub fn duration_us(&self) -> Option<i64> {
        self.duration_us
    }

    /// Set the duration in microseconds.
    pub fn set_duration_us(&mut self, duration_us: Option<i64>) {
        self.duration_us = duration_us;
    }

    /// Buffer flags.
    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    /// Replace the buffer flags.
    pub fn set_flags(&mut self, flags: BufferFlags) {
        self.flags = flags;
    }

    /// Whether the buffer starts at a sync sample.
    pub fn is_sync_frame(&self) -> bool {
        self.flags.contains(BufferFlags::SYNC_FRAME)
    }

    /// Extra per-buffer metadata.
    pub fn meta(&self) -> &MetaData {
        &self.meta
    }

    /// Mutable extra per-buffer metadata.
    pub fn meta_mut(&mut self) -> &mut MetaData {
        &mut self.meta
    }

    /// Number of live buffers sharing this buffer's memory.
    pub fn ref_count(&self) -> usize {
        self.memory.ref_count()
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("memory", &self.memory)
            .field("time_us", &self.time_us)
            .field("duration_us", &self.duration_us)
            .field("flags", &self.flags)
            .field("meta", &self.meta.len())
            .finish()
    }
}
