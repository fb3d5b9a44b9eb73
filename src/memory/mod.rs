//! Backing memory for buffers.
//!
//! - [`MemorySegment`]: Trait for memory backends
//! - [`HeapSegment`]: Memory allocated in-process
//! - [`PluginSegment`]: Memory lent by a plugin, released through its own
//!   entry point when the last buffer referring to it is dropped
//!
//! Buffers share segments through `Arc`, which is what makes them
//! reference-counted across the plugin boundary.

mod heap;
mod plugin;
mod segment;

pub use heap::HeapSegment;
pub use plugin::{PluginSegment, ReleaseFn};
pub use segment::{MemorySegment, MemoryType};
