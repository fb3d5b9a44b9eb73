//! Consumer-facing format metadata.
//!
//! [`MetaData`] is the only format description callers above the bridge
//! ever see: an insertion-ordered map from string keys to typed values.
//! Every `get_format()`/`metadata()` call fills a fresh object; nothing is
//! shared between calls.

use crate::error::{Error, Result};
use rkyv::{Archive, Deserialize, Serialize};

/// Well-known metadata keys.
pub mod keys {
    /// MIME type of the track or container (`String`).
    pub const MIME: &str = "mime";
    /// Audio sample rate in Hz (`Int32`).
    pub const SAMPLE_RATE: &str = "sample-rate";
    /// Audio channel count (`Int32`).
    pub const CHANNEL_COUNT: &str = "channel-count";
    /// Video width in pixels (`Int32`).
    pub const WIDTH: &str = "width";
    /// Video height in pixels (`Int32`).
    pub const HEIGHT: &str = "height";
    /// Duration in microseconds (`Int64`).
    pub const DURATION_US: &str = "durationUs";
    /// Average bit rate in bits per second (`Int32`).
    pub const BIT_RATE: &str = "bitrate";
    /// ISO 639 language code (`String`).
    pub const LANGUAGE: &str = "language";
    /// Maximum input buffer size (`Int32`).
    pub const MAX_INPUT_SIZE: &str = "max-input-size";
    /// First codec-specific data blob (`Bytes`).
    pub const CSD_0: &str = "csd-0";
    /// Second codec-specific data blob (`Bytes`).
    pub const CSD_1: &str = "csd-1";
    /// Sample presentation time in microseconds (`Int64`).
    pub const TIME_US: &str = "timeUs";
    /// Crop rectangle (`Rect`).
    pub const CROP: &str = "crop";
}

/// A rectangle value, edges inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Archive, Serialize, Deserialize)]
#[rkyv(attr(allow(missing_docs)))]
pub struct Rect {
    /// Left edge.
    pub left: i32,
    /// Top edge.
    pub top: i32,
    /// Right edge.
    pub right: i32,
    /// Bottom edge.
    pub bottom: i32,
}

/// A typed metadata value.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(attr(allow(missing_docs)))]
pub enum MetaValue {
    /// 32-bit integer.
    Int32(i32),
    /// 64-bit integer.
    Int64(i64),
    /// Single-precision float.
    Float(f32),
    /// Double-precision float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Byte blob with an application-defined type tag.
    Bytes {
        /// Tag describing the blob contents (0 when untyped).
        type_tag: u32,
        /// Blob contents.
        data: Vec<u8>,
    },
    /// Rectangle.
    Rect(Rect),
}

impl MetaValue {
    /// Short name of the value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            MetaValue::Int32(_) => "int32",
            MetaValue::Int64(_) => "int64",
            MetaValue::Float(_) => "float",
            MetaValue::Double(_) => "double",
            MetaValue::String(_) => "string",
            MetaValue::Bytes { .. } => "bytes",
            MetaValue::Rect(_) => "rect",
        }
    }
}

/// A key-value entry.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(attr(allow(missing_docs)))]
pub struct MetaEntry {
    /// Entry key.
    pub key: String,
    /// Entry value.
    pub value: MetaValue,
}

/// Format metadata: string keys mapped to typed values.
///
/// Entries keep insertion order. Setting an existing key replaces its value
/// in place. Uses a `Vec` for rkyv compatibility; format descriptions are
/// small enough that linear lookup wins.
///
/// # Example
///
/// ```rust
/// use extractor_bridge::metadata::{MetaData, keys};
///
/// let mut meta = MetaData::new();
/// meta.set_string(keys::MIME, "audio/test");
/// meta.set_int32(keys::SAMPLE_RATE, 48000);
///
/// assert_eq!(meta.find_string(keys::MIME), Some("audio/test"));
/// assert_eq!(meta.find_int32(keys::SAMPLE_RATE), Some(48000));
/// assert_eq!(meta.find_int64(keys::SAMPLE_RATE), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(attr(allow(missing_docs)))]
pub struct MetaData {
    entries: Vec<MetaEntry>,
}

impl MetaData {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Set a value, replacing any previous value for the key.
    pub fn set(&mut self, key: impl Into<String>, value: MetaValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.value = value,
            None => self.entries.push(MetaEntry { key, value }),
        }
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    /// Whether the key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove a key. Returns the removed value.
    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        let pos = self.entries.iter().position(|e| e.key == key)?;
        Some(self.entries.remove(pos).value)
    }

    /// Iterate over keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|e| (e.key.as_str(), &e.value))
    }

    /// Copy every entry of `other` into `self`, overwriting shared keys.
    pub fn merge_from(&mut self, other: &MetaData) {
        for (key, value) in other.iter() {
            self.set(key, value.clone());
        }
    }

    /// Set a 32-bit integer.
    pub fn set_int32(&mut self, key: impl Into<String>, value: i32) {
        self.set(key, MetaValue::Int32(value));
    }

    /// Set a 64-bit integer.
    pub fn set_int64(&mut self, key: impl Into<String>, value: i64) {
        self.set(key, MetaValue::Int64(value));
    }

    /// Set a float.
    pub fn set_float(&mut self, key: impl Into<String>, value: f32) {
        self.set(key, MetaValue::Float(value));
    }

    /// Set a double.
    pub fn set_double(&mut self, key: impl Into<String>, value: f64) {
        self.set(key, MetaValue::Double(value));
    }

    /// Set a string.
    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set(key, MetaValue::String(value.into()));
    }

    /// Set an untyped byte blob.
    pub fn set_bytes(&mut self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.set_typed_bytes(key, 0, data);
    }

    /// Set a byte blob with a type tag.
    pub fn set_typed_bytes(&mut self, key: impl Into<String>, type_tag: u32, data: impl Into<Vec<u8>>) {
        self.set(
            key,
            MetaValue::Bytes {
                type_tag,
                data: data.into(),
            },
        );
    }

    /// Set a rectangle.
    pub fn set_rect(&mut self, key: impl Into<String>, rect: Rect) {
        self.set(key, MetaValue::Rect(rect));
    }

    /// Find a 32-bit integer.
    pub fn find_int32(&self, key: &str) -> Option<i32> {
        match self.get(key)? {
            MetaValue::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// Find a 64-bit integer.
    pub fn find_int64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            MetaValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Find a float.
    pub fn find_float(&self, key: &str) -> Option<f32> {
        match self.get(key)? {
            MetaValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Find a double.
    pub fn find_double(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            MetaValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Find a string.
    pub fn find_string(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            MetaValue::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Find a byte blob and its type tag.
    pub fn find_bytes(&self, key: &str) -> Option<(u32, &[u8])> {
        match self.get(key)? {
            MetaValue::Bytes { type_tag, data } => Some((*type_tag, data.as_slice())),
            _ => None,
        }
    }

    /// Find a rectangle.
    pub fn find_rect(&self, key: &str) -> Option<Rect> {
        match self.get(key)? {
            MetaValue::Rect(r) => Some(*r),
            _ => None,
        }
    }

    /// Flatten into an rkyv archive, e.g. to hand metadata to another process.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|bytes| bytes.to_vec())
            .map_err(|e| Error::ExtractionFailure(format!("metadata archive failed: {}", e)))
    }

    /// Rebuild metadata from bytes produced by [`MetaData::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        // Copy to aligned buffer for rkyv
        let mut aligned = rkyv::util::AlignedVec::<16>::new();
        aligned.extend_from_slice(bytes);

        rkyv::from_bytes::<MetaData, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::InvalidArgument(format!("invalid metadata archive: {}", e)))
    }
}
