//! Format translation: plugin format carrier → native [`MetaData`].
//!
//! Translation is deterministic and keeps keys verbatim. Values the native
//! representation cannot hold (nested messages, process-local pointers) are
//! dropped one by one with a diagnostic instead of failing the whole
//! conversion, so one vendor-specific field cannot break an extractor.
//! Malformed writes recorded by the carrier are a conversion failure.

use crate::error::{Error, Result};
use crate::format::{CarrierValue, FormatCarrier};
use crate::metadata::{MetaData, MetaValue};
use crate::observability;

/// How strictly to treat values that cannot be translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranslationPolicy {
    /// Drop unsupported values and keep going.
    #[default]
    Lenient,
    /// Treat any dropped value as a conversion failure.
    Strict,
}

/// A value that could not be translated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedField {
    /// Carrier key.
    pub key: String,
    /// Kind of the carrier value.
    pub kind: &'static str,
}

/// Result of translating a carrier.
#[derive(Debug, Clone, Default)]
pub struct Translation {
    /// Everything that could be represented.
    pub metadata: MetaData,
    /// Values that were dropped, in carrier order.
    pub dropped: Vec<DroppedField>,
    /// Malformed writes reported by the carrier.
    pub malformed: Vec<String>,
}

impl Translation {
    /// Whether every carrier entry made it into the metadata.
    pub fn is_lossless(&self) -> bool {
        self.dropped.is_empty() && self.malformed.is_empty()
    }

    /// Check the translation against a policy.
    ///
    /// Malformed writes always fail; dropped values fail only under
    /// [`TranslationPolicy::Strict`].
    pub fn check(&self, policy: TranslationPolicy) -> Result<()> {
        if !self.malformed.is_empty() {
            return Err(Error::ExtractionFailure(format!(
                "malformed format data: {}",
                self.malformed.join(", ")
            )));
        }
        if policy == TranslationPolicy::Strict && !self.dropped.is_empty() {
            let keys: Vec<&str> = self.dropped.iter().map(|d| d.key.as_str()).collect();
            return Err(Error::ExtractionFailure(format!(
                "untranslatable format fields: {}",
                keys.join(", ")
            )));
        }
        Ok(())
    }
}

/// Convert one carrier value, or `None` if it has no native representation.
fn convert_value(value: &CarrierValue) -> Option<MetaValue> {
    let converted = match value {
        CarrierValue::Int32(v) => MetaValue::Int32(*v),
        CarrierValue::Int64(v) => MetaValue::Int64(*v),
        CarrierValue::Size(v) => MetaValue::Int64(i64::try_from(*v).ok()?),
        CarrierValue::Float(v) => MetaValue::Float(*v),
        CarrierValue::Double(v) => MetaValue::Double(*v),
        CarrierValue::String(v) => MetaValue::String(v.clone()),
        CarrierValue::Buffer(v) => MetaValue::Bytes {
            type_tag: 0,
            data: v.clone(),
        },
        CarrierValue::Rect(r) => MetaValue::Rect(*r),
        CarrierValue::Message(_) | CarrierValue::Pointer(_) => return None,
    };
    Some(converted)
}

/// Translate a carrier, reporting what was dropped.
///
/// # Example
///
/// ```rust
/// use extractor_bridge::format::FormatCarrier;
/// use extractor_bridge::translate::translate;
///
/// let mut carrier = FormatCarrier::new();
/// carrier.set_string("mime", "audio/test");
/// carrier.set_int32("sample-rate", 48000);
///
/// let translation = translate(&carrier);
/// assert!(translation.is_lossless());
/// assert_eq!(translation.metadata.find_int32("sample-rate"), Some(48000));
/// ```
pub fn translate(carrier: &FormatCarrier) -> Translation {
    let mut translation = Translation {
        malformed: carrier.malformed().to_vec(),
        ..Default::default()
    };

    for (key, value) in carrier.iter() {
        match convert_value(value) {
            Some(converted) => translation.metadata.set(key, converted),
            None => {
                tracing::warn!(
                    key = %key,
                    kind = value.kind(),
                    "dropping format field with no metadata representation"
                );
                observability::record_format_field_dropped();
                translation.dropped.push(DroppedField {
                    key: key.to_string(),
                    kind: value.kind(),
                });
            }
        }
    }

    for what in &translation.malformed {
        tracing::warn!(problem = %what, "malformed format write from plugin");
    }

    translation
}

/// Translate a carrier, keeping only the metadata.
pub fn translate_to_metadata(carrier: &FormatCarrier) -> MetaData {
    translate(carrier).metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Rect;

    #[test]
    fn test_reference_vector() {
        let mut carrier = FormatCarrier::new();
        carrier.set_string("mime", "audio/test");
        carrier.set_int32("sample-rate", 48000);
        carrier.set_int32("channel-count", 2);

        let translation = translate(&carrier);
        assert!(translation.is_lossless());

        let meta = translation.metadata;
        assert_eq!(meta.len(), 3);
        assert_eq!(meta.get("mime"), Some(&MetaValue::String("audio/test".into())));
        assert_eq!(meta.get("sample-rate"), Some(&MetaValue::Int32(48000)));
        assert_eq!(meta.get("channel-count"), Some(&MetaValue::Int32(2)));
    }

    #[test]
    fn test_every_supported_kind() {
        let mut carrier = FormatCarrier::new();
        carrier.set("a", CarrierValue::Int64(-5));
        carrier.set("b", CarrierValue::Size(1 << 20));
        carrier.set("c", CarrierValue::Float(1.5));
        carrier.set("d", CarrierValue::Double(2.25));
        carrier.set_buffer("e", vec![1, 2]);
        carrier.set(
            "f",
            CarrierValue::Rect(Rect {
                left: 1,
                top: 2,
                right: 3,
                bottom: 4,
            }),
        );

        let meta = translate_to_metadata(&carrier);
        assert_eq!(meta.find_int64("a"), Some(-5));
        assert_eq!(meta.find_int64("b"), Some(1 << 20));
        assert_eq!(meta.find_float("c"), Some(1.5));
        assert_eq!(meta.find_double("d"), Some(2.25));
        assert_eq!(meta.find_bytes("e"), Some((0, &[1u8, 2][..])));
        assert_eq!(meta.find_rect("f").map(|r| r.bottom), Some(4));
    }

    #[test]
    fn test_keys_keep_carrier_order() {
        let mut carrier = FormatCarrier::new();
        carrier.set_int32("z", 1);
        carrier.set_int32("a", 2);
        carrier.set_int32("m", 3);

        let meta = translate_to_metadata(&carrier);
        assert_eq!(meta.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
    }

    #[test]
    fn test_unsupported_values_are_dropped() {
        let mut nested = FormatCarrier::new();
        nested.set_int32("inner", 1);

        let mut carrier = FormatCarrier::new();
        carrier.set_string("mime", "video/avc");
        carrier.set_message("vendor.extra", nested);
        carrier.set("vendor.ptr", CarrierValue::Pointer(0xdead));

        let translation = translate(&carrier);
        assert_eq!(translation.metadata.len(), 1);
        assert_eq!(translation.metadata.find_string("mime"), Some("video/avc"));
        assert_eq!(
            translation.dropped,
            vec![
                DroppedField {
                    key: "vendor.extra".into(),
                    kind: "message"
                },
                DroppedField {
                    key: "vendor.ptr".into(),
                    kind: "pointer"
                },
            ]
        );

        assert!(translation.check(TranslationPolicy::Lenient).is_ok());
        assert!(matches!(
            translation.check(TranslationPolicy::Strict),
            Err(Error::ExtractionFailure(_))
        ));
    }

    #[test]
    fn test_malformed_always_fails() {
        let mut carrier = FormatCarrier::new();
        carrier.set_int32("ok", 1);
        carrier.record_malformed("null key");

        let translation = translate(&carrier);
        assert_eq!(translation.metadata.find_int32("ok"), Some(1));
        assert!(!translation.is_lossless());
        assert!(matches!(
            translation.check(TranslationPolicy::Lenient),
            Err(Error::ExtractionFailure(_))
        ));
    }

    #[test]
    fn test_empty_carrier() {
        let translation = translate(&FormatCarrier::new());
        assert!(translation.metadata.is_empty());
        assert!(translation.is_lossless());
    }
}
