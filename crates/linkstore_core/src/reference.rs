//! Resource references embedded in serialized records.

use linkstore_codec::{CodecError, CodecResult, Value};
use serde::{Deserialize, Serialize};

use crate::resource::UploadedResource;

/// Tag value identifying a reference map.
pub const REFERENCE_TYPE: &str = "resource";

/// Content type used when nothing better is known.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const TYPE_KEY: &str = "_type";
const RESOURCE_ID_KEY: &str = "resource_id";
const CONTENT_TYPE_KEY: &str = "content_type";
const SIZE_KEY: &str = "size";
const SOURCE_PROPERTY_KEY: &str = "source_property";

/// Pointer to a resource, stored in place of its bytes.
///
/// References are immutable. Saving new bytes for a property produces a new
/// reference; the old resource is left where it is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceReference {
    /// Identifier assigned by the resource service.
    pub resource_id: String,
    /// MIME type of the payload.
    pub content_type: String,
    /// Payload length in bytes.
    pub size: u64,
    /// Host property the resource belongs to.
    pub source_property: String,
}

impl ResourceReference {
    /// Builds a reference from an upload result.
    pub fn from_upload(uploaded: UploadedResource, source_property: impl Into<String>) -> Self {
        Self {
            resource_id: uploaded.resource_id,
            content_type: uploaded.content_type,
            size: uploaded.size,
            source_property: source_property.into(),
        }
    }

    /// Reference standing for an empty payload.
    ///
    /// Nothing is uploaded for it; it carries no resource id and resolves to
    /// empty bytes without a download.
    pub fn empty(content_type: impl Into<String>, source_property: impl Into<String>) -> Self {
        Self {
            resource_id: String::new(),
            content_type: content_type.into(),
            size: 0,
            source_property: source_property.into(),
        }
    }

    /// Returns true if this reference stands for an empty payload.
    pub fn is_empty_payload(&self) -> bool {
        self.resource_id.is_empty() && self.size == 0
    }

    /// Encodes the reference as a tagged map.
    pub fn to_value(&self) -> Value {
        Value::map([
            (TYPE_KEY, Value::from(REFERENCE_TYPE)),
            (RESOURCE_ID_KEY, Value::from(self.resource_id.as_str())),
            (CONTENT_TYPE_KEY, Value::from(self.content_type.as_str())),
            (SIZE_KEY, Value::Integer(i64::try_from(self.size).unwrap_or(i64::MAX))),
            (SOURCE_PROPERTY_KEY, Value::from(self.source_property.as_str())),
        ])
    }

    /// Reads a reference from a value.
    ///
    /// Returns `Ok(None)` if the value is not a tagged reference map.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is tagged as a reference but a field is
    /// missing or has the wrong type.
    pub fn from_value(value: &Value) -> CodecResult<Option<Self>> {
        if !Self::is_reference(value) {
            return Ok(None);
        }

        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_text)
                .map(str::to_string)
                .ok_or_else(|| CodecError::invalid_structure(format!("reference missing {key}")))
        };

        let size = value
            .get(SIZE_KEY)
            .and_then(Value::as_integer)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| CodecError::invalid_structure("reference missing size"))?;

        Ok(Some(Self {
            resource_id: text(RESOURCE_ID_KEY)?,
            content_type: text(CONTENT_TYPE_KEY)?,
            size,
            source_property: text(SOURCE_PROPERTY_KEY)?,
        }))
    }

    /// Returns true if the value is tagged as a reference.
    pub fn is_reference(value: &Value) -> bool {
        value.get(TYPE_KEY).and_then(Value::as_text) == Some(REFERENCE_TYPE)
    }
}

/// Detects a content type from leading magic bytes.
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
    ];

    if let Some((_, content_type)) = SIGNATURES.iter().find(|(sig, _)| bytes.starts_with(sig)) {
        return *content_type;
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return "image/webp";
    }
    DEFAULT_CONTENT_TYPE
}
