//! Serialized record documents.

use std::collections::BTreeMap;

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// The structured form of a record as the backend sees it: field name to value.
pub type Document = BTreeMap<String, Value>;

/// The encoded byte form of a [`Document`], exchanged with record stores.
///
/// Record stores treat the payload as opaque; only the linked store
/// interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SerializedRecord(Vec<u8>);

impl SerializedRecord {
    /// Encode a document as a CBOR map.
    ///
    /// # Errors
    ///
    /// Returns an error if the CBOR writer fails.
    pub fn encode(document: &Document) -> CodecResult<Self> {
        let cbor = ciborium::Value::Map(
            document
                .iter()
                .map(|(k, v)| (ciborium::Value::Text(k.clone()), v.to_cbor()))
                .collect(),
        );
        let mut buffer = Vec::new();
        ciborium::into_writer(&cbor, &mut buffer)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
        Ok(Self(buffer))
    }

    /// Decode the payload back into a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not CBOR, or the top-level item is
    /// not a map with text keys.
    pub fn decode(&self) -> CodecResult<Document> {
        let cbor: ciborium::Value = ciborium::from_reader(self.0.as_slice())
            .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
        match Value::from_cbor(cbor)? {
            Value::Map(entries) => Ok(entries),
            other => Err(CodecError::invalid_structure(format!(
                "expected map at top level, found {}",
                other.type_name()
            ))),
        }
    }

    /// Wrap raw bytes received from a store.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Length of the encoded payload in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
