//! Records as callers see them.

use std::collections::BTreeMap;
use std::fmt;

use linkstore_codec::Value;

use crate::error::{LinkError, LinkResult};

/// Field carrying the record id in the serialized form.
pub const ID_FIELD: &str = "_id";

/// Field carrying backend metadata in the serialized form.
pub const METADATA_FIELD: &str = "_kmd";

/// Names callers may not use for their own properties.
pub const RESERVED_FIELDS: [&str; 2] = [ID_FIELD, METADATA_FIELD];

/// Longest accepted record id, in bytes.
pub const MAX_RECORD_ID_LEN: usize = 1024;

/// Returns true if `name` is reserved for the serialized form.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_FIELDS.contains(&name)
}

/// Stable identifier of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    /// Wraps an identifier without checking it; see [`RecordId::validate`].
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks that the identifier can be used as a record store key.
    pub fn validate(&self) -> LinkResult<()> {
        if self.0.is_empty() {
            return Err(LinkError::validation("record id must not be empty"));
        }
        if self.0.len() > MAX_RECORD_ID_LEN {
            return Err(LinkError::validation(format!(
                "record id is {} bytes, limit is {MAX_RECORD_ID_LEN}",
                self.0.len()
            )));
        }
        if self.0.chars().any(char::is_control) {
            return Err(LinkError::validation(
                "record id must not contain control characters",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Backend bookkeeping attached to a stored record.
///
/// Timestamps are opaque strings owned by the backend; they are carried
/// through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Last modification time.
    pub last_modified_time: Option<String>,
    /// Entity creation time.
    pub entity_creation_time: Option<String>,
}

impl Metadata {
    /// Last modification time key.
    pub const LMT_KEY: &'static str = "lmt";
    /// Entity creation time key.
    pub const ECT_KEY: &'static str = "ect";

    /// Encodes the metadata as a map value.
    pub fn to_value(&self) -> Value {
        let mut entries = BTreeMap::new();
        if let Some(lmt) = &self.last_modified_time {
            entries.insert(Self::LMT_KEY.to_string(), Value::Text(lmt.clone()));
        }
        if let Some(ect) = &self.entity_creation_time {
            entries.insert(Self::ECT_KEY.to_string(), Value::Text(ect.clone()));
        }
        Value::Map(entries)
    }

    /// Reads metadata from a map value; unknown keys are ignored.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_map()?;
        let text = |key: &str| value.get(key).and_then(Value::as_text).map(str::to_string);
        Some(Self {
            last_modified_time: text(Self::LMT_KEY),
            entity_creation_time: text(Self::ECT_KEY),
        })
    }
}

/// A record: an optional id, named property values and backend metadata.
///
/// Resource-backed properties hold [`Value::Bytes`] on the caller's side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    id: Option<RecordId>,
    properties: BTreeMap<String, Value>,
    metadata: Option<Metadata>,
}

impl Record {
    /// Creates an empty record without an id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty record with the given id.
    pub fn with_id(id: impl Into<RecordId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Builder-style property setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Returns the record id, if assigned.
    pub fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    /// Sets the record id.
    pub fn set_id(&mut self, id: impl Into<RecordId>) {
        self.id = Some(id.into());
    }

    /// Returns a property value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Sets a property, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.properties.insert(name.into(), value.into())
    }

    /// Removes a property, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    /// Iterates over all properties in name order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns true if the record has no properties.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Returns the backend metadata, if any.
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Replaces the backend metadata.
    pub fn set_metadata(&mut self, metadata: Option<Metadata>) {
        self.metadata = metadata;
    }
}
