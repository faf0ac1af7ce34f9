//! Conversion between caller records and serialized documents.

use std::collections::HashMap;

use linkstore_codec::{CodecError, Document, Value};

use crate::error::LinkResult;
use crate::record::{Metadata, Record, RecordId, ID_FIELD, METADATA_FIELD};
use crate::schema::Schema;

/// Builds the document for a record.
///
/// `replacements` holds, by host name, the value to write instead of the
/// record's own value. Every resource-backed property must have one.
pub(crate) fn to_document(
    record_id: &RecordId,
    record: &Record,
    schema: &Schema,
    replacements: &HashMap<String, Value>,
) -> Document {
    let mut document = Document::new();
    document.insert(ID_FIELD.to_string(), Value::from(record_id.as_str()));
    if let Some(metadata) = record.metadata() {
        document.insert(METADATA_FIELD.to_string(), metadata.to_value());
    }

    for (name, value) in record.properties() {
        let value = replacements.get(name).unwrap_or(value);
        document.insert(schema.backend_name(name).to_string(), value.clone());
    }
    document
}

/// Rebuilds a record from a stored document.
///
/// Backend field names are mapped back to host names. The document's `_id`
/// wins over `fallback_id`.
pub(crate) fn from_document(
    document: Document,
    schema: &Schema,
    fallback_id: &RecordId,
) -> LinkResult<Record> {
    let mut record = Record::new();
    let mut id = None;

    for (field, value) in document {
        match field.as_str() {
            ID_FIELD => {
                let text = value
                    .as_text()
                    .ok_or_else(|| CodecError::invalid_structure("_id must be text"))?;
                id = Some(RecordId::new(text));
            }
            METADATA_FIELD => record.set_metadata(Metadata::from_value(&value)),
            _ => {
                let host = schema.host_name(&field).to_string();
                record.set(host, value);
            }
        }
    }

    record.set_id(id.unwrap_or_else(|| fallback_id.clone()));
    Ok(record)
}
