//! Test fixtures and linked store helpers.
//!
//! Provides a linked store wired to the in-memory record store and resource
//! service, plus sample payloads and schemas.

use std::sync::Arc;

use linkstore_codec::Document;
use linkstore_core::{
    LinkedStore, LinkedStoreConfig, MemoryRecordStore, MemoryResourceService, PropertyKind,
    RecordId, ResourceReference, Schema, Value,
};

/// Linked store type used throughout the testkit.
pub type MemoryLinkedStore = LinkedStore<Arc<MemoryRecordStore>, Arc<MemoryResourceService>>;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];

/// Bytes that sniff as `image/png`.
pub fn png_bytes(body: &[u8]) -> Vec<u8> {
    [PNG_MAGIC, body].concat()
}

/// Bytes that sniff as `image/jpeg`.
pub fn jpeg_bytes(body: &[u8]) -> Vec<u8> {
    [JPEG_MAGIC, body].concat()
}

/// User schema: inline `name`, resource `avatar`, and resource `coverPhoto`
/// stored as `cover_photo`.
pub fn avatar_schema() -> Schema {
    Schema::builder()
        .inline("name")
        .resource("avatar")
        .mapped(
            "coverPhoto",
            "cover_photo",
            PropertyKind::Resource { content_type: None },
        )
        .build()
        .expect("avatar schema is valid")
}

/// A linked store with handles on both in-memory collaborators.
pub struct TestLinkedStore {
    /// The store under test.
    pub store: MemoryLinkedStore,
    /// Record store behind it.
    pub records: Arc<MemoryRecordStore>,
    /// Resource service behind it.
    pub resources: Arc<MemoryResourceService>,
}

impl TestLinkedStore {
    /// Creates a store with [`avatar_schema`] and default configuration.
    pub fn new() -> Self {
        Self::with_config(LinkedStoreConfig::default())
    }

    /// Creates a store with [`avatar_schema`].
    pub fn with_config(config: LinkedStoreConfig) -> Self {
        Self::with_schema(config, avatar_schema())
    }

    /// Creates a store with an explicit schema.
    pub fn with_schema(config: LinkedStoreConfig, schema: Schema) -> Self {
        let records = Arc::new(MemoryRecordStore::new());
        let resources = Arc::new(MemoryResourceService::new());
        let store = LinkedStore::new(config, schema, Arc::clone(&records), Arc::clone(&resources));
        Self {
            store,
            records,
            resources,
        }
    }

    /// Decodes the payload the record store holds for `id`.
    pub fn stored_document(&self, id: &str) -> Option<Document> {
        self.records.stored(&RecordId::new(id))?.decode().ok()
    }

    /// Reference stored under a backend field name.
    pub fn stored_reference(&self, id: &str, field: &str) -> Option<ResourceReference> {
        let document = self.stored_document(id)?;
        ResourceReference::from_value(document.get(field)?).ok()?
    }

    /// Returns true if any stored field of `id` carries raw bytes.
    pub fn stored_has_bytes(&self, id: &str) -> bool {
        self.stored_document(id)
            .is_some_and(|doc| doc.values().any(Value::contains_bytes))
    }
}

impl Default for TestLinkedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestLinkedStore {
    type Target = MemoryLinkedStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a fresh default [`TestLinkedStore`].
pub fn with_linked_store<F, R>(f: F) -> R
where
    F: FnOnce(&TestLinkedStore) -> R,
{
    let harness = TestLinkedStore::new();
    f(&harness)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use linkstore_core::Record;

    /// A user record with a PNG avatar.
    pub fn user_with_avatar(id: &str, name: &str) -> Record {
        Record::with_id(id)
            .with("name", name)
            .with("avatar", png_bytes(name.as_bytes()))
    }

    /// A store pre-populated with `count` users named `u0..`.
    pub fn populated_store(count: usize) -> TestLinkedStore {
        let harness = TestLinkedStore::new();
        for i in 0..count {
            let id = format!("u{i}");
            harness
                .save(user_with_avatar(&id, &format!("user {i}")))
                .expect("failed to save user");
        }
        harness
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkstore_core::sniff_content_type;

    #[test]
    fn sample_payloads_sniff() {
        assert_eq!(sniff_content_type(&png_bytes(b"x")), "image/png");
        assert_eq!(sniff_content_type(&jpeg_bytes(b"x")), "image/jpeg");
    }

    #[test]
    fn populated_scenario() {
        let harness = scenarios::populated_store(3);
        assert_eq!(harness.records.len(), 3);
        assert_eq!(harness.resources.len(), 3);
        assert_eq!(harness.link_count(), 3);
        assert!(!harness.stored_has_bytes("u1"));
        assert!(harness.stored_reference("u1", "avatar").is_some());
    }
}
