//! Resource link table.
//!
//! Maps `{record id, property}` to the resource currently linked there and,
//! when available, a local copy of its bytes. This is what lets the linked
//! store skip redundant uploads and downloads.
//!
//! ## Invariants
//!
//! - At most one entry per key; `put` is last-write-wins
//! - Entries only disappear through [`ResourceLinkTable::delete_for_record`]
//!   or [`ResourceLinkTable::clear`]

use std::collections::HashMap;
use std::time::SystemTime;

use bytes::Bytes;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::record::RecordId;
use crate::reference::ResourceReference;

/// SHA-256 digest of a resource payload.
pub type ContentDigest = [u8; 32];

/// Computes the digest used to detect unchanged payloads.
pub fn content_digest(bytes: &[u8]) -> ContentDigest {
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&Sha256::digest(bytes));
    digest
}

/// Key of a link table entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkKey {
    /// Owning record.
    pub record_id: RecordId,
    /// Host property name.
    pub property: String,
}

impl LinkKey {
    /// Creates a key.
    pub fn new(record_id: RecordId, property: impl Into<String>) -> Self {
        Self {
            record_id,
            property: property.into(),
        }
    }
}

/// What is known about the resource linked at a key.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkEntry {
    /// Reference stored in the record.
    pub reference: ResourceReference,
    /// Digest of the payload, if the bytes were ever seen locally.
    pub digest: Option<ContentDigest>,
    /// Cached local copy of the payload.
    pub local_bytes: Option<Bytes>,
    /// When the entry was last confirmed against the services.
    pub last_synced_at: SystemTime,
}

impl LinkEntry {
    /// Creates an entry for a reference with no local copy.
    pub fn new(reference: ResourceReference) -> Self {
        Self {
            reference,
            digest: None,
            local_bytes: None,
            last_synced_at: SystemTime::now(),
        }
    }

    /// Attaches the payload digest and, optionally, a local copy.
    pub fn with_payload(mut self, bytes: Bytes, keep_copy: bool) -> Self {
        self.digest = Some(content_digest(&bytes));
        self.local_bytes = keep_copy.then_some(bytes);
        self
    }

    /// Identifier of the linked resource.
    pub fn resource_id(&self) -> &str {
        &self.reference.resource_id
    }

    /// Returns true if this entry holds exactly `digest` as `content_type`.
    pub fn matches_payload(&self, digest: &ContentDigest, content_type: &str) -> bool {
        self.digest.as_ref() == Some(digest) && self.reference.content_type == content_type
    }

    /// Local copy, if it belongs to `resource_id`.
    pub fn cached_copy_of(&self, resource_id: &str) -> Option<Bytes> {
        if self.reference.resource_id == resource_id {
            self.local_bytes.clone()
        } else {
            None
        }
    }
}

/// Thread-safe in-process link table.
#[derive(Debug, Default)]
pub struct ResourceLinkTable {
    entries: RwLock<HashMap<LinkKey, LinkEntry>>,
}

impl ResourceLinkTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for a key.
    pub fn get(&self, record_id: &RecordId, property: &str) -> Option<LinkEntry> {
        let key = LinkKey::new(record_id.clone(), property);
        self.entries.read().get(&key).cloned()
    }

    /// Stores an entry, replacing and returning any previous one.
    pub fn put(&self, key: LinkKey, entry: LinkEntry) -> Option<LinkEntry> {
        self.entries.write().insert(key, entry)
    }

    /// Stores an entry derived from data read at `read_at`.
    ///
    /// An existing entry for a different resource synced after `read_at` is
    /// newer than what the caller saw and is kept. Returns true if `entry`
    /// was stored.
    pub fn refresh(&self, key: LinkKey, entry: LinkEntry, read_at: SystemTime) -> bool {
        let mut entries = self.entries.write();
        if let Some(current) = entries.get(&key) {
            if current.resource_id() != entry.resource_id() && current.last_synced_at > read_at {
                return false;
            }
        }
        entries.insert(key, entry);
        true
    }

    /// Drops the local copy of every entry, keeping references and digests.
    /// Returns how many copies were dropped.
    pub fn drop_local_copies(&self) -> usize {
        self.entries
            .write()
            .values_mut()
            .filter_map(|entry| entry.local_bytes.take())
            .count()
    }

    /// Removes every entry of a record and returns how many were removed.
    pub fn delete_for_record(&self, record_id: &RecordId) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| &key.record_id != record_id);
        before - entries.len()
    }

    /// Returns all entries of a record, sorted by property.
    pub fn entries_for_record(&self, record_id: &RecordId) -> Vec<(String, LinkEntry)> {
        let mut found: Vec<_> = self
            .entries
            .read()
            .iter()
            .filter(|(key, _)| &key.record_id == record_id)
            .map(|(key, entry)| (key.property.clone(), entry.clone()))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn reference(resource_id: &str, property: &str) -> ResourceReference {
        ResourceReference {
            resource_id: resource_id.into(),
            content_type: "image/png".into(),
            size: 3,
            source_property: property.into(),
        }
    }

    #[test]
    fn put_is_last_write_wins() {
        let table = ResourceLinkTable::new();
        let id = RecordId::new("u1");

        assert!(table
            .put(LinkKey::new(id.clone(), "avatar"), LinkEntry::new(reference("r1", "avatar")))
            .is_none());
        let previous = table.put(
            LinkKey::new(id.clone(), "avatar"),
            LinkEntry::new(reference("r2", "avatar")),
        );

        assert_eq!(previous.map(|e| e.reference.resource_id), Some("r1".into()));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&id, "avatar").unwrap().resource_id(), "r2");
    }

    #[test]
    fn delete_cascades_per_record() {
        let table = ResourceLinkTable::new();
        let u1 = RecordId::new("u1");
        let u2 = RecordId::new("u2");
        table.put(LinkKey::new(u1.clone(), "avatar"), LinkEntry::new(reference("r1", "avatar")));
        table.put(LinkKey::new(u1.clone(), "banner"), LinkEntry::new(reference("r2", "banner")));
        table.put(LinkKey::new(u2.clone(), "avatar"), LinkEntry::new(reference("r3", "avatar")));

        let props: Vec<_> = table.entries_for_record(&u1).into_iter().map(|(p, _)| p).collect();
        assert_eq!(props, vec!["avatar", "banner"]);

        assert_eq!(table.delete_for_record(&u1), 2);
        assert!(table.get(&u1, "avatar").is_none());
        assert!(table.get(&u2, "avatar").is_some());
        assert_eq!(table.delete_for_record(&u1), 0);

        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn refresh_keeps_newer_entry_for_other_resource() {
        let table = ResourceLinkTable::new();
        let id = RecordId::new("u1");
        let read_at = SystemTime::now() - Duration::from_secs(60);

        table.put(LinkKey::new(id.clone(), "avatar"), LinkEntry::new(reference("r2", "avatar")));

        assert!(!table.refresh(
            LinkKey::new(id.clone(), "avatar"),
            LinkEntry::new(reference("r1", "avatar")),
            read_at,
        ));
        assert_eq!(table.get(&id, "avatar").unwrap().resource_id(), "r2");

        // Same resource, or an entry older than the read, is replaced.
        assert!(table.refresh(
            LinkKey::new(id.clone(), "avatar"),
            LinkEntry::new(reference("r2", "avatar")).with_payload(Bytes::from_static(b"abc"), true),
            read_at,
        ));
        assert!(table.get(&id, "avatar").unwrap().local_bytes.is_some());
        assert!(table.refresh(
            LinkKey::new(id.clone(), "avatar"),
            LinkEntry::new(reference("r1", "avatar")),
            SystemTime::now() + Duration::from_secs(60),
        ));
        assert_eq!(table.get(&id, "avatar").unwrap().resource_id(), "r1");
    }

    #[test]
    fn dropping_local_copies_keeps_links() {
        let table = ResourceLinkTable::new();
        let id = RecordId::new("u1");
        let bytes = Bytes::from_static(b"abc");
        table.put(
            LinkKey::new(id.clone(), "avatar"),
            LinkEntry::new(reference("r1", "avatar")).with_payload(bytes.clone(), true),
        );
        table.put(
            LinkKey::new(id.clone(), "banner"),
            LinkEntry::new(reference("r2", "banner")).with_payload(bytes, false),
        );

        assert_eq!(table.drop_local_copies(), 1);
        let entry = table.get(&id, "avatar").unwrap();
        assert!(entry.local_bytes.is_none());
        assert!(entry.matches_payload(&content_digest(b"abc"), "image/png"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn payload_matching() {
        let bytes = Bytes::from_static(b"abc");
        let entry = LinkEntry::new(reference("r1", "avatar")).with_payload(bytes.clone(), false);

        assert!(entry.local_bytes.is_none());
        assert!(entry.matches_payload(&content_digest(b"abc"), "image/png"));
        assert!(!entry.matches_payload(&content_digest(b"abd"), "image/png"));
        assert!(!entry.matches_payload(&content_digest(b"abc"), "image/jpeg"));

        let cached = LinkEntry::new(reference("r1", "avatar")).with_payload(bytes.clone(), true);
        assert_eq!(cached.cached_copy_of("r1"), Some(bytes));
        assert_eq!(cached.cached_copy_of("r2"), None);
    }

    #[test]
    fn concurrent_puts_keep_one_entry_per_key() {
        let table = Arc::new(ResourceLinkTable::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for j in 0..50 {
                        let id = format!("r{i}-{j}");
                        table.put(
                            LinkKey::new(RecordId::new("shared"), "avatar"),
                            LinkEntry::new(reference(&id, "avatar")),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(table.len(), 1);
    }
}
