//! End-to-end tests for the linked store against the in-memory collaborators.

use std::sync::Arc;
use std::thread;

use linkstore_core::{
    CachePolicy, FetchOptions, LinkError, LinkedStore, LinkedStoreConfig, MemoryRecordStore,
    MemoryResourceService, OnResourceMissing, PropertyKind, Record, RecordId, ResourceError,
    ResourceReference, Schema, StoreError, Value,
};

type Store = LinkedStore<Arc<MemoryRecordStore>, Arc<MemoryResourceService>>;

struct Harness {
    store: Store,
    records: Arc<MemoryRecordStore>,
    resources: Arc<MemoryResourceService>,
}

fn png(body: &[u8]) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(body);
    bytes
}

fn harness(config: LinkedStoreConfig) -> Harness {
    let schema = Schema::builder()
        .inline("name")
        .resource("avatar")
        .mapped(
            "coverPhoto",
            "cover_photo",
            PropertyKind::Resource { content_type: None },
        )
        .build()
        .unwrap();
    let records = Arc::new(MemoryRecordStore::new());
    let resources = Arc::new(MemoryResourceService::new());
    let store = LinkedStore::new(config, schema, Arc::clone(&records), Arc::clone(&resources));
    Harness {
        store,
        records,
        resources,
    }
}

/// Returns true if any field of the stored payload carries raw bytes.
fn stored_has_bytes(records: &MemoryRecordStore, id: &str) -> bool {
    let doc = records.stored(&RecordId::new(id)).unwrap().decode().unwrap();
    doc.values().any(Value::contains_bytes)
}

#[test]
fn avatar_round_trip() {
    let h = harness(LinkedStoreConfig::default());
    let avatar = png(b"alice");

    let saved = h
        .store
        .save(Record::with_id("u1").with("name", "Alice").with("avatar", avatar.clone()))
        .unwrap();
    assert_eq!(saved.id(), Some(&RecordId::new("u1")));
    assert_eq!(saved.get("avatar"), Some(&Value::Bytes(avatar.clone())));

    let doc = h.records.stored(&RecordId::new("u1")).unwrap().decode().unwrap();
    let reference = ResourceReference::from_value(&doc["avatar"]).unwrap().unwrap();
    assert_eq!(reference.content_type, "image/png");
    assert_eq!(reference.size, avatar.len() as u64);
    assert_eq!(h.resources.blob(&reference.resource_id).as_deref(), Some(&avatar[..]));

    let options = FetchOptions::new().with_cache_policy(CachePolicy::Online);
    let fetched = h.store.fetch(&RecordId::new("u1"), &options).unwrap();
    assert_eq!(fetched.get("name"), Some(&Value::from("Alice")));
    assert_eq!(fetched.get("avatar"), Some(&Value::Bytes(avatar)));
    assert!(fetched.metadata().is_some());
}

#[test]
fn stored_payload_never_holds_resource_bytes() {
    let h = harness(LinkedStoreConfig::default());
    h.store
        .save(
            Record::with_id("u1")
                .with("avatar", png(b"a"))
                .with("coverPhoto", vec![0u8, 1, 2, 3]),
        )
        .unwrap();

    assert!(!stored_has_bytes(&h.records, "u1"));
    let doc = h.records.stored(&RecordId::new("u1")).unwrap().decode().unwrap();
    assert!(doc.contains_key("cover_photo"));
    assert!(!doc.contains_key("coverPhoto"));
}

#[test]
fn mapped_resource_round_trips_under_host_name() {
    let h = harness(LinkedStoreConfig::default());
    h.store
        .save(Record::with_id("u1").with("coverPhoto", vec![9u8; 64]))
        .unwrap();

    let fetched = h
        .store
        .fetch(
            &RecordId::new("u1"),
            &FetchOptions::new().with_cache_policy(CachePolicy::Online),
        )
        .unwrap();
    assert_eq!(fetched.get("coverPhoto"), Some(&Value::Bytes(vec![9u8; 64])));
    assert!(fetched.get("cover_photo").is_none());
}

#[test]
fn upload_failure_writes_nothing() {
    let h = harness(LinkedStoreConfig::default());
    let avatar = png(b"rejected");
    h.resources.fail_uploads_of(avatar.clone());

    let err = h
        .store
        .save(Record::with_id("u1").with("name", "Alice").with("avatar", avatar))
        .unwrap_err();

    assert!(matches!(err, LinkError::ResourceUpload { .. }));
    assert_eq!(h.records.save_count(), 0);
    assert!(h.records.is_empty());
}

#[test]
fn disconnected_resource_service_is_retryable() {
    let h = harness(LinkedStoreConfig::default());
    h.resources.set_connected(false);

    let err = h
        .store
        .save(Record::with_id("u1").with("avatar", png(b"x")))
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(h.records.save_count(), 0);
}

#[test]
fn cancelled_upload_writes_nothing() {
    let h = harness(LinkedStoreConfig::default());
    h.resources.set_cancelled(true);

    let err = h
        .store
        .save(Record::with_id("u1").with("name", "Alice").with("avatar", png(b"c")))
        .unwrap_err();

    assert!(matches!(
        err,
        LinkError::ResourceUpload {
            source: ResourceError::Cancelled,
            ..
        }
    ));
    assert!(err.is_cancelled());
    assert!(!err.is_retryable());
    assert_eq!(h.records.save_count(), 0);
}

#[test]
fn cancelled_record_fetch() {
    let h = harness(LinkedStoreConfig::default());
    h.store.save(Record::with_id("u1").with("name", "Alice")).unwrap();
    h.records.set_cancelled(true);

    let err = h
        .store
        .fetch(&RecordId::new("u1"), &FetchOptions::new())
        .unwrap_err();

    assert!(matches!(
        err,
        LinkError::RecordFetch {
            source: StoreError::Cancelled,
            ..
        }
    ));
    assert!(err.is_cancelled());
}

#[test]
fn online_fetch_against_disconnected_store() {
    let h = harness(LinkedStoreConfig::default());
    h.store.save(Record::with_id("u1").with("avatar", png(b"o"))).unwrap();
    h.records.set_connected(false);

    let err = h
        .store
        .fetch(
            &RecordId::new("u1"),
            &FetchOptions::new().with_cache_policy(CachePolicy::Online),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        LinkError::RecordFetch {
            ref record_id,
            source: StoreError::Offline,
        } if record_id == "u1"
    ));
    assert!(err.is_retryable());
    assert!(!err.is_cancelled());
    assert_eq!(h.resources.download_count(), 0);
}

#[test]
fn empty_resource_round_trip() {
    let h = harness(LinkedStoreConfig::default());
    h.store
        .save(Record::with_id("u1").with("avatar", Vec::<u8>::new()))
        .unwrap();

    let fetched = h
        .store
        .fetch(
            &RecordId::new("u1"),
            &FetchOptions::new().with_cache_policy(CachePolicy::Online),
        )
        .unwrap();
    assert_eq!(fetched.get("avatar"), Some(&Value::Bytes(vec![])));
    assert!(!stored_has_bytes(&h.records, "u1"));
    assert_eq!(h.resources.upload_count(), 0);
}

#[test]
fn back_to_back_saves_keep_latest_link() {
    let h = harness(LinkedStoreConfig::default());
    let id = RecordId::new("u1");

    h.store.save(Record::with_id("u1").with("avatar", png(b"one"))).unwrap();
    let first = h.store.linked_reference(&id, "avatar").unwrap();
    h.store.save(Record::with_id("u1").with("avatar", png(b"two"))).unwrap();
    let second = h.store.linked_reference(&id, "avatar").unwrap();

    assert_ne!(first.resource_id, second.resource_id);
    assert_eq!(h.store.link_count(), 1);

    let doc = h.records.stored(&id).unwrap().decode().unwrap();
    let stored = ResourceReference::from_value(&doc["avatar"]).unwrap().unwrap();
    assert_eq!(stored.resource_id, second.resource_id);
}

fn broken_download(on_missing: OnResourceMissing) -> Result<Record, LinkError> {
    let h = harness(LinkedStoreConfig::default().with_cache_resources(false));
    h.store
        .save(Record::with_id("u1").with("name", "Alice").with("avatar", png(b"gone")))
        .unwrap();
    let reference = h
        .store
        .linked_reference(&RecordId::new("u1"), "avatar")
        .unwrap();
    h.resources.delete(&reference.resource_id);

    h.store.fetch(
        &RecordId::new("u1"),
        &FetchOptions::new().with_on_resource_missing(on_missing),
    )
}

#[test]
fn missing_resource_fails_fetch() {
    let err = broken_download(OnResourceMissing::Fail).unwrap_err();
    assert!(matches!(
        err,
        LinkError::ResourceFetch {
            ref property,
            source: ResourceError::NotFound(_),
            ..
        } if property == "avatar"
    ));
}

#[test]
fn missing_resource_nulls_property() {
    let record = broken_download(OnResourceMissing::Null).unwrap();
    assert_eq!(record.get("avatar"), Some(&Value::Null));
    assert_eq!(record.get("name"), Some(&Value::from("Alice")));
}

#[test]
fn missing_resource_leaves_reference() {
    let record = broken_download(OnResourceMissing::LeaveReference).unwrap();
    let value = record.get("avatar").unwrap();
    assert!(ResourceReference::is_reference(value));
}

#[test]
fn configured_default_applies_without_override() {
    let h = harness(
        LinkedStoreConfig::default()
            .with_cache_resources(false)
            .with_on_resource_missing(OnResourceMissing::Null),
    );
    h.store.save(Record::with_id("u1").with("avatar", png(b"z"))).unwrap();
    h.resources.set_connected(false);

    let record = h.store.fetch(&RecordId::new("u1"), &FetchOptions::new()).unwrap();
    assert_eq!(record.get("avatar"), Some(&Value::Null));
    assert_eq!(h.store.stats().unresolved_resources, 1);
}

#[test]
fn offline_fetch_served_from_link_table() {
    let h = harness(LinkedStoreConfig::default());
    let avatar = png(b"offline");
    h.store.save(Record::with_id("u1").with("avatar", avatar.clone())).unwrap();

    h.records.set_connected(false);
    h.resources.set_connected(false);

    let record = h
        .store
        .fetch(
            &RecordId::new("u1"),
            &FetchOptions::new().with_cache_policy(CachePolicy::Offline),
        )
        .unwrap();
    assert_eq!(record.get("avatar"), Some(&Value::Bytes(avatar)));
    assert_eq!(h.resources.download_count(), 0);
    assert_eq!(h.records.fetch_count(), 1);
}

#[test]
fn network_first_refreshes_then_falls_back() {
    let h = harness(LinkedStoreConfig::default().with_cache_policy(CachePolicy::NetworkFirst));
    let avatar = png(b"nf");
    h.store.save(Record::with_id("u1").with("avatar", avatar.clone())).unwrap();

    h.store.fetch(&RecordId::new("u1"), &FetchOptions::new()).unwrap();
    assert_eq!(h.resources.download_count(), 1);

    h.resources.set_connected(false);
    let record = h.store.fetch(&RecordId::new("u1"), &FetchOptions::new()).unwrap();
    assert_eq!(record.get("avatar"), Some(&Value::Bytes(avatar)));
}

#[test]
fn unchanged_resource_skips_upload() {
    let h = harness(LinkedStoreConfig::default());
    let avatar = png(b"same");

    h.store
        .save(Record::with_id("u1").with("name", "A").with("avatar", avatar.clone()))
        .unwrap();
    h.store
        .save(Record::with_id("u1").with("name", "B").with("avatar", avatar))
        .unwrap();

    assert_eq!(h.resources.upload_count(), 1);
    assert_eq!(h.records.save_count(), 2);
    assert_eq!(h.store.stats().uploads_skipped, 1);
}

#[test]
fn remove_drops_links_but_not_resources() {
    let h = harness(LinkedStoreConfig::default());
    h.store.save(Record::with_id("u1").with("avatar", png(b"r"))).unwrap();
    let reference = h
        .store
        .linked_reference(&RecordId::new("u1"), "avatar")
        .unwrap();

    h.store.remove(&RecordId::new("u1")).unwrap();

    assert!(h.store.linked_reference(&RecordId::new("u1"), "avatar").is_none());
    assert!(h.resources.contains(&reference.resource_id));
    assert!(matches!(
        h.store.fetch(&RecordId::new("u1"), &FetchOptions::new()),
        Err(LinkError::RecordNotFound(_))
    ));
}

#[test]
fn concurrent_saves_and_fetches_never_see_raw_bytes() {
    let h = Arc::new(harness(LinkedStoreConfig::default().with_max_concurrent_uploads(2)));

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let h = Arc::clone(&h);
            thread::spawn(move || {
                for i in 0..20u8 {
                    let id = format!("w{w}");
                    h.store
                        .save(
                            Record::with_id(id.as_str())
                                .with("avatar", png(&[w as u8, i]))
                                .with("coverPhoto", vec![i; 8]),
                        )
                        .unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|w| {
            let h = Arc::clone(&h);
            thread::spawn(move || {
                let id = RecordId::new(format!("w{w}"));
                for _ in 0..20 {
                    match h.store.fetch(&id, &FetchOptions::new()) {
                        Ok(record) => {
                            let avatar = record.get("avatar").unwrap();
                            assert!(avatar.as_bytes().is_some());
                            assert!(!ResourceReference::is_reference(avatar));
                        }
                        Err(LinkError::RecordNotFound(_)) => {}
                        Err(other) => panic!("unexpected fetch error: {other}"),
                    }
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    for w in 0..4 {
        assert!(!stored_has_bytes(&h.records, &format!("w{w}")));
    }
    assert_eq!(h.store.link_count(), 8);
}
