//! Linked store orchestrator.

use std::collections::HashMap;
use std::thread;
use std::time::SystemTime;

use bytes::Bytes;
use linkstore_codec::{SerializedRecord, Value};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::{FetchOptions, LinkedStoreConfig, OnResourceMissing};
use crate::error::{LinkError, LinkResult, ResourceError, ResourceResult, StoreError};
use crate::link_table::{content_digest, LinkEntry, LinkKey, ResourceLinkTable};
use crate::mapping;
use crate::record::{is_reserved, Record, RecordId};
use crate::reference::{sniff_content_type, ResourceReference, DEFAULT_CONTENT_TYPE};
use crate::resource::{ResourceService, UploadedResource};
use crate::schema::{PropertySpec, Schema};
use crate::store::{CachePolicy, RecordStore};

/// Counters describing what the linked store has done.
#[derive(Debug, Clone, Default)]
pub struct LinkStats {
    /// Successful saves.
    pub saves: u64,
    /// Successful fetches.
    pub fetches: u64,
    /// Successful removals.
    pub removals: u64,
    /// Resources uploaded.
    pub uploads: u64,
    /// Uploads skipped because the linked payload was unchanged.
    pub uploads_skipped: u64,
    /// Resources downloaded.
    pub downloads: u64,
    /// Resources served from the link table.
    pub cache_hits: u64,
    /// Resources returned unresolved or nulled on fetch.
    pub unresolved_resources: u64,
    /// Uploaded resources no persisted record references.
    pub orphaned_resources: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Outcome of planning one resource-backed property.
struct Linked {
    property: String,
    /// `None` writes null.
    reference: Option<ResourceReference>,
    payload: Option<Bytes>,
    /// Uploaded by the current save.
    fresh: bool,
}

impl Linked {
    fn empty(property: String) -> Self {
        Self {
            property,
            reference: None,
            payload: None,
            fresh: false,
        }
    }
}

struct UploadJob {
    property: String,
    content_type: String,
    bytes: Bytes,
}

enum Plan {
    Ready(Linked),
    Upload(UploadJob),
}

/// Saves and fetches records whose resource-backed properties live in a
/// separate resource service.
///
/// On save, resource bytes are uploaded first and replaced by references in
/// the serialized record; only then is the record persisted. On fetch, the
/// references are resolved back to bytes from the link table or the
/// resource service.
///
/// ## Guarantees
///
/// - A persisted record never contains raw bytes for a resource-backed property
/// - A failed upload means the record store is never written
/// - A fetch never hands back an unresolved reference unless the caller
///   asked for [`OnResourceMissing::LeaveReference`]
pub struct LinkedStore<R: RecordStore, S: ResourceService> {
    config: LinkedStoreConfig,
    schema: Schema,
    records: R,
    resources: S,
    links: ResourceLinkTable,
    stats: RwLock<LinkStats>,
}

impl<R: RecordStore, S: ResourceService> LinkedStore<R, S> {
    /// Creates a linked store for one record type.
    pub fn new(config: LinkedStoreConfig, schema: Schema, records: R, resources: S) -> Self {
        Self {
            config,
            schema,
            records,
            resources,
            links: ResourceLinkTable::new(),
            stats: RwLock::new(LinkStats::default()),
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &LinkedStoreConfig {
        &self.config
    }

    /// Gets the schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Gets the current stats.
    pub fn stats(&self) -> LinkStats {
        self.stats.read().clone()
    }

    /// Reference currently linked for a record property.
    pub fn linked_reference(&self, record_id: &RecordId, property: &str) -> Option<ResourceReference> {
        self.links.get(record_id, property).map(|entry| entry.reference)
    }

    /// Returns true if a local copy of the linked resource is held.
    pub fn has_local_copy(&self, record_id: &RecordId, property: &str) -> bool {
        self.links
            .get(record_id, property)
            .is_some_and(|entry| entry.local_bytes.is_some())
    }

    /// Number of link table entries across all records.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// References linked for every resource-backed property of a record,
    /// sorted by property.
    pub fn linked_resources(&self, record_id: &RecordId) -> Vec<(String, ResourceReference)> {
        self.links
            .entries_for_record(record_id)
            .into_iter()
            .map(|(property, entry)| (property, entry.reference))
            .collect()
    }

    /// Drops every locally cached resource copy and returns how many were
    /// dropped. Links and digests are kept, so unchanged payloads are still
    /// not uploaded again.
    pub fn clear_local_copies(&self) -> usize {
        let dropped = self.links.drop_local_copies();
        debug!(dropped, "local resource copies cleared");
        dropped
    }

    /// Forgets every link. The next save of each property uploads again and
    /// the next fetch downloads.
    pub fn clear_links(&self) {
        self.links.clear();
        debug!("link table cleared");
    }

    /// Saves a record, uploading its resource-backed properties first.
    ///
    /// Records without an id get a generated one. The returned record
    /// carries the id and metadata as persisted, with resource-backed
    /// properties holding the values the caller passed in.
    ///
    /// # Errors
    ///
    /// - [`LinkError::Validation`] before any network call
    /// - [`LinkError::ResourceUpload`] if any upload fails; nothing is persisted
    /// - [`LinkError::RecordPersist`] if the record store rejects the write;
    ///   resources uploaded by this call are left orphaned
    #[tracing::instrument(level = "debug", skip_all, fields(record_id = tracing::field::Empty))]
    pub fn save(&self, record: Record) -> LinkResult<Record> {
        let result = self.save_inner(record);
        self.track(result)
    }

    /// Fetches a record and resolves its resource-backed properties.
    ///
    /// # Errors
    ///
    /// - [`LinkError::RecordNotFound`] or [`LinkError::RecordFetch`] from the record store
    /// - [`LinkError::ResourceFetch`] if a resource cannot be obtained and the
    ///   effective [`OnResourceMissing`] is `Fail`
    #[tracing::instrument(level = "debug", skip_all, fields(record_id = %record_id))]
    pub fn fetch(&self, record_id: &RecordId, options: &FetchOptions) -> LinkResult<Record> {
        let result = self.fetch_inner(record_id, options);
        self.track(result)
    }

    /// Removes a record and drops its link table entries.
    ///
    /// Linked resources are not deleted from the resource service.
    #[tracing::instrument(level = "debug", skip_all, fields(record_id = %record_id))]
    pub fn remove(&self, record_id: &RecordId) -> LinkResult<()> {
        let result = self.remove_inner(record_id);
        self.track(result)
    }

    fn track<T>(&self, result: LinkResult<T>) -> LinkResult<T> {
        if let Err(e) = &result {
            self.stats.write().last_error = Some(e.to_string());
        }
        result
    }

    fn save_inner(&self, record: Record) -> LinkResult<Record> {
        let record_id = match record.id() {
            Some(id) => {
                id.validate()?;
                id.clone()
            }
            None => RecordId::generate(),
        };
        tracing::Span::current().record("record_id", record_id.as_str());
        self.validate_properties(&record)?;

        let mut linked = Vec::new();
        let mut jobs = Vec::new();
        for spec in self.schema.resource_properties() {
            if let Some(value) = record.get(&spec.host_name) {
                match self.plan(&record_id, spec, value)? {
                    Plan::Ready(ready) => linked.push(ready),
                    Plan::Upload(job) => jobs.push(job),
                }
            }
        }
        linked.extend(self.upload_all(&record_id, jobs)?);

        let replacements: HashMap<String, Value> = linked
            .iter()
            .map(|l| {
                let value = l
                    .reference
                    .as_ref()
                    .map_or(Value::Null, ResourceReference::to_value);
                (l.property.clone(), value)
            })
            .collect();
        let document = mapping::to_document(&record_id, &record, &self.schema, &replacements);

        let serialized = match SerializedRecord::encode(&document) {
            Ok(serialized) => serialized,
            Err(e) => {
                self.note_orphans(&record_id, &linked);
                return Err(e.into());
            }
        };
        let stored = match self
            .records
            .save(&record_id, &serialized, self.config.cache_policy)
        {
            Ok(stored) => stored,
            Err(source) => {
                self.note_orphans(&record_id, &linked);
                return Err(LinkError::RecordPersist {
                    record_id: record_id.to_string(),
                    source,
                });
            }
        };

        for item in &linked {
            self.link(&record_id, item);
        }

        let mut saved = mapping::from_document(stored.decode()?, &self.schema, &record_id)?;
        for item in &linked {
            if let Some(original) = record.get(&item.property) {
                saved.set(item.property.clone(), original.clone());
            }
        }

        let reused = linked
            .iter()
            .filter(|item| !item.fresh && item.payload.is_some())
            .count() as u64;
        {
            let mut stats = self.stats.write();
            stats.saves += 1;
            stats.uploads_skipped += reused;
        }
        debug!(resources = linked.len(), reused, "record saved");
        Ok(saved)
    }

    fn validate_properties(&self, record: &Record) -> LinkResult<()> {
        for (name, _) in record.properties() {
            if is_reserved(name) {
                return Err(LinkError::validation(format!(
                    "property name {name:?} is reserved"
                )));
            }
            if self.schema.property(name).is_none() && self.schema.host_name(name) != name {
                return Err(LinkError::validation(format!(
                    "property {name:?} collides with the backend field of {:?}",
                    self.schema.host_name(name)
                )));
            }
        }
        Ok(())
    }

    fn plan(&self, record_id: &RecordId, spec: &PropertySpec, value: &Value) -> LinkResult<Plan> {
        let property = spec.host_name.clone();
        match value {
            Value::Null => Ok(Plan::Ready(Linked::empty(property))),
            Value::Bytes(bytes) if bytes.is_empty() => {
                let content_type = spec.content_type().unwrap_or(DEFAULT_CONTENT_TYPE);
                Ok(Plan::Ready(Linked {
                    reference: Some(ResourceReference::empty(content_type, property.as_str())),
                    property,
                    payload: None,
                    fresh: false,
                }))
            }
            Value::Bytes(bytes) => {
                if let Some(limit) = self.config.max_resource_size {
                    if bytes.len() as u64 > limit {
                        return Err(LinkError::validation(format!(
                            "property {property:?} is {} bytes, limit is {limit}",
                            bytes.len()
                        )));
                    }
                }

                let content_type = spec
                    .content_type()
                    .unwrap_or_else(|| sniff_content_type(bytes))
                    .to_string();
                let payload = Bytes::copy_from_slice(bytes);

                if self.config.reuse_unchanged_resources {
                    let digest = content_digest(bytes);
                    let unchanged = self
                        .links
                        .get(record_id, &property)
                        .filter(|entry| entry.matches_payload(&digest, &content_type));
                    if let Some(entry) = unchanged {
                        debug!(
                            property = %property,
                            resource_id = %entry.reference.resource_id,
                            "payload unchanged, reusing linked resource"
                        );
                        return Ok(Plan::Ready(Linked {
                            property,
                            reference: Some(entry.reference),
                            payload: Some(payload),
                            fresh: false,
                        }));
                    }
                }

                Ok(Plan::Upload(UploadJob {
                    property,
                    content_type,
                    bytes: payload,
                }))
            }
            Value::Map(_) => {
                let reference = ResourceReference::from_value(value)
                    .map_err(|e| LinkError::validation(format!("property {property:?}: {e}")))?
                    .ok_or_else(|| {
                        LinkError::validation(format!(
                            "property {property:?} is resource-backed but holds a plain map"
                        ))
                    })?;
                Ok(Plan::Ready(Linked {
                    reference: Some(ResourceReference {
                        source_property: property.clone(),
                        ..reference
                    }),
                    property,
                    payload: None,
                    fresh: false,
                }))
            }
            other => Err(LinkError::validation(format!(
                "property {property:?} is resource-backed but holds {}",
                other.type_name()
            ))),
        }
    }

    /// Uploads in batches of `max_concurrent_uploads`. The first failure
    /// aborts the save; everything uploaded so far is reported as orphaned.
    fn upload_all(&self, record_id: &RecordId, jobs: Vec<UploadJob>) -> LinkResult<Vec<Linked>> {
        let mut done = Vec::with_capacity(jobs.len());

        for batch in jobs.chunks(self.config.upload_width()) {
            let mut failure = None;
            for (job, outcome) in batch.iter().zip(self.upload_batch(batch)) {
                match outcome {
                    Ok(uploaded) => {
                        debug!(
                            property = %job.property,
                            resource_id = %uploaded.resource_id,
                            size = uploaded.size,
                            "uploaded resource"
                        );
                        self.stats.write().uploads += 1;
                        done.push(Linked {
                            property: job.property.clone(),
                            reference: Some(ResourceReference::from_upload(uploaded, &job.property)),
                            payload: Some(job.bytes.clone()),
                            fresh: true,
                        });
                    }
                    Err(source) if failure.is_none() => {
                        failure = Some(LinkError::ResourceUpload {
                            property: job.property.clone(),
                            source,
                        });
                    }
                    Err(source) => {
                        warn!(property = %job.property, error = %source, "sibling upload also failed");
                    }
                }
            }

            if let Some(err) = failure {
                self.note_orphans(record_id, &done);
                return Err(err);
            }
        }

        Ok(done)
    }

    fn upload_batch(&self, batch: &[UploadJob]) -> Vec<ResourceResult<UploadedResource>> {
        if let [job] = batch {
            return vec![self.resources.upload(&job.bytes, &job.content_type)];
        }

        let resources = &self.resources;
        thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|job| scope.spawn(move || resources.upload(&job.bytes, &job.content_type)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(ResourceError::transport_fatal("upload worker panicked")))
                })
                .collect()
        })
    }

    fn note_orphans(&self, record_id: &RecordId, linked: &[Linked]) {
        let orphans: Vec<&str> = linked
            .iter()
            .filter(|l| l.fresh)
            .filter_map(|l| l.reference.as_ref())
            .map(|r| r.resource_id.as_str())
            .collect();
        if orphans.is_empty() {
            return;
        }

        warn!(
            record_id = %record_id,
            orphans = ?orphans,
            "save failed after upload, resources left orphaned"
        );
        self.stats.write().orphaned_resources += orphans.len() as u64;
    }

    fn link(&self, record_id: &RecordId, item: &Linked) {
        let Some(reference) = item.reference.clone().filter(|r| !r.is_empty_payload()) else {
            return;
        };

        let mut entry = LinkEntry::new(reference);
        match &item.payload {
            Some(bytes) => entry = entry.with_payload(bytes.clone(), self.config.cache_resources),
            None => {
                if let Some(previous) = self.links.get(record_id, &item.property) {
                    if previous.resource_id() == entry.resource_id() {
                        entry.digest = previous.digest;
                        entry.local_bytes = previous.local_bytes;
                    }
                }
            }
        }
        self.links
            .put(LinkKey::new(record_id.clone(), item.property.clone()), entry);
    }

    fn fetch_inner(&self, record_id: &RecordId, options: &FetchOptions) -> LinkResult<Record> {
        record_id.validate()?;
        let started = SystemTime::now();
        let policy = options.cache_policy.unwrap_or(self.config.cache_policy);
        let on_missing = options
            .on_resource_missing
            .unwrap_or(self.config.on_resource_missing);

        let serialized = self
            .records
            .fetch(record_id, policy)
            .map_err(|source| match source {
                StoreError::NotFound(_) => LinkError::RecordNotFound(record_id.to_string()),
                source => LinkError::RecordFetch {
                    record_id: record_id.to_string(),
                    source,
                },
            })?;
        let mut record = mapping::from_document(serialized.decode()?, &self.schema, record_id)?;

        for spec in self.schema.resource_properties() {
            let property = spec.host_name.as_str();
            let Some(value) = record.get(property) else {
                continue;
            };
            let reference = match ResourceReference::from_value(value)? {
                Some(reference) => reference,
                None => {
                    if value.as_bytes().is_some() {
                        warn!(property, "stored record holds raw bytes for a resource-backed property");
                    }
                    continue;
                }
            };
            if reference.is_empty_payload() {
                record.set(property, Value::Bytes(Vec::new()));
                continue;
            }

            match self.resolve(record_id, property, &reference, policy, started) {
                Ok(bytes) => {
                    record.set(property, Value::Bytes(bytes.to_vec()));
                }
                Err(source) => match on_missing {
                    OnResourceMissing::Fail => {
                        return Err(LinkError::ResourceFetch {
                            property: property.to_string(),
                            resource_id: reference.resource_id,
                            source,
                        });
                    }
                    OnResourceMissing::LeaveReference => {
                        warn!(property, error = %source, "leaving resource reference unresolved");
                        self.stats.write().unresolved_resources += 1;
                    }
                    OnResourceMissing::Null => {
                        warn!(property, error = %source, "resource unavailable, returning null");
                        self.stats.write().unresolved_resources += 1;
                        record.set(property, Value::Null);
                    }
                },
            }
        }

        self.stats.write().fetches += 1;
        Ok(record)
    }

    /// Obtains the bytes for a reference according to `policy`.
    ///
    /// `started` is when the fetch read the record; a link entry written by a
    /// save after that point is not replaced.
    fn resolve(
        &self,
        record_id: &RecordId,
        property: &str,
        reference: &ResourceReference,
        policy: CachePolicy,
        started: SystemTime,
    ) -> ResourceResult<Bytes> {
        let cached = self
            .links
            .get(record_id, property)
            .and_then(|entry| entry.cached_copy_of(&reference.resource_id));

        if policy.prefers_cache() {
            if let Some(bytes) = cached {
                debug!(property, resource_id = %reference.resource_id, "serving resource from link table");
                self.stats.write().cache_hits += 1;
                return Ok(bytes);
            }
        }
        if !policy.allows_network() {
            return Err(ResourceError::Offline(reference.resource_id.clone()));
        }

        match self.download(reference) {
            Ok(bytes) => {
                let entry = LinkEntry::new(reference.clone())
                    .with_payload(bytes.clone(), self.config.cache_resources);
                let key = LinkKey::new(record_id.clone(), property);
                if !self.links.refresh(key, entry, started) {
                    debug!(property, resource_id = %reference.resource_id, "newer link entry kept");
                }
                Ok(bytes)
            }
            Err(err) => match cached {
                Some(bytes) if policy.falls_back_to_cache() => {
                    warn!(
                        property,
                        resource_id = %reference.resource_id,
                        error = %err,
                        "download failed, serving cached copy"
                    );
                    self.stats.write().cache_hits += 1;
                    Ok(bytes)
                }
                _ => Err(err),
            },
        }
    }

    fn download(&self, reference: &ResourceReference) -> ResourceResult<Bytes> {
        let bytes = self.resources.download(&reference.resource_id)?;
        let actual = bytes.len() as u64;
        if actual != reference.size {
            return Err(ResourceError::Corrupt {
                expected: reference.size,
                actual,
            });
        }

        debug!(resource_id = %reference.resource_id, size = actual, "downloaded resource");
        self.stats.write().downloads += 1;
        Ok(Bytes::from(bytes))
    }

    fn remove_inner(&self, record_id: &RecordId) -> LinkResult<()> {
        record_id.validate()?;
        self.records
            .remove(record_id, self.config.cache_policy)
            .map_err(|source| match source {
                StoreError::NotFound(_) => LinkError::RecordNotFound(record_id.to_string()),
                source => LinkError::RecordPersist {
                    record_id: record_id.to_string(),
                    source,
                },
            })?;

        let dropped = self.links.delete_for_record(record_id);
        debug!(dropped, "record removed");
        self.stats.write().removals += 1;
        Ok(())
    }
}
