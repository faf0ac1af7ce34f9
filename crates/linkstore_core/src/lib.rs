//! # LinkStore Core
//!
//! Linked record and resource store.
//!
//! Records are persisted through a [`RecordStore`]; binary properties the
//! [`Schema`] marks as resource-backed are uploaded to a [`ResourceService`]
//! and replaced by a [`ResourceReference`] before the record is written.
//!
//! This crate provides:
//! - [`LinkedStore`], the save/fetch/remove orchestrator
//! - [`ResourceLinkTable`], the in-process map of record properties to linked resources
//! - The [`RecordStore`] and [`ResourceService`] traits plus in-memory implementations
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use linkstore_core::{
//!     FetchOptions, LinkedStore, LinkedStoreConfig, MemoryRecordStore,
//!     MemoryResourceService, Record, RecordId, Schema, Value,
//! };
//!
//! let schema = Schema::builder().inline("name").resource("avatar").build().unwrap();
//! let store = LinkedStore::new(
//!     LinkedStoreConfig::default(),
//!     schema,
//!     Arc::new(MemoryRecordStore::new()),
//!     Arc::new(MemoryResourceService::new()),
//! );
//!
//! store
//!     .save(Record::with_id("u1").with("name", "Alice").with("avatar", vec![1u8, 2, 3]))
//!     .unwrap();
//!
//! let fetched = store.fetch(&RecordId::new("u1"), &FetchOptions::new()).unwrap();
//! assert_eq!(fetched.get("avatar"), Some(&Value::Bytes(vec![1, 2, 3])));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod link_table;
mod linked;
mod mapping;
mod record;
mod reference;
mod resource;
mod schema;
mod store;

pub use config::{FetchOptions, LinkedStoreConfig, OnResourceMissing};
pub use error::{
    LinkError, LinkResult, ResourceError, ResourceResult, StoreError, StoreResult,
};
pub use link_table::{content_digest, ContentDigest, LinkEntry, LinkKey, ResourceLinkTable};
pub use linked::{LinkStats, LinkedStore};
pub use record::{
    is_reserved, Metadata, Record, RecordId, ID_FIELD, MAX_RECORD_ID_LEN, METADATA_FIELD,
    RESERVED_FIELDS,
};
pub use reference::{
    sniff_content_type, ResourceReference, DEFAULT_CONTENT_TYPE, REFERENCE_TYPE,
};
pub use resource::{MemoryResourceService, ResourceService, UploadedResource};
pub use schema::{PropertyKind, PropertySpec, Schema, SchemaBuilder};
pub use store::{CachePolicy, MemoryRecordStore, RecordStore};

pub use linkstore_codec::{CodecError, CodecResult, Document, SerializedRecord, Value};
