//! # LinkStore Testkit
//!
//! Test utilities for LinkStore.
//!
//! This crate provides:
//! - A linked store harness backed by the in-memory collaborators
//! - Sample payloads and schemas
//! - Property-based test generators using proptest
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust
//! use linkstore_testkit::prelude::*;
//!
//! with_linked_store(|h| {
//!     h.save(Record::with_id("u1").with("avatar", png_bytes(b"x"))).unwrap();
//!     assert_eq!(h.resources.upload_count(), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use linkstore_core::{
        CachePolicy, FetchOptions, LinkError, LinkedStoreConfig, OnResourceMissing, Record,
        RecordId, ResourceReference, Value,
    };
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
