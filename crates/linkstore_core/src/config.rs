//! Configuration for the linked store.

use serde::{Deserialize, Serialize};

use crate::store::CachePolicy;

/// What a fetch does when a linked resource cannot be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnResourceMissing {
    /// Abort the whole fetch with a resource fetch error.
    #[default]
    Fail,
    /// Return the record with the reference left in place of the bytes.
    LeaveReference,
    /// Return the record with the property set to null.
    Null,
}

/// Configuration for a [`crate::LinkedStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LinkedStoreConfig {
    /// Policy passed to the record store and used for resource cache validity.
    pub cache_policy: CachePolicy,
    /// Default handling of unobtainable resources on fetch.
    pub on_resource_missing: OnResourceMissing,
    /// Maximum number of uploads running at once within a single save.
    pub max_concurrent_uploads: usize,
    /// Skip uploading bytes identical to what is already linked.
    pub reuse_unchanged_resources: bool,
    /// Keep local copies of resource bytes in the link table.
    pub cache_resources: bool,
    /// Largest accepted resource payload in bytes.
    pub max_resource_size: Option<u64>,
}

impl LinkedStoreConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self {
            cache_policy: CachePolicy::default(),
            on_resource_missing: OnResourceMissing::default(),
            max_concurrent_uploads: 4,
            reuse_unchanged_resources: true,
            cache_resources: true,
            max_resource_size: None,
        }
    }

    /// Sets the cache policy.
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Sets the default missing-resource handling.
    pub fn with_on_resource_missing(mut self, on_missing: OnResourceMissing) -> Self {
        self.on_resource_missing = on_missing;
        self
    }

    /// Sets the upload concurrency limit. Zero is treated as one.
    pub fn with_max_concurrent_uploads(mut self, limit: usize) -> Self {
        self.max_concurrent_uploads = limit;
        self
    }

    /// Enables or disables reuse of unchanged resources.
    pub fn with_reuse_unchanged_resources(mut self, reuse: bool) -> Self {
        self.reuse_unchanged_resources = reuse;
        self
    }

    /// Enables or disables local caching of resource bytes.
    pub fn with_cache_resources(mut self, cache: bool) -> Self {
        self.cache_resources = cache;
        self
    }

    /// Sets the maximum resource size.
    pub fn with_max_resource_size(mut self, limit: u64) -> Self {
        self.max_resource_size = Some(limit);
        self
    }

    pub(crate) fn upload_width(&self) -> usize {
        self.max_concurrent_uploads.max(1)
    }
}

impl Default for LinkedStoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-call options for [`crate::LinkedStore::fetch`].
///
/// Unset fields fall back to the store's [`LinkedStoreConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Missing-resource handling for this call.
    pub on_resource_missing: Option<OnResourceMissing>,
    /// Cache policy for this call.
    pub cache_policy: Option<CachePolicy>,
}

impl FetchOptions {
    /// Options that defer entirely to the store configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the missing-resource handling.
    pub fn with_on_resource_missing(mut self, on_missing: OnResourceMissing) -> Self {
        self.on_resource_missing = Some(on_missing);
        self
    }

    /// Sets the cache policy.
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = Some(policy);
        self
    }
}
