//! Error types for the linked store and its collaborators.

use linkstore_codec::CodecError;
use thiserror::Error;

/// Result type for linked store operations.
pub type LinkResult<T> = Result<T, LinkError>;

/// Result type for resource service operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced to callers of [`crate::LinkedStore`].
///
/// None of these are retried internally; [`LinkError::is_retryable`] tells
/// the caller whether trying again might help.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Bad record shape or schema. Raised before any network call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Uploading a resource-backed property failed; nothing was persisted.
    #[error("failed to upload resource for property {property:?}: {source}")]
    ResourceUpload {
        /// Host name of the property being uploaded.
        property: String,
        /// Underlying resource service error.
        #[source]
        source: ResourceError,
    },

    /// Downloading a linked resource failed.
    #[error("failed to fetch resource {resource_id} for property {property:?}: {source}")]
    ResourceFetch {
        /// Host name of the property being resolved.
        property: String,
        /// Identifier of the resource.
        resource_id: String,
        /// Underlying resource service error.
        #[source]
        source: ResourceError,
    },

    /// The record store rejected a write or delete.
    #[error("failed to persist record {record_id}: {source}")]
    RecordPersist {
        /// Record being written.
        record_id: String,
        /// Underlying record store error.
        #[source]
        source: StoreError,
    },

    /// The record store failed to return a record.
    #[error("failed to fetch record {record_id}: {source}")]
    RecordFetch {
        /// Record being read.
        record_id: String,
        /// Underlying record store error.
        #[source]
        source: StoreError,
    },

    /// The record does not exist in the record store.
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// The serialized form could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl LinkError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns true if the failing collaborator reported a transient error.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::ResourceUpload { source, .. } | LinkError::ResourceFetch { source, .. } => {
                source.is_retryable()
            }
            LinkError::RecordPersist { source, .. } | LinkError::RecordFetch { source, .. } => {
                source.is_retryable()
            }
            _ => false,
        }
    }

    /// Returns true if the operation failed because a collaborator call was cancelled.
    pub fn is_cancelled(&self) -> bool {
        match self {
            LinkError::ResourceUpload { source, .. } | LinkError::ResourceFetch { source, .. } => {
                matches!(source, ResourceError::Cancelled)
            }
            LinkError::RecordPersist { source, .. } | LinkError::RecordFetch { source, .. } => {
                matches!(source, StoreError::Cancelled)
            }
            _ => false,
        }
    }
}

/// Errors reported by a [`crate::ResourceService`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// No resource with this identifier exists.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The service refused the payload.
    #[error("resource rejected: {0}")]
    Rejected(String),

    /// The resource is not cached locally and the cache policy forbids the network.
    #[error("resource {0} is not available offline")]
    Offline(String),

    /// The downloaded payload does not match the reference.
    #[error("resource size mismatch: expected {expected} bytes, got {actual}")]
    Corrupt {
        /// Size recorded in the reference.
        expected: u64,
        /// Size actually received.
        actual: u64,
    },

    /// The call was cancelled by the caller.
    #[error("resource operation cancelled")]
    Cancelled,
}

impl ResourceError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ResourceError::Transport { retryable, .. } => *retryable,
            ResourceError::Corrupt { .. } => true,
            _ => false,
        }
    }
}

/// Errors reported by a [`crate::RecordStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record with this identifier exists.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The policy requires the backend but the store is offline.
    #[error("record store is offline")]
    Offline,

    /// The backend returned an error.
    #[error("backend error: {message}")]
    Backend {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The call was cancelled by the caller.
    #[error("record store operation cancelled")]
    Cancelled,
}

impl StoreError {
    /// Creates a retryable backend error.
    pub fn backend_retryable(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable backend error.
    pub fn backend_fatal(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Backend { retryable, .. } => *retryable,
            StoreError::Offline => true,
            _ => false,
        }
    }
}
