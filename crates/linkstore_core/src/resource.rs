//! Resource service abstraction.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::error::{ResourceError, ResourceResult};

/// What the resource service reports after storing a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedResource {
    /// Stable identifier of the stored blob.
    pub resource_id: String,
    /// Content type recorded by the service.
    pub content_type: String,
    /// Stored size in bytes.
    pub size: u64,
}

/// A resource service stores binary blobs out of band from records.
///
/// This trait abstracts the network client, allowing for different
/// implementations (HTTP, object storage, in-memory for testing, etc.).
/// Implementations must not retry internally.
pub trait ResourceService: Send + Sync {
    /// Uploads a blob and returns its identifier and content metadata.
    fn upload(&self, bytes: &[u8], content_type: &str) -> ResourceResult<UploadedResource>;

    /// Downloads a blob by identifier.
    fn download(&self, resource_id: &str) -> ResourceResult<Vec<u8>>;
}

impl<T: ResourceService + ?Sized> ResourceService for Arc<T> {
    fn upload(&self, bytes: &[u8], content_type: &str) -> ResourceResult<UploadedResource> {
        (**self).upload(bytes, content_type)
    }

    fn download(&self, resource_id: &str) -> ResourceResult<Vec<u8>> {
        (**self).download(resource_id)
    }
}

/// An in-memory resource service for testing.
///
/// Identifiers are assigned sequentially (`r1`, `r2`, ...). Failures can be
/// injected per payload or per resource id.
#[derive(Debug)]
pub struct MemoryResourceService {
    blobs: RwLock<HashMap<String, (String, Bytes)>>,
    next_id: AtomicU64,
    connected: AtomicBool,
    cancelled: AtomicBool,
    uploads: AtomicU64,
    downloads: AtomicU64,
    failing_payloads: Mutex<HashSet<Vec<u8>>>,
    failing_downloads: Mutex<HashSet<String>>,
}

impl MemoryResourceService {
    /// Creates an empty service.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(true),
            cancelled: AtomicBool::new(false),
            uploads: AtomicU64::new(0),
            downloads: AtomicU64::new(0),
            failing_payloads: Mutex::new(HashSet::new()),
            failing_downloads: Mutex::new(HashSet::new()),
        }
    }

    /// Sets the connected state. A disconnected service fails every call.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes every call fail with [`ResourceError::Cancelled`].
    pub fn set_cancelled(&self, cancelled: bool) {
        self.cancelled.store(cancelled, Ordering::SeqCst);
    }

    /// Makes uploads of exactly these bytes fail.
    pub fn fail_uploads_of(&self, payload: impl Into<Vec<u8>>) {
        self.failing_payloads.lock().insert(payload.into());
    }

    /// Makes downloads of this resource fail.
    pub fn fail_downloads_of(&self, resource_id: impl Into<String>) {
        self.failing_downloads.lock().insert(resource_id.into());
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.failing_payloads.lock().clear();
        self.failing_downloads.lock().clear();
    }

    /// Deletes a stored blob, as if removed on the server.
    pub fn delete(&self, resource_id: &str) -> bool {
        self.blobs.write().remove(resource_id).is_some()
    }

    /// Returns true if a blob with this id is stored.
    pub fn contains(&self, resource_id: &str) -> bool {
        self.blobs.read().contains_key(resource_id)
    }

    /// Returns the stored bytes of a blob.
    pub fn blob(&self, resource_id: &str) -> Option<Bytes> {
        self.blobs.read().get(resource_id).map(|(_, b)| b.clone())
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Number of successful uploads so far.
    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Number of successful downloads so far.
    pub fn download_count(&self) -> u64 {
        self.downloads.load(Ordering::SeqCst)
    }

    fn check_connected(&self) -> ResourceResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(ResourceError::Cancelled);
        }
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ResourceError::transport_retryable("resource service unreachable"))
        }
    }
}

impl Default for MemoryResourceService {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceService for MemoryResourceService {
    fn upload(&self, bytes: &[u8], content_type: &str) -> ResourceResult<UploadedResource> {
        self.check_connected()?;
        if self.failing_payloads.lock().contains(bytes) {
            return Err(ResourceError::Rejected("upload refused by test hook".into()));
        }

        let resource_id = format!("r{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.blobs.write().insert(
            resource_id.clone(),
            (content_type.to_string(), Bytes::copy_from_slice(bytes)),
        );
        self.uploads.fetch_add(1, Ordering::SeqCst);

        Ok(UploadedResource {
            resource_id,
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
        })
    }

    fn download(&self, resource_id: &str) -> ResourceResult<Vec<u8>> {
        self.check_connected()?;
        if self.failing_downloads.lock().contains(resource_id) {
            return Err(ResourceError::transport_fatal("download refused by test hook"));
        }

        let bytes = self
            .blobs
            .read()
            .get(resource_id)
            .map(|(_, b)| b.to_vec())
            .ok_or_else(|| ResourceError::NotFound(resource_id.to_string()))?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_then_download() {
        let service = MemoryResourceService::new();
        let uploaded = service.upload(b"payload", "text/plain").unwrap();

        assert_eq!(uploaded.resource_id, "r1");
        assert_eq!(uploaded.size, 7);
        assert_eq!(service.download("r1").unwrap(), b"payload");
        assert_eq!(service.upload_count(), 1);
        assert_eq!(service.download_count(), 1);
    }

    #[test]
    fn ids_are_sequential() {
        let service = MemoryResourceService::new();
        let a = service.upload(b"a", "text/plain").unwrap();
        let b = service.upload(b"b", "text/plain").unwrap();
        assert_eq!(a.resource_id, "r1");
        assert_eq!(b.resource_id, "r2");
        assert_eq!(service.len(), 2);
    }

    #[test]
    fn disconnected_service_fails() {
        let service = MemoryResourceService::new();
        service.set_connected(false);

        let err = service.upload(b"x", "text/plain").unwrap_err();
        assert!(err.is_retryable());
        assert!(service.is_empty());
    }

    #[test]
    fn injected_failures() {
        let service = MemoryResourceService::new();
        service.fail_uploads_of(b"bad".to_vec());
        assert!(matches!(
            service.upload(b"bad", "text/plain"),
            Err(ResourceError::Rejected(_))
        ));
        assert!(service.upload(b"good", "text/plain").is_ok());

        service.fail_downloads_of("r1");
        assert!(service.download("r1").is_err());
        service.clear_failures();
        assert_eq!(service.download("r1").unwrap(), b"good");
    }

    #[test]
    fn cancelled_calls() {
        let service = MemoryResourceService::new();
        service.set_cancelled(true);
        assert_eq!(service.upload(b"x", "text/plain"), Err(ResourceError::Cancelled));
        assert!(service.is_empty());

        service.set_cancelled(false);
        assert!(service.upload(b"x", "text/plain").is_ok());
    }

    #[test]
    fn missing_resource() {
        let service = MemoryResourceService::new();
        assert_eq!(
            service.download("nope"),
            Err(ResourceError::NotFound("nope".into()))
        );
    }

    #[test]
    fn shared_through_arc() {
        let service = Arc::new(MemoryResourceService::new());
        let shared: Arc<MemoryResourceService> = Arc::clone(&service);
        shared.upload(b"z", "text/plain").unwrap();
        assert!(service.contains("r1"));
        assert!(service.delete("r1"));
        assert!(!service.contains("r1"));
    }
}
