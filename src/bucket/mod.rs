//! Bucket resolution
//!
//! Resolves a bucket name to a [`BucketHandle`] and probes whether the bucket
//! exists. The probe outcome is kept as an explicit [`BucketStatus`] and only
//! collapsed to a boolean by [`BucketResolver::resolve`].

use crate::backend::{BackendError, StorageBackend, UploadReceipt, STATUS_NOT_FOUND};
use crate::metrics;
use crate::progress::ProgressSink;
use crate::upload::UploadError;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;

/// Reference to a bucket on a backend. Does not prove the bucket exists.
#[derive(Clone)]
pub struct BucketHandle {
    name: String,
    backend: Arc<dyn StorageBackend>,
}

impl BucketHandle {
    pub fn new(name: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// PUT an in-memory payload into this bucket
    pub async fn put_object(&self, key: &str, body: Bytes) -> Result<UploadReceipt, BackendError> {
        self.backend.put_object(&self.name, key, body).await
    }

    /// Upload a local file into this bucket
    pub async fn put_file(
        &self,
        path: &Path,
        key: &str,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<UploadReceipt, BackendError> {
        self.backend.put_file(&self.name, path, key, progress).await
    }
}

impl std::fmt::Debug for BucketHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Outcome of a bucket existence probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketStatus {
    Exists,
    /// The store answered 404
    NotFound { status: u16 },
    /// The store answered with another client error (403, 301, ...)
    Inaccessible { status: u16, code: Option<String> },
}

impl BucketStatus {
    pub fn exists(&self) -> bool {
        matches!(self, BucketStatus::Exists)
    }

    /// Status code carried by a failed probe
    pub fn status_code(&self) -> Option<u16> {
        match self {
            BucketStatus::Exists => None,
            BucketStatus::NotFound { status } | BucketStatus::Inaccessible { status, .. } => {
                Some(*status)
            }
        }
    }
}

/// Resolves bucket names and checks that they exist
#[derive(Clone)]
pub struct BucketResolver {
    backend: Arc<dyn StorageBackend>,
    should_raise: bool,
}

impl BucketResolver {
    /// Create a resolver.
    ///
    /// With `should_raise` set, any client error from the probe fails with
    /// [`UploadError::BucketNotFound`] instead of reporting `exists = false`.
    pub fn new(backend: Arc<dyn StorageBackend>, should_raise: bool) -> Self {
        Self {
            backend,
            should_raise,
        }
    }

    /// Probe a bucket and return the uncollapsed outcome.
    ///
    /// Errors that are not client errors (transport, I/O) propagate.
    pub async fn status(&self, bucket: &str) -> Result<(BucketHandle, BucketStatus), UploadError> {
        if bucket.is_empty() {
            return Err(UploadError::InvalidArgument("bucket"));
        }

        let handle = BucketHandle::new(bucket, Arc::clone(&self.backend));

        let status = match self.backend.head_bucket(bucket).await {
            Ok(()) => BucketStatus::Exists,
            Err(BackendError::Client { status, .. }) if status == STATUS_NOT_FOUND => {
                BucketStatus::NotFound { status }
            }
            Err(BackendError::Client { status, code, .. }) => {
                BucketStatus::Inaccessible { status, code }
            }
            Err(e) => {
                metrics::record_bucket_probe("error");
                tracing::error!(bucket = %bucket, error = %e, "Bucket probe failed");
                return Err(UploadError::Backend(e));
            }
        };

        metrics::record_bucket_probe(match status {
            BucketStatus::Exists => "exists",
            BucketStatus::NotFound { .. } => "not_found",
            BucketStatus::Inaccessible { .. } => "inaccessible",
        });
        tracing::debug!(bucket = %bucket, status = ?status, "Probed bucket");

        Ok((handle, status))
    }

    /// Resolve a bucket to a handle and whether it exists.
    ///
    /// - probe succeeds: `exists = true`
    /// - any client error with `should_raise`: [`UploadError::BucketNotFound`]
    /// - 404 otherwise: `exists = false`
    /// - other client errors otherwise: [`UploadError::BucketInaccessible`]
    pub async fn resolve(&self, bucket: &str) -> Result<(BucketHandle, bool), UploadError> {
        let (handle, status) = self.status(bucket).await?;

        match status {
            BucketStatus::Exists => Ok((handle, true)),
            BucketStatus::NotFound { status } | BucketStatus::Inaccessible { status, .. }
                if self.should_raise =>
            {
                Err(UploadError::BucketNotFound {
                    bucket: bucket.to_string(),
                    status,
                })
            }
            BucketStatus::NotFound { .. } => {
                tracing::warn!(bucket = %bucket, "Bucket does not exist, skipping upload");
                Ok((handle, false))
            }
            BucketStatus::Inaccessible { status, code } => Err(UploadError::BucketInaccessible {
                bucket: bucket.to_string(),
                status,
                code,
            }),
        }
    }
}
