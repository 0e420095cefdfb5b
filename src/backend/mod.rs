//! Storage backend module
//!
//! The seam between the uploader and the object store. Everything that
//! touches the network (connection, signing, retries, multipart orchestration)
//! lives behind [`StorageBackend`].
//!
//! # Implementations
//!
//! - [`s3::S3Backend`] - AWS SDK backed, works with any S3-compatible endpoint
//! - `MockStorageBackend` - generated by `mockall` for unit tests

use crate::progress::ProgressSink;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub mod multipart;
pub mod s3;

pub use s3::S3Backend;

/// HTTP status the store answers with when a bucket does not exist
pub const STATUS_NOT_FOUND: u16 = 404;

/// Storage backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    /// The store answered with an error response carrying a status code
    #[error("Client error (status {status}): {message}")]
    Client {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The request never produced a response (DNS, TLS, timeout, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Build a client error from a bare status code
    pub fn client(status: u16, message: impl Into<String>) -> Self {
        Self::Client {
            status,
            code: None,
            message: message.into(),
        }
    }

    /// Status code of a client error, `None` for anything else
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Client { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Acknowledgment returned by the store for a completed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub key: String,
    pub etag: Option<String>,
    pub version_id: Option<String>,
    pub bytes: u64,
}

/// Object store operations used by the uploader
///
/// Implementations must be shareable across tasks. `put_file` may call the
/// progress sink from any thread, including several at once for one file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Metadata-only existence probe for a bucket
    async fn head_bucket(&self, bucket: &str) -> Result<(), BackendError>;

    /// Single PUT of an in-memory payload
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
    ) -> Result<UploadReceipt, BackendError>;

    /// Upload a local file, reporting transferred bytes to `progress`.
    ///
    /// The sink receives zero or more deltas. Their granularity is up to the
    /// implementation; a finished upload has reported the whole file size.
    async fn put_file(
        &self,
        bucket: &str,
        path: &Path,
        key: &str,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<UploadReceipt, BackendError>;
}
