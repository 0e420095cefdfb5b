//! Upload module
//!
//! The [`Uploader`] front end: object, single-file and directory uploads.
//! Every operation resolves the bucket first; a bucket that does not exist
//! turns the operation into a no-op returning `Ok(None)`.

use crate::backend::{BackendError, S3Backend, StorageBackend, UploadReceipt};
use crate::bucket::{BucketHandle, BucketResolver};
use crate::config::Config;
use crate::metrics;
use crate::progress::{NoProgress, ProgressReporter, ProgressSink};
use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

pub mod directory;

pub use directory::{plan_directory, PlannedUpload};

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    /// A required argument (bucket, key or path) was empty
    #[error("Invalid argument: {0} must not be empty")]
    InvalidArgument(&'static str),

    #[error("Bucket '{bucket}' does not exist (status {status})")]
    BucketNotFound { bucket: String, status: u16 },

    #[error("Bucket '{bucket}' is not accessible (status {status})")]
    BucketInaccessible {
        bucket: String,
        status: u16,
        code: Option<String>,
    },

    #[error("Storage backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One file uploaded as part of a directory upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub receipt: UploadReceipt,
}

/// Summary of a completed directory upload, in upload order
#[derive(Debug, Clone, Default)]
pub struct DirectoryUpload {
    pub files: Vec<UploadedFile>,
}

impl DirectoryUpload {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Destination keys in upload order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.receipt.key.as_str())
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.receipt.bytes).sum()
    }
}

/// Uploads objects, files and directory trees into buckets
///
/// # Example
///
/// ```no_run
/// use s3_uploadr::backend::S3Backend;
/// use s3_uploadr::config::Config;
/// use s3_uploadr::Uploader;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let backend = S3Backend::new(&config.s3, config.upload.clone()).await;
/// let uploader = Uploader::new(Arc::new(backend), false, true);
///
/// if let Some(receipt) = uploader.upload_file("reports", "/tmp/report.csv", None).await? {
///     println!("uploaded {} ({:?})", receipt.key, receipt.etag);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Uploader {
    resolver: BucketResolver,
    verbose: bool,
    progress_out: Option<ProgressWriterFactory>,
}

/// Builds the output of one file's progress line
type ProgressWriterFactory = Arc<dyn Fn() -> Box<dyn Write + Send> + Send + Sync>;

impl Uploader {
    /// Create an uploader over `backend`.
    ///
    /// `should_raise` selects between `BucketNotFound` errors and silent
    /// no-ops for missing buckets. `verbose` attaches a [`ProgressReporter`]
    /// to every file upload.
    pub fn new(backend: Arc<dyn StorageBackend>, should_raise: bool, verbose: bool) -> Self {
        Self {
            resolver: BucketResolver::new(backend, should_raise),
            verbose,
            progress_out: None,
        }
    }

    /// Turn on progress reporting, writing each file's progress line to the
    /// writer returned by `make` instead of stdout.
    pub fn with_progress_writer<F, W>(mut self, make: F) -> Self
    where
        F: Fn() -> W + Send + Sync + 'static,
        W: Write + Send + 'static,
    {
        self.verbose = true;
        let factory: ProgressWriterFactory =
            Arc::new(move || Box::new(make()) as Box<dyn Write + Send>);
        self.progress_out = Some(factory);
        self
    }

    /// Build an uploader backed by S3 from configuration
    pub async fn from_config(config: &Config) -> Result<Self, UploadError> {
        let backend = S3Backend::new(&config.s3, config.upload.clone()).await;
        Ok(Self::new(
            Arc::new(backend),
            config.should_raise,
            config.verbose,
        ))
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// PUT an in-memory payload under `key`.
    ///
    /// Returns `Ok(None)` without any transfer when the bucket does not exist.
    #[tracing::instrument(
        name = "upload.object",
        skip(self, body),
        fields(s3.bucket = %bucket, s3.key = %key),
        err
    )]
    pub async fn upload_object(
        &self,
        bucket: &str,
        body: impl Into<Bytes>,
        key: &str,
    ) -> Result<Option<UploadReceipt>, UploadError> {
        if key.is_empty() {
            return Err(UploadError::InvalidArgument("key"));
        }

        let (handle, exists) = self.resolver.resolve(bucket).await?;
        if !exists {
            return Ok(None);
        }

        let body = body.into();
        let bytes = body.len() as u64;
        let start_time = Instant::now();

        match handle.put_object(key, body).await {
            Ok(receipt) => {
                metrics::record_upload_success("object", bytes);
                tracing::info!(
                    etag = ?receipt.etag,
                    bytes = bytes,
                    duration_ms = start_time.elapsed().as_millis(),
                    "Object upload completed"
                );
                Ok(Some(receipt))
            }
            Err(e) => {
                metrics::record_upload_failure("object");
                tracing::error!(error = %e, "Object upload failed");
                Err(e.into())
            }
        }
    }

    /// Upload a local file under `key`, or under its base name when `key` is
    /// `None`.
    ///
    /// Returns `Ok(None)` without any transfer when the bucket does not exist.
    #[tracing::instrument(
        name = "upload.file",
        skip(self, path),
        fields(s3.bucket = %bucket, path = %path.as_ref().display()),
        err
    )]
    pub async fn upload_file(
        &self,
        bucket: &str,
        path: impl AsRef<Path>,
        key: Option<&str>,
    ) -> Result<Option<UploadReceipt>, UploadError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(UploadError::InvalidArgument("path"));
        }

        let key = match key {
            Some(key) => key.to_string(),
            None => base_name(path).ok_or(UploadError::InvalidArgument("key"))?,
        };
        if key.is_empty() {
            return Err(UploadError::InvalidArgument("key"));
        }

        let (handle, exists) = self.resolver.resolve(bucket).await?;
        if !exists {
            return Ok(None);
        }

        self.transfer_file(&handle, path, &key).await.map(Some)
    }

    /// Upload every visible file below `path`.
    ///
    /// Keys are built from `prefix` (bucket root when `None`) and, with
    /// `keep_structure`, the file's directory relative to `path`. Files are
    /// uploaded one at a time; the first failure stops the upload and is
    /// returned. Unreadable directories are skipped with a warning, and a
    /// missing root uploads nothing. Returns `Ok(None)` without touching the
    /// filesystem when the bucket does not exist.
    #[tracing::instrument(
        name = "upload.directory",
        skip(self, path),
        fields(s3.bucket = %bucket, path = %path.as_ref().display()),
        err
    )]
    pub async fn upload_directory(
        &self,
        bucket: &str,
        path: impl AsRef<Path>,
        prefix: Option<&str>,
        keep_structure: bool,
    ) -> Result<Option<DirectoryUpload>, UploadError> {
        let root = path.as_ref();
        if root.as_os_str().is_empty() {
            return Err(UploadError::InvalidArgument("path"));
        }
        let prefix = prefix.unwrap_or("");

        let (handle, exists) = self.resolver.resolve(bucket).await?;
        if !exists {
            return Ok(None);
        }

        let planned = {
            let root = root.to_path_buf();
            let prefix = prefix.to_string();
            tokio::task::spawn_blocking(move || plan_directory(&root, &prefix, keep_structure))
                .await
                .map_err(std::io::Error::other)?
        };
        tracing::debug!(files = planned.len(), "Planned directory upload");

        let mut summary = DirectoryUpload::default();
        for PlannedUpload { path, key } in planned {
            let receipt = self.transfer_file(&handle, &path, &key).await?;
            summary.files.push(UploadedFile { path, receipt });
        }

        tracing::info!(
            files = summary.len(),
            bytes = summary.total_bytes(),
            "Directory upload completed"
        );

        Ok(Some(summary))
    }

    async fn transfer_file(
        &self,
        handle: &BucketHandle,
        path: &Path,
        key: &str,
    ) -> Result<UploadReceipt, UploadError> {
        let progress: Arc<dyn ProgressSink> = if self.verbose {
            let reporter = match &self.progress_out {
                Some(make) => ProgressReporter::for_file_with_writer(path, make()).await?,
                None => ProgressReporter::for_file(path).await?,
            };
            Arc::new(reporter)
        } else {
            Arc::new(NoProgress)
        };
        let start_time = Instant::now();

        match handle.put_file(path, key, progress).await {
            Ok(receipt) => {
                metrics::record_upload_success("file", receipt.bytes);
                tracing::info!(
                    key = %key,
                    etag = ?receipt.etag,
                    bytes = receipt.bytes,
                    duration_ms = start_time.elapsed().as_millis(),
                    "File upload completed"
                );
                Ok(receipt)
            }
            Err(e) => {
                metrics::record_upload_failure("file");
                tracing::error!(key = %key, path = %path.display(), error = %e, "File upload failed");
                Err(e.into())
            }
        }
    }
}

/// Last path component, if there is one
fn base_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}
