//! S3 backend
//!
//! [`StorageBackend`] implementation on top of the AWS Rust SDK. Works with
//! AWS itself and with S3-compatible services (MinIO, RustFS, R2, ...) via a
//! custom endpoint and path-style addressing.
//!
//! # Example
//!
//! ```no_run
//! use s3_uploadr::backend::S3Backend;
//! use s3_uploadr::config::{S3Config, UploadConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let s3 = S3Config {
//!     endpoint: Some("http://localhost:9000".into()),
//!     force_path_style: true,
//!     access_key: Some("minioadmin".into()),
//!     secret_key: Some("minioadmin".into()),
//!     ..S3Config::default()
//! };
//! let backend = S3Backend::new(&s3, UploadConfig::default()).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Uploads
//!
//! | Operation | Span Name | Notes |
//! |-----------|-----------|-------|
//! | HeadBucket | `s3.head_bucket` | existence probe |
//! | PutObject | `s3.put_object` | payloads and files below the multipart threshold |
//! | Multipart | `s3.multipart` | parts uploaded concurrently, aborted on failure |

use super::multipart::{effective_part_size, plan_parts, CompletedPart};
use super::{BackendError, StorageBackend, UploadReceipt};
use crate::config::{S3Config, UploadConfig};
use crate::progress::ProgressSink;
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::task::JoinSet;

/// S3 storage backend
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: Client,
    upload: UploadConfig,
}

impl S3Backend {
    /// Build a backend from configuration.
    ///
    /// Static credentials are used when both keys are configured, otherwise
    /// the default AWS provider chain (env, profile, IMDS, ...) applies.
    pub async fn new(s3: &S3Config, upload: UploadConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(s3.region.clone()))
            .retry_config(RetryConfig::standard().with_max_attempts(s3.max_attempts.max(1)));

        if let Some(ref endpoint) = s3.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        if let (Some(access_key), Some(secret_key)) = (&s3.access_key, &s3.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "s3-uploadr-static",
            ));
        }

        let sdk_config = loader.load().await;
        let client_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(s3.force_path_style)
            .build();

        tracing::debug!(
            region = %s3.region,
            endpoint = ?s3.endpoint,
            path_style = s3.force_path_style,
            "S3 client configured"
        );

        Self::with_client(Client::from_conf(client_config), upload)
    }

    /// Wrap an already configured SDK client
    pub fn with_client(client: Client, upload: UploadConfig) -> Self {
        Self { client, upload }
    }

    async fn put_file_single(
        &self,
        bucket: &str,
        path: &Path,
        key: &str,
        size: u64,
        progress: &dyn ProgressSink,
    ) -> Result<UploadReceipt, BackendError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| BackendError::Io(io::Error::other(e)))?;

        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(map_sdk_error)?;

        progress.on_bytes_transferred(size);

        Ok(UploadReceipt {
            key: key.to_string(),
            etag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
            bytes: size,
        })
    }

    #[tracing::instrument(
        name = "s3.multipart",
        skip(self, progress),
        fields(s3.bucket = %bucket, s3.key = %key, upload.bytes = size),
        err
    )]
    async fn put_file_multipart(
        &self,
        bucket: &str,
        path: &Path,
        key: &str,
        size: u64,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<UploadReceipt, BackendError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| {
                BackendError::Transport("CreateMultipartUpload returned no upload id".into())
            })?
            .to_string();

        let parts = match self
            .upload_parts(bucket, path, key, &upload_id, size, progress)
            .await
        {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(
                    upload_id = %upload_id,
                    error = %e,
                    "Part upload failed, aborting multipart upload"
                );
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        upload_id = %upload_id,
                        error = %DisplayErrorContext(&abort_err),
                        "AbortMultipartUpload failed"
                    );
                }
                return Err(e);
            }
        };

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .iter()
                    .map(|p| {
                        S3CompletedPart::builder()
                            .part_number(p.part_number)
                            .e_tag(&p.etag)
                            .build()
                    })
                    .collect(),
            ))
            .build();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(map_sdk_error)?;

        tracing::info!(
            upload_id = %upload_id,
            parts = parts.len(),
            "Completed multipart upload"
        );

        Ok(UploadReceipt {
            key: key.to_string(),
            etag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
            bytes: size,
        })
    }

    /// Upload every part, at most `concurrent_parts` in flight.
    /// Returns the parts sorted by part number.
    async fn upload_parts(
        &self,
        bucket: &str,
        path: &Path,
        key: &str,
        upload_id: &str,
        size: u64,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Vec<CompletedPart>, BackendError> {
        let part_size = effective_part_size(size, self.upload.part_size);
        let concurrency = self.upload.concurrent_parts.max(1);
        let mut pending = plan_parts(size, part_size).into_iter();
        let mut tasks = JoinSet::new();
        let mut parts = Vec::new();

        loop {
            while tasks.len() < concurrency {
                let Some(range) = pending.next() else {
                    break;
                };
                let client = self.client.clone();
                let bucket = bucket.to_string();
                let key = key.to_string();
                let upload_id = upload_id.to_string();
                let path: PathBuf = path.to_path_buf();
                let progress = Arc::clone(&progress);

                tasks.spawn(async move {
                    let data = read_part(&path, range.offset, range.len).await?;
                    let output = client
                        .upload_part()
                        .bucket(bucket)
                        .key(key)
                        .upload_id(upload_id)
                        .part_number(range.part_number)
                        .body(ByteStream::from(data))
                        .send()
                        .await
                        .map_err(map_sdk_error)?;

                    progress.on_bytes_transferred(range.len as u64);

                    tracing::debug!(
                        part_number = range.part_number,
                        size = range.len,
                        "Uploaded part"
                    );

                    Ok::<_, BackendError>(CompletedPart {
                        part_number: range.part_number,
                        etag: output.e_tag().unwrap_or_default().to_string(),
                    })
                });
            }

            // Dropping the JoinSet on error aborts the parts still in flight.
            match tasks.join_next().await {
                Some(joined) => {
                    let part = joined
                        .map_err(|e| BackendError::Transport(format!("part task failed: {e}")))??;
                    parts.push(part);
                }
                None => break,
            }
        }

        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }
}

async fn read_part(path: &Path, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Map an SDK failure onto the backend taxonomy.
///
/// Only service errors (the store answered with an error response) become
/// [`BackendError::Client`]; everything else is a transport failure.
pub(crate) fn map_sdk_error<E>(err: SdkError<E>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::ServiceError(service) => {
            let inner = service.err();
            BackendError::Client {
                status: service.raw().status().as_u16(),
                code: inner.code().map(str::to_string),
                message: inner
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| inner.to_string()),
            }
        }
        _ => BackendError::Transport(DisplayErrorContext(&err).to_string()),
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    #[tracing::instrument(name = "s3.head_bucket", skip(self), fields(s3.bucket = %bucket))]
    async fn head_bucket(&self, bucket: &str) -> Result<(), BackendError> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(map_sdk_error)
    }

    #[tracing::instrument(
        name = "s3.put_object",
        skip(self, body),
        fields(s3.bucket = %bucket, s3.key = %key, upload.bytes = body.len()),
        err
    )]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
    ) -> Result<UploadReceipt, BackendError> {
        let bytes = body.len() as u64;
        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(UploadReceipt {
            key: key.to_string(),
            etag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
            bytes,
        })
    }

    /// Files below `multipart_threshold` go up in one PutObject and report
    /// their size in a single callback once the PUT succeeds. Larger files
    /// report each part as it completes, from the part's worker task.
    async fn put_file(
        &self,
        bucket: &str,
        path: &Path,
        key: &str,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<UploadReceipt, BackendError> {
        let size = tokio::fs::metadata(path).await?.len();

        if size == 0 || size < self.upload.multipart_threshold as u64 {
            self.put_file_single(bucket, path, key, size, progress.as_ref())
                .await
        } else {
            self.put_file_multipart(bucket, path, key, size, progress)
                .await
        }
    }
}
