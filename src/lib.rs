//! S3 Uploadr Library
//!
//! Small client-side helper for pushing data into S3-compatible buckets.
//!
//! # Features
//!
//! - **Object Upload**: Put an in-memory payload under a key
//! - **File Upload**: Upload a local file, deriving the key from its name
//! - **Directory Upload**: Walk a tree and upload every visible file under a prefix
//! - **Bucket Probe**: Check bucket existence before any transfer
//! - **Progress**: Per-file progress line, safe under concurrent part uploads
//!
//! # Example
//!
//! ```no_run
//! use s3_uploadr::{config::Config, Uploader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("uploadr.yaml")?;
//!     let uploader = Uploader::from_config(&config).await?;
//!
//!     uploader
//!         .upload_directory("my-bucket", "./site", Some("www"), true)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod bucket;
pub mod config;
pub mod metrics;
pub mod progress;
pub mod upload;

// Re-export commonly used types
pub use backend::{BackendError, StorageBackend, UploadReceipt};
pub use bucket::{BucketHandle, BucketResolver, BucketStatus};
pub use config::Config;
pub use progress::{NoProgress, ProgressReporter, ProgressSink};
pub use upload::{DirectoryUpload, UploadError, Uploader};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
