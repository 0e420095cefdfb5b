//! Common test infrastructure
//!
//! Provides a recording in-memory [`StorageBackend`] for uploader tests:
//! - Simulate missing or inaccessible buckets
//! - Fail uploads for chosen keys
//! - Inspect what was attempted and what landed
//! - Fire progress callbacks from several threads like a multipart transfer

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use s3_uploadr::{BackendError, ProgressSink, StorageBackend, UploadReceipt};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Internal state, grouped for a single lock
#[derive(Default)]
struct RecordingState {
    /// Status answered by `head_bucket`; `None` means the bucket exists
    bucket_status: Option<u16>,
    /// Answer `head_bucket` with a transport failure
    probe_transport_error: bool,
    head_calls: usize,
    /// Keys in the order uploads were attempted
    attempted: Vec<String>,
    /// Stored objects (key -> content)
    objects: HashMap<String, Vec<u8>>,
    fail_keys: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct RecordingBackend {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose bucket probe answers with `status`
    pub fn with_bucket_status(status: u16) -> Self {
        let backend = Self::new();
        backend.state.lock().unwrap().bucket_status = Some(status);
        backend
    }

    pub fn with_probe_transport_error() -> Self {
        let backend = Self::new();
        backend.state.lock().unwrap().probe_transport_error = true;
        backend
    }

    /// Make upload fail for a specific key
    pub fn fail_upload_for(&self, key: impl Into<String>) {
        self.state.lock().unwrap().fail_keys.insert(key.into());
    }

    pub fn head_calls(&self) -> usize {
        self.state.lock().unwrap().head_calls
    }

    pub fn attempted(&self) -> Vec<String> {
        self.state.lock().unwrap().attempted.clone()
    }

    pub fn transfer_calls(&self) -> usize {
        self.state.lock().unwrap().attempted.len()
    }

    pub fn was_uploaded(&self, key: &str) -> bool {
        self.state.lock().unwrap().objects.contains_key(key)
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().unwrap().objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn content(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    fn record(&self, key: &str, content: Vec<u8>) -> Result<UploadReceipt, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.attempted.push(key.to_string());

        if state.fail_keys.contains(key) {
            return Err(BackendError::Client {
                status: 500,
                code: Some("InternalError".into()),
                message: format!("Mock upload failure for key: {key}"),
            });
        }

        let bytes = content.len() as u64;
        state.objects.insert(key.to_string(), content);

        Ok(UploadReceipt {
            key: key.to_string(),
            etag: Some(format!("\"etag-{key}\"")),
            version_id: None,
            bytes,
        })
    }
}

#[async_trait]
impl StorageBackend for RecordingBackend {
    async fn head_bucket(&self, _bucket: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.head_calls += 1;

        if state.probe_transport_error {
            return Err(BackendError::Transport("dispatch failure".into()));
        }

        match state.bucket_status {
            None => Ok(()),
            Some(status) => Err(BackendError::client(status, "probe failed")),
        }
    }

    async fn put_object(
        &self,
        _bucket: &str,
        key: &str,
        body: Bytes,
    ) -> Result<UploadReceipt, BackendError> {
        self.record(key, body.to_vec())
    }

    async fn put_file(
        &self,
        _bucket: &str,
        path: &Path,
        key: &str,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<UploadReceipt, BackendError> {
        let content = fs::read(path)?;

        // Report the file in small chunks from several threads at once.
        std::thread::scope(|s| {
            for chunk in content.chunks(4) {
                let progress = Arc::clone(&progress);
                let len = chunk.len() as u64;
                s.spawn(move || progress.on_bytes_transferred(len));
            }
        });

        self.record(key, content)
    }
}

/// Sink that only counts bytes
#[derive(Default)]
pub struct CountingSink {
    bytes: std::sync::atomic::AtomicU64,
    calls: std::sync::atomic::AtomicUsize,
}

impl CountingSink {
    pub fn bytes(&self) -> u64 {
        self.bytes.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl ProgressSink for CountingSink {
    fn on_bytes_transferred(&self, bytes: u64) {
        self.bytes
            .fetch_add(bytes, std::sync::atomic::Ordering::SeqCst);
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

/// Writer that keeps everything in a shared buffer
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Write `relative` under `root`, creating parent directories
pub fn write_file(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}
