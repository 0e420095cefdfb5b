//! Transfer progress reporting
//!
//! A [`ProgressSink`] receives byte-count deltas while a file is uploaded.
//! The backend may call it from several worker threads at once, so the
//! reporter keeps its counter and output behind a single lock.

use parking_lot::Mutex;
use std::io::{self, Write};
use std::path::Path;

/// Receiver of transfer progress for one file
pub trait ProgressSink: Send + Sync {
    /// Called with the number of bytes transferred since the previous call
    fn on_bytes_transferred(&self, bytes: u64);
}

/// Sink used when progress reporting is off
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_bytes_transferred(&self, _bytes: u64) {}
}

struct ProgressState {
    seen: u64,
    out: Box<dyn Write + Send>,
}

/// Progress reporter writing an overwritable status line
///
/// Each update prints `\r<file>  <seen> / <size>  (<pct>%)`.
pub struct ProgressReporter {
    filename: String,
    size: u64,
    state: Mutex<ProgressState>,
}

impl ProgressReporter {
    /// Reporter for a local file, sized from its current length on disk.
    /// Writes to stdout.
    pub async fn for_file(path: &Path) -> io::Result<Self> {
        Self::for_file_with_writer(path, io::stdout()).await
    }

    pub async fn for_file_with_writer(
        path: &Path,
        out: impl Write + Send + 'static,
    ) -> io::Result<Self> {
        let size = tokio::fs::metadata(path).await?.len();
        Ok(Self::with_writer(path.display().to_string(), size, out))
    }

    pub fn with_writer(
        filename: impl Into<String>,
        size: u64,
        out: impl Write + Send + 'static,
    ) -> Self {
        Self {
            filename: filename.into(),
            size,
            state: Mutex::new(ProgressState {
                seen: 0,
                out: Box::new(out),
            }),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Total size fixed at construction
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes reported so far
    pub fn seen(&self) -> u64 {
        self.state.lock().seen
    }

    /// Current completion percentage
    pub fn percentage(&self) -> f64 {
        percentage(self.state.lock().seen, self.size)
    }
}

/// Empty files count as complete.
fn percentage(seen: u64, size: u64) -> f64 {
    if size == 0 {
        return 100.0;
    }
    (seen as f64 / size as f64) * 100.0
}

impl ProgressSink for ProgressReporter {
    fn on_bytes_transferred(&self, bytes: u64) {
        let mut state = self.state.lock();
        state.seen += bytes;
        let seen = state.seen;
        let pct = percentage(seen, self.size);

        // Output failures must never fail the transfer.
        let _ = write!(
            state.out,
            "\r{}  {} / {}  ({:.2}%)",
            self.filename, seen, self.size, pct
        );
        let _ = state.out.flush();
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("filename", &self.filename)
            .field("size", &self.size)
            .field("seen", &self.seen())
            .finish()
    }
}
