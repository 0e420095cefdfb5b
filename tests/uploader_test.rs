//! Uploader Integration Tests
//!
//! Exercises object, file and directory uploads against a recording backend.
//!
//! ## Test Coverage
//!
//! - Argument validation happens before any backend call
//! - Missing buckets turn every operation into a no-op (or an error with should_raise)
//! - Key derivation for single files and directory trees
//! - Hidden file filtering and flat-layout collisions
//! - A failing file aborts the rest of a directory upload

mod common;

use common::{write_file, RecordingBackend, SharedBuf};
use s3_uploadr::{BackendError, UploadError, Uploader};
use std::sync::Arc;
use tempfile::TempDir;

fn uploader(backend: &RecordingBackend, should_raise: bool) -> Uploader {
    Uploader::new(Arc::new(backend.clone()), should_raise, false)
}

// ========================================================================
// TEST: Argument Validation
// ========================================================================

#[tokio::test]
async fn test_empty_arguments_fail_before_backend_calls() {
    let backend = RecordingBackend::new();
    let uploader = uploader(&backend, true);

    let cases = vec![
        uploader.upload_object("", "x", "k").await.map(|_| ()),
        uploader.upload_object("b", "x", "").await.map(|_| ()),
        uploader.upload_file("", "/tmp/a.txt", None).await.map(|_| ()),
        uploader.upload_file("b", "", None).await.map(|_| ()),
        uploader.upload_directory("", "/tmp", None, true).await.map(|_| ()),
        uploader.upload_directory("b", "", None, true).await.map(|_| ()),
    ];

    for result in cases {
        assert!(matches!(result, Err(UploadError::InvalidArgument(_))));
    }
    assert_eq!(backend.head_calls(), 0);
    assert_eq!(backend.transfer_calls(), 0);
}

// ========================================================================
// TEST: Missing Buckets
// ========================================================================

#[tokio::test]
async fn test_missing_bucket_makes_no_transfers() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "a.txt", b"alpha");

    let backend = RecordingBackend::with_bucket_status(404);
    let uploader = uploader(&backend, false);

    assert!(uploader
        .upload_object("gone", "payload", "k")
        .await
        .unwrap()
        .is_none());
    assert!(uploader
        .upload_file("gone", tmp.path().join("a.txt"), None)
        .await
        .unwrap()
        .is_none());
    assert!(uploader
        .upload_directory("gone", tmp.path(), Some("p"), true)
        .await
        .unwrap()
        .is_none());

    assert_eq!(backend.head_calls(), 3);
    assert_eq!(backend.transfer_calls(), 0);
}

#[tokio::test]
async fn test_missing_bucket_raises_when_configured() {
    let backend = RecordingBackend::with_bucket_status(404);
    let uploader = uploader(&backend, true);

    let err = uploader
        .upload_object("gone", "payload", "k")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        UploadError::BucketNotFound { ref bucket, status: 404 } if bucket == "gone"
    ));
    assert_eq!(backend.transfer_calls(), 0);
}

#[tokio::test]
async fn test_forbidden_bucket_surfaces_status() {
    let backend = RecordingBackend::with_bucket_status(403);
    let uploader = uploader(&backend, false);

    let err = uploader
        .upload_object("locked", "payload", "k")
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::BucketInaccessible { status: 403, .. }));
    assert_eq!(backend.transfer_calls(), 0);
}

#[tokio::test]
async fn test_probe_transport_error_propagates() {
    let backend = RecordingBackend::with_probe_transport_error();
    let uploader = uploader(&backend, false);

    let err = uploader
        .upload_object("b", "payload", "k")
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Backend(BackendError::Transport(_))));
}

// ========================================================================
// TEST: Object and File Uploads
// ========================================================================

#[tokio::test]
async fn test_upload_object_stores_payload() {
    let backend = RecordingBackend::new();
    let uploader = uploader(&backend, false);

    let receipt = uploader
        .upload_object("b", b"hello world".to_vec(), "greetings/hello.txt")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(receipt.key, "greetings/hello.txt");
    assert_eq!(receipt.bytes, 11);
    assert_eq!(
        backend.content("greetings/hello.txt").unwrap(),
        b"hello world"
    );
}

#[tokio::test]
async fn test_upload_file_uses_base_name() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "a/b/report.csv", b"id,value\n1,2\n");

    let backend = RecordingBackend::new();
    let uploader = uploader(&backend, false);

    let receipt = uploader
        .upload_file("b", tmp.path().join("a/b/report.csv"), None)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(receipt.key, "report.csv");
    assert_eq!(backend.uploaded_keys(), vec!["report.csv"]);
}

#[tokio::test]
async fn test_upload_file_explicit_key() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "report.csv", b"data");

    let backend = RecordingBackend::new();
    let uploader = uploader(&backend, false);

    uploader
        .upload_file("b", tmp.path().join("report.csv"), Some("archive/2024.csv"))
        .await
        .unwrap();

    assert!(backend.was_uploaded("archive/2024.csv"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_verbose_upload_file_reports_full_size() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "big.bin", &[7u8; 4096]);

    let backend = RecordingBackend::new();
    let out = SharedBuf::default();
    let writer = out.clone();
    let uploader =
        Uploader::new(Arc::new(backend.clone()), false, false).with_progress_writer(move || writer.clone());
    assert!(uploader.verbose());

    let receipt = uploader
        .upload_file("b", tmp.path().join("big.bin"), None)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(receipt.bytes, 4096);

    let text = out.text();
    let lines: Vec<&str> = text.split('\r').filter(|l| !l.is_empty()).collect();
    // One line per 4-byte callback, sized from the file on disk.
    assert_eq!(lines.len(), 1024);
    assert!(lines.iter().all(|l| l.contains(" / 4096  (")));
    assert!(text.ends_with("big.bin  4096 / 4096  (100.00%)"));
}

#[tokio::test]
async fn test_verbose_directory_upload_reports_each_file() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "a.txt", b"aaaa");
    write_file(tmp.path(), "sub/b.txt", b"bbbbbbbb");

    let backend = RecordingBackend::new();
    let out = SharedBuf::default();
    let writer = out.clone();
    let uploader =
        Uploader::new(Arc::new(backend.clone()), false, false).with_progress_writer(move || writer.clone());

    uploader
        .upload_directory("b", tmp.path(), None, true)
        .await
        .unwrap();

    let text = out.text();
    assert!(text.contains("a.txt  4 / 4  (100.00%)"));
    assert!(text.ends_with("b.txt  8 / 8  (100.00%)"));
}

#[tokio::test]
async fn test_verbose_upload_of_missing_file_fails_locally() {
    let tmp = TempDir::new().unwrap();
    let backend = RecordingBackend::new();
    let uploader = Uploader::new(Arc::new(backend.clone()), false, true);

    let err = uploader
        .upload_file("b", tmp.path().join("nope.bin"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Io(_)));
    assert_eq!(backend.transfer_calls(), 0);
}

// ========================================================================
// TEST: Directory Uploads
// ========================================================================

#[tokio::test]
async fn test_directory_keep_structure() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "top.txt", b"top");
    write_file(tmp.path(), "sub/x.txt", b"x");

    let backend = RecordingBackend::new();
    let uploader = uploader(&backend, false);

    let summary = uploader
        .upload_directory("b", tmp.path(), Some("p"), true)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(summary.keys().collect::<Vec<_>>(), vec!["p/top.txt", "p/sub/x.txt"]);
    assert_eq!(summary.total_bytes(), 4);
    assert_eq!(backend.content("p/sub/x.txt").unwrap(), b"x");
}

#[tokio::test]
async fn test_directory_flat_layout() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "sub/x.txt", b"x");

    let backend = RecordingBackend::new();
    let uploader = uploader(&backend, false);

    uploader
        .upload_directory("b", tmp.path(), Some("p"), false)
        .await
        .unwrap();

    assert_eq!(backend.uploaded_keys(), vec!["p/x.txt"]);
}

#[tokio::test]
async fn test_directory_without_prefix_lands_at_root() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "sub/x.txt", b"x");

    let backend = RecordingBackend::new();
    let uploader = uploader(&backend, false);

    uploader
        .upload_directory("b", tmp.path(), None, true)
        .await
        .unwrap();

    assert_eq!(backend.uploaded_keys(), vec!["sub/x.txt"]);
}

#[tokio::test]
async fn test_directory_skips_hidden_files() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), ".env", b"SECRET=1");
    write_file(tmp.path(), "config.yaml", b"a: 1");

    let backend = RecordingBackend::new();
    let uploader = uploader(&backend, false);

    let summary = uploader
        .upload_directory("b", tmp.path(), None, true)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(summary.len(), 1);
    assert!(backend.was_uploaded("config.yaml"));
    assert!(!backend.was_uploaded(".env"));
    assert_eq!(backend.attempted(), vec!["config.yaml"]);
}

#[tokio::test]
async fn test_directory_flat_collision_overwrites() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "one/report.csv", b"first");
    write_file(tmp.path(), "two/report.csv", b"second");

    let backend = RecordingBackend::new();
    let uploader = uploader(&backend, false);

    uploader
        .upload_directory("b", tmp.path(), Some("p"), false)
        .await
        .unwrap();

    assert_eq!(backend.attempted().len(), 2);
    assert_eq!(backend.uploaded_keys(), vec!["p/report.csv"]);
    assert_eq!(backend.content("p/report.csv").unwrap(), b"second");
}

#[tokio::test]
async fn test_directory_failure_stops_traversal() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "a.txt", b"a");
    write_file(tmp.path(), "b.txt", b"b");
    write_file(tmp.path(), "c.txt", b"c");

    let backend = RecordingBackend::new();
    backend.fail_upload_for("b.txt");
    let uploader = uploader(&backend, false);

    let err = uploader
        .upload_directory("b", tmp.path(), None, true)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        UploadError::Backend(BackendError::Client { status: 500, .. })
    ));
    assert_eq!(backend.attempted(), vec!["a.txt", "b.txt"]);
    assert_eq!(backend.uploaded_keys(), vec!["a.txt"]);
    assert!(!backend.was_uploaded("c.txt"));
}

#[tokio::test]
async fn test_directory_missing_root_uploads_nothing() {
    let tmp = TempDir::new().unwrap();
    let backend = RecordingBackend::new();
    let uploader = uploader(&backend, false);

    let summary = uploader
        .upload_directory("b", tmp.path().join("missing"), None, true)
        .await
        .unwrap()
        .unwrap();

    assert!(summary.is_empty());
    assert_eq!(backend.head_calls(), 1);
    assert_eq!(backend.transfer_calls(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_directory_unreadable_subdirectory_is_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "a.txt", b"a");
    write_file(tmp.path(), "locked/secret.txt", b"s");
    write_file(tmp.path(), "open/b.txt", b"b");

    let locked = tmp.path().join("locked");
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
    // Root ignores directory permissions.
    let still_readable = std::fs::read_dir(&locked).is_ok();

    let backend = RecordingBackend::new();
    let uploader = uploader(&backend, false);
    let result = uploader
        .upload_directory("b", tmp.path(), None, true)
        .await;
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

    let summary = result.unwrap().unwrap();
    if still_readable {
        assert_eq!(summary.len(), 3);
    } else {
        assert_eq!(
            summary.keys().collect::<Vec<_>>(),
            vec!["a.txt", "open/b.txt"]
        );
        assert!(!backend.was_uploaded("locked/secret.txt"));
    }
    assert!(backend.was_uploaded("a.txt"));
    assert!(backend.was_uploaded("open/b.txt"));
}
