//! Directory traversal and key derivation
//!
//! Walks a local tree top-down (files of a directory before its
//! subdirectories, entries sorted by name) and computes the destination key
//! of every visible file.

use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Separator between key segments in the object store
pub const KEY_SEPARATOR: char = '/';

/// One file scheduled for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpload {
    pub path: PathBuf,
    pub key: String,
}

/// Hidden files (leading `.`) are never uploaded.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Join key segments with `/`, dropping empty segments and redundant
/// separators.
///
/// ```
/// use s3_uploadr::upload::directory::join_key;
///
/// assert_eq!(join_key(["backups/", "", "2024//logs", "a.txt"]), "backups/2024/logs/a.txt");
/// assert_eq!(join_key(["", "a.txt"]), "a.txt");
/// ```
pub fn join_key<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    segments
        .into_iter()
        .flat_map(|segment| segment.split(KEY_SEPARATOR))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Key segments for `dir` relative to `root`, independent of the platform
/// path separator.
fn relative_segments(root: &Path, dir: &Path) -> Vec<String> {
    let Ok(relative) = dir.strip_prefix(root) else {
        return Vec::new();
    };

    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// Destination key for `name` found in `dir` while uploading `root`.
///
/// With `keep_structure` the directory layout below `root` is mirrored under
/// `prefix`; without it every file lands directly under `prefix`.
pub fn derive_key(root: &Path, dir: &Path, name: &str, prefix: &str, keep_structure: bool) -> String {
    if !keep_structure {
        return join_key([prefix, name]);
    }

    let relative = relative_segments(root, dir);
    join_key(
        std::iter::once(prefix)
            .chain(relative.iter().map(String::as_str))
            .chain(std::iter::once(name)),
    )
}

/// Walk `root` and plan the upload of every visible regular file.
///
/// Symlinks to files are followed, symlinked directories are not descended.
/// Hidden directories are still walked; only hidden files are skipped.
/// Directories that cannot be read (including a missing `root`) are logged
/// and skipped, so the rest of the tree is still planned.
///
/// Blocking; run it off the async executor.
pub fn plan_directory(root: &Path, prefix: &str, keep_structure: bool) -> Vec<PlannedUpload> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by(|a, b| {
            // Files of a directory come before its subdirectories.
            a.file_type()
                .is_dir()
                .cmp(&b.file_type().is_dir())
                .then_with(|| a.file_name().cmp(b.file_name()))
        });

    let mut planned = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(
                    path = ?e.path(),
                    error = %e,
                    "Skipping unreadable directory entry"
                );
                continue;
            }
        };

        if entry.depth() == 0 || entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let is_file = if entry.path_is_symlink() {
            // Broken links are not regular files.
            fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
        } else {
            entry.file_type().is_file()
        };
        if !is_file {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if is_hidden(&name) {
            tracing::debug!(path = %path.display(), "Skipping hidden file");
            continue;
        }

        let dir = path.parent().unwrap_or(root);
        let key = derive_key(root, dir, &name, prefix, keep_structure);
        planned.push(PlannedUpload {
            path: path.to_path_buf(),
            key,
        });
    }

    planned
}
