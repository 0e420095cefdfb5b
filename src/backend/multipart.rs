//! Multipart upload planning
//!
//! Splits a file into part ranges that satisfy the S3 multipart limits.

/// Minimum part size (5MB) - S3 requirement
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Maximum parts allowed
pub const MAX_PARTS: usize = 10000;

/// Byte range of one part inside the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    /// 1-based, as S3 expects
    pub part_number: i32,
    pub offset: u64,
    pub len: usize,
}

/// Completed part info
#[derive(Debug, Clone)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

/// Part size to use for a file of `file_size` bytes.
///
/// Never below [`MIN_PART_SIZE`], and large enough that the file fits in
/// [`MAX_PARTS`] parts.
pub fn effective_part_size(file_size: u64, configured: usize) -> usize {
    let floor = std::cmp::max(configured, MIN_PART_SIZE);
    let needed = file_size.div_ceil(MAX_PARTS as u64) as usize;
    std::cmp::max(floor, needed)
}

/// Split `file_size` bytes into consecutive parts of `part_size` bytes.
/// The last part carries the remainder.
pub fn plan_parts(file_size: u64, part_size: usize) -> Vec<PartRange> {
    let mut parts = Vec::new();
    let mut offset = 0u64;
    let mut part_number = 1;

    while offset < file_size {
        let len = std::cmp::min(part_size as u64, file_size - offset) as usize;
        parts.push(PartRange {
            part_number,
            offset,
            len,
        });
        offset += len as u64;
        part_number += 1;
    }

    parts
}
