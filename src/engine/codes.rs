//! Status codes returned by the log engine.
//!
//! Codes are small negative integers grouped by call family. Each family
//! has a dedicated link-failure code for engines whose entry points are
//! resolved dynamically and may be missing.

/// Init succeeded with an mmap-backed buffer.
pub const INIT_SUCCESS_MMAP: i32 = -1010;
/// Init succeeded with a heap-backed buffer.
pub const INIT_SUCCESS_MEMORY: i32 = -1020;
/// Init failed: no usable cache directory.
pub const INIT_FAIL_NOCACHE: i32 = -1030;
/// Init failed: allocation failure.
pub const INIT_FAIL_ALLOC: i32 = -1040;
/// Init failed: header corruption.
pub const INIT_FAIL_HEADER: i32 = -1050;
/// Init failed: engine entry point unreachable.
pub const INIT_FAIL_LINK: i32 = -1060;

pub const OPEN_SUCCESS: i32 = -2010;
pub const OPEN_FAIL_IO: i32 = -2020;
pub const OPEN_FAIL_COMPRESS: i32 = -2030;
pub const OPEN_FAIL_ALLOC: i32 = -2040;
/// Open attempted before init.
pub const OPEN_FAIL_NOINIT: i32 = -2050;
pub const OPEN_FAIL_HEADER: i32 = -2060;
pub const OPEN_FAIL_LINK: i32 = -2070;

pub const WRITE_SUCCESS: i32 = -4010;
/// Write failed: malformed parameters.
pub const WRITE_FAIL_PARAM: i32 = -4020;
/// Write failed: file reached its maximum size.
pub const WRITE_FAIL_MAXFILE: i32 = -4030;
pub const WRITE_FAIL_ALLOC: i32 = -4040;
pub const WRITE_FAIL_HEADER: i32 = -4050;
/// Write failed: engine entry point unreachable. Never deduplicated.
pub const WRITE_FAIL_LINK: i32 = -4060;

/// Whether a status code denotes success for its family.
pub fn is_success(code: i32) -> bool {
    matches!(
        code,
        INIT_SUCCESS_MMAP | INIT_SUCCESS_MEMORY | OPEN_SUCCESS | WRITE_SUCCESS
    ) || code >= 0
}
