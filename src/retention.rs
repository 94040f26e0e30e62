//! Retention sweep over the day-named log files.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

/// Parse a file name that is exactly a 13-digit day-boundary timestamp.
/// Anything else is not ours to touch.
pub(crate) fn parse_day_token(name: &str) -> Option<i64> {
    if name.len() == 13 && name.bytes().all(|b| b.is_ascii_digit()) {
        name.parse().ok()
    } else {
        None
    }
}

/// Delete direct children of `dir` whose day-token name is at or before
/// `cutoff_ms`. Returns how many files were removed. Failure to delete one
/// file does not abort the sweep.
pub fn sweep_expired(dir: &Path, cutoff_ms: i64) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("retention sweep cannot read {:?}: {}", dir, e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(day_ms) = parse_day_token(name) else {
            continue;
        };
        if day_ms > cutoff_ms {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("removed expired log file {}", name);
                removed += 1;
            }
            Err(e) => warn!("failed to remove expired log file {}: {}", name, e),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn touch(dir: &TempDir, name: &str) {
        fs::write(dir.path().join(name), b"x").unwrap();
    }

    #[test]
    fn test_parse_day_token() {
        assert_eq!(parse_day_token("1699999999999"), Some(1_699_999_999_999));
        assert_eq!(parse_day_token("notanumber"), None);
        assert_eq!(parse_day_token("169999999999"), None); // 12 digits
        assert_eq!(parse_day_token("16999999999990"), None); // 14 digits
        assert_eq!(parse_day_token("1699999999.99"), None);
        assert_eq!(parse_day_token(""), None);
    }

    #[test]
    fn test_expired_day_files_deleted() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "1600000000000"); // old
        touch(&dir, "1700000000000"); // at the cutoff, inclusive
        touch(&dir, "1800000000000"); // newer than cutoff

        let removed = sweep_expired(dir.path(), 1_700_000_000_000);
        assert_eq!(removed, 2);
        assert!(!dir.path().join("1600000000000").exists());
        assert!(!dir.path().join("1700000000000").exists());
        assert!(dir.path().join("1800000000000").exists());
    }

    #[test]
    fn test_non_token_names_untouched() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "notanumber");
        touch(&dir, "123"); // wrong digit count
        touch(&dir, "1600000000000.bak");

        let removed = sweep_expired(dir.path(), i64::MAX);
        assert_eq!(removed, 0);
        assert!(dir.path().join("notanumber").exists());
        assert!(dir.path().join("123").exists());
        assert!(dir.path().join("1600000000000.bak").exists());
    }

    #[test]
    fn test_missing_dir_is_nonfatal() {
        assert_eq!(sweep_expired(Path::new("/nonexistent/logpipe"), 0), 0);
    }
}
