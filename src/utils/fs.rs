//! Publish-directory file operations.

use crate::error::BuildError;
use std::{
    fs::{self, File},
    path::Path,
};

/// Files to ignore during directory traversal
pub const IGNORED_FILES: &[&str] = &[".DS_Store", "Thumbs.db"];

/// Create `dir` and its parents if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), BuildError> {
    fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))
}

/// Check whether `dst` is an unchanged copy of `src`: same size and mtime.
pub fn is_up_to_date(src: &Path, dst: &Path) -> bool {
    let (Ok(src_meta), Ok(dst_meta)) = (src.metadata(), dst.metadata()) else {
        return false;
    };
    let (Ok(src_time), Ok(dst_time)) = (src_meta.modified(), dst_meta.modified()) else {
        return false;
    };
    src_meta.len() == dst_meta.len() && src_time == dst_time
}

/// Copy `src` to `dst`, carrying the source mtime over.
///
/// With `skip_unchanged`, an up-to-date destination is left alone.
/// Returns whether a copy happened.
pub fn copy_file(src: &Path, dst: &Path, skip_unchanged: bool) -> Result<bool, BuildError> {
    if skip_unchanged && is_up_to_date(src, dst) {
        return Ok(false);
    }
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }

    fs::copy(src, dst).map_err(|e| BuildError::io(src, e))?;
    let mtime = src
        .metadata()
        .and_then(|m| m.modified())
        .map_err(|e| BuildError::io(src, e))?;
    File::options()
        .write(true)
        .open(dst)
        .and_then(|f| f.set_modified(mtime))
        .map_err(|e| BuildError::io(dst, e))?;
    Ok(true)
}

/// Write rendered output, creating parent directories as needed.
pub fn write_output(dst: &Path, contents: &str) -> Result<(), BuildError> {
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    fs::write(dst, contents).map_err(|e| BuildError::io(dst, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[test]
    fn test_copy_then_skip_unchanged() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("logo.png");
        let dst = dir.path().join("pub/img/logo.png");
        fs::write(&src, b"\x89PNG").unwrap();

        assert!(copy_file(&src, &dst, true).unwrap());
        assert_eq!(fs::read(&dst).unwrap(), b"\x89PNG");
        assert!(is_up_to_date(&src, &dst));

        // second pass is a no-op
        assert!(!copy_file(&src, &dst, true).unwrap());
        // unless forced
        assert!(copy_file(&src, &dst, false).unwrap());
    }

    #[test]
    fn test_changed_mtime_triggers_copy() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&src, "same").unwrap();
        copy_file(&src, &dst, true).unwrap();

        let later = SystemTime::now() + Duration::from_secs(60);
        File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_modified(later)
            .unwrap();
        assert!(!is_up_to_date(&src, &dst));
        assert!(copy_file(&src, &dst, true).unwrap());
    }

    #[test]
    fn test_missing_source_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = copy_file(&dir.path().join("nope"), &dir.path().join("x"), true).unwrap_err();
        assert!(matches!(err, BuildError::Io { .. }));
    }

    #[test]
    fn test_write_output_creates_parents() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("a/b/c.html");
        write_output(&dst, "<p>hi</p>").unwrap();
        assert_eq!(fs::read_to_string(dst).unwrap(), "<p>hi</p>");
    }
}
