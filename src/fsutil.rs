// src/fsutil.rs

//! Filesystem helpers shared by the commit and abort engines

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Path of the backup file that preserves a target during the commit window
pub fn backup_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".filesafe");
    PathBuf::from(name)
}

/// Rename `source` onto `target`.
///
/// With `recursive` set, missing parent directories of `target` are created
/// first, and parent directories of `source` left empty by the move are
/// pruned afterwards. Pruning is best-effort and stops at the first
/// non-empty ancestor.
pub fn rename(source: &Path, target: &Path, recursive: bool) -> io::Result<()> {
    if recursive
        && let Some(parent) = target.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)?;
    }
    fs::rename(source, target)?;
    if recursive && let Some(parent) = source.parent() {
        prune_empty_dirs(parent);
    }
    Ok(())
}

/// Remove `dir` and then each of its ancestors while they are empty.
fn prune_empty_dirs(dir: &Path) {
    let mut current = Some(dir);
    while let Some(dir) = current {
        if dir.as_os_str().is_empty() || fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}

/// True when `err` reports a cross-filesystem rename
pub fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/d/greeting")),
            PathBuf::from("/d/greeting.filesafe")
        );
    }

    #[test]
    fn test_plain_rename() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::write(&src, "payload").unwrap();

        rename(&src, &dst, false).unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "payload");
    }

    #[test]
    fn test_plain_rename_fails_without_parent() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("missing").join("dst");
        fs::write(&src, "payload").unwrap();

        assert!(rename(&src, &dst, false).is_err());
        assert!(src.exists());
    }

    #[test]
    fn test_recursive_rename_creates_parents() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("a").join("b").join("dst");
        fs::write(&src, "payload").unwrap();

        rename(&src, &dst, true).unwrap();

        assert_eq!(fs::read_to_string(&dst).unwrap(), "payload");
    }

    #[test]
    fn test_recursive_rename_prunes_empty_source_dirs() {
        let dir = TempDir::new().unwrap();
        // Keep a sibling so pruning stops at the temp dir root.
        fs::write(dir.path().join("keep"), "").unwrap();

        let src_dir = dir.path().join("a").join("b");
        fs::create_dir_all(&src_dir).unwrap();
        let src = src_dir.join("src");
        fs::write(&src, "payload").unwrap();
        let dst = dir.path().join("dst");

        rename(&src, &dst, true).unwrap();

        assert!(!src_dir.exists());
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().exists());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "payload");
    }

    #[test]
    fn test_recursive_rename_keeps_nonempty_source_dirs() {
        let dir = TempDir::new().unwrap();
        let src_dir = dir.path().join("a");
        fs::create_dir_all(&src_dir).unwrap();
        fs::write(src_dir.join("other"), "").unwrap();
        let src = src_dir.join("src");
        fs::write(&src, "payload").unwrap();
        let dst = dir.path().join("dst");

        rename(&src, &dst, true).unwrap();

        assert!(src_dir.exists());
        assert!(src_dir.join("other").exists());
    }
}
