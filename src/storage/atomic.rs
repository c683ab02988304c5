//! Atomic file writes
//!
//! Every persistent write in the store goes through this module: content is
//! written to a temporary file alongside the target, flushed and synced,
//! then renamed into place. A failure at any point before the rename leaves
//! the target untouched and removes the temporary.

use crate::storage::error::{StoreError, StoreResult};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Write-temp-then-rename file primitive
pub struct AtomicFile;

impl AtomicFile {
    /// Atomically replace `path` with `contents`
    pub fn write(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> StoreResult<()> {
        let path = path.as_ref();
        let tmp_path = tmp_path_for(path);

        let result = Self::write_tmp(&tmp_path, contents.as_ref()).and_then(|_| {
            std::fs::rename(&tmp_path, path).map_err(|e| StoreError::io(path, e))
        });

        if result.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
        }

        result
    }

    fn write_tmp(tmp_path: &Path, contents: &[u8]) -> StoreResult<()> {
        let file = File::create(tmp_path).map_err(|e| StoreError::io(tmp_path, e))?;
        let mut writer = BufWriter::new(file);

        writer
            .write_all(contents)
            .and_then(|_| writer.flush())
            .and_then(|_| writer.get_ref().sync_all())
            .map_err(|e| StoreError::io(tmp_path, e))
    }

    /// Read an entire file into a string
    pub fn read_to_string(path: impl AsRef<Path>) -> StoreResult<String> {
        let path = path.as_ref();
        let mut content = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut content))
            .map_err(|e| StoreError::io(path, e))?;
        Ok(content)
    }

    /// True iff the target exists
    pub fn exists(path: impl AsRef<Path>) -> bool {
        path.as_ref().exists()
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_creates_target() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("2020-01.data");

        AtomicFile::write(&path, "inc 20200101T000000Z\n").unwrap();

        assert_eq!(
            AtomicFile::read_to_string(&path).unwrap(),
            "inc 20200101T000000Z\n"
        );
    }

    #[test]
    fn test_write_replaces_existing_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tags.data");

        AtomicFile::write(&path, "{}").unwrap();
        AtomicFile::write(&path, "{\"work\":{\"count\":1}}").unwrap();

        assert_eq!(
            AtomicFile::read_to_string(&path).unwrap(),
            "{\"work\":{\"count\":1}}"
        );
    }

    #[test]
    fn test_no_temporary_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("undo.data");

        AtomicFile::write(&path, "txn start\n").unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["undo.data"]);
    }

    #[test]
    fn test_failed_write_leaves_target_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("2020-01.data");
        AtomicFile::write(&path, "original\n").unwrap();

        // Writing into a directory that no longer exists must fail cleanly.
        let missing = dir.path().join("gone").join("2020-01.data");
        assert!(AtomicFile::write(&missing, "new").is_err());

        assert_eq!(AtomicFile::read_to_string(&path).unwrap(), "original\n");
    }

    #[test]
    fn test_read_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = AtomicFile::read_to_string(dir.path().join("absent.data")).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
