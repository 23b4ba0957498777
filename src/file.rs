/// Opens/creates the backing file, validates its size, and grows it in
/// fixed-size block quanta.
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::CacheError;
use crate::layout::{self, BLOCK_SIZE, MAX_BLOCKS};

#[cfg(unix)]
fn open_options() -> OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;
    let mut opts = OpenOptions::new();
    opts.read(true).write(true).create(true).mode(0o600);
    opts
}

#[cfg(not(unix))]
fn open_options() -> OpenOptions {
    let mut opts = OpenOptions::new();
    opts.read(true).write(true).create(true);
    opts
}

/// Owns the backing file descriptor and tracks its current length.
pub struct FileManager {
    file: File,
    path: PathBuf,
    len: u64,
}

impl FileManager {
    /// Opens `path`, creating it if absent, and validates its size per
    /// §4.1. A brand-new (zero-length) file is grown to one block.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let file = open_options().open(&path)?;
        let len = file.metadata()?.len();

        let mut manager = FileManager { file, path, len };

        if len == 0 {
            manager.append_block()?;
            return Ok(manager);
        }

        if layout::block_count(len).is_none() {
            return Err(CacheError::InvalidFileSize);
        }

        Ok(manager)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn block_count(&self) -> u64 {
        // Safe: invariant is checked at open() and maintained by grow().
        self.len / BLOCK_SIZE
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Appends one zero-filled block at the current end of the file.
    ///
    /// Fails with `FileSizeTooLarge` (non-fatal) if the file is already at
    /// `MAX_BLOCKS`; any I/O failure is returned as-is for the caller to
    /// latch.
    pub fn grow(&mut self) -> Result<(), CacheError> {
        if self.block_count() >= MAX_BLOCKS {
            return Err(CacheError::FileSizeTooLarge);
        }
        self.append_block()?;
        log::debug!(
            "grew {} to {} bytes ({} blocks)",
            self.path.display(),
            self.len,
            self.block_count()
        );
        Ok(())
    }

    fn append_block(&mut self) -> io::Result<()> {
        let new_len = self.len + BLOCK_SIZE;
        self.file.set_len(new_len)?;
        self.len = new_len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_a_fresh_path_creates_one_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let manager = FileManager::open(&path).unwrap();
        assert_eq!(manager.len(), BLOCK_SIZE);
        assert_eq!(manager.block_count(), 1);
    }

    #[test]
    fn reopening_preserves_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let mut manager = FileManager::open(&path).unwrap();
            manager.grow().unwrap();
        }
        let manager = FileManager::open(&path).unwrap();
        assert_eq!(manager.block_count(), 2);
    }

    #[test]
    fn rejects_files_with_illegal_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let file = open_options().open(&path).unwrap();
            file.set_len(BLOCK_SIZE + 17).unwrap();
        }
        assert!(matches!(
            FileManager::open(&path),
            Err(CacheError::InvalidFileSize)
        ));
    }

    #[test]
    fn grow_refuses_past_max_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let mut manager = FileManager::open(&path).unwrap();
        for _ in 1..MAX_BLOCKS {
            manager.grow().unwrap();
        }
        assert_eq!(manager.block_count(), MAX_BLOCKS);
        assert!(matches!(manager.grow(), Err(CacheError::FileSizeTooLarge)));
    }
}
