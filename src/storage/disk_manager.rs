//! Disk manager implementation.
//!
//! The disk manager is responsible for reading and writing pages of the
//! open files. It abstracts the file I/O operations behind a trait so
//! that the rest of the system can be tested with mock implementations.

use crate::error::{Result, StorageError};
use crate::types::{Fd, PageId, PAGE_SIZE};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Trait for page-granular disk I/O
///
/// This abstraction allows swapping the storage backend or mocking for
/// tests. Pages are addressed by an open-file handle plus a zero-based
/// page number.
pub trait DiskManager: Send + Sync {
    /// Read page `page_no` of `fd` into `buf` (exactly `buf.len()` bytes)
    fn read_page(&self, fd: Fd, page_no: i32, buf: &mut [u8]) -> Result<()>;

    /// Write `data` to page `page_no` of `fd`
    fn write_page(&self, fd: Fd, page_no: i32, data: &[u8]) -> Result<()>;

    /// Extend the file by one page and return the new page number
    fn allocate_page(&self, fd: Fd) -> Result<i32>;

    /// Get the path of the file behind `fd`, for error reporting
    fn get_file_name(&self, fd: Fd) -> Result<String>;
}

struct OpenFile {
    file: File,
    path: PathBuf,
    num_pages: i32,
}

/// File-based disk manager with an fd table
///
/// Hands out small integer handles for open files and serves all page
/// I/O through them. One file may be open at most once at a time.
pub struct FileDiskManager {
    files: Mutex<FdTable>,
    /// Whether to sync file data on each write
    sync_on_write: bool,
}

struct FdTable {
    open: HashMap<Fd, OpenFile>,
    by_path: HashMap<PathBuf, Fd>,
    next_fd: Fd,
}

impl FileDiskManager {
    /// Create a disk manager with no open files
    pub fn new(sync_on_write: bool) -> Self {
        Self {
            files: Mutex::new(FdTable {
                open: HashMap::new(),
                by_path: HashMap::new(),
                next_fd: 0,
            }),
            sync_on_write,
        }
    }

    /// Create a new, empty file. Fails if the file already exists.
    pub fn create_file(&self, path: &Path) -> Result<()> {
        OpenOptions::new().write(true).create_new(true).open(path)?;
        debug!("Created file {}", path.display());
        Ok(())
    }

    /// Remove a file from disk. Fails while the file is open.
    pub fn destroy_file(&self, path: &Path) -> Result<()> {
        let table = self.files.lock();
        if table.by_path.contains_key(path) {
            return Err(StorageError::internal(format!(
                "cannot destroy open file {}",
                path.display()
            )));
        }
        std::fs::remove_file(path)?;
        debug!("Destroyed file {}", path.display());
        Ok(())
    }

    /// Open an existing file and return its handle.
    ///
    /// A file may be open at most once; a second open of the same path
    /// fails until the first handle is closed.
    pub fn open_file(&self, path: &Path) -> Result<Fd> {
        let mut table = self.files.lock();
        if table.by_path.contains_key(path) {
            return Err(StorageError::internal(format!(
                "file {} is already open",
                path.display()
            )));
        }

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(StorageError::invalid_db(format!(
                "{}: length {} is not page-aligned",
                path.display(),
                len
            )));
        }

        let fd = table.next_fd;
        table.next_fd += 1;
        table.open.insert(
            fd,
            OpenFile {
                file,
                path: path.to_path_buf(),
                num_pages: (len / PAGE_SIZE as u64) as i32,
            },
        );
        table.by_path.insert(path.to_path_buf(), fd);
        debug!("Opened file {} as fd {}", path.display(), fd);
        Ok(fd)
    }

    /// Close an open file handle
    pub fn close_file(&self, fd: Fd) -> Result<()> {
        let mut table = self.files.lock();
        let entry = table
            .open
            .remove(&fd)
            .ok_or_else(|| StorageError::internal(format!("fd {fd} is not open")))?;
        entry.file.sync_all()?;
        table.by_path.remove(&entry.path);
        debug!("Closed fd {} ({})", fd, entry.path.display());
        Ok(())
    }

    /// Number of pages currently allocated in the file behind `fd`
    pub fn num_pages(&self, fd: Fd) -> Result<i32> {
        let table = self.files.lock();
        let entry = table
            .open
            .get(&fd)
            .ok_or_else(|| StorageError::internal(format!("fd {fd} is not open")))?;
        Ok(entry.num_pages)
    }

    fn check_range(entry: &OpenFile, page_no: i32) -> Result<()> {
        if page_no < 0 || page_no >= entry.num_pages {
            return Err(StorageError::PageNotExist {
                file: entry.path.display().to_string(),
                page_no,
            });
        }
        Ok(())
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, fd: Fd, page_no: i32, buf: &mut [u8]) -> Result<()> {
        let mut table = self.files.lock();
        let entry = table
            .open
            .get_mut(&fd)
            .ok_or_else(|| StorageError::internal(format!("fd {fd} is not open")))?;
        Self::check_range(entry, page_no)?;

        let offset = PageId::new(fd, page_no).file_offset(PAGE_SIZE);
        entry.file.seek(SeekFrom::Start(offset))?;
        entry.file.read_exact(buf)?;
        Ok(())
    }

    fn write_page(&self, fd: Fd, page_no: i32, data: &[u8]) -> Result<()> {
        if data.len() > PAGE_SIZE {
            return Err(StorageError::internal(format!(
                "page write of {} bytes exceeds page size",
                data.len()
            )));
        }

        let mut table = self.files.lock();
        let entry = table
            .open
            .get_mut(&fd)
            .ok_or_else(|| StorageError::internal(format!("fd {fd} is not open")))?;
        Self::check_range(entry, page_no)?;

        let offset = PageId::new(fd, page_no).file_offset(PAGE_SIZE);
        entry.file.seek(SeekFrom::Start(offset))?;
        entry.file.write_all(data)?;
        if self.sync_on_write {
            entry.file.sync_data()?;
        }
        Ok(())
    }

    fn allocate_page(&self, fd: Fd) -> Result<i32> {
        let mut table = self.files.lock();
        let entry = table
            .open
            .get_mut(&fd)
            .ok_or_else(|| StorageError::internal(format!("fd {fd} is not open")))?;

        let page_no = entry.num_pages;
        let zeros = [0u8; PAGE_SIZE];
        let offset = PageId::new(fd, page_no).file_offset(PAGE_SIZE);
        entry.file.seek(SeekFrom::Start(offset))?;
        entry.file.write_all(&zeros)?;
        if self.sync_on_write {
            entry.file.sync_data()?;
        }
        entry.num_pages += 1;
        Ok(page_no)
    }

    fn get_file_name(&self, fd: Fd) -> Result<String> {
        let table = self.files.lock();
        let entry = table
            .open
            .get(&fd)
            .ok_or_else(|| StorageError::internal(format!("fd {fd} is not open")))?;
        Ok(entry.path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_open_close() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let dm = FileDiskManager::new(false);
        dm.create_file(&path)?;
        assert!(dm.create_file(&path).is_err());

        let fd = dm.open_file(&path)?;
        assert_eq!(dm.num_pages(fd)?, 0);
        assert!(dm.open_file(&path).is_err());

        dm.close_file(fd)?;
        let fd2 = dm.open_file(&path)?;
        dm.close_file(fd2)?;
        Ok(())
    }

    #[test]
    fn test_allocate_write_read() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let dm = FileDiskManager::new(false);
        dm.create_file(&path)?;
        let fd = dm.open_file(&path)?;

        assert_eq!(dm.allocate_page(fd)?, 0);
        assert_eq!(dm.allocate_page(fd)?, 1);
        assert_eq!(dm.num_pages(fd)?, 2);

        let mut data = [0u8; PAGE_SIZE];
        data[0..5].copy_from_slice(b"hello");
        dm.write_page(fd, 1, &data)?;

        let mut buf = [0u8; PAGE_SIZE];
        dm.read_page(fd, 1, &mut buf)?;
        assert_eq!(&buf[0..5], b"hello");

        // page 0 was never written, reads back zeroed
        dm.read_page(fd, 0, &mut buf)?;
        assert_eq!(buf, [0u8; PAGE_SIZE]);
        Ok(())
    }

    #[test]
    fn test_read_out_of_range() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let dm = FileDiskManager::new(false);
        dm.create_file(&path)?;
        let fd = dm.open_file(&path)?;

        let mut buf = [0u8; PAGE_SIZE];
        assert!(matches!(
            dm.read_page(fd, 0, &mut buf),
            Err(StorageError::PageNotExist { page_no: 0, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_reopen_keeps_pages() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let dm = FileDiskManager::new(true);
        dm.create_file(&path)?;
        let fd = dm.open_file(&path)?;
        dm.allocate_page(fd)?;
        let mut data = [0u8; PAGE_SIZE];
        data[0..4].copy_from_slice(b"test");
        dm.write_page(fd, 0, &data)?;
        dm.close_file(fd)?;

        let fd = dm.open_file(&path)?;
        assert_eq!(dm.num_pages(fd)?, 1);
        let mut buf = [0u8; PAGE_SIZE];
        dm.read_page(fd, 0, &mut buf)?;
        assert_eq!(&buf[0..4], b"test");
        dm.close_file(fd)?;
        Ok(())
    }

    #[test]
    fn test_destroy() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let dm = FileDiskManager::new(false);
        dm.create_file(&path)?;
        let fd = dm.open_file(&path)?;
        assert!(dm.destroy_file(&path).is_err());
        dm.close_file(fd)?;
        dm.destroy_file(&path)?;
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_get_file_name() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("named.db");

        let dm = FileDiskManager::new(false);
        dm.create_file(&path)?;
        let fd = dm.open_file(&path)?;
        assert!(dm.get_file_name(fd)?.ends_with("named.db"));
        dm.close_file(fd)?;
        Ok(())
    }
}
