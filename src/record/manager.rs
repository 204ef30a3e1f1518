//! Record file lifecycle: create, open, close, destroy.

use crate::buffer::BufferPoolManager;
use crate::error::Result;
use crate::record::file_header::RecordFileHeader;
use crate::record::file_handle::RecordFileHandle;
use crate::storage::{DiskManager, FileDiskManager};
use crate::types::{Fd, FILE_HEADER_PAGE, PAGE_SIZE};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Creates and opens record files over a shared disk manager and
/// buffer pool.
///
/// Opening a file loads its header from page 0 into memory; closing a
/// handle persists the header, flushes the file's dirty pages and
/// releases the fd.
pub struct RecordFileManager {
    disk: Arc<FileDiskManager>,
    pool: Arc<BufferPoolManager>,
}

impl RecordFileManager {
    pub fn new(disk: Arc<FileDiskManager>, pool: Arc<BufferPoolManager>) -> Self {
        Self { disk, pool }
    }

    /// Create a record file for `record_size`-byte records
    pub fn create_file(&self, path: &Path, record_size: usize) -> Result<()> {
        let header = RecordFileHeader::for_record_size(record_size)?;
        self.disk.create_file(path)?;

        let fd = self.disk.open_file(path)?;
        let result = self.write_initial_header(fd, &header);
        self.disk.close_file(fd)?;
        result?;

        debug!(
            "created record file {} (record_size {}, {} slots per page)",
            path.display(),
            record_size,
            header.num_records_per_page
        );
        Ok(())
    }

    /// Open a record file and load its header
    pub fn open_file(&self, path: &Path) -> Result<RecordFileHandle> {
        let fd = self.disk.open_file(path)?;
        match self.read_header(fd) {
            Ok(header) => Ok(RecordFileHandle::new(
                fd,
                Arc::clone(&self.disk) as Arc<dyn DiskManager>,
                Arc::clone(&self.pool),
                header,
            )),
            Err(e) => {
                let _ = self.disk.close_file(fd);
                Err(e)
            }
        }
    }

    /// Close an open record file: persist the header, flush the file's
    /// dirty pages, release the fd.
    pub fn close_file(&self, handle: RecordFileHandle) -> Result<()> {
        handle.flush_header()?;
        self.pool.flush_all_pages(handle.fd())?;
        self.disk.close_file(handle.fd())
    }

    /// Remove a record file from disk. Fails while the file is open.
    pub fn destroy_file(&self, path: &Path) -> Result<()> {
        self.disk.destroy_file(path)
    }

    fn write_initial_header(&self, fd: Fd, header: &RecordFileHeader) -> Result<()> {
        self.disk.allocate_page(fd)?;
        let mut image = [0u8; PAGE_SIZE];
        header.write(&mut image);
        self.disk.write_page(fd, FILE_HEADER_PAGE, &image)
    }

    fn read_header(&self, fd: Fd) -> Result<RecordFileHeader> {
        let mut image = [0u8; PAGE_SIZE];
        self.disk.read_page(fd, FILE_HEADER_PAGE, &mut image)?;
        RecordFileHeader::read(&image)
    }
}
