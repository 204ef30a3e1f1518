//! Record file handle: fixed-size record CRUD over buffered pages.

use crate::buffer::BufferPoolManager;
use crate::error::{Result, StorageError};
use crate::record::file_header::RecordFileHeader;
use crate::record::page_handle::RecordPageHandle;
use crate::storage::DiskManager;
use crate::types::{Fd, PageId, Rid, FILE_HEADER_PAGE, NO_PAGE, PAGE_SIZE};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// One open record file, presented as a sequence of fixed-size records
/// addressed by [`Rid`].
///
/// The handle mediates all record access through the buffer pool and
/// manages slot allocation via the per-page bitmaps and the file-wide
/// free-page list. The in-memory file header is guarded by its own
/// mutex so a handle may be shared across threads; the header is
/// written back to page 0 on every free-list head change and again
/// when the file is closed.
///
/// Pages that fill up while not at the head of the free list stay
/// linked; allocation re-checks capacity and advances the head past
/// them instead of trusting the head to be non-full.
pub struct RecordFileHandle {
    fd: Fd,
    disk: Arc<dyn DiskManager>,
    pool: Arc<BufferPoolManager>,
    header: Mutex<RecordFileHeader>,
}

impl RecordFileHandle {
    pub(crate) fn new(
        fd: Fd,
        disk: Arc<dyn DiskManager>,
        pool: Arc<BufferPoolManager>,
        header: RecordFileHeader,
    ) -> Self {
        Self {
            fd,
            disk,
            pool,
            header: Mutex::new(header),
        }
    }

    /// The open-file handle this record file lives behind
    pub fn fd(&self) -> Fd {
        self.fd
    }

    /// Snapshot of the in-memory file header
    pub fn file_header(&self) -> RecordFileHeader {
        *self.header.lock()
    }

    /// Copy out the record stored at `rid`
    pub fn get_record(&self, rid: Rid) -> Result<Vec<u8>> {
        let hdr = self.file_header();
        let page = self.fetch_data_page(&hdr, rid.page_no)?;
        self.check_slot(&hdr, &page, rid, true)?;
        Ok(page.read_record(rid.slot_no as usize))
    }

    /// Insert a record into the first free slot of the file, creating
    /// a new data page when none has room. Returns the record's
    /// location.
    pub fn insert_record(&self, buf: &[u8]) -> Result<Rid> {
        let mut hdr = self.header.lock();
        self.check_record_size(&hdr, buf)?;

        let page = self.alloc_slot_page(&mut hdr)?;
        let slot_no = page
            .first_free_slot()
            .ok_or_else(|| StorageError::internal("page on free list has no free slot"))?;

        page.write_record(slot_no, buf);
        page.set_slot(slot_no);
        let mut page_hdr = page.header();
        page_hdr.num_records += 1;
        page.set_header(&page_hdr);

        // a page that just filled up must stop being the free-list
        // head; pages that fill mid-list are skipped by alloc_slot_page
        if page_hdr.num_records >= hdr.num_records_per_page
            && hdr.first_free_page_no == page.page_no()
        {
            hdr.first_free_page_no = page_hdr.next_free_page_no;
            self.persist_header(&hdr)?;
        }

        let rid = Rid::new(page.page_no(), slot_no as i32);
        trace!("inserted record at {}", rid);
        Ok(rid)
    }

    /// Write a record into the slot named by `rid`, occupying the slot
    /// if it was free.
    ///
    /// Used by recovery and undo paths that must restore a record at a
    /// known location. The free-page list is left untouched, and the
    /// file is never extended: a `rid` past the last allocated page
    /// fails with `PageNotExist`.
    pub fn insert_record_at(&self, rid: Rid, buf: &[u8]) -> Result<()> {
        let hdr = self.file_header();
        self.check_record_size(&hdr, buf)?;

        let page = self.fetch_data_page(&hdr, rid.page_no)?;
        self.check_slot(&hdr, &page, rid, false)?;

        let slot_no = rid.slot_no as usize;
        let was_set = page.is_slot_set(slot_no);
        page.write_record(slot_no, buf);
        if !was_set {
            page.set_slot(slot_no);
            let mut page_hdr = page.header();
            page_hdr.num_records += 1;
            page.set_header(&page_hdr);
        }
        Ok(())
    }

    /// Overwrite the record stored at `rid`
    pub fn update_record(&self, rid: Rid, buf: &[u8]) -> Result<()> {
        let hdr = self.file_header();
        self.check_record_size(&hdr, buf)?;

        let page = self.fetch_data_page(&hdr, rid.page_no)?;
        self.check_slot(&hdr, &page, rid, true)?;
        page.write_record(rid.slot_no as usize, buf);
        Ok(())
    }

    /// Delete the record stored at `rid`, freeing its slot.
    ///
    /// A page that was full regains space here and is linked back at
    /// the head of the free-page list.
    pub fn delete_record(&self, rid: Rid) -> Result<()> {
        let mut hdr = self.header.lock();
        let page = self.fetch_data_page(&hdr, rid.page_no)?;
        self.check_slot(&hdr, &page, rid, true)?;

        let mut page_hdr = page.header();
        let was_full = page_hdr.num_records >= hdr.num_records_per_page;

        page.clear_slot(rid.slot_no as usize);
        page_hdr.num_records -= 1;
        page.set_header(&page_hdr);

        if was_full {
            self.release_page(&page, &mut hdr)?;
        }
        trace!("deleted record at {}", rid);
        Ok(())
    }

    /// Pin the data page `page_no` and view it through the file's
    /// layout. Fails with `PageNotExist` when `page_no` is the header
    /// page or past the end of the file.
    pub fn fetch_page_handle(&self, page_no: i32) -> Result<RecordPageHandle<'_>> {
        let hdr = self.file_header();
        self.fetch_data_page(&hdr, page_no)
    }

    /// Write the in-memory header back to page 0
    pub(crate) fn flush_header(&self) -> Result<()> {
        let hdr = self.header.lock();
        self.persist_header(&hdr)
    }

    fn fetch_data_page(
        &self,
        hdr: &RecordFileHeader,
        page_no: i32,
    ) -> Result<RecordPageHandle<'_>> {
        if page_no <= FILE_HEADER_PAGE || page_no >= hdr.num_pages {
            return Err(StorageError::PageNotExist {
                file: self
                    .disk
                    .get_file_name(self.fd)
                    .unwrap_or_else(|_| format!("fd {}", self.fd)),
                page_no,
            });
        }
        let guard = self.pool.fetch_page(PageId::new(self.fd, page_no))?;
        Ok(RecordPageHandle::new(guard, hdr))
    }

    /// Obtain a pinned data page with at least one free slot: the first
    /// non-full page on the free list, else a freshly created page.
    fn alloc_slot_page(&self, hdr: &mut RecordFileHeader) -> Result<RecordPageHandle<'_>> {
        while hdr.first_free_page_no != NO_PAGE {
            let page = self.fetch_data_page(hdr, hdr.first_free_page_no)?;
            if !page.is_full() {
                return Ok(page);
            }
            hdr.first_free_page_no = page.header().next_free_page_no;
            self.persist_header(hdr)?;
        }
        self.create_data_page(hdr)
    }

    /// Allocate and initialize a new data page, linking it at the head
    /// of the free-page list.
    fn create_data_page(&self, hdr: &mut RecordFileHeader) -> Result<RecordPageHandle<'_>> {
        let guard = self.pool.new_page(self.fd)?;
        let page = RecordPageHandle::new(guard, hdr);
        page.init(hdr.first_free_page_no);

        if page.page_no() >= hdr.num_pages {
            hdr.num_pages = page.page_no() + 1;
        }
        hdr.first_free_page_no = page.page_no();
        self.persist_header(hdr)?;
        trace!("created data page {} for fd {}", page.page_no(), self.fd);
        Ok(page)
    }

    /// Link a page that regained free space at the head of the
    /// free-page list.
    fn release_page(
        &self,
        page: &RecordPageHandle<'_>,
        hdr: &mut RecordFileHeader,
    ) -> Result<()> {
        let mut page_hdr = page.header();
        page_hdr.next_free_page_no = hdr.first_free_page_no;
        page.set_header(&page_hdr);

        hdr.first_free_page_no = page.page_no();
        self.persist_header(hdr)
    }

    /// Persist the header image to page 0. On failure the in-memory
    /// header keeps its new value and the error surfaces; close-time
    /// flushing retries the write.
    fn persist_header(&self, hdr: &RecordFileHeader) -> Result<()> {
        let mut image = [0u8; PAGE_SIZE];
        hdr.write(&mut image);
        self.disk.write_page(self.fd, FILE_HEADER_PAGE, &image)
    }

    fn check_record_size(&self, hdr: &RecordFileHeader, buf: &[u8]) -> Result<()> {
        if buf.len() != hdr.record_size as usize {
            return Err(StorageError::RecordSizeMismatch {
                expected: hdr.record_size as usize,
                actual: buf.len(),
            });
        }
        Ok(())
    }

    fn check_slot(
        &self,
        hdr: &RecordFileHeader,
        page: &RecordPageHandle<'_>,
        rid: Rid,
        must_exist: bool,
    ) -> Result<()> {
        if rid.slot_no < 0 || rid.slot_no >= hdr.num_records_per_page as i32 {
            return Err(StorageError::InvalidSlot {
                slot_no: rid.slot_no,
                num_slots: hdr.num_records_per_page,
            });
        }
        if must_exist && !page.is_slot_set(rid.slot_no as usize) {
            return Err(StorageError::RecordNotFound {
                page_no: rid.page_no,
                slot_no: rid.slot_no,
            });
        }
        Ok(())
    }
}
