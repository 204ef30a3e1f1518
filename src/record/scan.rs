//! Forward scan over the live records of a file.

use crate::error::Result;
use crate::record::RecordFileHandle;
use crate::types::{Rid, FIRST_RECORD_PAGE, NO_PAGE};

/// Cursor yielding every live [`Rid`] of one file exactly once, in
/// ascending (page, slot) order.
///
/// The cursor holds no pin between advances: each `next` pins the
/// current page, consults its bitmap, and unpins before returning. It
/// observes whatever bits are set when it visits a page — inserts into
/// already-passed pages are invisible, deletes ahead of the cursor are
/// visible. No snapshot is attempted.
pub struct RecordScan<'a> {
    file: &'a RecordFileHandle,
    rid: Rid,
}

impl<'a> RecordScan<'a> {
    /// Open a scan positioned on the file's first record, or at the
    /// end when the file has none.
    pub fn new(file: &'a RecordFileHandle) -> Result<Self> {
        let mut scan = Self {
            file,
            rid: Rid::new(FIRST_RECORD_PAGE, -1),
        };
        scan.next()?;
        Ok(scan)
    }

    /// Advance to the next live record, or to the end state
    pub fn next(&mut self) -> Result<()> {
        if self.is_end() {
            return Ok(());
        }

        let hdr = self.file.file_header();
        while self.rid.page_no >= FIRST_RECORD_PAGE && self.rid.page_no < hdr.num_pages {
            let page = self.file.fetch_page_handle(self.rid.page_no)?;
            if let Some(slot_no) = page.next_set_slot((self.rid.slot_no + 1) as usize) {
                self.rid.slot_no = slot_no as i32;
                return Ok(());
            }
            self.rid.page_no += 1;
            self.rid.slot_no = -1;
        }

        self.rid = Rid::new(NO_PAGE, -1);
        Ok(())
    }

    /// Whether the cursor is past the last record
    pub fn is_end(&self) -> bool {
        self.rid.page_no == NO_PAGE
    }

    /// The record the cursor is positioned on
    pub fn rid(&self) -> Rid {
        self.rid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::record::RecordFileManager;
    use crate::storage::{DiskManager, FileDiskManager};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn open_handle(
        path: &Path,
        record_size: usize,
        pool_size: usize,
    ) -> (RecordFileManager, RecordFileHandle) {
        let disk = Arc::new(FileDiskManager::new(false));
        let pool = Arc::new(BufferPoolManager::new(
            pool_size,
            Arc::clone(&disk) as Arc<dyn DiskManager>,
        ));
        let manager = RecordFileManager::new(disk, pool);
        manager.create_file(path, record_size).unwrap();
        let handle = manager.open_file(path).unwrap();
        (manager, handle)
    }

    fn collect(handle: &RecordFileHandle) -> Result<Vec<Rid>> {
        let mut scan = RecordScan::new(handle)?;
        let mut rids = Vec::new();
        while !scan.is_end() {
            rids.push(scan.rid());
            scan.next()?;
        }
        Ok(rids)
    }

    #[test]
    fn test_empty_file_starts_at_end() -> Result<()> {
        let dir = tempdir().unwrap();
        let (_mgr, handle) = open_handle(&dir.path().join("test.rec"), 16, 8);

        let scan = RecordScan::new(&handle)?;
        assert!(scan.is_end());
        assert_eq!(scan.rid(), Rid::new(NO_PAGE, -1));
        Ok(())
    }

    #[test]
    fn test_scan_visits_inserts_in_order() -> Result<()> {
        let dir = tempdir().unwrap();
        // 4 slots per page forces the scan across pages
        let (_mgr, handle) = open_handle(&dir.path().join("test.rec"), 1000, 8);

        let mut inserted = Vec::new();
        for i in 0..10u8 {
            inserted.push(handle.insert_record(&vec![i; 1000])?);
        }

        let visited = collect(&handle)?;
        assert_eq!(visited, inserted);
        assert!(visited.windows(2).all(|w| w[0] < w[1]));
        Ok(())
    }

    #[test]
    fn test_scan_skips_deleted() -> Result<()> {
        let dir = tempdir().unwrap();
        let (_mgr, handle) = open_handle(&dir.path().join("test.rec"), 1000, 8);

        let mut inserted = Vec::new();
        for i in 0..10u8 {
            inserted.push(handle.insert_record(&vec![i; 1000])?);
        }
        // delete every other record across all three pages
        for rid in inserted.iter().step_by(2) {
            handle.delete_record(*rid)?;
        }

        let expected: Vec<Rid> = inserted.iter().skip(1).step_by(2).copied().collect();
        assert_eq!(collect(&handle)?, expected);
        Ok(())
    }

    #[test]
    fn test_scan_past_end_stays_at_end() -> Result<()> {
        let dir = tempdir().unwrap();
        let (_mgr, handle) = open_handle(&dir.path().join("test.rec"), 16, 8);

        handle.insert_record(&[7u8; 16])?;
        let mut scan = RecordScan::new(&handle)?;
        scan.next()?;
        assert!(scan.is_end());
        scan.next()?;
        assert!(scan.is_end());
        Ok(())
    }
}
