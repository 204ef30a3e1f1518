//! Buffer pool manager.
//!
//! The buffer pool manages a fixed number of in-memory page frames,
//! caching pages read from disk and writing dirty pages back when a
//! frame is reused. A page table maps bound pages to frames; unbound
//! frames sit on a free list; zero-pin bound frames are eviction
//! candidates tracked by the [`LruReplacer`].

use crate::buffer::{Frame, FrameId, LruReplacer, PageBuf};
use crate::error::{Result, StorageError};
use crate::storage::DiskManager;
use crate::types::{Fd, PageId};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

/// Page-table and free-list bookkeeping, guarded by one mutex.
///
/// Every frame id lives in exactly one of `free_list` (unbound) or
/// `page_table` (bound); bound zero-pin frames are additionally in the
/// replacer.
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

/// Bounded cache of pages with pin-count-based eviction protection
pub struct BufferPoolManager {
    /// Fixed frame array; the frame id is the index
    frames: Vec<Arc<RwLock<Frame>>>,
    state: Mutex<PoolState>,
    replacer: LruReplacer,
    disk: Arc<dyn DiskManager>,
}

impl BufferPoolManager {
    /// Create a pool of `pool_size` frames over the given disk manager
    pub fn new(pool_size: usize, disk: Arc<dyn DiskManager>) -> Self {
        Self {
            frames: (0..pool_size)
                .map(|_| Arc::new(RwLock::new(Frame::new())))
                .collect(),
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                free_list: (0..pool_size).collect(),
            }),
            replacer: LruReplacer::new(pool_size),
            disk,
        }
    }

    /// Number of frames in the pool
    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// Fetch a page into the pool, pinning it.
    ///
    /// The returned guard owns the pin and releases it when dropped.
    /// Fails with [`StorageError::BufferPoolExhausted`] when every
    /// frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageGuard<'_>> {
        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.frames[frame_id].write().pin_count += 1;
            self.replacer.pin(frame_id);
            trace!("buffer pool hit for page {}", page_id);
            return Ok(self.guard(page_id, frame_id));
        }

        trace!("buffer pool miss for page {}, loading from disk", page_id);
        let frame_id = self
            .find_victim(&mut state)
            .ok_or(StorageError::BufferPoolExhausted)?;

        {
            let frame_arc = Arc::clone(&self.frames[frame_id]);
            let mut frame = frame_arc.write();
            if let Err(e) = self.write_back(&mut state, &mut frame) {
                // the victim stays bound; put it back in the replacer
                self.replacer.unpin(frame_id);
                return Err(e);
            }
            frame.reset();
            if let Err(e) =
                self.disk
                    .read_page(page_id.fd, page_id.page_no, frame.buf.as_bytes_mut())
            {
                state.free_list.push_back(frame_id);
                return Err(e);
            }
            frame.page_id = page_id;
            frame.pin_count = 1;
            frame.dirty = false;
        }

        state.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);
        Ok(self.guard(page_id, frame_id))
    }

    /// Allocate a new page in file `fd` and pin it into a frame.
    ///
    /// The frame memory is zeroed and the page is not marked dirty; the
    /// caller is expected to initialize the contents before the guard
    /// drops.
    pub fn new_page(&self, fd: Fd) -> Result<PageGuard<'_>> {
        let mut state = self.state.lock();

        let frame_id = self
            .find_victim(&mut state)
            .ok_or(StorageError::BufferPoolExhausted)?;

        let page_no = match self.disk.allocate_page(fd) {
            Ok(page_no) => page_no,
            Err(e) => {
                // return the victim to wherever it came from
                if self.frames[frame_id].read().page_id.is_valid() {
                    self.replacer.unpin(frame_id);
                } else {
                    state.free_list.push_front(frame_id);
                }
                return Err(e);
            }
        };
        let page_id = PageId::new(fd, page_no);

        {
            let frame_arc = Arc::clone(&self.frames[frame_id]);
            let mut frame = frame_arc.write();
            if let Err(e) = self.write_back(&mut state, &mut frame) {
                self.replacer.unpin(frame_id);
                return Err(e);
            }
            frame.reset();
            frame.page_id = page_id;
            frame.pin_count = 1;
            frame.dirty = false;
        }

        state.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);
        debug!("allocated new page {}", page_id);
        Ok(self.guard(page_id, frame_id))
    }

    /// Release one pin on a page.
    ///
    /// `is_dirty` is ORed into the frame's dirty flag; this never
    /// clears it. Returns false when the page is not in the pool or
    /// its pin count is already zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let mut frame = self.frames[frame_id].write();
        if frame.pin_count == 0 {
            return false;
        }

        frame.pin_count -= 1;
        if is_dirty {
            frame.dirty = true;
        }
        if frame.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Write a page back to disk regardless of its dirty state.
    ///
    /// Returns false when the page is not in the pool.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };
        let mut frame = self.frames[frame_id].write();
        self.disk
            .write_page(page_id.fd, page_id.page_no, frame.buf.as_bytes())?;
        frame.dirty = false;
        Ok(true)
    }

    /// Write back every dirty page of file `fd`
    pub fn flush_all_pages(&self, fd: Fd) -> Result<()> {
        let state = self.state.lock();

        for (&page_id, &frame_id) in state.page_table.iter() {
            if page_id.fd != fd {
                continue;
            }
            let mut frame = self.frames[frame_id].write();
            if frame.dirty {
                self.disk
                    .write_page(page_id.fd, page_id.page_no, frame.buf.as_bytes())?;
                frame.dirty = false;
            }
        }
        Ok(())
    }

    /// Drop a page from the pool, returning its frame to the free list.
    ///
    /// Returns true when the page is absent (idempotent removal) or was
    /// removed; false when the page is pinned. Dirty contents are
    /// written back before the frame is released.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(true);
        };
        let mut frame = self.frames[frame_id].write();
        if frame.pin_count > 0 {
            return Ok(false);
        }

        if frame.dirty {
            self.disk
                .write_page(page_id.fd, page_id.page_no, frame.buf.as_bytes())?;
            frame.dirty = false;
        }
        state.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        frame.reset();
        state.free_list.push_back(frame_id);
        trace!("deleted page {} from frame {}", page_id, frame_id);
        Ok(true)
    }

    /// Pick a reusable frame: the free list first, then the replacer
    fn find_victim(&self, state: &mut PoolState) -> Option<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Some(frame_id);
        }
        self.replacer.victim()
    }

    /// Write back a bound frame's dirty contents and unbind it from the
    /// page table. No-op for unbound frames.
    fn write_back(&self, state: &mut PoolState, frame: &mut Frame) -> Result<()> {
        if !frame.page_id.is_valid() {
            return Ok(());
        }
        if frame.dirty {
            self.disk
                .write_page(frame.page_id.fd, frame.page_id.page_no, frame.buf.as_bytes())?;
            frame.dirty = false;
        }
        trace!("evicting page {}", frame.page_id);
        state.page_table.remove(&frame.page_id);
        frame.page_id = PageId::INVALID;
        Ok(())
    }

    fn guard(&self, page_id: PageId, frame_id: FrameId) -> PageGuard<'_> {
        PageGuard {
            pool: self,
            page_id,
            frame: Arc::clone(&self.frames[frame_id]),
            dirty: Cell::new(false),
        }
    }
}

/// RAII pin on one buffered page.
///
/// The guard's accessors view the frame memory, so the view is valid
/// exactly as long as the pin is held. Dropping the guard releases the
/// pin once, carrying a dirty mark if any write access was taken.
pub struct PageGuard<'a> {
    pool: &'a BufferPoolManager,
    page_id: PageId,
    frame: Arc<RwLock<Frame>>,
    dirty: Cell<bool>,
}

impl PageGuard<'_> {
    /// The page this guard pins
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Read access to the page bytes
    pub fn read(&self) -> PageRef<'_> {
        PageRef {
            guard: self.frame.read(),
        }
    }

    /// Write access to the page bytes; marks the page dirty
    pub fn write(&self) -> PageRefMut<'_> {
        self.dirty.set(true);
        PageRefMut {
            guard: self.frame.write(),
        }
    }

    /// Mark the page dirty without taking write access
    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.dirty.get());
    }
}

/// Read access to a pinned page's bytes
pub struct PageRef<'a> {
    guard: RwLockReadGuard<'a, Frame>,
}

impl std::ops::Deref for PageRef<'_> {
    type Target = PageBuf;

    fn deref(&self) -> &Self::Target {
        &self.guard.buf
    }
}

/// Write access to a pinned page's bytes
pub struct PageRefMut<'a> {
    guard: RwLockWriteGuard<'a, Frame>,
}

impl std::ops::Deref for PageRefMut<'_> {
    type Target = PageBuf;

    fn deref(&self) -> &Self::Target {
        &self.guard.buf
    }
}

impl std::ops::DerefMut for PageRefMut<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileDiskManager;
    use crate::types::PAGE_SIZE;
    use std::path::Path;
    use tempfile::tempdir;

    fn open_pool(path: &Path, pool_size: usize) -> (Arc<FileDiskManager>, BufferPoolManager, Fd) {
        let dm = Arc::new(FileDiskManager::new(false));
        dm.create_file(path).unwrap();
        let fd = dm.open_file(path).unwrap();
        let pool = BufferPoolManager::new(pool_size, Arc::clone(&dm) as Arc<dyn DiskManager>);
        (dm, pool, fd)
    }

    #[test]
    fn test_new_page_and_roundtrip() -> Result<()> {
        let dir = tempdir().unwrap();
        let (dm, pool, fd) = open_pool(&dir.path().join("test.db"), 4);

        let page_id = {
            let guard = pool.new_page(fd)?;
            guard.write()[0..5].copy_from_slice(b"hello");
            guard.page_id()
        };
        assert_eq!(page_id, PageId::new(fd, 0));

        // still cached
        {
            let guard = pool.fetch_page(page_id)?;
            assert_eq!(&guard.read()[0..5], b"hello");
        }

        pool.flush_all_pages(fd)?;
        let mut buf = [0u8; PAGE_SIZE];
        dm.read_page(fd, 0, &mut buf)?;
        assert_eq!(&buf[0..5], b"hello");
        Ok(())
    }

    #[test]
    fn test_lru_victim_is_least_recent() -> Result<()> {
        let dir = tempdir().unwrap();
        let (dm, pool, fd) = open_pool(&dir.path().join("test.db"), 2);

        // three pages on disk, pool of two frames
        let a = PageId::new(fd, dm.allocate_page(fd)?);
        let b = PageId::new(fd, dm.allocate_page(fd)?);
        let c = PageId::new(fd, dm.allocate_page(fd)?);

        // dirty A in memory only
        pool.fetch_page(a)?.write()[0] = 0xAA;
        pool.fetch_page(b)?;

        // both unpinned; fetching C must evict A (the LRU) and write it back
        pool.fetch_page(c)?;
        let mut buf = [0u8; PAGE_SIZE];
        dm.read_page(fd, a.page_no, &mut buf)?;
        assert_eq!(buf[0], 0xAA);

        // B was not evicted, so its frame never hit the disk
        pool.fetch_page(b)?.write()[0] = 0xBB;
        dm.read_page(fd, b.page_no, &mut buf)?;
        assert_eq!(buf[0], 0x00);
        Ok(())
    }

    #[test]
    fn test_pool_exhaustion_and_recovery() -> Result<()> {
        let dir = tempdir().unwrap();
        let (dm, pool, fd) = open_pool(&dir.path().join("test.db"), 1);

        let a = PageId::new(fd, dm.allocate_page(fd)?);
        let b = PageId::new(fd, dm.allocate_page(fd)?);

        let guard_a = pool.fetch_page(a)?;
        assert!(matches!(
            pool.fetch_page(b),
            Err(StorageError::BufferPoolExhausted)
        ));

        drop(guard_a);
        let guard_b = pool.fetch_page(b)?;
        assert_eq!(guard_b.page_id(), b);
        Ok(())
    }

    #[test]
    fn test_unpin_absent_or_unpinned_returns_false() -> Result<()> {
        let dir = tempdir().unwrap();
        let (dm, pool, fd) = open_pool(&dir.path().join("test.db"), 2);

        assert!(!pool.unpin_page(PageId::new(fd, 99), false));

        let a = PageId::new(fd, dm.allocate_page(fd)?);
        drop(pool.fetch_page(a)?);
        // pin already released by the guard
        assert!(!pool.unpin_page(a, false));
        Ok(())
    }

    #[test]
    fn test_flush_persists_and_clears_dirty() -> Result<()> {
        let dir = tempdir().unwrap();
        let (dm, pool, fd) = open_pool(&dir.path().join("test.db"), 2);

        let p = PageId::new(fd, dm.allocate_page(fd)?);

        // first pin marks dirty, second does not
        pool.fetch_page(p)?.write()[0] = 0x42;
        drop(pool.fetch_page(p)?);

        pool.flush_all_pages(fd)?;
        let mut buf = [0u8; PAGE_SIZE];
        dm.read_page(fd, p.page_no, &mut buf)?;
        assert_eq!(buf[0], 0x42);

        // the frame is clean now: deleting it must not rewrite disk
        assert!(pool.delete_page(p)?);
        assert!(!pool.flush_page(p)?);
        Ok(())
    }

    #[test]
    fn test_delete_page_semantics() -> Result<()> {
        let dir = tempdir().unwrap();
        let (dm, pool, fd) = open_pool(&dir.path().join("test.db"), 2);

        let p = PageId::new(fd, dm.allocate_page(fd)?);

        // absent delete is idempotent-true
        assert!(pool.delete_page(p)?);

        let guard = pool.fetch_page(p)?;
        guard.write()[0] = 0x07;
        // pinned pages cannot be deleted
        assert!(!pool.delete_page(p)?);
        drop(guard);

        // unpinned dirty page: delete writes back first
        assert!(pool.delete_page(p)?);
        let mut buf = [0u8; PAGE_SIZE];
        dm.read_page(fd, p.page_no, &mut buf)?;
        assert_eq!(buf[0], 0x07);

        // a later fetch reads whatever is on disk
        let guard = pool.fetch_page(p)?;
        assert_eq!(guard.read()[0], 0x07);
        Ok(())
    }
}
