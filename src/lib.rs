//! # Record Storage Engine
//!
//! A disk-backed storage engine for durable fixed-size records,
//! addressable by `(page, slot)` and served through a bounded
//! in-memory page cache.
//!
//! ## Architecture
//!
//! The engine is composed of modular, swappable components:
//!
//! - **Storage Layer** (`storage`): page-granular disk I/O behind the
//!   [`DiskManager`] trait
//! - **Buffer Pool** (`buffer`): fixed-size frame cache with pin
//!   counting, dirty write-back and LRU eviction
//! - **Record Layer** (`record`): slotted data pages holding
//!   fixed-size records, slot bitmaps, a file-wide free-page list and
//!   a forward scan cursor
//!
//! ## Usage
//!
//! ```rust,ignore
//! use record_storage::{
//!     BufferPoolManager, DiskManager, FileDiskManager, RecordFileManager, RecordScan,
//! };
//! use std::sync::Arc;
//!
//! let disk = Arc::new(FileDiskManager::new(false));
//! let pool = Arc::new(BufferPoolManager::new(
//!     256,
//!     Arc::clone(&disk) as Arc<dyn DiskManager>,
//! ));
//! let manager = RecordFileManager::new(disk, pool);
//!
//! manager.create_file("employees.rec".as_ref(), 64)?;
//! let file = manager.open_file("employees.rec".as_ref())?;
//!
//! let rid = file.insert_record(&[0u8; 64])?;
//! let record = file.get_record(rid)?;
//!
//! let mut scan = RecordScan::new(&file)?;
//! while !scan.is_end() {
//!     println!("live record at {}", scan.rid());
//!     scan.next()?;
//! }
//!
//! manager.close_file(file)?;
//! ```

pub mod buffer;
pub mod error;
pub mod record;
pub mod storage;
pub mod types;

pub use error::{Result, StorageError};
pub use types::{Fd, PageId, Rid, FILE_HEADER_PAGE, FIRST_RECORD_PAGE, NO_PAGE, PAGE_SIZE};

// Re-export main public API
pub use buffer::{BufferPoolManager, LruReplacer, PageGuard};
pub use record::{RecordFileHandle, RecordFileManager, RecordScan};
pub use storage::{DiskManager, FileDiskManager};
