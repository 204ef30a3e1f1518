//! Storage layer: disk I/O behind a page-granular contract.
//!
//! This module provides the abstraction for reading and writing pages
//! to disk files. The rest of the engine addresses pages by
//! `(fd, page_no)` and never touches file offsets directly.

mod disk_manager;

pub use disk_manager::{DiskManager, FileDiskManager};
