//! Buffer pool: bounded in-memory page cache with LRU eviction.
//!
//! The pool owns a fixed array of frames. Pages are pinned into frames
//! while in use and become eviction candidates once their pin count
//! drops to zero. Dirty frames are written back before their frame is
//! rebound.

mod frame;
mod pool;
mod replacer;

pub use frame::PageBuf;
pub use pool::{BufferPoolManager, PageGuard, PageRef, PageRefMut};
pub use replacer::LruReplacer;

pub(crate) use frame::Frame;

/// Index into the buffer pool's frame array
pub type FrameId = usize;
