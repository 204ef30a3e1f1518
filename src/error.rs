//! Error types for the storage engine.

use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in the storage engine
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error from the underlying file system
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Page number is outside the file's allocated range
    #[error("Page {page_no} does not exist in file {file}")]
    PageNotExist { file: String, page_no: i32 },

    /// No record occupies the addressed slot
    #[error("Record not found at page {page_no}, slot {slot_no}")]
    RecordNotFound { page_no: i32, slot_no: i32 },

    /// Slot number is outside the page's slot range
    #[error("Invalid slot number: {slot_no} (page holds {num_slots} slots)")]
    InvalidSlot { slot_no: i32, num_slots: u32 },

    /// Record buffer does not match the file's fixed record size
    #[error("Record size mismatch: expected {expected} bytes, got {actual}")]
    RecordSizeMismatch { expected: usize, actual: usize },

    /// Buffer pool has no free frame and no evictable frame
    #[error("Buffer pool exhausted: no available frames")]
    BufferPoolExhausted,

    /// Database file is corrupted or has invalid format
    #[error("Invalid database file: {0}")]
    InvalidDatabaseFile(String),

    /// Data corruption detected (e.g., checksum mismatch)
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Internal metadata inconsistency; indicates an engine bug
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Create a corruption error with a message
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create an invalid database file error
    pub fn invalid_db(msg: impl Into<String>) -> Self {
        Self::InvalidDatabaseFile(msg.into())
    }

    /// Create an internal inconsistency error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
