//! Record file and data page headers.
//!
//! Page 0 of every record file holds the file header; every data page
//! starts with a small page header followed by the slot bitmap and the
//! fixed-size slots.

use crate::error::{Result, StorageError};
use crate::types::{bitmap, NO_PAGE, PAGE_SIZE};

/// Magic bytes identifying a record file
pub const MAGIC: &[u8; 16] = b"record-store v1\0";

/// Serialized size of the file header within page 0
pub const FILE_HEADER_IMAGE_SIZE: usize = 40;

/// Size of the header at the start of each data page
pub const PAGE_HEADER_SIZE: usize = 8;

/// Record file header, persisted as page 0.
///
/// Loaded into memory when the file is opened; the in-memory copy is
/// authoritative while the file is open and is written back on every
/// free-list head change and on close.
///
/// Layout (big-endian):
/// ```text
/// Offset  Size  Description
/// 0       16    Magic string "record-store v1\0"
/// 16      4     Record size in bytes
/// 20      4     Total page count (including this header page)
/// 24      4     Slot capacity of each data page
/// 28      4     First page of the free-page list (-1 if empty)
/// 32      4     Slot bitmap size per data page, in bytes
/// 36      4     Checksum of the fields above (CRC32)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFileHeader {
    /// Bytes per record, fixed for the file
    pub record_size: u32,
    /// Pages allocated in the file, header page included
    pub num_pages: i32,
    /// Slots per data page, derived from the page layout
    pub num_records_per_page: u32,
    /// Head of the free-page list, or NO_PAGE
    pub first_free_page_no: i32,
    /// Bytes used by each data page's slot bitmap
    pub bitmap_size: u32,
}

impl RecordFileHeader {
    /// Build the header for a new file storing `record_size`-byte
    /// records, deriving the page layout.
    ///
    /// The capacity is the largest `n` with
    /// `PAGE_HEADER_SIZE + ceil(n/8) + n * record_size <= PAGE_SIZE`.
    pub fn for_record_size(record_size: usize) -> Result<Self> {
        let num_records_per_page =
            (PAGE_SIZE - PAGE_HEADER_SIZE) * 8 / (1 + 8 * record_size.max(1));
        if record_size == 0 || num_records_per_page == 0 {
            return Err(StorageError::invalid_db(format!(
                "unsupported record size: {record_size} (must be in 1..={})",
                PAGE_SIZE - PAGE_HEADER_SIZE - 1
            )));
        }
        Ok(Self {
            record_size: record_size as u32,
            num_pages: 1,
            num_records_per_page: num_records_per_page as u32,
            first_free_page_no: NO_PAGE,
            bitmap_size: bitmap::bytes_for(num_records_per_page) as u32,
        })
    }

    /// Read a file header from a page-0 image
    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FILE_HEADER_IMAGE_SIZE {
            return Err(StorageError::invalid_db("file header too short"));
        }
        if &bytes[0..16] != MAGIC {
            return Err(StorageError::invalid_db("invalid magic bytes"));
        }

        let record_size = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        let num_pages = i32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
        let num_records_per_page = u32::from_be_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);
        let first_free_page_no = i32::from_be_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]);
        let bitmap_size = u32::from_be_bytes([bytes[32], bytes[33], bytes[34], bytes[35]]);

        let stored_checksum = u32::from_be_bytes([bytes[36], bytes[37], bytes[38], bytes[39]]);
        let computed_checksum = crc32fast::hash(&bytes[0..36]);
        if stored_checksum != computed_checksum {
            return Err(StorageError::corruption("file header checksum mismatch"));
        }

        Ok(Self {
            record_size,
            num_pages,
            num_records_per_page,
            first_free_page_no,
            bitmap_size,
        })
    }

    /// Write this header into a page-0 image
    pub fn write(&self, bytes: &mut [u8]) {
        bytes[..FILE_HEADER_IMAGE_SIZE].fill(0);

        bytes[0..16].copy_from_slice(MAGIC);
        bytes[16..20].copy_from_slice(&self.record_size.to_be_bytes());
        bytes[20..24].copy_from_slice(&self.num_pages.to_be_bytes());
        bytes[24..28].copy_from_slice(&self.num_records_per_page.to_be_bytes());
        bytes[28..32].copy_from_slice(&self.first_free_page_no.to_be_bytes());
        bytes[32..36].copy_from_slice(&self.bitmap_size.to_be_bytes());

        let checksum = crc32fast::hash(&bytes[0..36]);
        bytes[36..40].copy_from_slice(&checksum.to_be_bytes());
    }
}

/// Header at the start of each data page.
///
/// `next_free_page_no` is meaningful only while the page is linked on
/// the file's free-page list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPageHeader {
    /// Count of occupied slots on this page
    pub num_records: u32,
    /// Next page on the free-page list, or NO_PAGE
    pub next_free_page_no: i32,
}

impl RecordPageHeader {
    /// Header of a freshly initialized, empty data page
    pub fn empty() -> Self {
        Self {
            num_records: 0,
            next_free_page_no: NO_PAGE,
        }
    }

    /// Read a page header from the start of a data page
    pub fn read(bytes: &[u8]) -> Self {
        Self {
            num_records: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            next_free_page_no: i32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }

    /// Write this header to the start of a data page
    pub fn write(&self, bytes: &mut [u8]) {
        bytes[0..4].copy_from_slice(&self.num_records.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.next_free_page_no.to_be_bytes());
    }
}
