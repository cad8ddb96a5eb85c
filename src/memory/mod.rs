//! Physical memory sources the page-table walk reads from
use crate::error::ScanError;
use crate::paging::PagingRoot;

pub mod device;
pub mod dump;
pub mod sparse;

pub use device::DeviceMemory;
pub use dump::DumpMemory;
pub use sparse::SparseMemory;

pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// One physical frame worth of bytes.
pub type Page = [u8; PAGE_SIZE];

/// Access to physical memory by frame number.
///
/// Implementations are synchronous and may fail per frame; the walker treats
/// a failed read as an absent subtree.
pub trait PhysicalMemory {
    /// Physical address of the top-level page table for this run.
    fn paging_root(&self) -> PagingRoot;

    /// Read the 4096-byte page at physical frame `frame`.
    fn read_physical_page(&self, frame: u64) -> Result<Page, ScanError>;
}

/// Physical address of the first byte of `frame`, if it fits in 64 bits.
pub fn frame_address(frame: u64) -> Option<u64> {
    frame.checked_mul(PAGE_SIZE as u64)
}

/// Structure to hold a physical memory region and where its bytes live in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: u64,
    /// Inclusive.
    pub end: u64,
    pub file_offset: u64,
}

impl MemoryRegion {
    /// Check if a physical address is within this memory region
    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address <= self.end
    }

    /// Convert a physical address to a file offset within this region
    pub fn file_offset_of(&self, address: u64) -> Option<u64> {
        if self.contains(address) {
            self.file_offset.checked_add(address - self.start)
        } else {
            None
        }
    }
}
