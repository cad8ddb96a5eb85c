//! In-memory frame map for building synthetic page-table hierarchies
use crate::error::ScanError;
use crate::memory::{Page, PhysicalMemory, PAGE_SIZE};
use crate::paging::PagingRoot;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// Physical memory made of explicitly populated frames.
///
/// Frames that were never written read as missing. Every read is recorded so
/// callers can check which frames a walk touched.
pub struct SparseMemory {
    frames: HashMap<u64, Box<Page>>,
    failing: HashSet<u64>,
    reads: RefCell<Vec<u64>>,
    root: PagingRoot,
}

impl SparseMemory {
    pub fn new(root: PagingRoot) -> Self {
        SparseMemory {
            frames: HashMap::new(),
            failing: HashSet::new(),
            reads: RefCell::new(Vec::new()),
            root,
        }
    }

    fn frame_mut(&mut self, frame: u64) -> &mut Page {
        self.frames
            .entry(frame)
            .or_insert_with(|| Box::new([0u8; PAGE_SIZE]))
    }

    /// Store a 64-bit entry at `index` of the table held in `frame`.
    pub fn set_entry(&mut self, frame: u64, index: usize, entry: u64) {
        let offset = index * 8;
        self.frame_mut(frame)[offset..offset + 8].copy_from_slice(&entry.to_le_bytes());
    }

    /// Copy `bytes` into `frame` starting at `offset`.
    pub fn write_bytes(&mut self, frame: u64, offset: usize, bytes: &[u8]) {
        self.frame_mut(frame)[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Store a little-endian u64 at a byte offset of `frame`.
    pub fn write_u64(&mut self, frame: u64, offset: usize, value: u64) {
        self.write_bytes(frame, offset, &value.to_le_bytes());
    }

    /// Make every subsequent read of `frame` fail.
    pub fn fail_frame(&mut self, frame: u64) {
        self.failing.insert(frame);
    }

    pub fn reads(&self) -> Vec<u64> {
        self.reads.borrow().clone()
    }

    pub fn clear_reads(&self) {
        self.reads.borrow_mut().clear();
    }
}

impl PhysicalMemory for SparseMemory {
    fn paging_root(&self) -> PagingRoot {
        self.root
    }

    fn read_physical_page(&self, frame: u64) -> Result<Page, ScanError> {
        self.reads.borrow_mut().push(frame);
        if self.failing.contains(&frame) {
            return Err(ScanError::PhysicalRead {
                frame,
                reason: "injected failure".to_string(),
            });
        }
        self.frames
            .get(&frame)
            .map(|page| **page)
            .ok_or_else(|| ScanError::PhysicalRead {
                frame,
                reason: "frame not populated".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_little_endian() -> Result<(), ScanError> {
        let mut memory = SparseMemory::new(PagingRoot::new(0x1000));
        memory.set_entry(1, 2, 0x1122_3344_5566_7788);
        let page = memory.read_physical_page(1)?;
        assert_eq!(page[16], 0x88);
        assert_eq!(page[23], 0x11);
        assert_eq!(memory.reads(), vec![1]);
        Ok(())
    }

    #[test]
    fn test_failing_and_missing_frames() {
        let mut memory = SparseMemory::new(PagingRoot::new(0));
        memory.write_u64(5, 0, 1);
        memory.fail_frame(5);
        assert!(memory.read_physical_page(5).is_err());
        assert!(memory.read_physical_page(6).is_err());
        assert_eq!(memory.reads(), vec![5, 6]);
        memory.clear_reads();
        assert!(memory.reads().is_empty());
    }
}
