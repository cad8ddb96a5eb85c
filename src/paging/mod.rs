//! x86-64 four-level page-table layout
//!
//! Entry decoding, virtual address reconstruction from table indices and a
//! software resolver that translates a single virtual address by reading
//! tables through [`PhysicalMemory`].
use crate::error::ScanError;
use crate::memory::{Page, PhysicalMemory, PAGE_SHIFT};
use std::fmt;

pub mod walker;

pub use walker::{Leaf, LeafVisitor, PageTableWalker, ScanStatistics, WalkScope};

pub const ENTRIES_PER_TABLE: usize = 512;

/// Physical address bits 12..51 of an entry.
pub const PHYS_ADDR_MASK: u64 = 0x000f_ffff_ffff_f000;

const BIT_PRESENT: u64 = 1 << 0;
const BIT_PSE: u64 = 1 << 7;
const CANONICAL_BIT: u64 = 1 << 47;
const CANONICAL_UPPER: u64 = 0xffff_0000_0000_0000;
const VA_MASK: u64 = 0x0000_ffff_ffff_ffff;

/// Physical address of the top-level table (the CR3 value).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingRoot(u64);

impl PagingRoot {
    pub fn new(address: u64) -> Self {
        PagingRoot(address)
    }

    pub fn address(&self) -> u64 {
        self.0
    }

    /// Frame of the PGD. PCID / flag bits are dropped.
    pub fn frame(&self) -> u64 {
        (self.0 & PHYS_ADDR_MASK) >> PAGE_SHIFT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageTableEntry(pub u64);

impl PageTableEntry {
    pub fn is_present(&self) -> bool {
        self.0 & BIT_PRESENT != 0
    }

    /// PSE bit: at PUD/PMD level the entry maps a 1 GiB / 2 MiB page.
    pub fn is_huge(&self) -> bool {
        self.0 & BIT_PSE != 0
    }

    /// Frame number of the next-level table or the mapped page.
    pub fn pfn(&self) -> u64 {
        (self.0 & PHYS_ADDR_MASK) >> PAGE_SHIFT
    }
}

impl fmt::LowerHex for PageTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Entry `index` of a table page.
pub fn entry_at(table: &Page, index: usize) -> PageTableEntry {
    let offset = index * 8;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&table[offset..offset + 8]);
    PageTableEntry(u64::from_le_bytes(raw))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Pgd,
    Pud,
    Pmd,
    Pt,
}

impl Level {
    /// Position of this level's 9-bit index within a virtual address.
    pub fn shift(self) -> u32 {
        match self {
            Level::Pgd => 39,
            Level::Pud => 30,
            Level::Pmd => 21,
            Level::Pt => 12,
        }
    }

    pub fn next(self) -> Option<Level> {
        match self {
            Level::Pgd => Some(Level::Pud),
            Level::Pud => Some(Level::Pmd),
            Level::Pmd => Some(Level::Pt),
            Level::Pt => None,
        }
    }

    /// Size of the page a leaf entry at this level maps, if the level can hold a
    /// leaf.
    pub fn leaf_size(self) -> Option<u64> {
        match self {
            Level::Pgd => None,
            Level::Pud => Some(1 << 30),
            Level::Pmd => Some(1 << 21),
            Level::Pt => Some(1 << 12),
        }
    }

    pub fn index_of(self, virtual_address: u64) -> usize {
        ((virtual_address >> self.shift()) & (ENTRIES_PER_TABLE as u64 - 1)) as usize
    }

    /// This level's contribution to a virtual address.
    pub fn fragment(self, index: usize) -> u64 {
        ((index & (ENTRIES_PER_TABLE - 1)) as u64) << self.shift()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Pgd => "PGD",
            Level::Pud => "PUD",
            Level::Pmd => "PMD",
            Level::Pt => "PTE",
        };
        f.write_str(name)
    }
}

/// Sign-extend bit 47 into the upper 16 bits.
pub fn canonicalize(address: u64) -> u64 {
    let address = address & VA_MASK;
    if address & CANONICAL_BIT != 0 {
        address | CANONICAL_UPPER
    } else {
        address
    }
}

/// Canonical base address of the 4 KiB page selected by the four indices.
pub fn virtual_address(pgd: usize, pud: usize, pmd: usize, pt: usize) -> u64 {
    canonicalize(
        Level::Pgd.fragment(pgd)
            | Level::Pud.fragment(pud)
            | Level::Pmd.fragment(pmd)
            | Level::Pt.fragment(pt),
    )
}

/// Entries met while translating one virtual address. Levels that were not
/// reached are left zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvedEntries {
    pub pgd: PageTableEntry,
    pub pud: PageTableEntry,
    pub pmd: PageTableEntry,
    pub pte: PageTableEntry,
}

/// Translate `virtual_address` by walking the tables below `root`.
///
/// Stops at the first non-present entry or large page. Read failures are
/// returned to the caller.
pub fn resolve(
    memory: &dyn PhysicalMemory,
    root: PagingRoot,
    virtual_address: u64,
) -> Result<ResolvedEntries, ScanError> {
    let mut resolved = ResolvedEntries::default();
    let mut frame = root.frame();
    let mut level = Level::Pgd;

    loop {
        let table = memory.read_physical_page(frame)?;
        let entry = entry_at(&table, level.index_of(virtual_address));
        match level {
            Level::Pgd => resolved.pgd = entry,
            Level::Pud => resolved.pud = entry,
            Level::Pmd => resolved.pmd = entry,
            Level::Pt => resolved.pte = entry,
        }

        if !entry.is_present() || (level != Level::Pgd && entry.is_huge()) {
            return Ok(resolved);
        }
        match level.next() {
            Some(next) => {
                frame = entry.pfn();
                level = next;
            }
            None => return Ok(resolved),
        }
    }
}
