//! Recursive walk over every present entry of the active page tables
use crate::error::ScanError;
use crate::memory::PhysicalMemory;
use crate::paging::{canonicalize, entry_at, resolve, Level, PageTableEntry, ENTRIES_PER_TABLE};
use log::{debug, trace, warn};

/// A present entry that maps memory directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leaf {
    pub frame: u64,
    /// Canonical virtual base address of the mapping.
    pub virtual_address: u64,
    pub level: Level,
    pub entry: PageTableEntry,
}

impl Leaf {
    pub fn size(&self) -> u64 {
        self.level.leaf_size().unwrap_or(0)
    }
}

/// Receives leaves in walk order.
pub trait LeafVisitor {
    /// Called for every present 4 KiB PT entry.
    fn visit_leaf(&mut self, leaf: &Leaf) -> Result<(), ScanError>;

    /// Called for 1 GiB and 2 MiB leaves. Their contents are not scanned.
    fn visit_huge_leaf(&mut self, _leaf: &Leaf) -> Result<(), ScanError> {
        Ok(())
    }
}

/// Which top-level entries the walk follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkScope {
    /// Every present PGD entry.
    Full,
    /// Only PGD entries equal to the one mapping this virtual address.
    Anchored(u64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStatistics {
    /// Present 4 KiB leaves handed to the visitor.
    pub leaves_visited: u64,
    pub tables_read: u64,
    pub failed_reads: u64,
    pub huge_2m: u64,
    pub huge_1g: u64,
    /// Present PGD entries passed over by the anchor filter.
    pub pgd_skipped: u64,
}

pub struct PageTableWalker<'a> {
    memory: &'a dyn PhysicalMemory,
    scope: WalkScope,
}

impl<'a> PageTableWalker<'a> {
    pub fn new(memory: &'a dyn PhysicalMemory, scope: WalkScope) -> Self {
        PageTableWalker { memory, scope }
    }

    /// Walk all four levels below the memory source's paging root.
    ///
    /// Tables that fail with a recoverable read error are skipped. Any other
    /// error from the memory source or the visitor ends the walk.
    pub fn walk(&self, visitor: &mut dyn LeafVisitor) -> Result<ScanStatistics, ScanError> {
        let root = self.memory.paging_root();
        let mut stats = ScanStatistics::default();
        let anchor = self.anchor_entry();
        debug!(
            "Walking page tables from root 0x{:x} (PGD frame 0x{:x})",
            root.address(),
            root.frame()
        );
        self.walk_table(Level::Pgd, root.frame(), 0, anchor, &mut stats, visitor)?;
        Ok(stats)
    }

    fn anchor_entry(&self) -> Option<PageTableEntry> {
        let WalkScope::Anchored(address) = self.scope else {
            return None;
        };
        match resolve(self.memory, self.memory.paging_root(), address) {
            Ok(entries) if entries.pgd.is_present() => {
                debug!("Anchor 0x{:x} is mapped by PGD entry 0x{:x}", address, entries.pgd);
                Some(entries.pgd)
            }
            Ok(_) => {
                warn!("Anchor 0x{:x} is not mapped; walking every PGD entry", address);
                None
            }
            Err(e) => {
                warn!("Could not resolve anchor 0x{:x} ({}); walking every PGD entry", address, e);
                None
            }
        }
    }

    fn walk_table(
        &self,
        level: Level,
        frame: u64,
        base: u64,
        anchor: Option<PageTableEntry>,
        stats: &mut ScanStatistics,
        visitor: &mut dyn LeafVisitor,
    ) -> Result<(), ScanError> {
        let table = match self.memory.read_physical_page(frame) {
            Ok(table) => table,
            Err(e) if e.is_recoverable() => {
                warn!("Skipping {} table at frame 0x{:x}: {}", level, frame, e);
                stats.failed_reads += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        stats.tables_read += 1;

        for index in 0..ENTRIES_PER_TABLE {
            let entry = entry_at(&table, index);
            if !entry.is_present() {
                continue;
            }
            if level == Level::Pgd {
                if let Some(anchor) = anchor {
                    if entry != anchor {
                        stats.pgd_skipped += 1;
                        continue;
                    }
                }
            }

            let address = base | level.fragment(index);
            let Some(next) = level.next() else {
                stats.leaves_visited += 1;
                visitor.visit_leaf(&Leaf {
                    frame: entry.pfn(),
                    virtual_address: canonicalize(address),
                    level,
                    entry,
                })?;
                continue;
            };

            if level != Level::Pgd && entry.is_huge() {
                if level == Level::Pud {
                    stats.huge_1g += 1;
                } else {
                    stats.huge_2m += 1;
                }
                let leaf = Leaf {
                    frame: entry.pfn(),
                    virtual_address: canonicalize(address),
                    level,
                    entry,
                };
                trace!("{}: 0x{:x} large leaf, not scanned", level, leaf.virtual_address);
                visitor.visit_huge_leaf(&leaf)?;
                continue;
            }

            self.walk_table(next, entry.pfn(), address, anchor, stats, visitor)?;
        }

        Ok(())
    }
}
