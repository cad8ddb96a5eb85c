//! Pointer search inside 4 KiB leaf pages
use crate::core::classifier::{AddressClass, AddressClassifier};
use crate::error::ScanError;
use crate::memory::{Page, PhysicalMemory, PAGE_SIZE};
use crate::paging::{Leaf, LeafVisitor};
use crate::symbols::{SymbolCache, SymbolLookup};
use log::warn;

/// Candidate pointers are read as 8-byte little-endian windows.
pub const WINDOW_SIZE: usize = 8;
/// Last window start inspected in a page.
pub const LAST_OFFSET: usize = PAGE_SIZE - WINDOW_SIZE - 1;

/// One candidate pointer found in a leaf page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub frame: u64,
    /// Byte offset inside the page.
    pub offset: usize,
    pub address: u64,
    pub class: AddressClass,
    /// Empty when the address did not resolve.
    pub symbol: String,
}

/// Consumer of scan results.
pub trait MatchSink {
    /// Called once per frame, before its first record.
    fn begin_frame(&mut self, frame: u64, virtual_address: u64) -> Result<(), ScanError>;

    fn record_match(&mut self, record: &MatchRecord) -> Result<(), ScanError>;
}

/// State shared across every leaf of one run.
#[derive(Debug)]
pub struct ScanContext {
    pub classifier: AddressClassifier,
    pub symbols: SymbolCache,
    pub matches: u64,
    pub frames_with_matches: u64,
    /// Leaf frames that could not be read.
    pub failed_reads: u64,
}

impl ScanContext {
    pub fn new(classifier: AddressClassifier) -> Self {
        ScanContext {
            classifier,
            symbols: SymbolCache::new(),
            matches: 0,
            frames_with_matches: 0,
            failed_reads: 0,
        }
    }
}

/// Offsets in `page` holding a text or module pointer, in ascending order.
pub fn find_candidates<'p>(
    page: &'p Page,
    classifier: &'p AddressClassifier,
) -> impl Iterator<Item = (usize, u64, AddressClass)> + 'p {
    (0..=LAST_OFFSET).filter_map(move |offset| {
        let mut window = [0u8; WINDOW_SIZE];
        window.copy_from_slice(&page[offset..offset + WINDOW_SIZE]);
        let value = u64::from_le_bytes(window);
        let class = classifier.classify(value);
        class.is_reportable().then_some((offset, value, class))
    })
}

pub struct LeafPageScanner<'a> {
    memory: &'a dyn PhysicalMemory,
    lookup: &'a dyn SymbolLookup,
    context: &'a mut ScanContext,
    sink: &'a mut dyn MatchSink,
}

impl<'a> LeafPageScanner<'a> {
    pub fn new(
        memory: &'a dyn PhysicalMemory,
        lookup: &'a dyn SymbolLookup,
        context: &'a mut ScanContext,
        sink: &'a mut dyn MatchSink,
    ) -> Self {
        LeafPageScanner {
            memory,
            lookup,
            context,
            sink,
        }
    }

    /// Scan one frame and forward every match. Returns the match count.
    ///
    /// A frame that fails with a recoverable read error yields no matches.
    pub fn scan_frame(&mut self, frame: u64, virtual_address: u64) -> Result<usize, ScanError> {
        let page = match self.memory.read_physical_page(frame) {
            Ok(page) => page,
            Err(e) if e.is_recoverable() => {
                warn!("Skipping leaf 0x{:x} (frame 0x{:x}): {}", virtual_address, frame, e);
                self.context.failed_reads += 1;
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        let classifier = self.context.classifier;
        let mut found = 0;
        for (offset, address, class) in find_candidates(&page, &classifier) {
            if found == 0 {
                self.sink.begin_frame(frame, virtual_address)?;
                self.context.frames_with_matches += 1;
            }
            let symbol = self.context.symbols.resolve(address, self.lookup).to_string();
            self.sink.record_match(&MatchRecord {
                frame,
                offset,
                address,
                class,
                symbol,
            })?;
            found += 1;
        }

        self.context.matches += found as u64;
        Ok(found)
    }
}

impl LeafVisitor for LeafPageScanner<'_> {
    fn visit_leaf(&mut self, leaf: &Leaf) -> Result<(), ScanError> {
        self.scan_frame(leaf.frame, leaf.virtual_address).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layout::{KaslrMode, DEFAULT_KERNEL_TEXT_MAPPING};
    use crate::memory::SparseMemory;
    use crate::paging::{PageTableWalker, PagingRoot, WalkScope};
    use crate::symbols::SymbolResolver;

    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<u64>,
        records: Vec<MatchRecord>,
    }

    impl MatchSink for RecordingSink {
        fn begin_frame(&mut self, frame: u64, _virtual_address: u64) -> Result<(), ScanError> {
            self.frames.push(frame);
            Ok(())
        }

        fn record_match(&mut self, record: &MatchRecord) -> Result<(), ScanError> {
            self.records.push(record.clone());
            Ok(())
        }
    }

    fn nokaslr_context() -> ScanContext {
        ScanContext::new(AddressClassifier::for_mode(
            KaslrMode::Disabled,
            DEFAULT_KERNEL_TEXT_MAPPING,
        ))
    }

    fn scan(
        memory: &SparseMemory,
        lookup: &SymbolResolver,
        frame: u64,
    ) -> (usize, RecordingSink, ScanContext) {
        let mut context = nokaslr_context();
        let mut sink = RecordingSink::default();
        let found = {
            let mut scanner = LeafPageScanner::new(memory, lookup, &mut context, &mut sink);
            scanner.scan_frame(frame, 0xffff_ffff_8000_0000).unwrap()
        };
        (found, sink, context)
    }

    #[test]
    fn test_direct_map_page_yields_nothing() {
        let mut memory = SparseMemory::new(PagingRoot::new(0));
        for offset in (0..PAGE_SIZE).step_by(8) {
            memory.write_u64(7, offset, 0xffff_8880_0000_1000);
        }
        let (found, sink, context) = scan(&memory, &SymbolResolver::new(), 7);
        assert_eq!(found, 0);
        assert!(sink.records.is_empty());
        assert!(sink.frames.is_empty());
        assert_eq!(context.frames_with_matches, 0);
    }

    #[test]
    fn test_single_text_pointer() {
        let mut memory = SparseMemory::new(PagingRoot::new(0));
        memory.write_u64(7, 16, 0xffff_ffff_8001_0000);
        let mut resolver = SymbolResolver::new();
        resolver.add_symbol("startup_64".to_string(), 0xffff_ffff_8001_0000);

        let (found, sink, context) = scan(&memory, &resolver, 7);
        assert_eq!(found, 1);
        assert_eq!(
            sink.records,
            vec![MatchRecord {
                frame: 7,
                offset: 16,
                address: 0xffff_ffff_8001_0000,
                class: AddressClass::KernelText,
                symbol: "startup_64".to_string(),
            }]
        );
        assert_eq!(sink.frames, vec![7]);
        assert_eq!(context.matches, 1);
    }

    #[test]
    fn test_window_range_ends_at_4087() {
        let mut memory = SparseMemory::new(PagingRoot::new(0));
        memory.write_u64(1, 4087, 0xffff_ffff_8001_0000);
        memory.write_u64(2, 4088, 0xffff_ffff_8001_0000);

        let (found, sink, _) = scan(&memory, &SymbolResolver::new(), 1);
        assert_eq!(found, 1);
        assert_eq!(sink.records[0].offset, LAST_OFFSET);
        assert_eq!(sink.records[0].symbol, "");

        let (found, _, _) = scan(&memory, &SymbolResolver::new(), 2);
        assert_eq!(found, 0);
    }

    #[test]
    fn test_progress_marker_once_per_frame() {
        let mut memory = SparseMemory::new(PagingRoot::new(0));
        memory.write_u64(3, 0, 0xffff_ffff_8000_1000);
        memory.write_u64(3, 64, 0xffff_ffff_a000_2000);
        memory.write_u64(3, 128, 0xffff_ffff_8000_1000);

        let (found, sink, context) = scan(&memory, &SymbolResolver::new(), 3);
        assert_eq!(found, 3);
        assert_eq!(sink.frames, vec![3]);
        let classes: Vec<_> = sink.records.iter().map(|r| r.class).collect();
        assert_eq!(
            classes,
            vec![AddressClass::KernelText, AddressClass::Module, AddressClass::KernelText]
        );
        // Repeated address served from the cache
        assert_eq!(context.symbols.misses(), 2);
        assert_eq!(context.symbols.hits(), 1);
    }

    #[test]
    fn test_unreadable_leaf_is_skipped() {
        let memory = SparseMemory::new(PagingRoot::new(0));
        let (found, sink, context) = scan(&memory, &SymbolResolver::new(), 9);
        assert_eq!(found, 0);
        assert!(sink.records.is_empty());
        assert_eq!(context.failed_reads, 1);
    }

    fn walk_once(memory: &SparseMemory) -> Vec<MatchRecord> {
        let resolver = SymbolResolver::new();
        let mut context = nokaslr_context();
        let mut sink = RecordingSink::default();
        {
            let mut scanner = LeafPageScanner::new(memory, &resolver, &mut context, &mut sink);
            PageTableWalker::new(memory, WalkScope::Full)
                .walk(&mut scanner)
                .unwrap();
        }
        sink.records
    }

    #[test]
    fn test_repeated_walks_are_identical() {
        let mut memory = SparseMemory::new(PagingRoot::new(0x1000));
        memory.set_entry(1, 511, 0x2003);
        memory.set_entry(2, 510, 0x3003);
        memory.set_entry(3, 0, 0x4003);
        memory.set_entry(4, 0, 0x10063);
        memory.set_entry(4, 3, 0x11063);
        memory.write_u64(0x10, 8, 0xffff_ffff_8100_0000);
        memory.write_u64(0x11, 40, 0xffff_ffff_a010_0000);
        memory.write_u64(0x11, 200, 0xffff_ffff_8100_0000);

        let first = walk_once(&memory);
        let second = walk_once(&memory);
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(first[0].frame, 0x10);
        assert_eq!(first[2].offset, 200);
    }
}
