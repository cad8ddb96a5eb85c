//! Small lookaside cache in front of the symbol table
use crate::symbols::SymbolLookup;
use log::trace;

pub const SYMBOL_CACHE_SIZE: usize = 32;

#[derive(Debug, Clone)]
struct CacheEntry {
    address: u64,
    name: String,
}

/// Fixed-capacity address → symbol name cache.
///
/// Replacement is round-robin over the slots in insertion order, not LRU.
/// Failed lookups are stored with an empty name.
#[derive(Debug)]
pub struct SymbolCache {
    entries: Vec<CacheEntry>,
    capacity: usize,
    inserted: u64,
    hits: u64,
    misses: u64,
}

impl SymbolCache {
    pub fn new() -> Self {
        SymbolCache::with_capacity(SYMBOL_CACHE_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SymbolCache {
            entries: Vec::with_capacity(capacity),
            capacity,
            inserted: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Name for `address`, asking `lookup` only on a miss.
    pub fn resolve(&mut self, address: u64, lookup: &dyn SymbolLookup) -> &str {
        if let Some(slot) = self.find(address) {
            self.hits += 1;
            return &self.entries[slot].name;
        }

        self.misses += 1;
        let name = match lookup.lookup_symbol_near(address) {
            Ok(name) => name,
            Err(e) => {
                trace!("{}", e);
                String::new()
            }
        };
        let slot = self.insert(address, name);
        &self.entries[slot].name
    }

    /// Cached name without touching the lookup.
    pub fn get(&self, address: u64) -> Option<&str> {
        self.find(address).map(|slot| self.entries[slot].name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    // Newest to oldest
    fn find(&self, address: u64) -> Option<usize> {
        let len = self.entries.len();
        if len == 0 {
            return None;
        }
        let newest = ((self.inserted - 1) % self.capacity as u64) as usize;
        (0..len)
            .map(|step| (newest + len - step) % len)
            .find(|&slot| self.entries[slot].address == address)
    }

    fn insert(&mut self, address: u64, name: String) -> usize {
        let slot = (self.inserted % self.capacity as u64) as usize;
        let entry = CacheEntry { address, name };
        if slot == self.entries.len() {
            self.entries.push(entry);
        } else {
            self.entries[slot] = entry;
        }
        self.inserted += 1;
        slot
    }
}

impl Default for SymbolCache {
    fn default() -> Self {
        SymbolCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct CountingLookup {
        calls: Cell<usize>,
        order: RefCell<Vec<u64>>,
    }

    impl SymbolLookup for CountingLookup {
        fn lookup_symbol_near(&self, address: u64) -> Result<String, ScanError> {
            self.calls.set(self.calls.get() + 1);
            self.order.borrow_mut().push(address);
            if address & 1 == 1 {
                return Err(ScanError::SymbolResolution(address));
            }
            Ok(format!("sym_{:x}", address))
        }
    }

    fn address(i: u64) -> u64 {
        0xffff_ffff_8100_0000 + i * 0x10
    }

    #[test]
    fn test_hit_skips_lookup() {
        let lookup = CountingLookup::default();
        let mut cache = SymbolCache::new();
        assert_eq!(cache.resolve(0x1000, &lookup), "sym_1000");
        assert_eq!(cache.resolve(0x1000, &lookup), "sym_1000");
        assert_eq!(lookup.calls.get(), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_failed_lookup_cached_as_empty() {
        let lookup = CountingLookup::default();
        let mut cache = SymbolCache::new();
        assert_eq!(cache.resolve(0x1001, &lookup), "");
        assert_eq!(cache.resolve(0x1001, &lookup), "");
        assert_eq!(lookup.calls.get(), 1);
        assert_eq!(cache.get(0x1001), Some(""));
    }

    #[test]
    fn test_thirty_three_inserts_evict_the_oldest() {
        let lookup = CountingLookup::default();
        let mut cache = SymbolCache::new();
        for i in 0..33 {
            cache.resolve(address(i), &lookup);
        }
        assert_eq!(lookup.calls.get(), 33);
        assert_eq!(cache.len(), SYMBOL_CACHE_SIZE);

        // The 32 most recent stay resident
        for i in 1..33 {
            assert_eq!(cache.resolve(address(i), &lookup), format!("sym_{:x}", address(i)));
        }
        assert_eq!(lookup.calls.get(), 33);

        assert_eq!(cache.get(address(0)), None);
        cache.resolve(address(0), &lookup);
        assert_eq!(lookup.calls.get(), 34);
    }

    #[test]
    fn test_round_robin_not_lru() {
        let lookup = CountingLookup::default();
        let mut cache = SymbolCache::with_capacity(2);
        cache.resolve(0x10, &lookup);
        cache.resolve(0x20, &lookup);
        // Touching 0x10 does not protect it
        cache.resolve(0x10, &lookup);
        cache.resolve(0x30, &lookup);
        assert_eq!(cache.get(0x10), None);
        assert_eq!(cache.get(0x20), Some("sym_20"));
        assert_eq!(cache.get(0x30), Some("sym_30"));
        assert_eq!(*lookup.order.borrow(), vec![0x10, 0x20, 0x30]);
    }

    #[test]
    fn test_wraparound_overwrites_first_slot() {
        let lookup = CountingLookup::default();
        let mut cache = SymbolCache::with_capacity(3);
        for a in [0x10, 0x20, 0x30, 0x40] {
            cache.resolve(a, &lookup);
        }
        // Slot 0 was overwritten by 0x40
        assert_eq!(cache.get(0x40), Some("sym_40"));
        assert_eq!(cache.get(0x10), None);
        assert_eq!(cache.capacity(), 3);
    }
}
