//! Kernel symbol tables and nearest-symbol lookup
use crate::error::ScanError;
use log::{debug, info};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub mod cache;

pub use cache::{SymbolCache, SYMBOL_CACHE_SIZE};

/// Lookups further than this past the nearest symbol fail.
pub const DEFAULT_MAX_SYMBOL_DISTANCE: u64 = 0x10_0000;

/// Resolves an address to the name of the closest kernel symbol.
pub trait SymbolLookup {
    fn lookup_symbol_near(&self, address: u64) -> Result<String, ScanError>;
}

/// Structure to hold symbol information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: u64,
    /// Owning module for kallsyms lines tagged `[module]`.
    pub module: Option<String>,
}

/// Symbol resolver backed by a System.map or kallsyms dump
pub struct SymbolResolver {
    // Sorted by address
    symbols: Vec<Symbol>,
    max_distance: u64,
}

impl SymbolResolver {
    pub fn new() -> Self {
        SymbolResolver {
            symbols: Vec::new(),
            max_distance: DEFAULT_MAX_SYMBOL_DISTANCE,
        }
    }

    pub fn with_max_distance(mut self, max_distance: u64) -> Self {
        self.max_distance = max_distance;
        self
    }

    /// Add a symbol to the resolver
    pub fn add_symbol(&mut self, name: String, address: u64) {
        let index = self.symbols.partition_point(|s| s.address <= address);
        self.symbols.insert(
            index,
            Symbol {
                name,
                address,
                module: None,
            },
        );
    }

    /// Get the number of symbols
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Parse a System.map or kallsyms file. Both share one line format;
    /// kallsyms adds an optional `[module]` column.
    pub fn load_symbol_file(&mut self, file_path: &Path) -> Result<(), ScanError> {
        let file = File::open(file_path)?;
        let added = self.load_lines(BufReader::new(file))?;
        info!("Loaded {} symbols from {}", added, file_path.display());
        Ok(())
    }

    /// Parse `address type name [module]` lines. Zero addresses (unprivileged
    /// kallsyms reads, absolute symbols) carry no location and are skipped.
    pub fn load_lines<R: BufRead>(&mut self, reader: R) -> Result<usize, ScanError> {
        let mut added = 0;
        for line_result in reader.lines() {
            let line = line_result?;
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                continue;
            }

            let symbol_type = parts[1];
            // System.map and kallsyms use single letter types like T, D, etc.
            if symbol_type.len() != 1 {
                continue;
            }
            let Ok(address) = u64::from_str_radix(parts[0].trim_start_matches("0x"), 16) else {
                continue;
            };
            if address == 0 {
                continue;
            }

            let module = parts
                .get(3)
                .filter(|m| m.starts_with('['))
                .map(|m| m.trim_matches(|c| c == '[' || c == ']').to_string());
            self.symbols.push(Symbol {
                name: parts[2].to_string(),
                address,
                module,
            });
            added += 1;
        }

        // Stable, so aliases keep file order
        self.symbols.sort_by_key(|s| s.address);
        debug!("Symbol table now holds {} entries", self.symbols.len());
        Ok(added)
    }

    /// Symbol starting exactly at `address`.
    pub fn symbol_at(&self, address: u64) -> Option<&Symbol> {
        let index = self.symbols.partition_point(|s| s.address <= address);
        index
            .checked_sub(1)
            .map(|i| &self.symbols[i])
            .filter(|s| s.address == address)
    }

    /// Closest symbol at or below `address` and the distance to it.
    pub fn nearest(&self, address: u64) -> Option<(&Symbol, u64)> {
        let index = self.symbols.partition_point(|s| s.address <= address);
        let symbol = &self.symbols[index.checked_sub(1)?];
        let offset = address - symbol.address;
        if offset > self.max_distance {
            return None;
        }
        Some((symbol, offset))
    }

    /// Exact address → bare symbol name, as used to relabel an existing report.
    /// Later aliases at the same address win.
    pub fn exact_names(&self) -> HashMap<u64, String> {
        self.symbols
            .iter()
            .map(|s| (s.address, s.name.clone()))
            .collect()
    }
}

impl SymbolLookup for SymbolResolver {
    fn lookup_symbol_near(&self, address: u64) -> Result<String, ScanError> {
        self.nearest(address)
            .map(|(symbol, offset)| format_symbol(symbol, offset))
            .ok_or(ScanError::SymbolResolution(address))
    }
}

/// `name`, `name+0x10`, `name+0x10 [module]`
fn format_symbol(symbol: &Symbol, offset: u64) -> String {
    let mut text = symbol.name.clone();
    if offset != 0 {
        text.push_str(&format!("+0x{:x}", offset));
    }
    if let Some(module) = &symbol.module {
        text.push_str(&format!(" [{}]", module));
    }
    text
}
