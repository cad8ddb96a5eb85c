//! Kernel virtual address layout used to classify candidate pointers
//!
//! The boundaries change between architectures and kernel versions, so they
//! are carried in one record that can be built from the KASLR mode or loaded
//! from a JSON file:
//!
//! ```json
//! {
//!   "direct_map":  { "start": "0xffff888000000000", "end": "0xffffc87fffffffff" },
//!   "kernel_text": { "start": "0xffffffff80000000", "end": "0xffffffff9fffffff" },
//!   "modules":     { "start": "0xffffffffa0000000", "end": "0xfffffffffeffffff" }
//! }
//! ```
use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// __START_KERNEL_map
pub const DEFAULT_KERNEL_TEXT_MAPPING: u64 = 0xffff_ffff_8000_0000;
pub const STEP_1G: u64 = 0x4000_0000;

const DIRECT_MAP_START: u64 = 0xffff_8880_0000_0000;
const DIRECT_MAP_END: u64 = 0xffff_c87f_ffff_ffff;
const NOKASLR_TEXT_START: u64 = 0xffff_ffff_8000_0000;
const NOKASLR_TEXT_END: u64 = 0xffff_ffff_9fff_ffff;
const NOKASLR_MODULES_START: u64 = 0xffff_ffff_a000_0000;
const NOKASLR_MODULES_END: u64 = 0xffff_ffff_feff_ffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KaslrMode {
    Enabled,
    Disabled,
}

/// Inclusive address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    #[serde(with = "hex_address")]
    pub start: u64,
    #[serde(with = "hex_address")]
    pub end: u64,
}

impl AddressRange {
    pub const fn new(start: u64, end: u64) -> Self {
        AddressRange { start, end }
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressLayout {
    /// Linear map of all physical memory (page_offset_base). Recognised but
    /// never reported.
    pub direct_map: AddressRange,
    pub kernel_text: AddressRange,
    pub modules: AddressRange,
}

impl AddressLayout {
    /// Layout for a KASLR assumption.
    ///
    /// With KASLR the text and module windows follow `kernel_text_base`;
    /// without it the fixed x86-64 defaults apply and the base is ignored.
    pub fn new(mode: KaslrMode, kernel_text_base: u64) -> Self {
        let direct_map = AddressRange::new(DIRECT_MAP_START, DIRECT_MAP_END);
        match mode {
            KaslrMode::Enabled => AddressLayout {
                direct_map,
                kernel_text: AddressRange::new(
                    kernel_text_base,
                    kernel_text_base.saturating_add(STEP_1G),
                ),
                modules: AddressRange::new(
                    kernel_text_base.saturating_add(STEP_1G),
                    kernel_text_base.saturating_add(2 * STEP_1G),
                ),
            },
            KaslrMode::Disabled => AddressLayout {
                direct_map,
                kernel_text: AddressRange::new(NOKASLR_TEXT_START, NOKASLR_TEXT_END),
                modules: AddressRange::new(NOKASLR_MODULES_START, NOKASLR_MODULES_END),
            },
        }
    }

    /// Load a layout from a JSON file and check it.
    pub fn load_from_file(path: &Path) -> Result<Self, ScanError> {
        let content = std::fs::read_to_string(path)?;
        let layout: AddressLayout = serde_json::from_str(&content)?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        for (name, range) in [
            ("direct_map", &self.direct_map),
            ("kernel_text", &self.kernel_text),
            ("modules", &self.modules),
        ] {
            if range.start > range.end {
                return Err(ScanError::Config(format!(
                    "{} range starts at 0x{:x} after its end 0x{:x}",
                    name, range.start, range.end
                )));
            }
        }
        Ok(())
    }
}

impl Default for AddressLayout {
    fn default() -> Self {
        AddressLayout::new(KaslrMode::Enabled, DEFAULT_KERNEL_TEXT_MAPPING)
    }
}

/// Parse an address given as `0x`-prefixed hex or plain decimal.
pub fn parse_address(text: &str) -> Result<u64, String> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", text, e))
}

mod hex_address {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAddress {
        Number(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{:x}", value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match RawAddress::deserialize(deserializer)? {
            RawAddress::Number(value) => Ok(value),
            RawAddress::Text(text) => super::parse_address(&text).map_err(serde::de::Error::custom),
        }
    }
}
