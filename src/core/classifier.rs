//! Range-based classification of candidate kernel pointers
use crate::core::layout::{AddressLayout, KaslrMode};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressClass {
    KernelText,
    Module,
    DirectMap,
    None,
}

impl AddressClass {
    /// Numeric tag written to reports.
    pub fn tag(self) -> u8 {
        match self {
            AddressClass::KernelText => 0,
            AddressClass::Module => 1,
            AddressClass::DirectMap => 2,
            AddressClass::None => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(AddressClass::KernelText),
            1 => Some(AddressClass::Module),
            2 => Some(AddressClass::DirectMap),
            3 => Some(AddressClass::None),
            _ => None,
        }
    }

    /// Only text and module pointers produce match records.
    pub fn is_reportable(self) -> bool {
        matches!(self, AddressClass::KernelText | AddressClass::Module)
    }

    pub fn name(self) -> &'static str {
        match self {
            AddressClass::KernelText => "kernel",
            AddressClass::Module => "module",
            AddressClass::DirectMap => "direct",
            AddressClass::None => "none",
        }
    }
}

impl fmt::Display for AddressClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressClassifier {
    layout: AddressLayout,
}

impl AddressClassifier {
    pub fn new(layout: AddressLayout) -> Self {
        AddressClassifier { layout }
    }

    pub fn for_mode(mode: KaslrMode, kernel_text_base: u64) -> Self {
        AddressClassifier::new(AddressLayout::new(mode, kernel_text_base))
    }

    pub fn layout(&self) -> &AddressLayout {
        &self.layout
    }

    /// Classify a raw 64-bit value. Ranges are tested direct map first, then
    /// kernel text, then modules, so a value on a shared boundary takes the
    /// earlier class.
    pub fn classify(&self, value: u64) -> AddressClass {
        if self.layout.direct_map.contains(value) {
            AddressClass::DirectMap
        } else if self.layout.kernel_text.contains(value) {
            AddressClass::KernelText
        } else if self.layout.modules.contains(value) {
            AddressClass::Module
        } else {
            AddressClass::None
        }
    }
}

impl Default for AddressClassifier {
    fn default() -> Self {
        AddressClassifier::new(AddressLayout::default())
    }
}
