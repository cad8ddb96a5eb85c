//! Library crate for the kernel pointer scanner

// Allow clippy lints that would require significant refactoring
#![allow(clippy::new_without_default)]
#![allow(clippy::manual_range_contains)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::unusual_byte_groupings)]

pub mod analysis;
pub mod error;
pub mod memory;
pub mod paging;
pub mod scanner;
pub mod symbols;

// Core modules
pub mod core {
    pub mod classifier;
    pub mod layout;
}

// CLI modules
pub mod cli {
    pub mod args;
}

// Format modules
pub mod formats {
    pub mod csv;
    pub mod json;
    pub mod jsonl;
    pub mod text;
    pub mod traits;

    pub use traits::{
        EvaluationFormat, EvaluationFormatter, RecordFormatter, ReportFormat, ReportWriter,
    };
}
