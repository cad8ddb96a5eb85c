//! Error types for the scanner
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    /// The physical memory source could not be opened or mapped.
    #[error("physical memory source {} unavailable: {source}", path.display())]
    DriverUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("physical read of frame 0x{frame:x} failed: {reason}")]
    PhysicalRead { frame: u64, reason: String },

    #[error("no symbol near 0x{0:x}")]
    SymbolResolution(u64),

    /// The report sink rejected a write. Always fatal.
    #[error("report write failed: {0}")]
    OutputWrite(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScanError {
    /// Wrap a sink failure so it is reported as an output error rather
    /// than a generic IO error.
    pub fn output(error: impl std::fmt::Display) -> Self {
        ScanError::OutputWrite(error.to_string())
    }

    /// Whether the walk may continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ScanError::PhysicalRead { .. } | ScanError::SymbolResolution(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        let read = ScanError::PhysicalRead {
            frame: 0x42,
            reason: "short read".to_string(),
        };
        assert!(read.is_recoverable());
        assert!(ScanError::SymbolResolution(0xffffffff81000000).is_recoverable());
        assert!(!ScanError::output("disk full").is_recoverable());
        assert_eq!(read.to_string(), "physical read of frame 0x42 failed: short read");
    }
}
