//! Report sink shared by the scan output formats
use crate::analysis::Evaluation;
use crate::error::ScanError;
use crate::paging::ScanStatistics;
use crate::scanner::{MatchRecord, MatchSink, ScanContext};
use log::info;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Column names of a scan report, in order.
pub const REPORT_FIELDS: [&str; 5] = ["PFN", "Offset", "Address", "Type", "Symbol"];

/// Trait for match record formatters
pub trait RecordFormatter {
    fn write_header(&mut self) -> Result<(), ScanError>;

    /// Append one record and push it to the underlying sink.
    fn write_record(&mut self, record: &MatchRecord) -> Result<(), ScanError>;
}

/// Enum for report format types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Csv,
    Jsonl,
}

impl ReportFormat {
    pub fn formatter<W: Write + 'static>(self, sink: W) -> Box<dyn RecordFormatter> {
        match self {
            ReportFormat::Csv => Box::new(crate::formats::csv::CsvReport::new(sink)),
            ReportFormat::Jsonl => Box::new(crate::formats::jsonl::JsonlReport::new(sink)),
        }
    }
}

/// Trait for evaluation summary formatters
pub trait EvaluationFormatter {
    fn format_evaluation(&self, evaluation: &Evaluation) -> Result<String, ScanError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationFormat {
    Text,
    Json,
}

impl EvaluationFormat {
    pub fn formatter(self) -> Box<dyn EvaluationFormatter> {
        match self {
            EvaluationFormat::Text => Box::new(crate::formats::text::TextFormatter),
            EvaluationFormat::Json => Box::new(crate::formats::json::JsonFormatter),
        }
    }
}

/// Writes match records to the report and progress lines to a diagnostic
/// stream.
pub struct ReportWriter {
    formatter: Box<dyn RecordFormatter>,
    progress: Box<dyn Write>,
    rows: u64,
}

impl ReportWriter {
    pub fn new(formatter: Box<dyn RecordFormatter>, progress: Box<dyn Write>) -> Self {
        ReportWriter {
            formatter,
            progress,
            rows: 0,
        }
    }

    /// Create (truncate) the report file at `path` and write its header.
    /// Progress goes to stdout.
    pub fn create(path: &Path, format: ReportFormat) -> Result<Self, ScanError> {
        let file = File::create(path).map_err(|e| {
            ScanError::output(format!("cannot create {}: {}", path.display(), e))
        })?;
        let mut writer = ReportWriter::new(format.formatter(file), Box::new(std::io::stdout()));
        writer.begin()?;
        info!("Writing {:?} report to {}", format, path.display());
        Ok(writer)
    }

    /// Write the report header and announce the fields on the diagnostic stream.
    pub fn begin(&mut self) -> Result<(), ScanError> {
        self.formatter.write_header()?;
        writeln!(self.progress, "Fields: {}", REPORT_FIELDS.join(",")).map_err(ScanError::output)?;
        self.progress.flush().map_err(ScanError::output)
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Print the end-of-run summary to the diagnostic stream.
    pub fn finish(
        &mut self,
        stats: &ScanStatistics,
        context: &ScanContext,
    ) -> Result<(), ScanError> {
        let lines = [
            format!("Present 4 KiB pages scanned: {}", stats.leaves_visited),
            format!("Pages with matches: {}", context.frames_with_matches),
            format!("Matches written: {}", self.rows),
            format!(
                "Large pages skipped: {} (1 GiB), {} (2 MiB)",
                stats.huge_1g, stats.huge_2m
            ),
            format!(
                "Failed reads: {}",
                stats.failed_reads + context.failed_reads
            ),
        ];
        for line in lines {
            writeln!(self.progress, "{}", line).map_err(ScanError::output)?;
        }
        self.progress.flush().map_err(ScanError::output)
    }
}

impl MatchSink for ReportWriter {
    fn begin_frame(&mut self, frame: u64, _virtual_address: u64) -> Result<(), ScanError> {
        writeln!(self.progress, "PFN: 0x{:x}", frame).map_err(ScanError::output)?;
        self.progress.flush().map_err(ScanError::output)
    }

    fn record_match(&mut self, record: &MatchRecord) -> Result<(), ScanError> {
        self.formatter.write_record(record)?;
        self.rows += 1;
        Ok(())
    }
}
