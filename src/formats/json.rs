//! JSON rendering of report evaluations
use crate::analysis::{Evaluation, FrameSummary, PageCategory};
use crate::error::ScanError;
use crate::formats::EvaluationFormatter;
use serde::Serialize;

#[derive(Serialize)]
struct Counts {
    pages: usize,
    candidates: usize,
    module: usize,
    direct: usize,
    no_symbols: usize,
    partial_symbols: usize,
}

#[derive(Serialize)]
struct OutputWrapper<'a> {
    timestamp: String,
    counts: Counts,
    candidates: Vec<&'a FrameSummary>,
}

/// JSON formatter that outputs the evaluation with metadata
pub struct JsonFormatter;

impl EvaluationFormatter for JsonFormatter {
    fn format_evaluation(&self, evaluation: &Evaluation) -> Result<String, ScanError> {
        let wrapper = OutputWrapper {
            timestamp: chrono::Utc::now().to_rfc3339(),
            counts: Counts {
                pages: evaluation.page_count(),
                candidates: evaluation.count(PageCategory::Candidate),
                module: evaluation.count(PageCategory::Module),
                direct: evaluation.count(PageCategory::Direct),
                no_symbols: evaluation.count(PageCategory::NoSymbols),
                partial_symbols: evaluation.count(PageCategory::PartialSymbols),
            },
            candidates: evaluation.in_category(PageCategory::Candidate).collect(),
        };

        Ok(serde_json::to_string_pretty(&wrapper)?)
    }
}
