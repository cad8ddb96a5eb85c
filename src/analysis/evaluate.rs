//! Per-frame categorisation of a scan report
use crate::analysis::ReportRow;
use crate::core::classifier::AddressClass;
use crate::error::ScanError;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeMap;

/// What a frame's rows say about it. The first matching rule wins, in
/// declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageCategory {
    /// References module memory.
    Module,
    /// References the direct map.
    Direct,
    /// No pointer resolved to a symbol.
    NoSymbols,
    /// Some pointers resolved, some did not.
    PartialSymbols,
    /// Every pointer resolved.
    Candidate,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    pub frame: u64,
    pub category: PageCategory,
    pub rows: Vec<ReportRow>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Evaluation {
    pub frames: Vec<FrameSummary>,
}

impl Evaluation {
    pub fn page_count(&self) -> usize {
        self.frames.len()
    }

    pub fn count(&self, category: PageCategory) -> usize {
        self.frames.iter().filter(|f| f.category == category).count()
    }

    pub fn in_category(&self, category: PageCategory) -> impl Iterator<Item = &FrameSummary> {
        self.frames.iter().filter(move |f| f.category == category)
    }
}

pub fn categorize(rows: &[ReportRow]) -> PageCategory {
    let has_class = |class: AddressClass| rows.iter().any(|r| r.address_class() == Some(class));

    if has_class(AddressClass::Module) {
        PageCategory::Module
    } else if has_class(AddressClass::DirectMap) {
        PageCategory::Direct
    } else if !rows.iter().any(ReportRow::has_symbol) {
        PageCategory::NoSymbols
    } else if rows.iter().any(|r| !r.has_symbol()) {
        PageCategory::PartialSymbols
    } else {
        PageCategory::Candidate
    }
}

/// Group rows by frame (ascending) and categorise each frame.
pub fn evaluate(rows: Vec<ReportRow>) -> Result<Evaluation, ScanError> {
    let mut groups: BTreeMap<u64, Vec<ReportRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.frame()?).or_default().push(row);
    }

    let progress = ProgressBar::new(groups.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} frames") {
        progress.set_style(style);
    }

    let mut evaluation = Evaluation::default();
    for (frame, rows) in groups {
        evaluation.frames.push(FrameSummary {
            frame,
            category: categorize(&rows),
            rows,
        });
        progress.inc(1);
    }
    progress.finish_and_clear();

    Ok(evaluation)
}
