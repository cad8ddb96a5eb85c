//! Text (table) rendering of report evaluations
use crate::analysis::{Evaluation, PageCategory, ReportRow};
use crate::error::ScanError;
use crate::formats::EvaluationFormatter;
use prettytable::{Cell, Row, Table};

/// Human-readable summary and candidate listing
pub struct TextFormatter;

impl TextFormatter {
    pub fn format_rows(rows: &[&ReportRow]) -> String {
        let mut table = Table::new();
        table.set_format(*prettytable::format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        table.set_titles(Row::new(vec![
            Cell::new("PFN").style_spec("c"),
            Cell::new("OFFSET").style_spec("c"),
            Cell::new("ADDRESS").style_spec("c"),
            Cell::new("TYPE").style_spec("c"),
            Cell::new("SYMBOL").style_spec("c"),
        ]));

        for row in rows {
            table.add_row(Row::new(vec![
                Cell::new(&row.pfn),
                Cell::new(&row.offset.to_string()),
                Cell::new(&row.address),
                Cell::new(&row.class.to_string()),
                Cell::new(row.symbol.as_deref().unwrap_or("")),
            ]));
        }

        table.to_string()
    }
}

impl EvaluationFormatter for TextFormatter {
    fn format_evaluation(&self, evaluation: &Evaluation) -> Result<String, ScanError> {
        let mut counts = Table::new();
        counts.set_format(*prettytable::format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        counts.set_titles(Row::new(vec![
            Cell::new("CATEGORY").style_spec("c"),
            Cell::new("PAGES").style_spec("c"),
        ]));
        for (label, category) in [
            ("Candidates", PageCategory::Candidate),
            ("Module pages", PageCategory::Module),
            ("Direct pages", PageCategory::Direct),
            ("No symbols", PageCategory::NoSymbols),
            ("Partial symbols", PageCategory::PartialSymbols),
        ] {
            counts.add_row(Row::new(vec![
                Cell::new(label),
                Cell::new(&evaluation.count(category).to_string()),
            ]));
        }

        let mut output = format!("{} pages\n{}", evaluation.page_count(), counts);
        output.push_str("Candidates:\n");
        for frame in evaluation.in_category(PageCategory::Candidate) {
            let rows: Vec<&ReportRow> = frame.rows.iter().collect();
            output.push_str(&format!("0x{:x}\n", frame.frame));
            output.push_str(&TextFormatter::format_rows(&rows));
        }
        Ok(output)
    }
}
