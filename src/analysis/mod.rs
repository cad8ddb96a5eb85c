//! Reading scan reports back for offline analysis
use crate::core::classifier::AddressClass;
use crate::core::layout::parse_address;
use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub mod evaluate;

pub use evaluate::{evaluate, Evaluation, FrameSummary, PageCategory};

/// One row of a CSV scan report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    #[serde(rename = "PFN")]
    pub pfn: String,
    #[serde(rename = "Offset")]
    pub offset: u64,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Type")]
    pub class: u8,
    /// `None` for an empty field.
    #[serde(rename = "Symbol")]
    pub symbol: Option<String>,
}

impl ReportRow {
    pub fn frame(&self) -> Result<u64, ScanError> {
        parse_address(&self.pfn).map_err(ScanError::Config)
    }

    pub fn address_value(&self) -> Result<u64, ScanError> {
        parse_address(&self.address).map_err(ScanError::Config)
    }

    pub fn address_class(&self) -> Option<AddressClass> {
        AddressClass::from_tag(self.class)
    }

    pub fn has_symbol(&self) -> bool {
        self.symbol.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Load every row of a CSV report.
pub fn read_report(path: &Path) -> Result<Vec<ReportRow>, ScanError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in rdr.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Write rows as a CSV report, header included.
pub fn write_report(path: &Path, rows: &[ReportRow]) -> Result<(), ScanError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Replace every Symbol field with the exact-address name from `names`.
/// Addresses with no exact entry become unresolved.
pub fn relabel_symbols(
    rows: &mut [ReportRow],
    names: &HashMap<u64, String>,
) -> Result<(), ScanError> {
    for row in rows.iter_mut() {
        row.symbol = names.get(&row.address_value()?).cloned();
    }
    Ok(())
}

/// Rows of one frame, in report order.
pub fn rows_for_frame(rows: &[ReportRow], frame: u64) -> Result<Vec<&ReportRow>, ScanError> {
    let mut selected = Vec::new();
    for row in rows {
        if row.frame()? == frame {
            selected.push(row);
        }
    }
    Ok(selected)
}

/// Offsets of `rows` joined with commas.
pub fn joined_offsets(rows: &[&ReportRow]) -> String {
    rows.iter()
        .map(|row| row.offset.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    pub(crate) const SAMPLE_REPORT: &str = "\
PFN,Offset,Address,Type,Symbol
0x10,8,0xffffffff81000000,0,_text
0x10,64,0xffffffff81000040,0,startup_64+0x40
0x11,0,0xffffffffc0a00000,1,e1000_probe [e1000]
0x12,16,0xffffffff81200000,0,
0x13,24,0xffffffff81000000,0,_text
0x13,40,0xffffffff81300000,0,
0x14,128,0xffffffff81000000,0,_text
0x14,136,0xffffffff81000040,0,startup_64+0x40
";

    pub(crate) fn sample_file() -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(SAMPLE_REPORT.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_read_report() -> Result<(), ScanError> {
        let file = sample_file();
        let rows = read_report(file.path())?;
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0].frame()?, 0x10);
        assert_eq!(rows[2].address_class(), Some(AddressClass::Module));
        assert_eq!(rows[3].symbol, None);
        assert!(!rows[3].has_symbol());
        assert!(rows[1].has_symbol());
        Ok(())
    }

    #[test]
    fn test_offsets_for_frame() -> Result<(), ScanError> {
        let file = sample_file();
        let rows = read_report(file.path())?;
        let selected = rows_for_frame(&rows, 0x14)?;
        assert_eq!(selected.len(), 2);
        assert_eq!(joined_offsets(&selected), "128,136");
        assert!(rows_for_frame(&rows, 0x99)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_relabel_and_rewrite() -> Result<(), ScanError> {
        let file = sample_file();
        let mut rows = read_report(file.path())?;
        let mut names = HashMap::new();
        names.insert(0xffff_ffff_8120_0000, "kernel_init".to_string());
        relabel_symbols(&mut rows, &names)?;
        assert_eq!(rows[3].symbol.as_deref(), Some("kernel_init"));
        assert_eq!(rows[0].symbol, None);

        let out = NamedTempFile::new()?;
        write_report(out.path(), &rows)?;
        let written = std::fs::read_to_string(out.path())?;
        assert!(written.starts_with("PFN,Offset,Address,Type,Symbol\n"));
        assert!(written.contains("0x12,16,0xffffffff81200000,0,kernel_init\n"));
        assert_eq!(read_report(out.path())?, rows);
        Ok(())
    }
}
