//! CSV report format
use crate::error::ScanError;
use crate::formats::traits::{RecordFormatter, REPORT_FIELDS};
use crate::scanner::MatchRecord;
use csv::Writer;
use std::io::Write;

/// Comma-separated report: hex frame and address, decimal offset and class tag.
pub struct CsvReport<W: Write> {
    wtr: Writer<W>,
}

impl<W: Write> CsvReport<W> {
    pub fn new(sink: W) -> Self {
        CsvReport {
            wtr: Writer::from_writer(sink),
        }
    }
}

impl<W: Write> RecordFormatter for CsvReport<W> {
    fn write_header(&mut self) -> Result<(), ScanError> {
        self.wtr.write_record(REPORT_FIELDS).map_err(ScanError::output)?;
        self.wtr.flush().map_err(ScanError::output)
    }

    fn write_record(&mut self, record: &MatchRecord) -> Result<(), ScanError> {
        self.wtr
            .write_record(&[
                format!("0x{:x}", record.frame),
                record.offset.to_string(),
                format!("0x{:x}", record.address),
                record.class.tag().to_string(),
                record.symbol.clone(),
            ])
            .map_err(ScanError::output)?;
        // Per record, so an interrupted run leaves a readable prefix
        self.wtr.flush().map_err(ScanError::output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::AddressClass;
    use crate::formats::traits::tests::SharedBuffer;

    #[test]
    fn test_rows_are_flushed_individually() -> Result<(), ScanError> {
        let buffer = SharedBuffer::default();
        let mut report = CsvReport::new(buffer.clone());
        report.write_header()?;
        assert_eq!(buffer.contents(), "PFN,Offset,Address,Type,Symbol\n");

        report.write_record(&MatchRecord {
            frame: 0x5,
            offset: 16,
            address: 0xffff_ffff_a000_0000,
            class: AddressClass::Module,
            symbol: String::new(),
        })?;
        assert_eq!(
            buffer.contents(),
            "PFN,Offset,Address,Type,Symbol\n0x5,16,0xffffffffa0000000,1,\n"
        );
        Ok(())
    }

    #[test]
    fn test_symbol_with_delimiter_is_quoted() -> Result<(), ScanError> {
        let buffer = SharedBuffer::default();
        let mut report = CsvReport::new(buffer.clone());
        report.write_record(&MatchRecord {
            frame: 0x5,
            offset: 0,
            address: 0xffff_ffff_8000_0000,
            class: AddressClass::KernelText,
            symbol: "a,b".to_string(),
        })?;
        assert_eq!(buffer.contents(), "0x5,0,0xffffffff80000000,0,\"a,b\"\n");
        Ok(())
    }
}
