//! JSONL (JSON Lines) report format
use crate::error::ScanError;
use crate::formats::traits::RecordFormatter;
use crate::scanner::MatchRecord;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct JsonlRow<'a> {
    pfn: String,
    offset: usize,
    address: String,
    class: u8,
    class_name: &'static str,
    symbol: &'a str,
}

/// One JSON object per match, one match per line
pub struct JsonlReport<W: Write> {
    sink: W,
}

impl<W: Write> JsonlReport<W> {
    pub fn new(sink: W) -> Self {
        JsonlReport { sink }
    }
}

impl<W: Write> RecordFormatter for JsonlReport<W> {
    fn write_header(&mut self) -> Result<(), ScanError> {
        Ok(())
    }

    fn write_record(&mut self, record: &MatchRecord) -> Result<(), ScanError> {
        let row = JsonlRow {
            pfn: format!("0x{:x}", record.frame),
            offset: record.offset,
            address: format!("0x{:x}", record.address),
            class: record.class.tag(),
            class_name: record.class.name(),
            symbol: &record.symbol,
        };
        let mut line = serde_json::to_string(&row)?;
        line.push('\n');
        self.sink.write_all(line.as_bytes()).map_err(ScanError::output)?;
        self.sink.flush().map_err(ScanError::output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::AddressClass;
    use crate::formats::traits::tests::SharedBuffer;

    #[test]
    fn test_one_object_per_line() -> Result<(), Box<dyn std::error::Error>> {
        let buffer = SharedBuffer::default();
        let mut report = JsonlReport::new(buffer.clone());
        report.write_header()?;
        for offset in [8, 32] {
            report.write_record(&MatchRecord {
                frame: 0x10,
                offset,
                address: 0xffff_ffff_8100_0000,
                class: AddressClass::KernelText,
                symbol: "_text".to_string(),
            })?;
        }

        let contents = buffer.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[1])?;
        assert_eq!(value["pfn"], "0x10");
        assert_eq!(value["offset"], 32);
        assert_eq!(value["class"], 0);
        assert_eq!(value["class_name"], "kernel");
        assert_eq!(value["symbol"], "_text");
        Ok(())
    }
}
