//! CSV output formatter

use serde::Serialize;

use crate::{Disassembly, DisassemblyError};
use super::{hex_bytes, operand_text, DisassemblyFormatter};

#[derive(Serialize)]
struct CsvRow {
    offset: String,
    /// Empty on the trailing row of a truncated pass
    size: Option<u8>,
    bytes: String,
    prefix: String,
    mnemonic: String,
    operands: String,
}

const HEADER: [&str; 6] = ["offset", "size", "bytes", "prefix", "mnemonic", "operands"];

impl DisassemblyFormatter for super::CsvFormatter {
    fn format(&self, disassembly: &Disassembly) -> Result<String, DisassemblyError> {
        let to_csv_error = |e: csv::Error| DisassemblyError::Format(format!("CSV error: {}", e));

        // header is written by hand so that an empty pass still gets one
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(HEADER).map_err(to_csv_error)?;

        for insn in &disassembly.insns {
            writer
                .serialize(CsvRow {
                    offset: format!("0x{:04x}", insn.offset),
                    size: Some(insn.size),
                    bytes: hex_bytes(insn),
                    prefix: insn.prefix.map(|p| p.to_string()).unwrap_or_default(),
                    mnemonic: insn.mnemonic.to_string(),
                    operands: operand_text(insn),
                })
                .map_err(to_csv_error)?;
        }

        // a truncated pass ends with the same marker the text format prints
        if let Some(t) = disassembly.truncation() {
            writer
                .serialize(CsvRow {
                    offset: format!("0x{:04x}", t.offset),
                    size: None,
                    bytes: String::new(),
                    prefix: String::new(),
                    mnemonic: format!("Incomplete {}", t.rule),
                    operands: String::new(),
                })
                .map_err(to_csv_error)?;
        }

        let data = writer
            .into_inner()
            .map_err(|e| DisassemblyError::Format(format!("CSV error: {}", e)))?;
        String::from_utf8(data).map_err(|e| DisassemblyError::Format(format!("CSV error: {}", e)))
    }
}
