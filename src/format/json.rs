//! JSON and JSON Lines output formatters

use serde::Serialize;
use serde_json::json;

use crate::{DecodeError, Disassembly, DisassemblyError, Insn, Operand, Stop};
use super::{hex_bytes, stop_reason, DisassemblyFormatter};

/// Serializable instruction record
#[derive(Serialize)]
struct RecordJson<'a> {
    /// Offset of the first byte
    offset: usize,
    /// Size of the instruction in bytes
    size: u8,
    /// Bytes of the instruction as hex string
    bytes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
    mnemonic: String,
    operands: &'a [Operand],
    /// Rendered text, identical to the text format
    text: String,
}

/// Why the pass ended
#[derive(Serialize)]
struct StopJson {
    reason: String,
    /// Offset of the record that could not be completed
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Serializable pass result
#[derive(Serialize)]
struct DisassemblyJson<'a> {
    /// Bytes decoded before the pass ended
    cursor: usize,
    complete: bool,
    records: Vec<RecordJson<'a>>,
    stop: StopJson,
}

fn record_to_json(insn: &Insn) -> RecordJson<'_> {
    RecordJson {
        offset: insn.offset,
        size: insn.size,
        bytes: hex_bytes(insn),
        prefix: insn.prefix.map(|p| p.to_string()),
        mnemonic: insn.mnemonic.to_string(),
        operands: &insn.operands,
        text: insn.to_string(),
    }
}

fn stop_to_json(stop: &Stop) -> StopJson {
    let mut json = StopJson {
        reason: stop_reason(stop).to_string(),
        offset: None,
        rule: None,
        missing: None,
        message: None,
    };
    match stop {
        Stop::Exhausted => {}
        Stop::Failed(DecodeError::IncompleteOpcodeOperand(t)) => {
            json.offset = Some(t.offset);
            json.rule = Some(t.rule.to_string());
            json.missing = Some(t.missing.to_string());
            json.message = Some(t.to_string());
        }
        Stop::Failed(err @ DecodeError::OutOfBounds { at, .. }) => {
            json.offset = Some(*at);
            json.message = Some(err.to_string());
        }
    }
    json
}

fn to_json_error(e: serde_json::Error) -> DisassemblyError {
    DisassemblyError::Format(format!("JSON serialization error: {}", e))
}

impl DisassemblyFormatter for super::JsonFormatter {
    fn format(&self, disassembly: &Disassembly) -> Result<String, DisassemblyError> {
        let result = DisassemblyJson {
            cursor: disassembly.cursor,
            complete: disassembly.is_complete(),
            records: disassembly.insns.iter().map(record_to_json).collect(),
            stop: stop_to_json(&disassembly.stop),
        };

        serde_json::to_string_pretty(&result).map_err(to_json_error)
    }
}

impl DisassemblyFormatter for super::JsonLinesFormatter {
    fn format(&self, disassembly: &Disassembly) -> Result<String, DisassemblyError> {
        let mut output = String::new();

        for insn in &disassembly.insns {
            let mut record = serde_json::to_value(record_to_json(insn)).map_err(to_json_error)?;
            record["type"] = json!("instruction");
            output.push_str(&serde_json::to_string(&record).map_err(to_json_error)?);
            output.push('\n');
        }

        let stop = json!({
            "type": "stop",
            "cursor": disassembly.cursor,
            "stop": stop_to_json(&disassembly.stop),
        });
        output.push_str(&serde_json::to_string(&stop).map_err(to_json_error)?);
        output.push('\n');

        Ok(output)
    }
}
