//! Output format module implementation

mod text;
mod json;
mod csv;

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

use crate::{Disassembly, DisassemblyError, Insn, Stop};

/// Supported output formats for disassembly results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text, one `offset: instruction` line per record (default)
    Text,
    /// JSON format (one document per pass)
    Json,
    /// JSON Lines format (one JSON object per line)
    #[value(name = "jsonl")]
    JsonLines,
    /// CSV format (comma-separated values)
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "jsonlines" => Ok(OutputFormat::JsonLines),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Text
    }
}

impl OutputFormat {
    /// Get all available output formats
    pub fn available_formats() -> &'static [Self] {
        &[
            OutputFormat::Text,
            OutputFormat::Json,
            OutputFormat::JsonLines,
            OutputFormat::Csv,
        ]
    }

    /// Get a formatter for this output format
    pub fn get_formatter(&self, text_params: Option<TextParams>) -> Box<dyn DisassemblyFormatter> {
        match self {
            OutputFormat::Text => Box::new(TextFormatter::new(text_params.unwrap_or_default())),
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::JsonLines => Box::new(JsonLinesFormatter),
            OutputFormat::Csv => Box::new(CsvFormatter),
        }
    }
}

/// Parameters for the text format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextParams {
    /// Print the raw instruction bytes between the offset and the instruction
    pub show_bytes: bool,
}

/// Formatter trait for disassembly output
pub trait DisassemblyFormatter {
    /// Format a disassembly result
    fn format(&self, disassembly: &Disassembly) -> Result<String, DisassemblyError>;
}

/// Format disassembly in plain text
pub struct TextFormatter {
    params: TextParams,
}

impl TextFormatter {
    /// Create a new text formatter
    pub fn new(params: TextParams) -> Self {
        Self { params }
    }
}

/// Format disassembly in JSON
pub struct JsonFormatter;

/// Format disassembly in JSON Lines
pub struct JsonLinesFormatter;

/// Format disassembly in CSV
pub struct CsvFormatter;

/// Raw bytes as space-separated lowercase hex
pub(crate) fn hex_bytes(insn: &Insn) -> String {
    insn.bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Operands joined the way the text format prints them
pub(crate) fn operand_text(insn: &Insn) -> String {
    insn.operands
        .iter()
        .map(|op| op.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Machine-readable stop reason
pub(crate) fn stop_reason(stop: &Stop) -> &'static str {
    match stop {
        Stop::Exhausted => "exhausted",
        Stop::Failed(crate::DecodeError::IncompleteOpcodeOperand(_)) => "truncated",
        Stop::Failed(crate::DecodeError::OutOfBounds { .. }) => "out_of_bounds",
    }
}
