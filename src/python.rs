//! Python bindings for the disforge disassembler

use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::format::{OutputFormat, TextParams};
use crate::parser::{load_code, InputMode};
use crate::strategy::linear;
use crate::X86Decoder;

fn parse_input_mode(input_mode: &str) -> PyResult<InputMode> {
    match input_mode.to_lowercase().as_str() {
        "raw" => Ok(InputMode::Raw),
        "auto" => Ok(InputMode::Auto),
        _ => Err(PyValueError::new_err(format!("Unknown input mode: {}", input_mode))),
    }
}

fn render(
    bytes: &[u8],
    output_format: &str,
    input_mode: &str,
    show_bytes: bool,
) -> PyResult<String> {
    let output_format: OutputFormat = output_format.parse().map_err(PyValueError::new_err)?;
    let code = load_code(bytes, parse_input_mode(input_mode)?)
        .map_err(|e| PyValueError::new_err(format!("Failed to load code: {}", e)))?;

    let disassembly = linear::run(code, &X86Decoder);
    output_format
        .get_formatter(Some(TextParams { show_bytes }))
        .format(&disassembly)
        .map_err(|e| PyValueError::new_err(format!("Failed to format output: {}", e)))
}

/// Disassemble a byte buffer and return the rendered output.
///
/// A truncated final instruction is reported in the output, not raised.
#[pyfunction]
#[pyo3(signature = (code, output_format="text", input_mode="raw", show_bytes=false))]
fn disassemble(
    code: Vec<u8>,
    output_format: &str,
    input_mode: &str,
    show_bytes: bool,
) -> PyResult<String> {
    render(&code, output_format, input_mode, show_bytes)
}

/// Disassemble the contents of a file
#[pyfunction]
#[pyo3(signature = (file_path, output_format="text", input_mode="raw", show_bytes=false))]
fn disassemble_file(
    file_path: &str,
    output_format: &str,
    input_mode: &str,
    show_bytes: bool,
) -> PyResult<String> {
    let bytes = std::fs::read(file_path)
        .map_err(|e| PyIOError::new_err(format!("Failed to read file {}: {}", file_path, e)))?;
    log::debug!("disassembling file {}", file_path);
    render(&bytes, output_format, input_mode, show_bytes)
}

/// Python module initialization
#[pymodule]
fn disforge(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(disassemble, m)?)?;
    m.add_function(wrap_pyfunction!(disassemble_file, m)?)?;

    let py = m.py();
    let output_format = PyDict::new(py);
    for format in OutputFormat::available_formats() {
        output_format.set_item(format.to_string().to_uppercase(), format.to_string())?;
    }
    m.setattr("OutputFormat", output_format)?;

    let input_mode = PyDict::new(py);
    input_mode.set_item("RAW", "raw")?;
    input_mode.set_item("AUTO", "auto")?;
    m.setattr("InputMode", input_mode)?;

    Ok(())
}
