// CLI application
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use disforge::format::{OutputFormat, TextParams};
use disforge::parser::{load_code, InputMode};
use disforge::strategy::linear;
use disforge::X86Decoder;

/// Exit status when `--strict` is set and a pass ended on a truncated instruction
const EXIT_TRUNCATED: i32 = 2;

#[derive(Parser)]
#[command(name = "disforge")]
#[command(about = "Linear-sweep disassembler for 32-bit x86 machine code")]
#[command(version)]
struct Cli {
    /// Files to disassemble, `-` reads standard input
    #[arg(required = true, num_args = 1..)]
    files: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// How the input bytes are interpreted
    #[arg(short, long, value_enum, default_value_t = InputMode::Raw)]
    input: InputMode,

    /// Show raw instruction bytes in text output
    #[arg(long)]
    bytes: bool,

    /// Exit with status 2 if any input ends in a truncated instruction
    #[arg(long)]
    strict: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut data = Vec::new();
        io::stdin()
            .read_to_end(&mut data)
            .context("Failed to read standard input")?;
        return Ok(data);
    }
    std::fs::read(path).with_context(|| format!("Failed to read file {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let inputs = cli
        .files
        .iter()
        .map(|path| read_input(path).map(|data| (path, data)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut code = Vec::with_capacity(inputs.len());
    for (path, data) in &inputs {
        let region = load_code(data, cli.input)
            .with_context(|| format!("Failed to load code from {}", path.display()))?;
        code.push(region);
    }

    let results = linear::run_many(&code, &X86Decoder);
    let formatter = cli.format.get_formatter(Some(TextParams {
        show_bytes: cli.bytes,
    }));

    let mut truncated = false;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for ((path, _), disassembly) in inputs.iter().zip(&results) {
        if let Some(t) = disassembly.truncation() {
            log::warn!("{}: {}", path.display(), t);
            truncated = true;
        }

        if inputs.len() > 1 && cli.format == OutputFormat::Text {
            writeln!(out, "Disassembled code from file '{}':", path.display())?;
        }
        let output = formatter
            .format(disassembly)
            .with_context(|| format!("Failed to format output for {}", path.display()))?;
        out.write_all(output.as_bytes())?;
    }
    out.flush()?;

    if cli.strict && truncated {
        std::process::exit(EXIT_TRUNCATED);
    }
    Ok(())
}
