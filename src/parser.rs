//! Goblin-based container parser.
//!
//! Input is raw machine code by default. In [`InputMode::Auto`] ELF and PE
//! images are recognised by their magic and only the code section is handed
//! to the decoder; anything else is still treated as raw code.

use std::fmt;

use clap::ValueEnum;
use goblin::{elf, pe, Object};

use crate::{Architecture, BinaryMetadata, BinaryParser, DisassemblyError, Offset, Section};

/// How input bytes are interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum InputMode {
    /// The whole input is machine code (default)
    #[default]
    Raw,
    /// Extract the code section of an ELF or PE image, raw otherwise
    Auto,
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputMode::Raw => write!(f, "raw"),
            InputMode::Auto => write!(f, "auto"),
        }
    }
}

/// A parser that handles ELF and PE via Goblin.
#[derive(Debug, Default)]
pub struct GoblinParser;

impl GoblinParser {
    /// Construct a new GoblinParser.
    pub fn new() -> Self {
        GoblinParser
    }

    /// Parse an ELF image.
    fn parse_elf(&self, elf: elf::Elf) -> Result<BinaryMetadata, DisassemblyError> {
        let arch = match elf.header.e_machine {
            elf::header::EM_386 => Architecture::X86_32,
            elf::header::EM_X86_64 => Architecture::X86_64,
            elf::header::EM_ARM => Architecture::Arm,
            elf::header::EM_AARCH64 => Architecture::AArch64,
            _ => Architecture::Unknown,
        };

        let mut sections = Vec::new();
        for sh in &elf.section_headers {
            if sh.sh_type == elf::section_header::SHT_NOBITS {
                continue;
            }
            if let Some(name) = elf.shdr_strtab.get_at(sh.sh_name) {
                sections.push(Section::new(
                    name.to_string(),
                    sh.sh_offset as Offset,
                    sh.sh_size as usize,
                    sh.is_executable(),
                ));
            }
        }

        Ok(BinaryMetadata {
            architecture: arch,
            sections,
        })
    }

    /// Parse a PE image.
    fn parse_pe(&self, pe: pe::PE<'_>) -> Result<BinaryMetadata, DisassemblyError> {
        let arch = match pe.header.coff_header.machine {
            pe::header::COFF_MACHINE_X86 => Architecture::X86_32,
            pe::header::COFF_MACHINE_X86_64 => Architecture::X86_64,
            pe::header::COFF_MACHINE_ARM => Architecture::Arm,
            pe::header::COFF_MACHINE_ARM64 => Architecture::AArch64,
            _ => Architecture::Unknown,
        };

        let mut sections = Vec::new();
        for sect in &pe.sections {
            let name = sect.name().unwrap_or("").to_string();
            let executable =
                (sect.characteristics & pe::section_table::IMAGE_SCN_MEM_EXECUTE) != 0;
            sections.push(Section::new(
                name,
                sect.pointer_to_raw_data as Offset,
                sect.size_of_raw_data as usize,
                executable,
            ));
        }

        Ok(BinaryMetadata {
            architecture: arch,
            sections,
        })
    }
}

impl fmt::Display for GoblinParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GoblinParser")
    }
}

impl BinaryParser for GoblinParser {
    fn parse(&self, data: &[u8]) -> Result<BinaryMetadata, DisassemblyError> {
        match Object::parse(data) {
            Ok(Object::Elf(elf)) => self.parse_elf(elf),
            Ok(Object::PE(pe)) => self.parse_pe(pe),
            Ok(_) => Ok(BinaryMetadata::default_raw()),
            Err(e) => Err(DisassemblyError::ParsingError(e.to_string())),
        }
    }
}

/// True if `data` starts with an ELF or MZ signature.
pub fn has_container_magic(data: &[u8]) -> bool {
    data.starts_with(b"\x7fELF") || data.starts_with(b"MZ")
}

/// Select the bytes to decode from `data`.
///
/// In raw mode this is `data` itself. In auto mode a recognised container must
/// declare x86-32 and contributes its code section; unrecognised input is
/// decoded whole.
pub fn load_code(data: &[u8], mode: InputMode) -> Result<&[u8], DisassemblyError> {
    if mode == InputMode::Raw || !has_container_magic(data) {
        log::debug!("treating {} bytes as raw code", data.len());
        return Ok(data);
    }

    let meta = GoblinParser::new().parse(data)?;
    match meta.architecture {
        Architecture::X86_32 => meta.code_region(data),
        Architecture::Unknown if meta.sections.is_empty() => Ok(data),
        other => Err(DisassemblyError::UnsupportedArchitecture(other)),
    }
}
