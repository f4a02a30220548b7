//! Core IR, traits, metadata, and dispatch for the disforge disassembler.
//!
//! disforge is a linear-sweep disassembler for a subset of the 32-bit x86
//! encoding. It walks a byte buffer one instruction at a time, turning each
//! recognised opcode (plus its ModR/M, SIB, displacement and immediate bytes)
//! into a structured [`Insn`] record. Rendering to text, JSON or CSV happens in
//! a separate stage (see [`format`]).
//!
//! # Basic Usage
//!
//! ```rust
//! use disforge::{disassemble, Mnemonic, Operand, Register, Stop};
//!
//! let code = [0x90, 0xB8, 0x78, 0x56, 0x34, 0x12];
//! let mut sweep = disassemble(&code);
//!
//! let nop = sweep.next().unwrap();
//! assert_eq!(nop.mnemonic, Mnemonic::Nop);
//!
//! let mov = sweep.next().unwrap();
//! assert_eq!(mov.operands[0], Operand::Register(Register::Eax));
//! assert_eq!(mov.to_string(), "MOV EAX, 0x12345678");
//!
//! assert!(sweep.next().is_none());
//! assert_eq!(sweep.stop(), Some(&Stop::Exhausted));
//! ```
//!
//! A pass stops for good the moment an instruction needs bytes past the end of
//! the buffer; the stop reason and final cursor are reported, never papered over.

pub mod parser;
pub mod decoder;
pub mod strategy;
pub mod format;
mod large_tests;
#[cfg(feature = "extension-module")]
pub mod python;

use std::fmt;

use serde::Serialize;

pub use decoder::{DecodeError, Missing, Truncation, X86Decoder};
pub use decoder::operand::{decode_operand, OperandError};
pub use strategy::linear::{LinearSweep, Stop};

/// Position of a byte in the stream being decoded.
pub type Offset = usize;

/// Maximum instruction size in bytes
pub const MAX_INSTRUCTION_SIZE: usize = 16;

/// Start a linear sweep over `stream` with the built-in x86-32 decoder.
///
/// The returned iterator is lazy and fused: it yields one record per
/// instruction and ends either at the end of the buffer or at the first
/// instruction whose trailing bytes are missing.
pub fn disassemble(stream: &[u8]) -> LinearSweep<'_, X86Decoder> {
    LinearSweep::new(stream, &X86Decoder)
}

/// The eight 32-bit general-purpose registers, in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Register {
    Eax = 0,
    Ecx = 1,
    Edx = 2,
    Ebx = 3,
    Esp = 4,
    Ebp = 5,
    Esi = 6,
    Edi = 7,
}

impl Register {
    /// All registers indexed by their 3-bit encoding.
    pub const ALL: [Register; 8] = [
        Register::Eax,
        Register::Ecx,
        Register::Edx,
        Register::Ebx,
        Register::Esp,
        Register::Ebp,
        Register::Esi,
        Register::Edi,
    ];

    /// Select a register from the low 3 bits of `bits`.
    pub fn from_bits(bits: u8) -> Self {
        Self::ALL[(bits & 0x7) as usize]
    }

    /// The 3-bit encoding of this register.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Uppercase register name, e.g. `"EAX"`.
    pub fn name(self) -> &'static str {
        decoder::tables::REGISTER_NAMES[self as usize]
    }
}

/// Index register of a SIB memory reference together with its multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScaledIndex {
    pub register: Register,
    /// 1, 2, 4 or 8
    pub scale: u8,
}

/// A decoded memory reference.
///
/// All three parts may be absent: a SIB byte with no base and no index and a
/// zero displacement is legal and renders as `[0x0]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryRef {
    pub base: Option<Register>,
    pub index: Option<ScaledIndex>,
    pub displacement: Option<i32>,
}

/// Register-or-memory operand selected by a ModR/M byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RmOperand {
    Register(Register),
    Memory(MemoryRef),
}

/// Immediate data carried in the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "width", content = "value", rename_all = "snake_case")]
pub enum Immediate {
    Byte(u8),
    Dword(u32),
}

/// One operand of a decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Operand {
    Register(Register),
    Memory(MemoryRef),
    /// Byte-sized source of MOVZX/MOVSX
    BytePtr(RmOperand),
    Immediate(Immediate),
    /// Raw rel8 byte, not resolved to a target
    Relative8(u8),
    /// Absolute target of a rel32 CALL/JMP
    Target(u32),
    /// LOOP target, truncated to 8 bits
    ShortTarget(u8),
    /// The CL shift count
    Cl,
    /// The implicit shift count of 1
    One,
}

impl From<RmOperand> for Operand {
    fn from(rm: RmOperand) -> Self {
        match rm {
            RmOperand::Register(reg) => Operand::Register(reg),
            RmOperand::Memory(mem) => Operand::Memory(mem),
        }
    }
}

impl From<Register> for Operand {
    fn from(reg: Register) -> Self {
        Operand::Register(reg)
    }
}

/// Condition code of a `Jcc`, taken from the low 4 bits of the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Condition(u8);

impl Condition {
    pub fn from_bits(bits: u8) -> Self {
        Condition(bits & 0xF)
    }

    pub fn code(self) -> u8 {
        self.0
    }

    /// Combined suffix name, e.g. `"E/Z"`.
    pub fn name(self) -> &'static str {
        decoder::tables::CONDITION_NAMES[self.0 as usize]
    }
}

/// Decoding outcomes that are recovered from locally: the sweep emits a record
/// and carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unknown {
    /// Primary opcode matches no rule
    Opcode(u8),
    /// Byte after 0x0F matches no rule
    TwoByte(u8),
    /// ModR/M `reg` field selects nothing in an opcode group
    Extension { opcode: u8, reg: u8 },
    /// REP followed by something other than MOVSB/MOVSD
    RepOperand(u8),
    /// REP at the very end of the stream
    RepIncomplete,
}

/// Instruction mnemonics understood by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Mov,
    Add,
    Or,
    Adc,
    Sbb,
    And,
    Sub,
    Xor,
    Cmp,
    Inc,
    Dec,
    Push,
    Pop,
    Jcc(Condition),
    Call,
    Jmp,
    Nop,
    Ret,
    Int3,
    Lea,
    Test,
    Xchg,
    Rol,
    Ror,
    Rcl,
    Rcr,
    Shl,
    Shr,
    Sal,
    Sar,
    Not,
    Neg,
    Mul,
    Imul,
    Div,
    Idiv,
    Movzx,
    Movsx,
    Loopnz,
    Loopz,
    Loop,
    Jecxz,
    Movsb,
    Movsd,
    Cmpsb,
    Cmpsd,
    Stosb,
    Stosd,
    Lodsb,
    Lodsd,
    Scasb,
    Scasd,
    Lock,
    Repnz,
    Unknown(Unknown),
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mnemonic::Mov => "MOV",
            Mnemonic::Add => "ADD",
            Mnemonic::Or => "OR",
            Mnemonic::Adc => "ADC",
            Mnemonic::Sbb => "SBB",
            Mnemonic::And => "AND",
            Mnemonic::Sub => "SUB",
            Mnemonic::Xor => "XOR",
            Mnemonic::Cmp => "CMP",
            Mnemonic::Inc => "INC",
            Mnemonic::Dec => "DEC",
            Mnemonic::Push => "PUSH",
            Mnemonic::Pop => "POP",
            Mnemonic::Jcc(cond) => return write!(f, "J{}", cond.name()),
            Mnemonic::Call => "CALL",
            Mnemonic::Jmp => "JMP",
            Mnemonic::Nop => "NOP",
            Mnemonic::Ret => "RET",
            Mnemonic::Int3 => "INT3",
            Mnemonic::Lea => "LEA",
            Mnemonic::Test => "TEST",
            Mnemonic::Xchg => "XCHG",
            Mnemonic::Rol => "ROL",
            Mnemonic::Ror => "ROR",
            Mnemonic::Rcl => "RCL",
            Mnemonic::Rcr => "RCR",
            Mnemonic::Shl => "SHL",
            Mnemonic::Shr => "SHR",
            Mnemonic::Sal => "SAL",
            Mnemonic::Sar => "SAR",
            Mnemonic::Not => "NOT",
            Mnemonic::Neg => "NEG",
            Mnemonic::Mul => "MUL",
            Mnemonic::Imul => "IMUL",
            Mnemonic::Div => "DIV",
            Mnemonic::Idiv => "IDIV",
            Mnemonic::Movzx => "MOVZX",
            Mnemonic::Movsx => "MOVSX",
            Mnemonic::Loopnz => "LOOPNZ",
            Mnemonic::Loopz => "LOOPZ",
            Mnemonic::Loop => "LOOP",
            Mnemonic::Jecxz => "JECXZ",
            Mnemonic::Movsb => "MOVSB",
            Mnemonic::Movsd => "MOVSD",
            Mnemonic::Cmpsb => "CMPSB",
            Mnemonic::Cmpsd => "CMPSD",
            Mnemonic::Stosb => "STOSB",
            Mnemonic::Stosd => "STOSD",
            Mnemonic::Lodsb => "LODSB",
            Mnemonic::Lodsd => "LODSD",
            Mnemonic::Scasb => "SCASB",
            Mnemonic::Scasd => "SCASD",
            Mnemonic::Lock => "LOCK",
            Mnemonic::Repnz => "REPNZ",
            Mnemonic::Unknown(unknown) => match unknown {
                Unknown::Opcode(op) => return write!(f, "Unknown instruction: 0x{:02x}", op),
                Unknown::TwoByte(_) => "Unknown 0F instruction",
                Unknown::Extension { opcode, .. } => {
                    return write!(f, "Unknown {:02X} instruction", opcode)
                }
                Unknown::RepOperand(_) => "Unknown REP instruction",
                Unknown::RepIncomplete => "Incomplete REP instruction",
            },
        };
        f.write_str(name)
    }
}

/// Prefix fused onto the following instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prefix {
    Rep,
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::Rep => write!(f, "REP"),
        }
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insn {
    /// Offset of the first byte of the instruction
    pub offset: Offset,
    /// Size of the instruction in bytes
    pub size: u8,
    /// Fused prefix, only ever REP
    pub prefix: Option<Prefix>,
    pub mnemonic: Mnemonic,
    pub operands: Vec<Operand>,
    /// Raw bytes of the instruction (up to MAX_INSTRUCTION_SIZE)
    pub bytes: [u8; MAX_INSTRUCTION_SIZE],
}

impl Insn {
    /// Returns the instruction bytes, up to the actual instruction size.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.size as usize]
    }

    /// Offset just past the last byte of the instruction.
    pub fn end(&self) -> Offset {
        self.offset + self.size as Offset
    }

    /// Returns true if this instruction transfers control somewhere else
    pub fn is_branch(&self) -> bool {
        matches!(
            self.mnemonic,
            Mnemonic::Jcc(_)
                | Mnemonic::Jmp
                | Mnemonic::Call
                | Mnemonic::Loop
                | Mnemonic::Loopz
                | Mnemonic::Loopnz
                | Mnemonic::Jecxz
        )
    }

    /// Returns true if this instruction is a return
    pub fn is_return(&self) -> bool {
        self.mnemonic == Mnemonic::Ret
    }

    /// Returns true for the records emitted for unrecognised bytes
    pub fn is_unknown(&self) -> bool {
        matches!(self.mnemonic, Mnemonic::Unknown(_))
    }
}

/// Decoder trait: decode a single instruction.
pub trait Decoder: Send + Sync {
    /// Decode one instruction starting at `at`.
    ///
    /// # Arguments
    /// * `image` - The byte stream to decode
    /// * `at` - Offset of the first byte of the instruction
    ///
    /// # Returns
    /// The decoded record, or the reason no record could be produced
    fn decode(&self, image: &[u8], at: Offset) -> Result<Insn, DecodeError>;
}

/// The result of one complete linear pass over a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembly {
    /// Records in stream order
    pub insns: Vec<Insn>,
    /// Final cursor: number of bytes decoded before the pass ended
    pub cursor: Offset,
    /// Why the pass ended
    pub stop: Stop,
}

impl Disassembly {
    /// Get the total number of instructions
    pub fn instruction_count(&self) -> usize {
        self.insns.len()
    }

    /// True if the pass consumed the whole buffer
    pub fn is_complete(&self) -> bool {
        self.stop == Stop::Exhausted
    }

    /// The truncation that ended the pass, if any
    pub fn truncation(&self) -> Option<&Truncation> {
        match &self.stop {
            Stop::Failed(DecodeError::IncompleteOpcodeOperand(t)) => Some(t),
            _ => None,
        }
    }
}

/// Architectures a container header can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Architecture {
    /// 32-bit x86
    X86_32,
    /// 64-bit x86
    X86_64,
    /// ARM (32-bit)
    Arm,
    /// AArch64 (ARM 64-bit)
    AArch64,
    /// Unknown architecture
    Unknown,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86_32 => write!(f, "x86-32"),
            Architecture::X86_64 => write!(f, "x86-64"),
            Architecture::Arm => write!(f, "ARM"),
            Architecture::AArch64 => write!(f, "AArch64"),
            Architecture::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A section of a container file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section name
    pub name: String,
    /// File offset of the section contents
    pub offset: Offset,
    /// Size of the section contents in the file
    pub size: usize,
    /// Whether this section contains executable code
    pub executable: bool,
}

impl Section {
    /// Create a new section
    pub fn new(name: String, offset: Offset, size: usize, executable: bool) -> Self {
        Self {
            name,
            offset,
            size,
            executable,
        }
    }

    /// File offset just past the section contents, `None` if it overflows
    pub fn end_offset(&self) -> Option<Offset> {
        self.offset.checked_add(self.size)
    }
}

/// Metadata describing a parsed container.
#[derive(Debug, Clone)]
pub struct BinaryMetadata {
    /// Declared architecture
    pub architecture: Architecture,
    /// Sections found in the file
    pub sections: Vec<Section>,
}

impl BinaryMetadata {
    /// Fallback metadata when no headers could be parsed: the whole file is code.
    pub fn default_raw() -> Self {
        Self {
            architecture: Architecture::Unknown,
            sections: Vec::new(),
        }
    }

    /// Find a section by name
    pub fn find_section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Get all executable sections
    pub fn executable_sections(&self) -> Vec<&Section> {
        self.sections.iter().filter(|s| s.executable).collect()
    }

    /// Return the code region of `img`: `.text` if present, else the first
    /// executable section, else the whole file.
    ///
    /// A section running past the end of the file is clamped to it; one that
    /// starts beyond the end, or whose end overflows, is a parsing error.
    pub fn code_region<'a>(&self, img: &'a [u8]) -> Result<&'a [u8], DisassemblyError> {
        let section = self
            .find_section(".text")
            .or_else(|| self.sections.iter().find(|s| s.executable));

        let Some(section) = section else {
            log::debug!("no executable section found, using whole file");
            return Ok(img);
        };

        let out_of_file = || {
            DisassemblyError::ParsingError(format!(
                "section '{}' at file offset 0x{:x} ({} bytes) lies outside the file ({} bytes)",
                section.name,
                section.offset,
                section.size,
                img.len()
            ))
        };
        let end = section.end_offset().ok_or_else(out_of_file)?.min(img.len());
        let region = img.get(section.offset..end).ok_or_else(out_of_file)?;

        log::debug!(
            "using section '{}' at file offset 0x{:x} ({} bytes)",
            section.name,
            section.offset,
            region.len()
        );
        Ok(region)
    }
}

/// Parser trait: turn raw bytes into `BinaryMetadata`.
pub trait BinaryParser: Send + Sync {
    /// Parse container data into metadata
    fn parse(&self, data: &[u8]) -> Result<BinaryMetadata, DisassemblyError>;
}

/// Error type for disassembly operations
#[derive(Debug, thiserror::Error)]
pub enum DisassemblyError {
    /// Failed to parse container format
    #[error("Failed to parse binary format: {0}")]
    ParsingError(String),

    /// Container declares an architecture we do not decode
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(Architecture),

    /// Decoding stopped early
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Output could not be produced
    #[error("Format error: {0}")]
    Format(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
