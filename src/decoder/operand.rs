//! ModR/M and SIB byte decoding.

use crate::{MemoryRef, Offset, Register, RmOperand, ScaledIndex};

/// Errors raised while reading the bytes that follow a ModR/M byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OperandError {
    /// SIB byte announced by `rm == 4` is missing
    #[error("incomplete SIB byte at offset 0x{at:04x}")]
    IncompleteSib { at: Offset },

    /// disp8 announced by `mod == 1` is missing
    #[error("incomplete 8-bit displacement at offset 0x{at:04x}")]
    IncompleteDisplacement8 { at: Offset },

    /// disp32 is cut short
    #[error("incomplete 32-bit displacement at offset 0x{at:04x} ({available} of 4 bytes)")]
    IncompleteDisplacement32 { at: Offset, available: usize },
}

impl OperandError {
    /// Offset of the first missing byte run.
    pub fn at(&self) -> Offset {
        match *self {
            OperandError::IncompleteSib { at }
            | OperandError::IncompleteDisplacement8 { at }
            | OperandError::IncompleteDisplacement32 { at, .. } => at,
        }
    }

    /// Bytes the run needed.
    pub fn needed(&self) -> usize {
        match self {
            OperandError::IncompleteSib { .. } | OperandError::IncompleteDisplacement8 { .. } => 1,
            OperandError::IncompleteDisplacement32 { .. } => 4,
        }
    }

    /// Bytes of the run that were present.
    pub fn available(&self) -> usize {
        match *self {
            OperandError::IncompleteDisplacement32 { available, .. } => available,
            _ => 0,
        }
    }
}

/// Decoded ModR/M byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModRm {
    /// Mod field (2 bits)
    pub mod_: u8,
    /// Reg field (3 bits): register operand or opcode extension
    pub reg: u8,
    /// R/M field (3 bits)
    pub rm: u8,
}

impl ModRm {
    pub fn parse(byte: u8) -> Self {
        Self {
            mod_: byte >> 6,
            reg: (byte >> 3) & 0x7,
            rm: byte & 0x7,
        }
    }

    /// Returns true if this ModR/M encodes a register operand (mod=11).
    pub fn is_register(&self) -> bool {
        self.mod_ == 0b11
    }

    /// Returns true if a SIB byte follows.
    pub fn needs_sib(&self) -> bool {
        !self.is_register() && self.rm == 0b100
    }

    /// The register selected by the `reg` field.
    pub fn reg_operand(&self) -> Register {
        Register::from_bits(self.reg)
    }
}

/// Decoded SIB byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sib {
    /// Scale (2 bits), the multiplier is 1 << scale
    pub scale: u8,
    /// Index register (3 bits), 4 means "no index"
    pub index: u8,
    /// Base register (3 bits)
    pub base: u8,
}

impl Sib {
    pub fn parse(byte: u8) -> Self {
        Self {
            scale: byte >> 6,
            index: (byte >> 3) & 0x7,
            base: byte & 0x7,
        }
    }

    /// Returns the actual scale factor (1, 2, 4, or 8).
    pub fn scale_factor(&self) -> u8 {
        1 << self.scale
    }
}

/// Read a little-endian dword at `at`, if all four bytes are present.
pub(crate) fn dword_at(stream: &[u8], at: Offset) -> Option<u32> {
    let bytes: [u8; 4] = stream.get(at..at.checked_add(4)?)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Decode the r/m operand of `modrm`.
///
/// `cursor` points just past the ModR/M byte. On success the operand is
/// returned together with the cursor advanced past any SIB and displacement
/// bytes; a register operand (`mod == 3`) consumes nothing.
pub fn decode_operand(
    modrm: u8,
    stream: &[u8],
    cursor: Offset,
) -> Result<(RmOperand, Offset), OperandError> {
    let modrm = ModRm::parse(modrm);
    if modrm.is_register() {
        return Ok((RmOperand::Register(Register::from_bits(modrm.rm)), cursor));
    }

    let mut next = cursor;
    let mut mem = MemoryRef::default();
    let mut no_base = false;

    if modrm.needs_sib() {
        let sib = Sib::parse(
            *stream
                .get(next)
                .ok_or(OperandError::IncompleteSib { at: next })?,
        );
        next += 1;

        // mod=00 with base=101: no base register, a disp32 follows instead
        no_base = modrm.mod_ == 0 && sib.base == 5;
        if !no_base {
            mem.base = Some(Register::from_bits(sib.base));
        }
        if sib.index != 4 {
            mem.index = Some(ScaledIndex {
                register: Register::from_bits(sib.index),
                scale: sib.scale_factor(),
            });
        }
    } else {
        mem.base = Some(Register::from_bits(modrm.rm));
    }

    if modrm.mod_ == 1 {
        let disp = *stream
            .get(next)
            .ok_or(OperandError::IncompleteDisplacement8 { at: next })?;
        next += 1;
        mem.displacement = Some(disp as i8 as i32);
    } else if modrm.mod_ == 2 || (modrm.mod_ == 0 && modrm.rm == 5) || no_base {
        let disp = dword_at(stream, next).ok_or(OperandError::IncompleteDisplacement32 {
            at: next,
            available: stream.len().saturating_sub(next).min(4),
        })?;
        next += 4;
        mem.displacement = Some(disp as i32);
    }

    Ok((RmOperand::Memory(mem), next))
}
