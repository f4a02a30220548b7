//! Table-driven decoder for the supported 32-bit x86 subset.
//!
//! Decoding one instruction is a lookup of the opcode's [`OpcodeClass`]
//! followed by that class's [`Rule`]. Rules pull bytes through a [`Fetch`]
//! cursor, which turns any read past the end of the stream into a
//! [`Truncation`] naming the instruction and the missing part.

pub mod opcode;
pub mod operand;
pub mod tables;

use std::fmt;

use crate::{
    Condition, Decoder, Immediate, Insn, Mnemonic, Offset, Operand, Prefix, Register, RmOperand,
    Unknown, MAX_INSTRUCTION_SIZE,
};
use self::opcode::{OpcodeClass, OPCODE_TABLE};
use self::operand::{decode_operand, dword_at, ModRm, OperandError};
use self::tables::{ARITHMETIC_GROUP, INDIRECT_GROUP, SHIFT_GROUP, STRING_OPS, UNARY_GROUP};

/// The part of an instruction that ran past the end of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Missing {
    ModRm,
    /// Byte after the 0x0F escape
    SecondOpcode,
    Sib,
    Displacement8,
    Displacement32,
    Immediate8,
    Immediate32,
    Relative8,
    Relative32,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Missing::ModRm => "ModR/M byte",
            Missing::SecondOpcode => "second opcode byte",
            Missing::Sib => "SIB byte",
            Missing::Displacement8 => "disp8",
            Missing::Displacement32 => "disp32",
            Missing::Immediate8 => "imm8",
            Missing::Immediate32 => "imm32",
            Missing::Relative8 => "rel8",
            Missing::Relative32 => "rel32",
        };
        f.write_str(name)
    }
}

impl From<OperandError> for Missing {
    fn from(err: OperandError) -> Self {
        match err {
            OperandError::IncompleteSib { .. } => Missing::Sib,
            OperandError::IncompleteDisplacement8 { .. } => Missing::Displacement8,
            OperandError::IncompleteDisplacement32 { .. } => Missing::Displacement32,
        }
    }
}

/// An instruction whose trailing bytes extend past the end of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error(
    "incomplete {rule} at offset 0x{offset:04x}: {missing} needs {needed} byte(s) at 0x{at:04x}, {available} available"
)]
pub struct Truncation {
    /// Offset of the opcode byte
    pub offset: Offset,
    pub opcode: u8,
    /// Label of the opcode class, e.g. `MOV imm32`
    pub rule: &'static str,
    pub missing: Missing,
    /// Offset of the first missing byte
    pub at: Offset,
    pub needed: usize,
    pub available: usize,
}

/// Errors that keep the decoder from producing a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A ModR/M, SIB, immediate or displacement run extends past the stream end
    #[error(transparent)]
    IncompleteOpcodeOperand(#[from] Truncation),

    /// Decoding was requested at or past the end of the stream
    #[error("offset 0x{at:x} is outside the stream ({len} bytes)")]
    OutOfBounds { at: Offset, len: usize },
}

/// Decoder for the supported 32-bit x86 subset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct X86Decoder;

impl fmt::Display for X86Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X86Decoder")
    }
}

impl Decoder for X86Decoder {
    fn decode(&self, image: &[u8], at: Offset) -> Result<Insn, DecodeError> {
        let opcode = *image.get(at).ok_or(DecodeError::OutOfBounds {
            at,
            len: image.len(),
        })?;
        let class = OPCODE_TABLE[opcode as usize];
        let mut fetch = Fetch {
            stream: image,
            start: at,
            next: at + 1,
            opcode,
            class,
        };
        rule(class)(&mut fetch)
    }
}

/// Cursor over one instruction being decoded.
pub struct Fetch<'a> {
    stream: &'a [u8],
    start: Offset,
    next: Offset,
    opcode: u8,
    class: OpcodeClass,
}

impl Fetch<'_> {
    fn truncated(&self, missing: Missing, at: Offset, needed: usize, available: usize) -> DecodeError {
        DecodeError::IncompleteOpcodeOperand(Truncation {
            offset: self.start,
            opcode: self.opcode,
            rule: self.class.label(self.opcode),
            missing,
            at,
            needed,
            available,
        })
    }

    /// The byte at the cursor, without consuming it.
    fn peek(&self, missing: Missing) -> Result<u8, DecodeError> {
        self.stream
            .get(self.next)
            .copied()
            .ok_or_else(|| self.truncated(missing, self.next, 1, 0))
    }

    fn byte(&mut self, missing: Missing) -> Result<u8, DecodeError> {
        let b = self.peek(missing)?;
        self.next += 1;
        Ok(b)
    }

    fn dword(&mut self, missing: Missing) -> Result<u32, DecodeError> {
        let available = self.stream.len().saturating_sub(self.next).min(4);
        let d = dword_at(self.stream, self.next)
            .ok_or_else(|| self.truncated(missing, self.next, 4, available))?;
        self.next += 4;
        Ok(d)
    }

    fn modrm(&mut self) -> Result<u8, DecodeError> {
        self.byte(Missing::ModRm)
    }

    fn rm_operand(&mut self, modrm: u8) -> Result<RmOperand, DecodeError> {
        let (operand, next) = decode_operand(modrm, self.stream, self.next)
            .map_err(|e| self.truncated(e.into(), e.at(), e.needed(), e.available()))?;
        self.next = next;
        Ok(operand)
    }

    fn emit(&self, prefix: Option<Prefix>, mnemonic: Mnemonic, operands: Vec<Operand>) -> Insn {
        let size = self.next - self.start;
        let copied = size.min(MAX_INSTRUCTION_SIZE);
        let mut bytes = [0u8; MAX_INSTRUCTION_SIZE];
        bytes[..copied].copy_from_slice(&self.stream[self.start..self.start + copied]);
        Insn {
            offset: self.start,
            size: size as u8,
            prefix,
            mnemonic,
            operands,
            bytes,
        }
    }

    fn finish(&self, mnemonic: Mnemonic, operands: Vec<Operand>) -> Insn {
        self.emit(None, mnemonic, operands)
    }
}

/// A decoding rule: reads the bytes after the opcode and builds the record.
pub type Rule = fn(&mut Fetch<'_>) -> Result<Insn, DecodeError>;

/// The rule that decodes instructions of `class`.
pub fn rule(class: OpcodeClass) -> Rule {
    match class {
        OpcodeClass::MovRm => mov_rm,
        OpcodeClass::MovRegImm8 => mov_reg_imm8,
        OpcodeClass::MovRegImm32 => mov_reg_imm32,
        OpcodeClass::Arithmetic => arithmetic,
        OpcodeClass::ArithmeticImm => arithmetic_imm,
        OpcodeClass::IncReg => inc_reg,
        OpcodeClass::DecReg => dec_reg,
        OpcodeClass::PushReg => push_reg,
        OpcodeClass::PopReg => pop_reg,
        OpcodeClass::PushImm32 => push_imm32,
        OpcodeClass::PushImm8 => push_imm8,
        OpcodeClass::MovRmImm8 => mov_rm_imm8,
        OpcodeClass::MovRmImm32 => mov_rm_imm32,
        OpcodeClass::Jcc => jcc,
        OpcodeClass::CallRel32 => call_rel32,
        OpcodeClass::JmpRel32 => jmp_rel32,
        OpcodeClass::JmpRel8 => jmp_rel8,
        OpcodeClass::Nop => nop,
        OpcodeClass::Ret => ret,
        OpcodeClass::Int3 => int3,
        OpcodeClass::Lea => lea,
        OpcodeClass::Test => test,
        OpcodeClass::Xchg => xchg,
        OpcodeClass::Shift => shift,
        OpcodeClass::Unary => unary,
        OpcodeClass::TwoByte => two_byte,
        OpcodeClass::Indirect => indirect,
        OpcodeClass::LoopFamily => loop_family,
        OpcodeClass::StringOp => string_op,
        OpcodeClass::Lock => lock,
        OpcodeClass::Repnz => repnz,
        OpcodeClass::Rep => rep,
        OpcodeClass::Unknown => unknown,
    }
}

/// ModR/M with the `reg` field as the second register operand.
fn reg_and_rm(f: &mut Fetch<'_>, mnemonic: Mnemonic, reg_is_dest: bool) -> Result<Insn, DecodeError> {
    let modrm = f.modrm()?;
    let reg = Operand::from(ModRm::parse(modrm).reg_operand());
    let rm = Operand::from(f.rm_operand(modrm)?);
    let operands = if reg_is_dest { vec![reg, rm] } else { vec![rm, reg] };
    Ok(f.finish(mnemonic, operands))
}

fn mov_rm(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let reg_is_dest = f.opcode & 0x02 != 0;
    reg_and_rm(f, Mnemonic::Mov, reg_is_dest)
}

fn arithmetic(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let mnemonic = ARITHMETIC_GROUP[((f.opcode >> 3) & 0x7) as usize];
    let reg_is_dest = f.opcode & 0x02 != 0;
    reg_and_rm(f, mnemonic, reg_is_dest)
}

fn lea(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    reg_and_rm(f, Mnemonic::Lea, true)
}

fn test(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    reg_and_rm(f, Mnemonic::Test, false)
}

fn xchg(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    reg_and_rm(f, Mnemonic::Xchg, false)
}

fn imm8(f: &mut Fetch<'_>) -> Result<Operand, DecodeError> {
    Ok(Operand::Immediate(Immediate::Byte(f.byte(Missing::Immediate8)?)))
}

fn imm32(f: &mut Fetch<'_>) -> Result<Operand, DecodeError> {
    Ok(Operand::Immediate(Immediate::Dword(f.dword(Missing::Immediate32)?)))
}

fn arithmetic_imm(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let modrm = f.modrm()?;
    let mnemonic = ARITHMETIC_GROUP[ModRm::parse(modrm).reg as usize];
    let rm = Operand::from(f.rm_operand(modrm)?);
    let imm = if f.opcode == 0x81 { imm32(f)? } else { imm8(f)? };
    Ok(f.finish(mnemonic, vec![rm, imm]))
}

fn mov_rm_imm8(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let modrm = f.modrm()?;
    let rm = Operand::from(f.rm_operand(modrm)?);
    let imm = imm8(f)?;
    Ok(f.finish(Mnemonic::Mov, vec![rm, imm]))
}

fn mov_rm_imm32(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let modrm = f.modrm()?;
    let rm = Operand::from(f.rm_operand(modrm)?);
    let imm = imm32(f)?;
    Ok(f.finish(Mnemonic::Mov, vec![rm, imm]))
}

fn opcode_register(f: &Fetch<'_>) -> Operand {
    Operand::from(Register::from_bits(f.opcode))
}

fn mov_reg_imm8(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let reg = opcode_register(f);
    let imm = imm8(f)?;
    Ok(f.finish(Mnemonic::Mov, vec![reg, imm]))
}

fn mov_reg_imm32(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let reg = opcode_register(f);
    let imm = imm32(f)?;
    Ok(f.finish(Mnemonic::Mov, vec![reg, imm]))
}

fn inc_reg(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    Ok(f.finish(Mnemonic::Inc, vec![opcode_register(f)]))
}

fn dec_reg(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    Ok(f.finish(Mnemonic::Dec, vec![opcode_register(f)]))
}

fn push_reg(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    Ok(f.finish(Mnemonic::Push, vec![opcode_register(f)]))
}

fn pop_reg(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    Ok(f.finish(Mnemonic::Pop, vec![opcode_register(f)]))
}

fn push_imm32(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let imm = imm32(f)?;
    Ok(f.finish(Mnemonic::Push, vec![imm]))
}

fn push_imm8(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let imm = imm8(f)?;
    Ok(f.finish(Mnemonic::Push, vec![imm]))
}

fn rel8(f: &mut Fetch<'_>) -> Result<u8, DecodeError> {
    f.byte(Missing::Relative8)
}

fn jcc(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let rel = rel8(f)?;
    Ok(f.finish(
        Mnemonic::Jcc(Condition::from_bits(f.opcode)),
        vec![Operand::Relative8(rel)],
    ))
}

fn jmp_rel8(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let rel = rel8(f)?;
    Ok(f.finish(Mnemonic::Jmp, vec![Operand::Relative8(rel)]))
}

/// rel32 resolved against the offset just past the instruction, wrapping at 32 bits.
fn rel32_target(f: &mut Fetch<'_>) -> Result<Operand, DecodeError> {
    let rel = f.dword(Missing::Relative32)?;
    Ok(Operand::Target(rel.wrapping_add(f.next as u32)))
}

fn call_rel32(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let target = rel32_target(f)?;
    Ok(f.finish(Mnemonic::Call, vec![target]))
}

fn jmp_rel32(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let target = rel32_target(f)?;
    Ok(f.finish(Mnemonic::Jmp, vec![target]))
}

fn loop_family(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let rel = rel8(f)?;
    let (mnemonic, operand) = match f.opcode {
        0xE0 => (Mnemonic::Loopnz, Operand::Relative8(rel)),
        0xE1 => (Mnemonic::Loopz, Operand::Relative8(rel)),
        // LOOP alone resolves its target, modulo 256
        0xE2 => (Mnemonic::Loop, Operand::ShortTarget((f.next as u8).wrapping_add(rel))),
        _ => (Mnemonic::Jecxz, Operand::Relative8(rel)),
    };
    Ok(f.finish(mnemonic, vec![operand]))
}

fn nop(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    Ok(f.finish(Mnemonic::Nop, Vec::new()))
}

fn ret(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    Ok(f.finish(Mnemonic::Ret, Vec::new()))
}

fn int3(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    Ok(f.finish(Mnemonic::Int3, Vec::new()))
}

fn shift(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let modrm = f.modrm()?;
    let mnemonic = SHIFT_GROUP[ModRm::parse(modrm).reg as usize];
    let rm = Operand::from(f.rm_operand(modrm)?);
    let count = match f.opcode {
        0xC0 | 0xC1 => imm8(f)?,
        0xD2 | 0xD3 => Operand::Cl,
        _ => Operand::One,
    };
    Ok(f.finish(mnemonic, vec![rm, count]))
}

fn unary(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let modrm = f.modrm()?;
    let reg = ModRm::parse(modrm).reg;
    let mnemonic = UNARY_GROUP[reg as usize];
    let mut operands = vec![Operand::from(f.rm_operand(modrm)?)];
    // TEST forms carry an immediate
    if reg <= 1 {
        operands.push(if f.opcode == 0xF6 { imm8(f)? } else { imm32(f)? });
    }
    Ok(f.finish(mnemonic, operands))
}

fn two_byte(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let second = f.byte(Missing::SecondOpcode)?;
    // every 0x0F form needs its ModR/M byte, even when the second byte is unknown
    f.peek(Missing::ModRm)?;
    let mnemonic = match second {
        0xB6 | 0xB7 => Mnemonic::Movzx,
        0xBE | 0xBF => Mnemonic::Movsx,
        // the ModR/M byte is checked but not consumed
        _ => return Ok(f.finish(Mnemonic::Unknown(Unknown::TwoByte(second)), Vec::new())),
    };
    let modrm = f.modrm()?;
    let reg = Operand::from(ModRm::parse(modrm).reg_operand());
    let rm = f.rm_operand(modrm)?;
    // 0xB6/0xBE read a byte, 0xB7/0xBF a word
    let source = if second & 0x01 == 0 {
        Operand::BytePtr(rm)
    } else {
        Operand::from(rm)
    };
    Ok(f.finish(mnemonic, vec![reg, source]))
}

fn indirect(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let modrm = f.modrm()?;
    let reg = ModRm::parse(modrm).reg;
    match INDIRECT_GROUP[reg as usize] {
        Some(mnemonic) => {
            let rm = Operand::from(f.rm_operand(modrm)?);
            Ok(f.finish(mnemonic, vec![rm]))
        }
        None => Ok(f.finish(
            Mnemonic::Unknown(Unknown::Extension {
                opcode: f.opcode,
                reg,
            }),
            Vec::new(),
        )),
    }
}

fn string_op(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    match STRING_OPS.get(f.opcode.wrapping_sub(0xA4) as usize).copied().flatten() {
        Some(mnemonic) => Ok(f.finish(mnemonic, Vec::new())),
        None => unknown(f),
    }
}

fn lock(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    Ok(f.finish(Mnemonic::Lock, Vec::new()))
}

fn repnz(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    Ok(f.finish(Mnemonic::Repnz, Vec::new()))
}

fn rep(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    let Some(&next) = f.stream.get(f.next) else {
        return Ok(f.emit(Some(Prefix::Rep), Mnemonic::Unknown(Unknown::RepIncomplete), Vec::new()));
    };
    f.next += 1;
    let mnemonic = match next {
        0xA4 => Mnemonic::Movsb,
        0xA5 => Mnemonic::Movsd,
        other => Mnemonic::Unknown(Unknown::RepOperand(other)),
    };
    Ok(f.emit(Some(Prefix::Rep), mnemonic, Vec::new()))
}

fn unknown(f: &mut Fetch<'_>) -> Result<Insn, DecodeError> {
    Ok(f.finish(Mnemonic::Unknown(Unknown::Opcode(f.opcode)), Vec::new()))
}
