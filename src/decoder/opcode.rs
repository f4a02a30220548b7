//! Primary opcode classification.
//!
//! Every one of the 256 primary opcodes maps to exactly one [`OpcodeClass`];
//! the class decides the decoding shape (ModR/M, immediates, rel8/rel32) and
//! the dispatcher in [`super`] turns it into a record.

/// Decoding shape of a primary opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpcodeClass {
    /// 0x88-0x8B, direction bit selects reg-is-destination
    MovRm,
    /// 0xB0-0xB7
    MovRegImm8,
    /// 0xB8-0xBF
    MovRegImm32,
    /// 0x00-0x3D blocks, mnemonic from `(opcode >> 3) & 7`
    Arithmetic,
    /// 0x80, 0x81, 0x83
    ArithmeticImm,
    /// 0x40-0x47
    IncReg,
    /// 0x48-0x4F
    DecReg,
    /// 0x50-0x57
    PushReg,
    /// 0x58-0x5F
    PopReg,
    /// 0x68
    PushImm32,
    /// 0x6A
    PushImm8,
    /// 0xC6
    MovRmImm8,
    /// 0xC7
    MovRmImm32,
    /// 0x70-0x7F
    Jcc,
    /// 0xE8
    CallRel32,
    /// 0xE9
    JmpRel32,
    /// 0xEB
    JmpRel8,
    /// 0x90
    Nop,
    /// 0xC3
    Ret,
    /// 0xCC
    Int3,
    /// 0x8D
    Lea,
    /// 0x84, 0x85
    Test,
    /// 0x86, 0x87
    Xchg,
    /// 0xC0, 0xC1, 0xD0-0xD3
    Shift,
    /// 0xF6, 0xF7
    Unary,
    /// 0x0F
    TwoByte,
    /// 0xFF
    Indirect,
    /// 0xE0-0xE3
    LoopFamily,
    /// 0xA4-0xA7, 0xAA-0xAF
    StringOp,
    /// 0xF0
    Lock,
    /// 0xF2
    Repnz,
    /// 0xF3
    Rep,
    /// Anything else
    Unknown,
}

impl OpcodeClass {
    /// Classify a primary opcode.
    pub const fn of(opcode: u8) -> Self {
        match opcode {
            0x88..=0x8B => OpcodeClass::MovRm,
            0xB0..=0xB7 => OpcodeClass::MovRegImm8,
            0xB8..=0xBF => OpcodeClass::MovRegImm32,
            0x00..=0x3D if opcode & 0x7 <= 5 => OpcodeClass::Arithmetic,
            0x80 | 0x81 | 0x83 => OpcodeClass::ArithmeticImm,
            0x40..=0x47 => OpcodeClass::IncReg,
            0x48..=0x4F => OpcodeClass::DecReg,
            0x50..=0x57 => OpcodeClass::PushReg,
            0x58..=0x5F => OpcodeClass::PopReg,
            0x68 => OpcodeClass::PushImm32,
            0x6A => OpcodeClass::PushImm8,
            0xC6 => OpcodeClass::MovRmImm8,
            0xC7 => OpcodeClass::MovRmImm32,
            0x70..=0x7F => OpcodeClass::Jcc,
            0xE8 => OpcodeClass::CallRel32,
            0xE9 => OpcodeClass::JmpRel32,
            0xEB => OpcodeClass::JmpRel8,
            0x90 => OpcodeClass::Nop,
            0xC3 => OpcodeClass::Ret,
            0xCC => OpcodeClass::Int3,
            0x8D => OpcodeClass::Lea,
            0x84 | 0x85 => OpcodeClass::Test,
            0x86 | 0x87 => OpcodeClass::Xchg,
            0xC0 | 0xC1 | 0xD0..=0xD3 => OpcodeClass::Shift,
            0xF6 | 0xF7 => OpcodeClass::Unary,
            0x0F => OpcodeClass::TwoByte,
            0xFF => OpcodeClass::Indirect,
            0xE0..=0xE3 => OpcodeClass::LoopFamily,
            0xA4..=0xA7 | 0xAA..=0xAF => OpcodeClass::StringOp,
            0xF0 => OpcodeClass::Lock,
            0xF2 => OpcodeClass::Repnz,
            0xF3 => OpcodeClass::Rep,
            _ => OpcodeClass::Unknown,
        }
    }

    /// True if the class reads a ModR/M byte right after the opcode.
    pub const fn has_modrm(self) -> bool {
        matches!(
            self,
            OpcodeClass::MovRm
                | OpcodeClass::Arithmetic
                | OpcodeClass::ArithmeticImm
                | OpcodeClass::MovRmImm8
                | OpcodeClass::MovRmImm32
                | OpcodeClass::Lea
                | OpcodeClass::Test
                | OpcodeClass::Xchg
                | OpcodeClass::Shift
                | OpcodeClass::Unary
                | OpcodeClass::Indirect
        )
    }

    /// Label used when an instruction of this class is cut short,
    /// as in `Incomplete MOV imm32`.
    pub fn label(self, opcode: u8) -> &'static str {
        match self {
            OpcodeClass::MovRm => "MOV instruction",
            OpcodeClass::MovRegImm8 => "MOV imm8",
            OpcodeClass::MovRegImm32 => "MOV imm32",
            OpcodeClass::Arithmetic => "arithmetic instruction",
            OpcodeClass::ArithmeticImm => "immediate arithmetic",
            OpcodeClass::PushImm32 => "PUSH imm32",
            OpcodeClass::PushImm8 => "PUSH imm8",
            OpcodeClass::MovRmImm8 => "MOV r/m8, imm8",
            OpcodeClass::MovRmImm32 => "MOV r/m32, imm32",
            OpcodeClass::Jcc => "conditional jump",
            OpcodeClass::CallRel32 => "CALL",
            OpcodeClass::JmpRel32 => "JMP",
            OpcodeClass::JmpRel8 => "JMP rel8",
            OpcodeClass::Lea => "LEA",
            OpcodeClass::Test => "TEST",
            OpcodeClass::Xchg => "XCHG",
            OpcodeClass::Shift => "shift/rotate",
            OpcodeClass::Unary => "MUL/IMUL/DIV/IDIV",
            OpcodeClass::TwoByte => "0F instruction",
            OpcodeClass::Indirect => "FF instruction",
            OpcodeClass::LoopFamily => match opcode {
                0xE0 => "LOOPNZ",
                0xE1 => "LOOPZ",
                0xE2 => "LOOP",
                _ => "JECXZ",
            },
            OpcodeClass::Rep => "REP instruction",
            OpcodeClass::IncReg
            | OpcodeClass::DecReg
            | OpcodeClass::PushReg
            | OpcodeClass::PopReg
            | OpcodeClass::Nop
            | OpcodeClass::Ret
            | OpcodeClass::Int3
            | OpcodeClass::StringOp
            | OpcodeClass::Lock
            | OpcodeClass::Repnz
            | OpcodeClass::Unknown => "instruction",
        }
    }
}

/// Class of every primary opcode, indexed by the opcode byte.
pub static OPCODE_TABLE: [OpcodeClass; 256] = {
    let mut table = [OpcodeClass::Unknown; 256];
    let mut op = 0;
    while op < 256 {
        table[op] = OpcodeClass::of(op as u8);
        op += 1;
    }
    table
};
