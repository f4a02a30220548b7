//! Immutable lookup tables indexed by decoded bit-fields.

use crate::Mnemonic;

/// General-purpose register names, indexed by a 3-bit register field.
pub const REGISTER_NAMES: [&str; 8] = ["EAX", "ECX", "EDX", "EBX", "ESP", "EBP", "ESI", "EDI"];

/// `Jcc` suffixes, indexed by the low 4 bits of the opcode.
pub const CONDITION_NAMES: [&str; 16] = [
    "O", "NO", "B/NAE/C", "NB/AE/NC", "E/Z", "NE/NZ", "BE/NA", "NBE/A",
    "S", "NS", "P/PE", "NP/PO", "L/NGE", "NL/GE", "LE/NG", "NLE/G",
];

/// ALU group, indexed by `(opcode >> 3) & 7` or by the ModR/M `reg` field of 0x80/0x81/0x83.
pub const ARITHMETIC_GROUP: [Mnemonic; 8] = [
    Mnemonic::Add,
    Mnemonic::Or,
    Mnemonic::Adc,
    Mnemonic::Sbb,
    Mnemonic::And,
    Mnemonic::Sub,
    Mnemonic::Xor,
    Mnemonic::Cmp,
];

/// Shift/rotate group (0xC0, 0xC1, 0xD0-0xD3), indexed by the ModR/M `reg` field.
pub const SHIFT_GROUP: [Mnemonic; 8] = [
    Mnemonic::Rol,
    Mnemonic::Ror,
    Mnemonic::Rcl,
    Mnemonic::Rcr,
    Mnemonic::Shl,
    Mnemonic::Shr,
    Mnemonic::Sal,
    Mnemonic::Sar,
];

/// Unary group (0xF6, 0xF7), indexed by the ModR/M `reg` field.
pub const UNARY_GROUP: [Mnemonic; 8] = [
    Mnemonic::Test,
    Mnemonic::Test,
    Mnemonic::Not,
    Mnemonic::Neg,
    Mnemonic::Mul,
    Mnemonic::Imul,
    Mnemonic::Div,
    Mnemonic::Idiv,
];

/// 0xFF group, indexed by the ModR/M `reg` field. `None` entries are undefined here.
pub const INDIRECT_GROUP: [Option<Mnemonic>; 8] = [
    Some(Mnemonic::Inc),
    Some(Mnemonic::Dec),
    Some(Mnemonic::Call),
    None,
    Some(Mnemonic::Jmp),
    None,
    None,
    None,
];

/// String instructions 0xA4-0xAF, indexed by `opcode - 0xA4`. 0xA8/0xA9 are not string ops.
pub const STRING_OPS: [Option<Mnemonic>; 12] = [
    Some(Mnemonic::Movsb),
    Some(Mnemonic::Movsd),
    Some(Mnemonic::Cmpsb),
    Some(Mnemonic::Cmpsd),
    None,
    None,
    Some(Mnemonic::Stosb),
    Some(Mnemonic::Stosd),
    Some(Mnemonic::Lodsb),
    Some(Mnemonic::Lodsd),
    Some(Mnemonic::Scasb),
    Some(Mnemonic::Scasd),
];
