//! Text rendering of operands and instructions.
//!
//! Registers are uppercase, immediates are zero-padded hex (2 digits for a
//! byte, 8 for a dword) and displacements carry an explicit sign in front of
//! their absolute value.

use std::fmt;

use crate::{
    DecodeError, Disassembly, DisassemblyError, Immediate, Insn, MemoryRef, Operand, Register,
    RmOperand, Stop,
};
use super::{hex_bytes, DisassemblyFormatter, TextFormatter};

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for MemoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        let mut empty = true;
        if let Some(base) = self.base {
            write!(f, "{}", base)?;
            empty = false;
        }
        if let Some(index) = self.index {
            if !empty {
                f.write_str(" + ")?;
            }
            write!(f, "{}", index.register)?;
            if index.scale > 1 {
                write!(f, "*{}", index.scale)?;
            }
            empty = false;
        }
        if let Some(disp) = self.displacement {
            let sign = if disp < 0 { "-" } else { "+" };
            match (empty, disp < 0) {
                (true, false) => write!(f, "0x{:x}", disp)?,
                (true, true) => write!(f, "-0x{:x}", disp.unsigned_abs())?,
                (false, _) => write!(f, " {} 0x{:x}", sign, disp.unsigned_abs())?,
            }
        }
        f.write_str("]")
    }
}

impl fmt::Display for RmOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RmOperand::Register(reg) => write!(f, "{}", reg),
            RmOperand::Memory(mem) => write!(f, "{}", mem),
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Byte(b) => write!(f, "0x{:02x}", b),
            Immediate::Dword(d) => write!(f, "0x{:08x}", d),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(reg) => write!(f, "{}", reg),
            Operand::Memory(mem) => write!(f, "{}", mem),
            Operand::BytePtr(rm) => write!(f, "BYTE PTR {}", rm),
            Operand::Immediate(imm) => write!(f, "{}", imm),
            Operand::Relative8(rel) => write!(f, "0x{:02x}", rel),
            Operand::Target(target) => write!(f, "0x{:08x}", target),
            Operand::ShortTarget(target) => write!(f, "0x{:02x}", target),
            Operand::Cl => f.write_str("CL"),
            Operand::One => f.write_str("1"),
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = self.prefix {
            write!(f, "{} ", prefix)?;
        }
        write!(f, "{}", self.mnemonic)?;
        for (i, op) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", sep, op)?;
        }
        Ok(())
    }
}

impl DisassemblyFormatter for TextFormatter {
    fn format(&self, disassembly: &Disassembly) -> Result<String, DisassemblyError> {
        let mut output = String::new();

        for insn in &disassembly.insns {
            if self.params.show_bytes {
                output.push_str(&format!("{:04x}: {:<32} {}\n", insn.offset, hex_bytes(insn), insn));
            } else {
                output.push_str(&format!("{:04x}: {}\n", insn.offset, insn));
            }
        }

        if let Stop::Failed(DecodeError::IncompleteOpcodeOperand(t)) = &disassembly.stop {
            output.push_str(&format!("{:04x}: Incomplete {}\n", t.offset, t.rule));
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::TextParams;
    use crate::strategy::linear;
    use crate::{ScaledIndex, X86Decoder};

    fn mem(base: Option<Register>, index: Option<(Register, u8)>, disp: Option<i32>) -> String {
        MemoryRef {
            base,
            index: index.map(|(register, scale)| ScaledIndex { register, scale }),
            displacement: disp,
        }
        .to_string()
    }

    #[test]
    fn test_memory_rendering() {
        assert_eq!(mem(Some(Register::Eax), None, None), "[EAX]");
        assert_eq!(mem(Some(Register::Ebp), None, Some(-1)), "[EBP - 0x1]");
        assert_eq!(mem(Some(Register::Ebp), None, Some(127)), "[EBP + 0x7f]");
        assert_eq!(
            mem(Some(Register::Eax), Some((Register::Esi, 1)), Some(0)),
            "[EAX + ESI + 0x0]"
        );
        assert_eq!(mem(None, Some((Register::Edi, 8)), Some(-16)), "[EDI*8 - 0x10]");
        assert_eq!(mem(None, None, Some(0)), "[0x0]");
        assert_eq!(mem(None, None, Some(-2)), "[-0x2]");
        assert_eq!(mem(Some(Register::Ecx), None, Some(i32::MIN)), "[ECX - 0x80000000]");
    }

    #[test]
    fn test_immediate_padding() {
        assert_eq!(Immediate::Byte(5).to_string(), "0x05");
        assert_eq!(Immediate::Dword(5).to_string(), "0x00000005");
    }

    #[test]
    fn test_text_lines() {
        let disasm = linear::run(&[0x90, 0xB8, 0x78, 0x56, 0x34, 0x12, 0x03, 0xC1], &X86Decoder);
        let output = TextFormatter::new(TextParams::default()).format(&disasm).unwrap();
        assert_eq!(output, "0000: NOP\n0001: MOV EAX, 0x12345678\n0006: ADD EAX, ECX\n");
    }

    #[test]
    fn test_text_reports_truncation() {
        let disasm = linear::run(&[0x90, 0x8B], &X86Decoder);
        let output = TextFormatter::new(TextParams::default()).format(&disasm).unwrap();
        assert_eq!(output, "0000: NOP\n0001: Incomplete MOV instruction\n");
    }

    #[test]
    fn test_text_with_bytes() {
        let disasm = linear::run(&[0x89, 0xE5], &X86Decoder);
        let output = TextFormatter::new(TextParams { show_bytes: true })
            .format(&disasm)
            .unwrap();
        assert!(output.starts_with("0000: 89 e5 "));
        assert!(output.ends_with(" MOV EBP, ESP\n"));
    }

    #[test]
    fn test_offsets_grow_past_four_digits() {
        let code = vec![0x90; 0x10001];
        let disasm = linear::run(&code, &X86Decoder);
        let output = TextFormatter::new(TextParams::default()).format(&disasm).unwrap();
        assert!(output.ends_with("10000: NOP\n"));
    }
}
