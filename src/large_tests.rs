#[cfg(test)]
mod tests {
    use proptest::collection::vec;
    use proptest::prelude::*;
    use rstest::rstest;

    use crate::{
        decoder::opcode::{OpcodeClass, OPCODE_TABLE},
        disassemble,
        format::{OutputFormat, TextParams},
        strategy::linear,
        DecodeError, Decoder, Disassembly, Missing, Mnemonic, Operand, Prefix, Register,
        RmOperand, Stop, Unknown, X86Decoder,
    };

    /// Mixed sequence covering most instruction classes.
    const DEMO: [u8; 55] = [
        0x90, // NOP
        0xB8, 0x78, 0x56, 0x34, 0x12, // MOV EAX, imm32
        0xB9, 0xEF, 0xCD, 0xAB, 0x90, // MOV ECX, imm32
        0x03, 0xC1, // ADD EAX, ECX
        0x83, 0xE8, 0x05, // SUB EAX, imm8
        0x89, 0xC3, // MOV EBX, EAX
        0x01, 0xCB, // ADD EBX, ECX
        0x29, 0xC3, // SUB EBX, EAX
        0xF7, 0xE3, // MUL EBX
        0xE8, 0x12, 0x34, 0x56, 0x78, // CALL rel32
        0x74, 0x05, // JE rel8
        0xE9, 0x78, 0x56, 0x34, 0x12, // JMP rel32
        0xFF, 0xC0, // INC EAX
        0xFF, 0xC8, // DEC EAX
        0x0F, 0xB6, 0xC0, // MOVZX
        0x0F, 0xBE, 0xC0, // MOVSX
        0xF3, 0xA4, // REP MOVSB
        0x86, 0xC1, // XCHG
        0xD1, 0xE0, // SHL EAX, 1
        0xE2, 0xFE, // LOOP -2
        0xC3, // RET
    ];

    const DEMO_TEXT: &str = "\
0000: NOP
0001: MOV EAX, 0x12345678
0006: MOV ECX, 0x90abcdef
000b: ADD EAX, ECX
000d: SUB EAX, 0x05
0010: MOV EBX, EAX
0012: ADD EBX, ECX
0014: SUB EBX, EAX
0016: MUL EBX
0018: CALL 0x7856342f
001d: JE/Z 0x05
001f: JMP 0x1234569c
0024: INC EAX
0026: DEC EAX
0028: MOVZX EAX, BYTE PTR EAX
002b: MOVSX EAX, BYTE PTR EAX
002e: REP MOVSB
0030: XCHG ECX, EAX
0032: SHL EAX, 1
0034: LOOP 0x34
0036: RET
";

    fn text(disassembly: &Disassembly) -> String {
        OutputFormat::Text
            .get_formatter(Some(TextParams::default()))
            .format(disassembly)
            .unwrap()
    }

    fn assert_contiguous(image: &[u8], disassembly: &Disassembly) {
        let mut expected = 0;
        for insn in &disassembly.insns {
            assert_eq!(insn.offset, expected, "gap before {:?}", insn);
            assert!(insn.size > 0);
            assert_eq!(insn.bytes(), &image[insn.offset..insn.end()]);
            expected = insn.end();
        }
        assert_eq!(disassembly.cursor, expected);
        match &disassembly.stop {
            Stop::Exhausted => assert_eq!(disassembly.cursor, image.len()),
            Stop::Failed(DecodeError::IncompleteOpcodeOperand(t)) => {
                assert_eq!(t.offset, disassembly.cursor);
                assert!(t.at + t.needed > image.len());
            }
            Stop::Failed(other) => panic!("unexpected stop: {}", other),
        }
    }

    #[test]
    fn test_demo_program() {
        let disassembly = linear::run(&DEMO, &X86Decoder);
        assert!(disassembly.is_complete());
        assert_eq!(disassembly.cursor, DEMO.len());
        assert_eq!(disassembly.instruction_count(), 21);
        assert_eq!(text(&disassembly), DEMO_TEXT);
        assert_contiguous(&DEMO, &disassembly);
    }

    #[test]
    fn test_scenario_nop() {
        let disassembly = linear::run(&[0x90], &X86Decoder);
        assert_eq!(disassembly.instruction_count(), 1);
        assert_eq!(disassembly.insns[0].mnemonic, Mnemonic::Nop);
        assert_eq!(disassembly.insns[0].size, 1);
        assert_eq!(disassembly.cursor, 1);
        assert_eq!(disassembly.stop, Stop::Exhausted);
    }

    #[test]
    fn test_scenario_mov_imm32() {
        let disassembly = linear::run(&[0xB8, 0x78, 0x56, 0x34, 0x12], &X86Decoder);
        let insn = &disassembly.insns[0];
        assert_eq!(disassembly.instruction_count(), 1);
        assert_eq!(insn.size, 5);
        assert_eq!(insn.to_string(), "MOV EAX, 0x12345678");
    }

    #[test]
    fn test_scenario_add_registers() {
        let disassembly = linear::run(&[0x03, 0xC1], &X86Decoder);
        let insn = &disassembly.insns[0];
        assert_eq!(insn.mnemonic, Mnemonic::Add);
        assert_eq!(
            insn.operands,
            vec![Operand::Register(Register::Eax), Operand::Register(Register::Ecx)]
        );
        assert_eq!(insn.size, 2);
    }

    #[test]
    fn test_scenario_inc_via_indirect_group() {
        let disassembly = linear::run(&[0xFF, 0xC0], &X86Decoder);
        let insn = &disassembly.insns[0];
        assert_eq!(insn.mnemonic, Mnemonic::Inc);
        assert_eq!(insn.operands, vec![Operand::Register(Register::Eax)]);
        assert_eq!(insn.size, 2);
        assert!(disassembly.is_complete());
    }

    #[test]
    fn test_scenario_rep_movsb_is_one_record() {
        let disassembly = linear::run(&[0xF3, 0xA4], &X86Decoder);
        assert_eq!(disassembly.instruction_count(), 1);
        let insn = &disassembly.insns[0];
        assert_eq!(insn.prefix, Some(Prefix::Rep));
        assert_eq!(insn.mnemonic, Mnemonic::Movsb);
        assert_eq!(insn.size, 2);
        assert_eq!(insn.to_string(), "REP MOVSB");
    }

    #[test]
    fn test_scenario_lone_immediate_group_opcode() {
        let disassembly = linear::run(&[0x81], &X86Decoder);
        assert!(disassembly.insns.is_empty());
        assert_eq!(disassembly.cursor, 0);
        let t = disassembly.truncation().unwrap();
        assert_eq!(t.missing, Missing::ModRm);
        assert_eq!(t.offset, 0);
        assert_eq!(text(&disassembly), "0000: Incomplete immediate arithmetic\n");
    }

    #[test]
    fn test_exhaustive_dispatch() {
        let mut unknown = 0;
        for op in 0..=255u8 {
            let mut stream = [0u8; 16];
            stream[0] = op;
            let insn = X86Decoder.decode(&stream, 0).unwrap();

            if OPCODE_TABLE[op as usize] == OpcodeClass::Unknown {
                unknown += 1;
                assert_eq!(insn.mnemonic, Mnemonic::Unknown(Unknown::Opcode(op)));
                assert_eq!(insn.size, 1, "opcode 0x{:02x}", op);
                assert_eq!(insn.to_string(), format!("Unknown instruction: 0x{:02x}", op));
            } else {
                assert!(
                    !matches!(insn.mnemonic, Mnemonic::Unknown(Unknown::Opcode(_))),
                    "defined opcode 0x{:02x} fell through",
                    op
                );
            }
        }
        assert_eq!(unknown, 95);
    }

    #[test]
    fn test_unknown_opcodes_advance_by_one() {
        let unknown: Vec<u8> = (0..=255u8)
            .filter(|&op| OPCODE_TABLE[op as usize] == OpcodeClass::Unknown)
            .collect();
        let disassembly = linear::run(&unknown, &X86Decoder);
        assert!(disassembly.is_complete());
        assert_eq!(disassembly.instruction_count(), unknown.len());
        for (insn, op) in disassembly.insns.iter().zip(&unknown) {
            assert_eq!(insn.bytes(), &[*op]);
        }
    }

    #[test]
    fn test_mod3_register_round_trip() {
        // ModR/M classes whose r/m operand comes first, with mod=3
        let opcodes = [
            0x89u8, 0x01, 0x81, 0xC6, 0xC7, 0x85, 0x87, 0xC1, 0xD1, 0xF7, 0xFF,
        ];
        for op in opcodes {
            for rm in 0..8u8 {
                let modrm = 0xC0 | rm;
                let stream = [op, modrm, 0, 0, 0, 0];
                let insn = X86Decoder.decode(&stream, 0).unwrap();
                assert_eq!(
                    insn.operands.first(),
                    Some(&Operand::Register(Register::from_bits(rm))),
                    "opcode 0x{:02x} rm={}",
                    op,
                    rm
                );
            }
        }
    }

    #[rstest]
    #[case::mov_reg_imm8(&[0xB1, 0x7F])]
    #[case::mov_reg_imm32(&[0xB8, 0x78, 0x56, 0x34, 0x12])]
    #[case::push_imm32(&[0x68, 0x00, 0x10, 0x00, 0x00])]
    #[case::push_imm8(&[0x6A, 0x01])]
    #[case::jcc(&[0x75, 0xFE])]
    #[case::jmp_rel8(&[0xEB, 0x00])]
    #[case::call_rel32(&[0xE8, 0x00, 0x00, 0x00, 0x00])]
    #[case::jmp_rel32(&[0xE9, 0xFB, 0xFF, 0xFF, 0xFF])]
    #[case::loop_(&[0xE2, 0xFE])]
    #[case::jecxz(&[0xE3, 0x10])]
    #[case::mov_disp8(&[0x8B, 0x45, 0xFC])]
    #[case::mov_sib_disp32(&[0x8B, 0x84, 0x88, 0x00, 0x10, 0x00, 0x00])]
    #[case::mov_mod0_rm5(&[0x8B, 0x05, 0x00, 0x20, 0x40, 0x00])]
    #[case::mov_sib_no_base(&[0x8B, 0x04, 0x25, 0x44, 0x33, 0x22, 0x11])]
    #[case::alu_imm32(&[0x81, 0xC0, 0x01, 0x00, 0x00, 0x00])]
    #[case::alu_imm8(&[0x83, 0xC0, 0x05])]
    #[case::alu_disp8_imm8(&[0x80, 0x40, 0x10, 0x05])]
    #[case::mov_rm_imm8(&[0xC6, 0x00, 0x05])]
    #[case::mov_rm_imm32(&[0xC7, 0x45, 0xF8, 0x01, 0x00, 0x00, 0x00])]
    #[case::shift_imm8(&[0xC1, 0xE0, 0x04])]
    #[case::shift_one(&[0xD1, 0xE0])]
    #[case::test_imm8(&[0xF6, 0xC0, 0xFF])]
    #[case::test_imm32(&[0xF7, 0xC0, 0xFF, 0x00, 0x00, 0x00])]
    #[case::mul(&[0xF7, 0xE3])]
    #[case::lea(&[0x8D, 0x04, 0x8D, 0x00, 0x10, 0x00, 0x00])]
    #[case::test_rm(&[0x85, 0xC0])]
    #[case::xchg(&[0x87, 0xC1])]
    #[case::call_indirect(&[0xFF, 0x15, 0x00, 0x20, 0x40, 0x00])]
    #[case::ff_unknown_reg(&[0xFF, 0xF8])]
    #[case::movzx(&[0x0F, 0xB6, 0xC0])]
    #[case::movsx_sib_disp8(&[0x0F, 0xBF, 0x44, 0x24, 0x08])]
    fn test_truncation_boundary(#[case] encoding: &[u8]) {
        // a NOP in front shows that earlier records survive the truncation
        let mut stream = vec![0x90];
        stream.extend_from_slice(encoding);

        let complete = linear::run(&stream, &X86Decoder);
        assert!(complete.is_complete(), "{:?}", complete.stop);
        assert_eq!(complete.instruction_count(), 2);
        assert_eq!(complete.insns[1].size as usize, encoding.len());

        for cut in 1..stream.len() - 1 {
            let partial = linear::run(&stream[..=cut], &X86Decoder);
            assert_eq!(partial.instruction_count(), 1, "cut after {} bytes", cut + 1);
            assert_eq!(partial.cursor, 1);
            let t = partial
                .truncation()
                .unwrap_or_else(|| panic!("no truncation at cut {}", cut));
            assert_eq!(t.offset, 1);
            assert_eq!(t.opcode, encoding[0]);
        }
    }

    #[rstest]
    #[case::disp8_minus_one(&[0x8B, 0x45, 0xFF], -1, "MOV EAX, [EBP - 0x1]")]
    #[case::disp32_minus_one(&[0x8B, 0x85, 0xFF, 0xFF, 0xFF, 0xFF], -1, "MOV EAX, [EBP - 0x1]")]
    #[case::disp8_max(&[0x8B, 0x45, 0x7F], 127, "MOV EAX, [EBP + 0x7f]")]
    fn test_displacement_sign(#[case] bytes: &[u8], #[case] disp: i32, #[case] rendered: &str) {
        let insn = X86Decoder.decode(bytes, 0).unwrap();
        match insn.operands[1] {
            Operand::Memory(mem) => assert_eq!(mem.displacement, Some(disp)),
            other => panic!("expected memory operand, got {:?}", other),
        }
        assert_eq!(insn.to_string(), rendered);
    }

    #[test]
    fn test_unknown_two_byte_checks_modrm() {
        let lone = linear::run(&[0x90, 0x0F], &X86Decoder);
        assert_eq!(lone.instruction_count(), 1);
        assert_eq!(lone.truncation().unwrap().missing, Missing::SecondOpcode);

        let no_modrm = linear::run(&[0x90, 0x0F, 0x05], &X86Decoder);
        assert_eq!(no_modrm.instruction_count(), 1);
        assert_eq!(no_modrm.cursor, 1);
        let t = no_modrm.truncation().unwrap();
        assert_eq!((t.offset, t.missing), (1, Missing::ModRm));
        assert_eq!(text(&no_modrm), "0000: NOP\n0001: Incomplete 0F instruction\n");

        // the ModR/M byte is not consumed, the sweep resumes on it
        let complete = linear::run(&[0x90, 0x0F, 0x05, 0x90], &X86Decoder);
        assert!(complete.is_complete());
        let offsets: Vec<_> = complete.insns.iter().map(|i| (i.offset, i.size)).collect();
        assert_eq!(offsets, vec![(0, 1), (1, 2), (3, 1)]);
        assert_eq!(complete.insns[1].to_string(), "Unknown 0F instruction");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            .. ProptestConfig::default()
        })]

        #[test]
        fn test_random_sweep_is_contiguous(image in vec(any::<u8>(), 0..4096)) {
            let disassembly = linear::run(&image, &X86Decoder);
            assert_contiguous(&image, &disassembly);
        }

        #[test]
        fn test_lazy_sweep_matches_collected_pass(image in vec(any::<u8>(), 0..1024)) {
            let mut sweep = disassemble(&image);
            let lazy: Vec<_> = sweep.by_ref().collect();
            let collected = linear::run(&image, &X86Decoder);

            prop_assert_eq!(&lazy, &collected.insns);
            prop_assert_eq!(sweep.cursor(), collected.cursor);
            prop_assert_eq!(sweep.stop(), Some(&collected.stop));
            prop_assert!(sweep.next().is_none());
        }

        #[test]
        fn test_run_many_keeps_input_order(images in vec(vec(any::<u8>(), 0..512), 0..16)) {
            let parallel = linear::run_many(&images, &X86Decoder);
            prop_assert_eq!(parallel.len(), images.len());
            for (image, disassembly) in images.iter().zip(&parallel) {
                prop_assert_eq!(disassembly, &linear::run(image, &X86Decoder));
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 16,
            .. ProptestConfig::default()
        })]

        #[test]
        fn test_large_random_sweep(image in vec(any::<u8>(), 1 << 15..1 << 16)) {
            let disassembly = linear::run(&image, &X86Decoder);
            assert_contiguous(&image, &disassembly);
        }
    }

    #[test]
    fn test_every_format_on_demo() {
        let disassembly = linear::run(&DEMO, &X86Decoder);
        for format in OutputFormat::available_formats() {
            let output = format.get_formatter(None).format(&disassembly).unwrap();
            assert!(output.contains("MOVZX"), "{} output lost MOVZX", format);
        }
    }

    #[test]
    fn test_byte_ptr_source_structure() {
        let insn = X86Decoder.decode(&[0x0F, 0xB6, 0xC0], 0).unwrap();
        assert_eq!(
            insn.operands,
            vec![
                Operand::Register(Register::Eax),
                Operand::BytePtr(RmOperand::Register(Register::Eax)),
            ]
        );
    }
}
