//! Engine diagnostics: instruction listing and state dump.
//!
//! These routines never fail; undecodable bytes render as `<invalid>` and
//! the listing stops there. Output is stable so tests and tooling can
//! match on it.

use crate::machine::Vm;
use skein_common::{ImmType, Instruction, Word};

/// Render one payload word according to its header type nibble.
fn render_word(word: Word, imm_type: Option<ImmType>) -> String {
    match imm_type {
        Some(ImmType::Int) => format!("{}", word.as_i32()),
        Some(ImmType::Float) => format!("{}", word.as_f32()),
        Some(ImmType::UChar) => format!("u+{:04x}", word.as_u32()),
        Some(ImmType::UShort) => {
            let [a, b] = word.as_u16x2();
            format!("[{a}, {b}]")
        }
        Some(ImmType::StackRef) => {
            let r = word.as_stack_ref();
            format!("{{{}, {}}}", r.frame, r.var)
        }
        Some(ImmType::GlobalRef) => format!("g{}", word.as_u32()),
        Some(ImmType::BufRef) => format!("b{}", word.as_u32()),
        Some(ImmType::BufPos) => format!("@{}", word.as_u32()),
        Some(ImmType::UInt) | Some(ImmType::None) | None => format!("{}", word.as_u32()),
    }
}

/// Disassemble the single instruction at `pc`.
pub fn disassemble_at(vm: &Vm, pc: u32) -> String {
    let loaded = vm.loaded_program();
    let ins = match Instruction::decode_at(loaded, pc as usize) {
        Ok(ins) => ins,
        Err(_) => return format!("{pc:#06x}: <invalid>"),
    };

    let mut line = format!("{pc:#06x}: {}", ins.header.opcode.mnemonic());
    line.push_str(&format!(" {}", ins.header.operand));
    for i in 0..ins.header.payload_len() as usize {
        line.push_str(", ");
        line.push_str(&render_word(ins.imm[i], ins.header.imm_type(i + 1)));
    }
    line
}

/// Disassemble the whole loaded program, one instruction per line.
///
/// Stops after the first undecodable header, which is rendered as
/// `<invalid>`.
pub fn disassemble(vm: &Vm) -> String {
    let mut out = String::new();
    let mut pc = 0u32;
    while pc < vm.program_len() {
        let line = disassemble_at(vm, pc);
        let stop = line.ends_with("<invalid>");
        out.push_str(&line);
        out.push('\n');
        if stop {
            break;
        }
        match Instruction::decode_at(vm.loaded_program(), pc as usize) {
            Ok(ins) => pc += ins.size(),
            Err(_) => break,
        }
    }
    out
}

/// Render PC, SP, flags, the error latch, and the non-Void stack vars of
/// the current frame.
pub fn dump_state(vm: &Vm) -> String {
    let flags = vm.flags();
    let flag_str: String = [
        if flags.zero { 'Z' } else { '-' },
        if flags.less { 'L' } else { '-' },
        if flags.greater { 'G' } else { '-' },
    ]
    .iter()
    .collect();

    let mut out = String::from("=== VM State ===\n");
    out.push_str(&format!(
        "PC: {:#06x}  SP: {}  Flags: {}\n",
        vm.pc(),
        vm.sp(),
        flag_str
    ));
    match vm.last_error() {
        None => out.push_str("Last Error: ok\n"),
        Some(e) => out.push_str(&format!("Last Error: {e}\n")),
    }

    out.push_str(&format!("Stack Frame {}:\n", vm.sp()));
    for (i, value) in vm.current_frame().stack_vars.iter().enumerate() {
        if !value.is_void() {
            out.push_str(&format!("  s{i}: {value}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VmError;
    use crate::io::MemConsole;
    use skein_common::{Instruction, Opcode, Word};

    fn program(instrs: &[Instruction]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for ins in instrs {
            ins.encode_into(&mut bytes);
        }
        bytes
    }

    #[test]
    fn disassemble_simple_program() {
        let mut vm = Vm::new();
        let image = program(&[
            Instruction::new(Opcode::LoadImmI32, 0, &[Word::from_i32(10)]),
            Instruction::new(Opcode::PrintI32, 0, &[Word::from_u32(0)]),
            Instruction::new(Opcode::Halt, 0, &[]),
        ]);
        vm.load_program(&image).unwrap();

        let listing = disassemble(&vm);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "0x0000: load.i32 0, 10");
        assert_eq!(lines[1], "0x0008: print.i32 0, 0");
        assert_eq!(lines[2], "0x0010: halt 0");
    }

    #[test]
    fn disassemble_stops_at_invalid() {
        let mut vm = Vm::new();
        let mut image = program(&[Instruction::new(Opcode::Nop, 0, &[])]);
        image.extend_from_slice(&[0xA9, 0, 0, 0]);
        vm.load_program(&image).unwrap();

        let listing = disassemble(&vm);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "0x0004: <invalid>");
    }

    #[test]
    fn dump_shows_non_void_slots_and_error() {
        let mut vm = Vm::new();
        let image = program(&[
            Instruction::new(Opcode::LoadImmI32, 2, &[Word::from_i32(-5)]),
            Instruction::new(Opcode::Halt, 0, &[]),
        ]);
        vm.load_program(&image).unwrap();
        let mut io = MemConsole::new();
        assert_eq!(vm.run(&mut io), Ok(()));
        assert_eq!(vm.last_error(), Some(VmError::Halt));

        let dump = dump_state(&vm);
        assert!(dump.contains("SP: 0"));
        assert!(dump.contains("Flags: ---"));
        assert!(dump.contains("Last Error: program halted"));
        assert!(dump.contains("s2: i32 = -5"));
        assert!(!dump.contains("s0:"));
    }
}
