//! Skein virtual machine — executes untrusted bytecode with fully
//! deterministic, bounded behavior.
//!
//! The engine is a single owned state value holding program memory, a
//! 32-deep frame stack, 256 global value slots, 256 typed memory buffers,
//! three comparison flags, and an error latch. Every opcode handler
//! validates all of its operands before mutating anything; bad bytecode
//! is an ordinary error, never a panic.
//!
//! # Usage
//!
//! ```
//! use skein_common::{Instruction, Opcode, Word};
//! use skein_vm::{MemConsole, Vm};
//!
//! let mut image = Vec::new();
//! Instruction::new(Opcode::LoadImmI32, 0, &[Word::from_i32(42)]).encode_into(&mut image);
//! Instruction::new(Opcode::PrintI32, 0, &[Word::from_u32(0)]).encode_into(&mut image);
//! Instruction::new(Opcode::Halt, 0, &[]).encode_into(&mut image);
//!
//! let mut vm = Vm::new();
//! vm.load_program(&image).unwrap();
//! let mut console = MemConsole::new();
//! vm.run(&mut console).unwrap();
//! assert_eq!(console.output_str(), "42");
//! ```

pub mod disasm;
pub mod error;
pub mod execute;
pub mod io;
pub mod machine;

pub use disasm::{disassemble, disassemble_at, dump_state};
pub use error::VmError;
pub use io::{Console, MemConsole, StdConsole};
pub use machine::{Flags, Frame, Vm};
