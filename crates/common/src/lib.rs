//! Skein common types and instruction encoding.
//!
//! This crate provides the foundational data structures shared by the
//! engine and the tooling:
//!
//! - [`Opcode`] — the 74-opcode instruction set
//! - [`Value`] / [`ValueTag`] — tagged runtime values
//! - [`Buffer`] / [`BufferKind`] — typed fixed-size memory buffers
//! - [`Instruction`] / [`Header`] / [`Word`] — wire encoding and decoding
//! - [`limits`] — the fixed resource ceilings
//! - [`DecodeError`] — errors from decoding byte streams
//!
//! # Dependencies
//!
//! This crate uses `thiserror` (compile-time proc-macro, zero runtime cost)
//! and has no other dependencies.

pub mod buffer;
pub mod error;
pub mod instruction;
pub mod limits;
pub mod opcode;
pub mod value;

// Re-export commonly used types at the crate root.
pub use buffer::{Buffer, BufferKind};
pub use error::DecodeError;
pub use instruction::{Header, ImmType, Instruction, Word};
pub use opcode::Opcode;
pub use value::{StackVarRef, Value, ValueTag};

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Strategy that generates a random valid Opcode.
    fn arb_opcode() -> impl Strategy<Value = Opcode> {
        prop::sample::select(&opcode::ALL_OPCODES[..])
    }

    /// Strategy that generates a random payload word.
    fn arb_word() -> impl Strategy<Value = Word> {
        prop::array::uniform4(any::<u8>()).prop_map(Word)
    }

    /// Strategy that generates a random valid Instruction.
    fn arb_instruction() -> impl Strategy<Value = Instruction> {
        (
            arb_opcode(),
            any::<u8>(),
            prop::collection::vec(arb_word(), 0..=3),
        )
            .prop_map(|(op, operand, words)| Instruction::new(op, operand, &words))
    }

    proptest! {
        /// For all valid instructions, encode then decode produces the original.
        #[test]
        fn encode_decode_roundtrip(instr in arb_instruction()) {
            let mut bytes = Vec::new();
            instr.encode_into(&mut bytes);
            prop_assert_eq!(bytes.len() as u32, instr.size());
            let decoded = Instruction::decode_at(&bytes, 0).unwrap();
            prop_assert_eq!(instr, decoded);
        }

        /// For any byte soup, decoding either succeeds or returns a specific
        /// DecodeError; it never panics.
        #[test]
        fn random_bytes_decode(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            match Instruction::decode_at(&bytes, 0) {
                Ok(instr) => {
                    // A successful decode re-encodes to the same prefix.
                    let mut out = Vec::new();
                    instr.encode_into(&mut out);
                    prop_assert_eq!(&out[..], &bytes[..out.len()]);
                }
                Err(
                    DecodeError::InvalidOpcode(_)
                    | DecodeError::TruncatedHeader { .. }
                    | DecodeError::PayloadTooLong { .. }
                    | DecodeError::TruncatedPayload { .. },
                ) => {}
            }
        }

        /// Word reinterpretation is lossless for every 32-bit pattern.
        #[test]
        fn word_bit_patterns(v in any::<u32>()) {
            let w = Word::from_u32(v);
            prop_assert_eq!(w.as_u32(), v);
            prop_assert_eq!(w.as_i32() as u32, v);
            prop_assert_eq!(w.as_f32().to_bits(), f32::from_bits(v).to_bits());
        }
    }
}
