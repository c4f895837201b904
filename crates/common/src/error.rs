//! Decode errors for Skein instruction streams.

use thiserror::Error;

/// Errors that occur while decoding an instruction from program memory.
///
/// The engine maps these onto its runtime status codes; tooling (the
/// disassembler, the CLI) reports them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The opcode byte is not assigned (reserved gap or 0xA9..=0xFF).
    #[error("invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),

    /// Fewer than four bytes remain at the decode position.
    #[error("truncated instruction header at {at:#06x}")]
    TruncatedHeader { at: u32 },

    /// The header's payload length nibble exceeds three words.
    #[error("payload length {len} exceeds 3 words at {at:#06x}")]
    PayloadTooLong { at: u32, len: u8 },

    /// The payload runs past the end of the loaded program.
    #[error("instruction needs {need} bytes but only {have} remain at {at:#06x}")]
    TruncatedPayload { at: u32, need: u32, have: u32 },
}
