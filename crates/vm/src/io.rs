//! Host console binding and textual I/O helpers.
//!
//! The engine reaches the outside world through exactly two primitives:
//! a byte sink and a byte source. Everything else here (decimal
//! formatting, token parsing) is deterministic and locale-independent,
//! built on those two calls only.

use std::io::{BufReader, Read, Write};

/// Host text console used by the PRINT_* and READ_* opcodes.
pub trait Console {
    /// Write raw bytes to the host sink.
    fn write_bytes(&mut self, bytes: &[u8]);

    /// Read one byte from the host source; `None` at end of input.
    fn read_byte(&mut self) -> Option<u8>;
}

/// Console bound to the process stdin/stdout.
pub struct StdConsole {
    input: BufReader<std::io::Stdin>,
}

impl StdConsole {
    pub fn new() -> StdConsole {
        StdConsole {
            input: BufReader::new(std::io::stdin()),
        }
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        StdConsole::new()
    }
}

impl Console for StdConsole {
    fn write_bytes(&mut self, bytes: &[u8]) {
        // The engine has no status for a failing sink; a broken pipe
        // simply drops output, like the original.
        let _ = std::io::stdout().write_all(bytes);
        let _ = std::io::stdout().flush();
    }

    fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.input.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }
}

/// In-memory console for tests and embedding: reads from a preloaded
/// byte string, captures everything written.
#[derive(Debug, Default)]
pub struct MemConsole {
    input: Vec<u8>,
    cursor: usize,
    output: Vec<u8>,
}

impl MemConsole {
    pub fn new() -> MemConsole {
        MemConsole::default()
    }

    /// Console whose source yields the given bytes, then end of input.
    pub fn with_input(input: impl Into<Vec<u8>>) -> MemConsole {
        MemConsole {
            input: input.into(),
            cursor: 0,
            output: Vec::new(),
        }
    }

    /// Everything written so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Everything written so far, lossily decoded for assertions.
    pub fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Console for MemConsole {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.output.extend_from_slice(bytes);
    }

    fn read_byte(&mut self) -> Option<u8> {
        let byte = *self.input.get(self.cursor)?;
        self.cursor += 1;
        Some(byte)
    }
}

// ---- Decimal formatting ----
//
// Digit loops into fixed stack buffers; no allocation, no locale.

/// Write a u32 in decimal.
pub(crate) fn write_u32(io: &mut dyn Console, mut value: u32) {
    let mut digits = [0u8; 10];
    let mut n = 0;
    if value == 0 {
        io.write_bytes(b"0");
        return;
    }
    while value > 0 {
        digits[n] = b'0' + (value % 10) as u8;
        value /= 10;
        n += 1;
    }
    while n > 0 {
        n -= 1;
        io.write_bytes(&digits[n..n + 1]);
    }
}

/// Write an i32 in decimal.
pub(crate) fn write_i32(io: &mut dyn Console, value: i32) {
    if value < 0 {
        io.write_bytes(b"-");
    }
    write_u32(io, value.unsigned_abs());
}

/// Write an f32 as optional sign, integer part, '.', and exactly six
/// truncated decimal digits.
pub(crate) fn write_f32(io: &mut dyn Console, value: f32) {
    let mut v = value;
    if v < 0.0 {
        io.write_bytes(b"-");
        v = -v;
    }

    let int_part = v as i32;
    let frac_part = v - int_part as f32;

    write_i32(io, int_part);
    io.write_bytes(b".");

    let mut frac_val = (frac_part * 1_000_000.0) as u32;
    for _ in 0..6 {
        let digit = b'0' + (frac_val / 100_000) as u8;
        io.write_bytes(&[digit]);
        frac_val = (frac_val % 100_000) * 10;
    }
}

// ---- Token reading ----

const TOKEN_MAX: usize = 64;

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

/// Read one whitespace-delimited token into a fixed buffer.
///
/// Leading whitespace (including line terminators) is skipped. The byte
/// that ends the token is consumed. Returns the token length, which is
/// zero at end of input. Tokens longer than the buffer are truncated.
fn read_token(io: &mut dyn Console, buf: &mut [u8; TOKEN_MAX]) -> usize {
    let mut byte = loop {
        match io.read_byte() {
            Some(b) if is_space(b) => continue,
            Some(b) => break b,
            None => return 0,
        }
    };

    let mut len = 0;
    loop {
        if len < TOKEN_MAX {
            buf[len] = byte;
            len += 1;
        }
        byte = match io.read_byte() {
            Some(b) if is_space(b) => break,
            Some(b) => b,
            None => break,
        };
    }
    len
}

/// Discard source bytes through the next line terminator.
fn discard_line(io: &mut dyn Console) {
    while let Some(byte) = io.read_byte() {
        if byte == b'\n' {
            break;
        }
    }
}

/// Parse one token with the given parser. On failure the rest of the
/// line is discarded and `None` is returned; the caller stores zero.
pub(crate) fn read_parsed<T>(io: &mut dyn Console, parse: fn(&str) -> Option<T>) -> Option<T> {
    let mut buf = [0u8; TOKEN_MAX];
    let len = read_token(io, &mut buf);
    let parsed = std::str::from_utf8(&buf[..len])
        .ok()
        .and_then(|s| parse(s));
    if parsed.is_none() {
        discard_line(io);
    }
    parsed
}

pub(crate) fn parse_i32(s: &str) -> Option<i32> {
    s.parse().ok()
}

pub(crate) fn parse_u32(s: &str) -> Option<u32> {
    s.parse().ok()
}

pub(crate) fn parse_f32(s: &str) -> Option<f32> {
    s.parse().ok()
}
