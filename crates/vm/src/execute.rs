//! Main execution loop and opcode dispatch for the Skein engine.
//!
//! Every handler follows the same contract: validate every operand
//! (indices, tags, divisors, bounds) before touching any state, apply the
//! effect, and only then let the dispatcher advance the PC. A failing
//! instruction therefore leaves the machine unchanged except for the
//! error latch, and the PC still addresses the faulting instruction.

use crate::error::VmError;
use crate::io::{self, Console};
use crate::machine::Vm;
use skein_common::limits::{STACK_DEPTH, STACK_VAR_COUNT, STR_CAPACITY, STR_MAX};
use skein_common::{Buffer, BufferKind, DecodeError, Instruction, Opcode, StackVarRef, Value};

/// Bounds-check an element position, converting to a storage index.
fn pos_in(pos: u32, capacity: u32, at: u32) -> Result<usize, VmError> {
    if pos < capacity {
        Ok(pos as usize)
    } else {
        Err(VmError::InvalidBufferPos { pos, at })
    }
}

/// Length of a NUL-terminated byte string; the full storage size when no
/// terminator is present.
fn cstr_len(bytes: &[u8; STR_CAPACITY]) -> usize {
    bytes.iter().position(|&b| b == 0).unwrap_or(STR_CAPACITY)
}

impl Vm {
    /// Decode and execute one instruction, recording its status in the
    /// error latch. `Err(VmError::Halt)` is normal termination.
    pub fn step(&mut self, io: &mut dyn Console) -> Result<(), VmError> {
        let result = self.dispatch(io);
        self.last_error = result.err();
        result
    }

    /// Execute until HALT or the first fault. HALT folds to `Ok(())`;
    /// every other non-success status propagates unchanged.
    pub fn run(&mut self, io: &mut dyn Console) -> Result<(), VmError> {
        loop {
            match self.step(io) {
                Ok(()) => {}
                Err(VmError::Halt) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch the instruction at the current PC.
    fn fetch(&self) -> Result<Instruction, VmError> {
        let at = self.pc;
        let loaded = &self.program[..self.program_len as usize];
        Instruction::decode_at(loaded, self.pc as usize).map_err(|e| match e {
            DecodeError::TruncatedHeader { .. } => VmError::InvalidPc { at },
            DecodeError::PayloadTooLong { .. } | DecodeError::TruncatedPayload { .. } => {
                VmError::InvalidInstruction { at }
            }
            DecodeError::InvalidOpcode(op) => VmError::InvalidOpcode { op, at },
        })
    }

    fn dispatch(&mut self, io: &mut dyn Console) -> Result<(), VmError> {
        let ins = self.fetch()?;
        let next_pc = self.pc + ins.size();

        match ins.header.opcode {
            // ---- Control flow ----
            Opcode::Nop => {}
            Opcode::Halt => return Err(VmError::Halt),
            Opcode::Jmp => {
                self.pc = self.jump_target(&ins)?;
                return Ok(());
            }
            Opcode::Jz | Opcode::Jnz | Opcode::Jlt | Opcode::Jgt | Opcode::Jle | Opcode::Jge => {
                let taken = match ins.header.opcode {
                    Opcode::Jz => self.flags.zero,
                    Opcode::Jnz => !self.flags.zero,
                    Opcode::Jlt => self.flags.less,
                    Opcode::Jgt => self.flags.greater,
                    Opcode::Jle => self.flags.less || self.flags.zero,
                    _ => self.flags.greater || self.flags.zero,
                };
                self.pc = if taken { self.jump_target(&ins)? } else { next_pc };
                return Ok(());
            }
            Opcode::Call => {
                self.op_call(&ins, next_pc)?;
                return Ok(());
            }
            Opcode::Ret => {
                self.op_ret()?;
                return Ok(());
            }

            // ---- Loads ----
            Opcode::LoadG => {
                self.slot(ins.header.operand)?;
                let v = self.global(ins.imm[0].as_u32())?;
                *self.slot_mut(ins.header.operand)? = v;
            }
            Opcode::LoadL => {
                self.slot(ins.header.operand)?;
                let v = self.local(ins.imm[0].as_u32())?;
                *self.slot_mut(ins.header.operand)? = v;
            }
            Opcode::LoadS => {
                self.slot(ins.header.operand)?;
                let v = self.frame_var(ins.imm[0].as_stack_ref())?;
                *self.slot_mut(ins.header.operand)? = v;
            }
            Opcode::LoadImmI32 => {
                *self.slot_mut(ins.header.operand)? = Value::I32(ins.imm[0].as_i32());
            }
            Opcode::LoadImmU32 => {
                *self.slot_mut(ins.header.operand)? = Value::U32(ins.imm[0].as_u32());
            }
            Opcode::LoadImmF32 => {
                *self.slot_mut(ins.header.operand)? = Value::F32(ins.imm[0].as_f32());
            }
            Opcode::LoadRet => {
                self.slot(ins.header.operand)?;
                let v = self.frame_ret(ins.imm[0].as_u32())?;
                *self.slot_mut(ins.header.operand)? = v;
            }

            // ---- Stores ----
            Opcode::StoreG => {
                let v = self.slot(ins.header.operand)?;
                *self.global_mut(ins.imm[0].as_u32())? = v;
            }
            Opcode::StoreL => {
                let v = self.slot(ins.header.operand)?;
                *self.local_mut(ins.imm[0].as_u32())? = v;
            }
            Opcode::StoreS => {
                let v = self.slot(ins.header.operand)?;
                *self.frame_var_mut(ins.imm[0].as_stack_ref())? = v;
            }
            Opcode::StoreRet => {
                let v = self.slot(ins.header.operand)?;
                *self.frame_ret_mut(ins.imm[0].as_u32())? = v;
            }

            // ---- Signed integer arithmetic ----
            Opcode::AddI32 => self.bin_i32(&ins, |a, b| a.wrapping_add(b))?,
            Opcode::SubI32 => self.bin_i32(&ins, |a, b| a.wrapping_sub(b))?,
            Opcode::MulI32 => self.bin_i32(&ins, |a, b| a.wrapping_mul(b))?,
            Opcode::DivI32 => self.div_i32(&ins, |a, b| a.wrapping_div(b))?,
            Opcode::ModI32 => self.div_i32(&ins, |a, b| a.wrapping_rem(b))?,
            Opcode::NegI32 => self.un_i32(&ins, |a| a.wrapping_neg())?,

            // ---- Unsigned integer arithmetic ----
            Opcode::AddU32 => self.bin_u32(&ins, |a, b| a.wrapping_add(b))?,
            Opcode::SubU32 => self.bin_u32(&ins, |a, b| a.wrapping_sub(b))?,
            Opcode::MulU32 => self.bin_u32(&ins, |a, b| a.wrapping_mul(b))?,
            Opcode::DivU32 => self.div_u32(&ins, |a, b| a / b)?,
            Opcode::ModU32 => self.div_u32(&ins, |a, b| a % b)?,

            // ---- Float arithmetic ----
            Opcode::AddF32 => self.bin_f32(&ins, |a, b| a + b)?,
            Opcode::SubF32 => self.bin_f32(&ins, |a, b| a - b)?,
            Opcode::MulF32 => self.bin_f32(&ins, |a, b| a * b)?,
            Opcode::DivF32 => self.div_f32(&ins)?,
            Opcode::NegF32 => self.un_f32(&ins, |a| -a)?,
            Opcode::AbsF32 => self.un_f32(&ins, f32::abs)?,
            Opcode::SqrtF32 => self.un_f32(&ins, f32::sqrt)?,

            // ---- Bitwise ----
            Opcode::AndU32 => self.bin_u32(&ins, |a, b| a & b)?,
            Opcode::OrU32 => self.bin_u32(&ins, |a, b| a | b)?,
            Opcode::XorU32 => self.bin_u32(&ins, |a, b| a ^ b)?,
            Opcode::NotU32 => self.un_u32(&ins, |a| !a)?,
            Opcode::ShlU32 => self.shift_u32(&ins, |a, k| a << k)?,
            Opcode::ShrU32 => self.shift_u32(&ins, |a, k| a >> k)?,

            // ---- Comparison ----
            Opcode::CmpI32 | Opcode::CmpU32 | Opcode::CmpF32 => self.op_cmp(&ins)?,

            // ---- Type conversion ----
            Opcode::I32ToU32
            | Opcode::U32ToI32
            | Opcode::I32ToF32
            | Opcode::U32ToF32
            | Opcode::F32ToI32
            | Opcode::F32ToU32 => self.op_convert(&ins)?,

            // ---- Memory buffers ----
            Opcode::BufRead => self.op_buf_read(&ins)?,
            Opcode::BufWrite => self.op_buf_write(&ins)?,
            Opcode::BufLen => self.op_buf_len(&ins)?,
            Opcode::BufClear => {
                self.buffer_mut(ins.imm[0].as_u32())?.clear();
            }

            // ---- Strings ----
            Opcode::StrCat => self.op_str_cat(&ins)?,
            Opcode::StrCopy => self.op_str_copy(&ins)?,
            Opcode::StrLen => self.op_str_len(&ins)?,
            Opcode::StrCmp => self.op_str_cmp(&ins)?,
            Opcode::StrChr => self.op_str_chr(&ins)?,
            Opcode::StrSetChr => self.op_str_set_chr(&ins)?,

            // ---- Console I/O ----
            Opcode::PrintI32 => {
                match self.slot(ins.imm[0].low_byte())? {
                    Value::I32(v) => io::write_i32(io, v),
                    _ => return Err(self.type_mismatch()),
                }
            }
            Opcode::PrintU32 => {
                match self.slot(ins.imm[0].low_byte())? {
                    Value::U32(v) => io::write_u32(io, v),
                    _ => return Err(self.type_mismatch()),
                }
            }
            Opcode::PrintF32 => {
                match self.slot(ins.imm[0].low_byte())? {
                    Value::F32(v) => io::write_f32(io, v),
                    _ => return Err(self.type_mismatch()),
                }
            }
            Opcode::PrintStr => self.op_print_str(&ins, io)?,
            Opcode::Println => io.write_bytes(b"\n"),
            Opcode::ReadI32 => {
                self.slot(ins.header.operand)?;
                let v = io::read_parsed(io, io::parse_i32).unwrap_or(0);
                *self.slot_mut(ins.header.operand)? = Value::I32(v);
            }
            Opcode::ReadU32 => {
                self.slot(ins.header.operand)?;
                let v = io::read_parsed(io, io::parse_u32).unwrap_or(0);
                *self.slot_mut(ins.header.operand)? = Value::U32(v);
            }
            Opcode::ReadF32 => {
                self.slot(ins.header.operand)?;
                let v = io::read_parsed(io, io::parse_f32).unwrap_or(0.0);
                *self.slot_mut(ins.header.operand)? = Value::F32(v);
            }
            Opcode::ReadStr => self.op_read_str(&ins, io)?,
        }

        self.pc = next_pc;
        Ok(())
    }

    fn type_mismatch(&self) -> VmError {
        VmError::TypeMismatch { at: self.pc }
    }

    // ---- Control-flow helpers ----

    /// Jump target from imm1, validated against the loaded program.
    fn jump_target(&self, ins: &Instruction) -> Result<u32, VmError> {
        let target = ins.imm[0].as_u32();
        if target < self.program_len {
            Ok(target)
        } else {
            Err(VmError::InvalidPc { at: self.pc })
        }
    }

    fn op_call(&mut self, ins: &Instruction, next_pc: u32) -> Result<(), VmError> {
        if self.sp as usize >= STACK_DEPTH - 1 {
            return Err(VmError::StackOverflow { at: self.pc });
        }
        let target = self.jump_target(ins)?;

        // The callee frame gets fresh locals and the return address; its
        // stack vars keep whatever the caller staged there.
        let callee = self.sp as usize + 1;
        self.frames[callee].return_addr = next_pc;
        self.frames[callee].reset_locals();
        self.sp += 1;
        self.pc = target;
        Ok(())
    }

    fn op_ret(&mut self) -> Result<(), VmError> {
        if self.sp == 0 {
            return Err(VmError::StackUnderflow { at: self.pc });
        }
        // ret_val stays in the now-inactive frame for LOAD_RET.
        self.pc = self.frames[self.sp as usize].return_addr;
        self.sp -= 1;
        Ok(())
    }

    // ---- Frame addressing ----

    fn frame_var(&self, r: StackVarRef) -> Result<Value, VmError> {
        self.check_frame_ref(r)?;
        Ok(self.frames[r.frame as usize].stack_vars[r.var as usize])
    }

    fn frame_var_mut(&mut self, r: StackVarRef) -> Result<&mut Value, VmError> {
        self.check_frame_ref(r)?;
        Ok(&mut self.frames[r.frame as usize].stack_vars[r.var as usize])
    }

    fn check_frame_ref(&self, r: StackVarRef) -> Result<(), VmError> {
        if r.frame as usize >= STACK_DEPTH {
            return Err(VmError::InvalidStackVarIdx {
                idx: r.frame as u32,
                at: self.pc,
            });
        }
        if r.var as usize >= STACK_VAR_COUNT {
            return Err(VmError::InvalidStackVarIdx {
                idx: r.var as u32,
                at: self.pc,
            });
        }
        Ok(())
    }

    fn frame_ret(&self, frame: u32) -> Result<Value, VmError> {
        if (frame as usize) < STACK_DEPTH {
            Ok(self.frames[frame as usize].ret_val)
        } else {
            Err(VmError::InvalidStackVarIdx {
                idx: frame,
                at: self.pc,
            })
        }
    }

    fn frame_ret_mut(&mut self, frame: u32) -> Result<&mut Value, VmError> {
        if (frame as usize) < STACK_DEPTH {
            Ok(&mut self.frames[frame as usize].ret_val)
        } else {
            Err(VmError::InvalidStackVarIdx {
                idx: frame,
                at: self.pc,
            })
        }
    }

    // ---- Arithmetic helpers ----
    //
    // dest comes from the operand byte, sources from the low bytes of
    // imm1/imm2. Indices are validated before tags, tags before effects.

    fn bin_i32(&mut self, ins: &Instruction, op: fn(i32, i32) -> i32) -> Result<(), VmError> {
        let dest = ins.header.operand;
        self.slot(dest)?;
        let a = self.slot(ins.imm[0].low_byte())?;
        let b = self.slot(ins.imm[1].low_byte())?;
        let (x, y) = match (a, b) {
            (Value::I32(x), Value::I32(y)) => (x, y),
            _ => return Err(self.type_mismatch()),
        };
        *self.slot_mut(dest)? = Value::I32(op(x, y));
        Ok(())
    }

    fn div_i32(&mut self, ins: &Instruction, op: fn(i32, i32) -> i32) -> Result<(), VmError> {
        let dest = ins.header.operand;
        self.slot(dest)?;
        let a = self.slot(ins.imm[0].low_byte())?;
        let b = self.slot(ins.imm[1].low_byte())?;
        let (x, y) = match (a, b) {
            (Value::I32(x), Value::I32(y)) => (x, y),
            _ => return Err(self.type_mismatch()),
        };
        if y == 0 {
            return Err(VmError::DivByZero { at: self.pc });
        }
        *self.slot_mut(dest)? = Value::I32(op(x, y));
        Ok(())
    }

    fn un_i32(&mut self, ins: &Instruction, op: fn(i32) -> i32) -> Result<(), VmError> {
        let dest = ins.header.operand;
        self.slot(dest)?;
        let x = match self.slot(ins.imm[0].low_byte())? {
            Value::I32(x) => x,
            _ => return Err(self.type_mismatch()),
        };
        *self.slot_mut(dest)? = Value::I32(op(x));
        Ok(())
    }

    fn bin_u32(&mut self, ins: &Instruction, op: fn(u32, u32) -> u32) -> Result<(), VmError> {
        let dest = ins.header.operand;
        self.slot(dest)?;
        let a = self.slot(ins.imm[0].low_byte())?;
        let b = self.slot(ins.imm[1].low_byte())?;
        let (x, y) = match (a, b) {
            (Value::U32(x), Value::U32(y)) => (x, y),
            _ => return Err(self.type_mismatch()),
        };
        *self.slot_mut(dest)? = Value::U32(op(x, y));
        Ok(())
    }

    fn div_u32(&mut self, ins: &Instruction, op: fn(u32, u32) -> u32) -> Result<(), VmError> {
        let dest = ins.header.operand;
        self.slot(dest)?;
        let a = self.slot(ins.imm[0].low_byte())?;
        let b = self.slot(ins.imm[1].low_byte())?;
        let (x, y) = match (a, b) {
            (Value::U32(x), Value::U32(y)) => (x, y),
            _ => return Err(self.type_mismatch()),
        };
        if y == 0 {
            return Err(VmError::DivByZero { at: self.pc });
        }
        *self.slot_mut(dest)? = Value::U32(op(x, y));
        Ok(())
    }

    fn un_u32(&mut self, ins: &Instruction, op: fn(u32) -> u32) -> Result<(), VmError> {
        let dest = ins.header.operand;
        self.slot(dest)?;
        let x = match self.slot(ins.imm[0].low_byte())? {
            Value::U32(x) => x,
            _ => return Err(self.type_mismatch()),
        };
        *self.slot_mut(dest)? = Value::U32(op(x));
        Ok(())
    }

    /// Shifts validate the count against the 32-bit width on top of the
    /// usual U32 tag checks.
    fn shift_u32(&mut self, ins: &Instruction, op: fn(u32, u32) -> u32) -> Result<(), VmError> {
        let dest = ins.header.operand;
        self.slot(dest)?;
        let a = self.slot(ins.imm[0].low_byte())?;
        let b = self.slot(ins.imm[1].low_byte())?;
        let (x, k) = match (a, b) {
            (Value::U32(x), Value::U32(k)) => (x, k),
            _ => return Err(self.type_mismatch()),
        };
        if k >= 32 {
            return Err(VmError::Bounds { at: self.pc });
        }
        *self.slot_mut(dest)? = Value::U32(op(x, k));
        Ok(())
    }

    fn bin_f32(&mut self, ins: &Instruction, op: fn(f32, f32) -> f32) -> Result<(), VmError> {
        let dest = ins.header.operand;
        self.slot(dest)?;
        let a = self.slot(ins.imm[0].low_byte())?;
        let b = self.slot(ins.imm[1].low_byte())?;
        let (x, y) = match (a, b) {
            (Value::F32(x), Value::F32(y)) => (x, y),
            _ => return Err(self.type_mismatch()),
        };
        *self.slot_mut(dest)? = Value::F32(op(x, y));
        Ok(())
    }

    fn div_f32(&mut self, ins: &Instruction) -> Result<(), VmError> {
        let dest = ins.header.operand;
        self.slot(dest)?;
        let a = self.slot(ins.imm[0].low_byte())?;
        let b = self.slot(ins.imm[1].low_byte())?;
        let (x, y) = match (a, b) {
            (Value::F32(x), Value::F32(y)) => (x, y),
            _ => return Err(self.type_mismatch()),
        };
        if y == 0.0 {
            return Err(VmError::DivByZero { at: self.pc });
        }
        *self.slot_mut(dest)? = Value::F32(x / y);
        Ok(())
    }

    fn un_f32(&mut self, ins: &Instruction, op: fn(f32) -> f32) -> Result<(), VmError> {
        let dest = ins.header.operand;
        self.slot(dest)?;
        let x = match self.slot(ins.imm[0].low_byte())? {
            Value::F32(x) => x,
            _ => return Err(self.type_mismatch()),
        };
        *self.slot_mut(dest)? = Value::F32(op(x));
        Ok(())
    }

    // ---- Comparison ----

    fn op_cmp(&mut self, ins: &Instruction) -> Result<(), VmError> {
        let a = self.slot(ins.imm[0].low_byte())?;
        let b = self.slot(ins.imm[1].low_byte())?;

        let (zero, less, greater) = match (ins.header.opcode, a, b) {
            (Opcode::CmpI32, Value::I32(x), Value::I32(y)) => (x == y, x < y, x > y),
            (Opcode::CmpU32, Value::U32(x), Value::U32(y)) => (x == y, x < y, x > y),
            // Epsilon equality absorbs rounding noise; ordering stays
            // strict, so a near-tie can set Zero together with Less or
            // Greater.
            (Opcode::CmpF32, Value::F32(x), Value::F32(y)) => {
                ((x - y).abs() < 1e-6, x < y, x > y)
            }
            _ => return Err(self.type_mismatch()),
        };

        self.flags.clear();
        self.flags.zero = zero;
        self.flags.less = less;
        self.flags.greater = greater;
        Ok(())
    }

    // ---- Type conversion ----

    fn op_convert(&mut self, ins: &Instruction) -> Result<(), VmError> {
        let dest = ins.header.operand;
        self.slot(dest)?;
        let src = self.slot(ins.imm[0].low_byte())?;

        // Float-to-integer casts truncate toward zero and saturate at the
        // target range; NaN converts to zero.
        let out = match (ins.header.opcode, src) {
            (Opcode::I32ToU32, Value::I32(x)) => Value::U32(x as u32),
            (Opcode::U32ToI32, Value::U32(x)) => Value::I32(x as i32),
            (Opcode::I32ToF32, Value::I32(x)) => Value::F32(x as f32),
            (Opcode::U32ToF32, Value::U32(x)) => Value::F32(x as f32),
            (Opcode::F32ToI32, Value::F32(x)) => Value::I32(x as i32),
            (Opcode::F32ToU32, Value::F32(x)) => Value::U32(x as u32),
            _ => return Err(self.type_mismatch()),
        };
        *self.slot_mut(dest)? = out;
        Ok(())
    }

    // ---- Memory buffers ----

    fn op_buf_read(&mut self, ins: &Instruction) -> Result<(), VmError> {
        let dest = ins.header.operand;
        self.slot(dest)?;
        let at = self.pc;
        let pos = ins.imm[1].as_u32();

        let out = match self.buffer(ins.imm[0].as_u32())? {
            Buffer::Void => return Err(VmError::TypeMismatch { at }),
            Buffer::U8(b) => Value::U32(b[pos_in(pos, b.len() as u32, at)?] as u32),
            Buffer::U16(b) => Value::U32(b[pos_in(pos, b.len() as u32, at)?] as u32),
            Buffer::I32(b) => Value::I32(b[pos_in(pos, b.len() as u32, at)?]),
            Buffer::U32(b) => Value::U32(b[pos_in(pos, b.len() as u32, at)?]),
            Buffer::F32(b) => Value::F32(b[pos_in(pos, b.len() as u32, at)?]),
        };
        *self.slot_mut(dest)? = out;
        Ok(())
    }

    fn op_buf_write(&mut self, ins: &Instruction) -> Result<(), VmError> {
        let src = self.slot(ins.header.operand)?;
        let at = self.pc;
        let bi = ins.imm[0].as_u32();
        let pos = ins.imm[1].as_u32();

        // A Void buffer adopts the element kind of the first scalar
        // written to it, on zeroed storage. Established buffers keep
        // their kind and require a compatible source tag.
        let kind = match self.buffer(bi)?.kind() {
            BufferKind::Void => match src {
                Value::I32(_) => BufferKind::I32,
                Value::U32(_) => BufferKind::U32,
                Value::F32(_) => BufferKind::F32,
                _ => return Err(VmError::TypeMismatch { at }),
            },
            k => k,
        };
        let idx = pos_in(pos, kind.capacity(), at)?;

        let compatible = matches!(
            (kind, src),
            (BufferKind::U8, Value::U32(_) | Value::I32(_))
                | (BufferKind::U16, Value::U32(_) | Value::I32(_))
                | (BufferKind::I32, Value::I32(_))
                | (BufferKind::U32, Value::U32(_))
                | (BufferKind::F32, Value::F32(_))
        );
        if !compatible {
            return Err(VmError::TypeMismatch { at });
        }

        let buf = self.buffer_mut(bi)?;
        if buf.kind() == BufferKind::Void {
            *buf = Buffer::zeroed(kind);
        }
        match (buf, src) {
            (Buffer::U8(b), Value::U32(v)) => b[idx] = v as u8,
            (Buffer::U8(b), Value::I32(v)) => b[idx] = v as u8,
            (Buffer::U16(b), Value::U32(v)) => b[idx] = v as u16,
            (Buffer::U16(b), Value::I32(v)) => b[idx] = v as u16,
            (Buffer::I32(b), Value::I32(v)) => b[idx] = v,
            (Buffer::U32(b), Value::U32(v)) => b[idx] = v,
            (Buffer::F32(b), Value::F32(v)) => b[idx] = v,
            _ => return Err(VmError::TypeMismatch { at }),
        }
        Ok(())
    }

    fn op_buf_len(&mut self, ins: &Instruction) -> Result<(), VmError> {
        let dest = ins.header.operand;
        self.slot(dest)?;
        let capacity = self.buffer(ins.imm[0].as_u32())?.capacity();
        *self.slot_mut(dest)? = Value::U32(capacity);
        Ok(())
    }

    // ---- Strings ----

    /// Borrow a buffer's bytes as string storage.
    fn str_bytes(&self, bi: u32) -> Result<&[u8; STR_CAPACITY], VmError> {
        match self.buffer(bi)? {
            Buffer::U8(b) => Ok(b),
            _ => Err(self.type_mismatch()),
        }
    }

    /// Write string bytes into a destination buffer, making it U8.
    ///
    /// An existing U8 buffer keeps its bytes past the written range, like
    /// the in-place writes of the original; any other buffer is replaced
    /// with zeroed string storage first.
    fn write_str(&mut self, bi: u32, bytes: &[u8]) -> Result<(), VmError> {
        let buf = self.buffer_mut(bi)?;
        match buf {
            Buffer::U8(d) => d[..bytes.len()].copy_from_slice(bytes),
            other => {
                let mut d = [0u8; STR_CAPACITY];
                d[..bytes.len()].copy_from_slice(bytes);
                *other = Buffer::U8(d);
            }
        }
        Ok(())
    }

    fn op_str_cat(&mut self, ins: &Instruction) -> Result<(), VmError> {
        let dest = ins.header.operand as u32;
        self.buffer(dest)?;
        let a = *self.str_bytes(ins.imm[0].as_u32())?;
        let b = *self.str_bytes(ins.imm[1].as_u32())?;

        // Concatenate into scratch storage so the destination may alias a
        // source; truncate at STR_MAX and terminate.
        let mut out = [0u8; STR_CAPACITY];
        let mut n = 0;
        for &byte in a.iter().take(cstr_len(&a)) {
            if n >= STR_MAX {
                break;
            }
            out[n] = byte;
            n += 1;
        }
        for &byte in b.iter().take(cstr_len(&b)) {
            if n >= STR_MAX {
                break;
            }
            out[n] = byte;
            n += 1;
        }
        self.write_str(dest, &out[..=n])
    }

    fn op_str_copy(&mut self, ins: &Instruction) -> Result<(), VmError> {
        let dest = ins.header.operand as u32;
        self.buffer(dest)?;
        let src = *self.str_bytes(ins.imm[0].as_u32())?;

        let n = cstr_len(&src);
        if n == STR_CAPACITY {
            // Unterminated source: copy everything and force a terminator
            // at the last position.
            let mut out = src;
            out[STR_MAX] = 0;
            self.write_str(dest, &out)
        } else {
            // Copy up to and including the NUL.
            self.write_str(dest, &src[..=n])
        }
    }

    fn op_str_len(&mut self, ins: &Instruction) -> Result<(), VmError> {
        let dest = ins.header.operand;
        self.slot(dest)?;
        let len = cstr_len(self.str_bytes(ins.imm[0].as_u32())?) as u32;
        *self.slot_mut(dest)? = Value::U32(len);
        Ok(())
    }

    fn op_str_cmp(&mut self, ins: &Instruction) -> Result<(), VmError> {
        let a = self.str_bytes(ins.imm[0].as_u32())?;
        let b = self.str_bytes(ins.imm[1].as_u32())?;

        let mut ordering = std::cmp::Ordering::Equal;
        for i in 0..STR_CAPACITY {
            match a[i].cmp(&b[i]) {
                std::cmp::Ordering::Equal => {
                    if a[i] == 0 {
                        break;
                    }
                }
                other => {
                    ordering = other;
                    break;
                }
            }
        }

        self.flags.clear();
        match ordering {
            std::cmp::Ordering::Equal => self.flags.zero = true,
            std::cmp::Ordering::Less => self.flags.less = true,
            std::cmp::Ordering::Greater => self.flags.greater = true,
        }
        Ok(())
    }

    fn op_str_chr(&mut self, ins: &Instruction) -> Result<(), VmError> {
        let dest = ins.header.operand;
        self.slot(dest)?;
        let at = self.pc;
        let bytes = self.str_bytes(ins.imm[0].as_u32())?;
        let idx = pos_in(ins.imm[1].as_u32(), STR_CAPACITY as u32, at)?;
        let byte = bytes[idx];
        *self.slot_mut(dest)? = Value::U32(byte as u32);
        Ok(())
    }

    fn op_str_set_chr(&mut self, ins: &Instruction) -> Result<(), VmError> {
        let at = self.pc;
        let bi = ins.imm[0].as_u32();
        self.str_bytes(bi)?;
        let idx = pos_in(ins.imm[1].as_u32(), STR_CAPACITY as u32, at)?;
        let byte = (ins.imm[2].as_u32() & 0xFF) as u8;
        if let Buffer::U8(b) = self.buffer_mut(bi)? {
            b[idx] = byte;
        }
        Ok(())
    }

    // ---- Console I/O ----

    fn op_print_str(&mut self, ins: &Instruction, io: &mut dyn Console) -> Result<(), VmError> {
        let bytes = self.str_bytes(ins.imm[0].as_u32())?;
        let len = cstr_len(bytes);
        io.write_bytes(&bytes[..len]);
        Ok(())
    }

    fn op_read_str(&mut self, ins: &Instruction, io: &mut dyn Console) -> Result<(), VmError> {
        let bi = ins.imm[0].as_u32();
        self.buffer(bi)?;

        let mut line = [0u8; STR_CAPACITY];
        let mut n = 0;
        while n < STR_MAX {
            match io.read_byte() {
                None | Some(b'\n') => break,
                Some(byte) => {
                    line[n] = byte;
                    n += 1;
                }
            }
        }
        self.write_str(bi, &line[..=n])
    }
}
