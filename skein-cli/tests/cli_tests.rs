//! Integration tests for the Skein CLI.
//!
//! These tests invoke the `skein` binary as a subprocess and check exit
//! codes, stdout, and stderr. Bytecode fixtures are assembled in-process
//! with the encoding helpers from `skein_common`.

use assert_cmd::Command;
use predicates::prelude::*;
use skein_common::{Instruction, Opcode, Word};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn skein() -> Command {
    Command::cargo_bin("skein").unwrap()
}

/// Write a bytecode file into `dir` and return its path.
fn write_program(dir: &TempDir, name: &str, instrs: &[Instruction]) -> PathBuf {
    let mut bytes = Vec::new();
    for ins in instrs {
        ins.encode_into(&mut bytes);
    }
    write_raw(dir, name, &bytes)
}

fn write_raw(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn w(v: u32) -> Word {
    Word::from_u32(v)
}

/// The "10 + 20" demo program; prints "30\n".
fn add_program() -> Vec<Instruction> {
    vec![
        Instruction::new(Opcode::LoadImmI32, 0, &[Word::from_i32(10)]),
        Instruction::new(Opcode::LoadImmI32, 1, &[Word::from_i32(20)]),
        Instruction::new(Opcode::AddI32, 2, &[w(0), w(1)]),
        Instruction::new(Opcode::PrintI32, 0, &[w(2)]),
        Instruction::new(Opcode::Println, 0, &[]),
        Instruction::new(Opcode::Halt, 0, &[]),
    ]
}

// ---- No-args / help ----

#[test]
fn no_args_prints_usage_and_exits_1() {
    skein()
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage: skein"));
}

#[test]
fn help_flag_exits_0() {
    skein()
        .arg("--help")
        .assert()
        .success()
        .stderr(predicate::str::contains("Commands:"));
}

#[test]
fn unknown_command_exits_1() {
    skein()
        .arg("frobnicate")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown command"));
}

// ---- Run ----

#[test]
fn run_executes_program_and_prints_output() {
    let dir = TempDir::new().unwrap();
    let path = write_program(&dir, "add.skb", &add_program());
    skein()
        .args(["run", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout("30\n");
}

#[test]
fn run_missing_file_exits_1() {
    skein()
        .args(["run", "/nonexistent/program.skb"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("cannot read"));
}

#[test]
fn run_without_input_exits_1() {
    skein()
        .arg("run")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("requires an input file"));
}

#[test]
fn run_reserved_opcode_exits_3_with_dump() {
    let dir = TempDir::new().unwrap();
    let path = write_raw(&dir, "bad.skb", &[0xA9, 0, 0, 0]);
    skein()
        .args(["run", path.to_str().unwrap()])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("invalid opcode"))
        .stderr(predicate::str::contains("=== VM State ==="));
}

#[test]
fn run_division_by_zero_exits_3() {
    let dir = TempDir::new().unwrap();
    let program = vec![
        Instruction::new(Opcode::LoadImmI32, 0, &[Word::from_i32(1)]),
        Instruction::new(Opcode::LoadImmI32, 1, &[Word::from_i32(0)]),
        Instruction::new(Opcode::DivI32, 2, &[w(0), w(1)]),
        Instruction::new(Opcode::Halt, 0, &[]),
    ];
    let path = write_program(&dir, "div0.skb", &program);
    skein()
        .args(["run", path.to_str().unwrap()])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("division by zero"));
}

#[test]
fn run_oversized_program_exits_1() {
    let dir = TempDir::new().unwrap();
    let path = write_raw(&dir, "huge.skb", &vec![0u8; 65_537]);
    skein()
        .args(["run", path.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("program too large"));
}

#[test]
fn run_reads_stdin_tokens() {
    let dir = TempDir::new().unwrap();
    let program = vec![
        Instruction::new(Opcode::ReadI32, 0, &[]),
        Instruction::new(Opcode::PrintI32, 0, &[w(0)]),
        Instruction::new(Opcode::Println, 0, &[]),
        Instruction::new(Opcode::Halt, 0, &[]),
    ];
    let path = write_program(&dir, "echo.skb", &program);
    skein()
        .args(["run", path.to_str().unwrap()])
        .write_stdin("41\n")
        .assert()
        .success()
        .stdout("41\n");
}

// ---- Disassemble ----

#[test]
fn disassemble_lists_instructions() {
    let dir = TempDir::new().unwrap();
    let path = write_program(&dir, "add.skb", &add_program());
    skein()
        .args(["disassemble", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("load.i32"))
        .stdout(predicate::str::contains("add.i32"))
        .stdout(predicate::str::contains("halt"));
}

#[test]
fn disassemble_marks_invalid_bytes() {
    let dir = TempDir::new().unwrap();
    let path = write_raw(&dir, "bad.skb", &[0xFF, 0, 0, 0]);
    skein()
        .args(["disassemble", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("<invalid>"));
}
