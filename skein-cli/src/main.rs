//! Skein CLI — load and execute compiled bytecode.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Input/load error
//! - 3: Runtime error

mod commands;

use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "run" => commands::run(&args[2..]),
        "disassemble" => commands::disassemble(&args[2..]),
        "--help" | "-h" | "help" => {
            print_usage();
            process::exit(0);
        }
        other => {
            eprintln!("error: unknown command '{other}'");
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    if let Err(code) = result {
        process::exit(code);
    }
}

fn print_usage() {
    eprintln!("Usage: skein <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  run <input.skb>           Load and execute a bytecode file");
    eprintln!("  disassemble <input.skb>   Print a bytecode listing");
}
