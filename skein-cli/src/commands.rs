//! CLI command implementations.

use std::fs;

use skein_vm::{disasm, StdConsole, Vm};

/// Read a bytecode file into memory.
fn read_image(path: &str) -> Result<Vec<u8>, i32> {
    fs::read(path).map_err(|e| {
        eprintln!("error: cannot read '{path}': {e}");
        1
    })
}

/// Load a bytecode image into a fresh machine.
fn load(path: &str) -> Result<Vm, i32> {
    let image = read_image(path)?;
    let mut vm = Vm::new();
    vm.load_program(&image).map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;
    Ok(vm)
}

/// Execute a .skb bytecode file against the process console.
pub fn run(args: &[String]) -> Result<(), i32> {
    if args.is_empty() {
        eprintln!("error: run requires an input file");
        eprintln!("Usage: skein run <input.skb>");
        return Err(1);
    }

    let mut vm = load(&args[0])?;
    let mut console = StdConsole::new();
    match vm.run(&mut console) {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("runtime error: {e}");
            eprint!("{}", disasm::dump_state(&vm));
            Err(3)
        }
    }
}

/// Print a listing of a .skb bytecode file.
pub fn disassemble(args: &[String]) -> Result<(), i32> {
    if args.is_empty() {
        eprintln!("error: disassemble requires an input file");
        eprintln!("Usage: skein disassemble <input.skb>");
        return Err(1);
    }

    let vm = load(&args[0])?;
    print!("{}", disasm::disassemble(&vm));
    Ok(())
}
