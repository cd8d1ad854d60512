//! `asm` — assembles a 6502 source file into a DOLLY object file.
//!
//! Usage: `asm <input.s> [output.bin]` (default output `out.bin`).

use std::fs;
use std::process::ExitCode;

use simple_logger::SimpleLogger;

mod emitter;
mod error;
mod lexer;
mod semantics;
mod syntax;
mod token;

fn run(input_path: &str, output_path: &str) -> bool {
    let source = match fs::read(input_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::error!("{input_path}: {err}");
            return false;
        }
    };

    let tokens = match lexer::lex(&source) {
        Ok(tokens) => tokens,
        Err(errors) => {
            for err in &errors {
                error::report(input_path, err);
            }
            println!("{} errors generated.", errors.len());
            return false;
        }
    };

    let (mut tree, errors) = syntax::make_syntax_tree(&tokens);
    if !errors.is_empty() {
        for err in &errors {
            error::report(input_path, err);
        }
        println!("{} errors generated.", errors.len());
        return false;
    }

    if let Err(errors) = semantics::verify_semantics(&mut tree) {
        for err in &errors {
            error::report(input_path, err);
        }
        println!("{} errors generated.", errors.len());
        return false;
    }

    let exec = emitter::emit(&mut tree);

    match fs::File::create(output_path).and_then(|f| exec.write(f)) {
        Ok(()) => {
            println!("Assembled executable {output_path}");
            true
        }
        Err(err) => {
            log::error!("{output_path}: {err}");
            false
        }
    }
}

fn main() -> ExitCode {
    SimpleLogger::new().init().unwrap();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("usage: asm <input.s> [output.bin]");
        return ExitCode::FAILURE;
    }

    let output = args.get(2).map(String::as_str).unwrap_or("out.bin");
    if run(&args[1], output) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
