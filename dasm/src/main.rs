//! `dasm` — disassembles a DOLLY object file's text sections.
//!
//! Usage: `dasm <input.bin>`

use std::fs;
use std::process::ExitCode;

use dolly_core::object::{Executable, SectionType};
use simple_logger::SimpleLogger;

mod disassemble;

fn run(path: &str) -> bool {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::error!("{path}: {err}");
            return false;
        }
    };

    let exec = match Executable::read(&bytes) {
        Ok(exec) => exec,
        Err(err) => {
            log::error!("{path}: {err}");
            return false;
        }
    };

    for section in &exec.sections {
        if section.section_type != SectionType::Text {
            // Data/string sections aren't code; dumping them as hex rather
            // than silently skipping still gives a complete picture of
            // the object file's contents.
            println!("== Section: {} ({}, {} byte(s)) ==", section.name, section.section_type.as_str(), section.size);
            println!("{}", hex::encode(exec.section_data(section)));
            continue;
        }
        println!("== Section: {} ==", section.name);
        let mut records = disassemble::decode_section(exec.section_data(section), section.load_address);
        disassemble::synthesize_labels(&mut records);
        print!("{}", disassemble::format_listing(&records));
    }

    true
}

fn main() -> ExitCode {
    SimpleLogger::new().init().unwrap();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("usage: dasm <input.bin>");
        return ExitCode::FAILURE;
    }

    if run(&args[1]) { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
