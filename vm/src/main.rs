//! `vm` — loads a DOLLY object file and runs it on the 6502 core.
//!
//! Usage: `vm [-d] <input.bin>`. Requires a `_start` text section. `-d`
//! prints a processor-status dump once execution halts.

use std::fs;
use std::process::ExitCode;

use dolly_core::object::{Executable, SectionType};
use simple_logger::SimpleLogger;

mod cpu;

use cpu::{Cpu, StatusFlags, MEMORY_SIZE};

const SYSCALL_EXIT: u8 = 0;
const SYSCALL_PRINT: u8 = 1;

fn load(cpu: &mut Cpu, exec: &Executable) -> bool {
    let mut found_start = false;
    for section in &exec.sections {
        let end = section.load_address as usize + section.size as usize;
        if end > MEMORY_SIZE {
            log::warn!("section '{}' doesn't fit in memory, skipping", section.name);
            continue;
        }
        let data = exec.section_data(section);
        cpu.memory[section.load_address as usize..end].copy_from_slice(data);

        if section.name == "_start" && section.section_type == SectionType::Text {
            cpu.program_counter = section.load_address as u16;
            found_start = true;
        }
    }
    found_start
}

fn read_cstring(cpu: &Cpu, addr: u16) -> String {
    let mut out = Vec::new();
    let mut i = addr as usize;
    while cpu.memory[i] != 0 {
        out.push(cpu.memory[i]);
        i = (i + 1) % MEMORY_SIZE;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn run(path: &str, debug: bool) -> bool {
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

    let mut cpu = Cpu::new();
    if !load(&mut cpu, &exec) {
        eprintln!("Couldn't run executable: text section '_start' not found");
        return false;
    }

    let mut total_cycles: u64 = 0;
    loop {
        let Some(cycles) = cpu.step() else { break };
        total_cycles += cycles as u64;

        if cpu.flags.contains(StatusFlags::BREAK) {
            match cpu.reg_a {
                SYSCALL_EXIT => break,
                SYSCALL_PRINT => {
                    let ptr = u16::from_le_bytes([cpu.memory[0xFE], cpu.memory[0xFF]]);
                    print!("{}", read_cstring(&cpu, ptr));
                }
                _ => {
                    eprintln!("Invalid syscall, exiting");
                    break;
                }
            }
            cpu.flags.remove(StatusFlags::BREAK);
        }
    }

    if debug {
        println!("\n\nExecution done: {total_cycles} cycles");
        println!("Processor status:");
        println!("{cpu}");
    }

    true
}

fn main() -> ExitCode {
    SimpleLogger::new().init().unwrap();

    let args: Vec<String> = std::env::args().collect();
    let debug = args.iter().any(|a| a == "-d");
    let Some(path) = args.iter().skip(1).find(|a| *a != "-d") else {
        eprintln!("usage: vm [-d] <input.bin>");
        return ExitCode::FAILURE;
    };

    if run(path, debug) { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
