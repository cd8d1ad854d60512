//! Two-pass disassembly (spec.md §4.6): pass one decodes every byte run
//! into `(offset, opcode, operand)` records, skipping undecodable bytes
//! one at a time; pass two synthesizes `LBL_<n>` labels for every branch
//! target that lands on a decoded instruction.

use std::fmt::Write as _;

use dolly_core::isa::{self, AddressingMode, Opcode};

#[derive(Debug, Clone)]
pub enum Decoded {
    Instruction(Opcode, u32),
    /// A byte that didn't decode to any opcode. Still gets a listing
    /// entry, carrying the raw byte, rather than vanishing from the
    /// output.
    Invalid(u8),
}

#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    pub offset: u32,
    pub decoded: Decoded,
    pub label: Option<String>,
    pub operand_label: Option<String>,
}

impl DecodedInstruction {
    fn op(&self) -> Option<&Opcode> {
        match &self.decoded {
            Decoded::Instruction(op, _) => Some(op),
            Decoded::Invalid(_) => None,
        }
    }
}

/// Decodes one section's bytes, starting at `base_address`. An
/// undecodable byte still produces a record (carrying the raw byte),
/// advancing one position at a time, so a disassembly can recover after
/// embedded data without losing track of it.
pub fn decode_section(data: &[u8], base_address: u32) -> Vec<DecodedInstruction> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < data.len() {
        let Some(op) = isa::decode(data[i]) else {
            out.push(DecodedInstruction {
                offset: base_address + i as u32,
                decoded: Decoded::Invalid(data[i]),
                label: None,
                operand_label: None,
            });
            i += 1;
            continue;
        };
        let size = isa::operand_size(op.mode) as usize;
        if i + 1 + size > data.len() {
            break;
        }
        let operand = match size {
            0 => 0,
            1 => data[i + 1] as u32,
            2 => u16::from_le_bytes([data[i + 1], data[i + 2]]) as u32,
            _ => unreachable!(),
        };
        out.push(DecodedInstruction {
            offset: base_address + i as u32,
            decoded: Decoded::Instruction(op, operand),
            label: None,
            operand_label: None,
        });
        i += 1 + size;
    }
    out
}

/// Assigns `LBL_<n>` to every decoded instruction that a relative branch
/// in the same list targets.
pub fn synthesize_labels(records: &mut [DecodedInstruction]) {
    let mut next_label = 0u32;
    let mut assignments: Vec<(usize, String)> = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let Decoded::Instruction(op, operand) = &record.decoded else { continue };
        if op.mode != AddressingMode::RELATIVE {
            continue;
        }
        let rel = *operand as u8 as i8 as i64;
        let target = record.offset as i64 + 2 + rel;
        let Some(target_idx) = records.iter().position(|r| r.offset as i64 == target) else {
            continue;
        };
        let name = if let Some(existing) = &records[target_idx].label {
            existing.clone()
        } else if let Some((_, name)) = assignments.iter().find(|(idx, _)| *idx == target_idx) {
            name.clone()
        } else {
            let name = format!("LBL_{next_label}");
            next_label += 1;
            assignments.push((target_idx, name.clone()));
            name
        };
        assignments.push((i, name));
    }

    for (idx, name) in assignments {
        let record = &mut records[idx];
        if record.op().is_some_and(|op| op.mode == AddressingMode::RELATIVE) {
            record.operand_label = Some(name);
        } else {
            record.label = Some(name);
        }
    }

    // A record can end up in both roles (a label lands on another branch);
    // the loop above assigns operand_label/label independently per record
    // based on whether it is itself the branch or the target, so no
    // further reconciliation is needed.
}

/// Renders one instruction's operand per addressing mode. `ACCUMULATOR`
/// prints bare `A`, unlike the source this is grounded on, which fell
/// through to also print the zero-page form for that case.
fn operand_str(op: &Opcode, operand: u32, operand_label: &Option<String>) -> String {
    use AddressingMode as A;
    match op.mode {
        A::RELATIVE => operand_label.clone().unwrap_or_default(),
        A::IMMEDIATE => format!("#${:02x}", operand),
        A::IMPLICIT => String::new(),
        A::ACCUMULATOR => "A".to_string(),
        A::ZERO_PAGE => format!("${:02x}", operand),
        A::ZERO_PAGE_X => format!("${:02x},x", operand),
        A::ZERO_PAGE_Y => format!("${:02x},y", operand),
        A::ABSOLUTE => format!("${:04x}", operand),
        A::INDIRECT => format!("(${:04x})", operand),
        A::ABSOLUTE_X => format!("${:04x},x", operand),
        A::ABSOLUTE_Y => format!("${:04x},y", operand),
        A::INDIRECT_X => format!("(${:02x},x)", operand),
        A::INDIRECT_Y => format!("(${:02x}),y", operand),
        _ => String::new(),
    }
}

/// Renders a decoded+labeled record list as a listing, one line per
/// record: `0xHHHH\tLABEL:\tMNEMONIC operand`, or `0xHHHH\t\t.byte $HH` for
/// a byte that didn't decode to an instruction.
pub fn format_listing(records: &[DecodedInstruction]) -> String {
    let mut out = String::new();
    for record in records {
        let label = record.label.as_deref().unwrap_or("");
        let colon = if record.label.is_some() { ":" } else { "" };
        match &record.decoded {
            Decoded::Instruction(op, operand) => {
                let text = operand_str(op, *operand, &record.operand_label);
                let sep = if text.is_empty() { "" } else { " " };
                writeln!(out, "0x{:04x}\t{label}{colon}\t{}{sep}{text}", record.offset, op.instr.name()).unwrap();
            }
            Decoded::Invalid(byte) => {
                writeln!(out, "0x{:04x}\t{label}{colon}\t.byte ${byte:02x}", record.offset).unwrap();
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_simple_program() {
        let records = decode_section(&[0xA9, 0x05, 0x00], 0x0600);
        assert_eq!(records.len(), 2);
        let Decoded::Instruction(op, operand) = &records[0].decoded else { panic!() };
        assert_eq!(op.instr.name(), "LDA");
        assert_eq!(*operand, 5);
        let Decoded::Instruction(op, _) = &records[1].decoded else { panic!() };
        assert_eq!(op.instr.name(), "BRK");
    }

    #[test]
    fn undecodable_bytes_still_produce_a_record_each() {
        // 0xFF never decodes to anything valid on this ISA subset.
        let records = decode_section(&[0xFF, 0xFF, 0xEA], 0);
        assert_eq!(records.len(), 3);
        assert!(matches!(records[0].decoded, Decoded::Invalid(0xFF)));
        assert!(matches!(records[1].decoded, Decoded::Invalid(0xFF)));
        assert_eq!(records[0].offset, 0);
        assert_eq!(records[1].offset, 1);
        assert_eq!(records[2].offset, 2);
        let listing = format_listing(&records);
        assert!(listing.contains(".byte $ff"));
    }

    #[test]
    fn accumulator_mode_prints_bare_a() {
        let records = decode_section(&[0x4A], 0); // LSR A
        let listing = format_listing(&records);
        assert!(listing.contains("LSR A"));
        assert!(!listing.contains("LSR A\t$"));
    }

    #[test]
    fn synthesizes_label_for_backward_branch() {
        // NOP; NOP; BNE -3 (branches back to offset 0)
        let mut records = decode_section(&[0xEA, 0xEA, 0xD0, 0xFB], 0);
        synthesize_labels(&mut records);
        assert_eq!(records[0].label.as_deref(), Some("LBL_0"));
        assert_eq!(records[2].operand_label.as_deref(), Some("LBL_0"));
    }

    #[test]
    fn shares_one_label_for_multiple_branches_to_the_same_target() {
        let mut records = decode_section(&[0xEA, 0xD0, 0xFD, 0xD0, 0xFB], 0);
        synthesize_labels(&mut records);
        let label = records[0].label.clone();
        assert!(label.is_some());
        assert_eq!(records[1].operand_label, label);
        assert_eq!(records[2].operand_label, label);
    }
}
