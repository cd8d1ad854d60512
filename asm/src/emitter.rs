//! Two-pass emission: layout assigns each non-empty `.text`/`.data`
//! section a size and output index (renumbering over the semantic pass's
//! section numbers, since those don't account for sections that turn out
//! empty); encode writes the actual bytes.

use dolly_core::isa::{self, AddressingMode, Opcode};
use dolly_core::object::{Architecture, Executable, SectionType};

use crate::syntax::{NodeKind, Operand, SyntaxTree};

struct SectionLayout {
    name: String,
    section_type: SectionType,
    load_address: u32,
    size: u32,
    start: usize,
    boundary: usize,
}

fn layout_sections(tree: &mut SyntaxTree) -> Vec<SectionLayout> {
    let mut layouts = Vec::new();
    let last = tree.nodes.len() - 1; // sentinel

    let mut i = 0;
    while i < last {
        if !tree.nodes[i].kind.is_section() {
            i += 1;
            continue;
        }

        let Some(first) = tree.find(i + 1, |k| k.is_writable() || k.is_section()) else {
            i += 1;
            continue;
        };
        if tree.nodes[first].kind.is_section() {
            i += 1;
            continue; // empty: nothing writable before the next section
        }

        let boundary = tree.find(i + 1, |k| k.is_section()).unwrap_or(last);
        if tree.rfind(boundary, |k| k.is_writable()).is_none() {
            i += 1;
            continue;
        }

        let size = tree.nodes[boundary].bin_offset - tree.nodes[i].bin_offset;
        if size == 0 {
            i += 1;
            continue;
        }

        let (name, section_type) = match &tree.nodes[i].kind {
            NodeKind::SectionText { name } => (name.clone(), SectionType::Text),
            NodeKind::SectionData { name } => (name.clone(), SectionType::Data),
            _ => unreachable!(),
        };
        let load_address = tree.nodes[i].bin_offset;
        let output_index = layouts.len() as u8;
        for k in i..boundary {
            tree.nodes[k].section_number = output_index;
        }

        layouts.push(SectionLayout { name, section_type, load_address, size, start: i, boundary });
        i += 1;
    }

    layouts
}

fn resolved_operand(tree: &SyntaxTree, name: &str) -> Option<(bool, u32, Option<usize>)> {
    let &idx = tree.identifiers.get(name)?;
    match &tree.nodes[idx].kind {
        NodeKind::Label { .. } => Some((true, tree.nodes[idx].bin_offset, Some(idx))),
        NodeKind::Constant { value, .. } => Some((false, *value as u32, None)),
        _ => None,
    }
}

fn encode_instruction(tree: &SyntaxTree, node_idx: usize, buf: &mut [u8], local_pos: usize) {
    let NodeKind::Instruction(instr) = &tree.nodes[node_idx].kind else { unreachable!() };
    let mode = instr.mode.expect("semantic pass assigns a mode to every instruction");
    let opcode_byte = isa::encode(Opcode { instr: instr.instr, mode })
        .expect("semantic pass only accepts modes the ISA can encode");
    buf[local_pos] = opcode_byte;

    let size = isa::operand_size(mode);
    if size == 0 {
        return;
    }

    let node_bin_offset = tree.nodes[node_idx].bin_offset;
    let write = |buf: &mut [u8], value: u32| {
        if size == 1 {
            buf[local_pos + 1] = value as u8;
        } else {
            buf[local_pos + 1..local_pos + 3].copy_from_slice(&(value as u16).to_le_bytes());
        }
    };

    match &instr.operand {
        Operand::Identifier(name) => {
            let (is_label, value, _) = resolved_operand(tree, name)
                .expect("semantic pass rejects unresolved identifiers");
            if is_label && mode == AddressingMode::RELATIVE {
                let distance = value as i64 - node_bin_offset as i64 - 2;
                buf[local_pos + 1] = distance as i8 as u8;
            } else {
                write(buf, value);
            }
        }
        Operand::Integer(v) => write(buf, *v as u32),
        Operand::None => {}
    }
}

/// Encodes `tree` (which must already have passed semantic analysis) into
/// an executable object. The layout pass may renumber section indices;
/// section numbers assigned during semantic analysis are not reused here.
pub fn emit(tree: &mut SyntaxTree) -> Executable {
    let layouts = layout_sections(tree);
    let mut exec = Executable::new(Architecture::Mos6502);

    for layout in layouts {
        let mut buf = vec![0u8; layout.size as usize];
        for k in layout.start..layout.boundary {
            let local_pos = (tree.nodes[k].bin_offset - layout.load_address) as usize;
            match &tree.nodes[k].kind {
                NodeKind::Instruction(_) => encode_instruction(tree, k, &mut buf, local_pos),
                NodeKind::ByteData { bytes } => {
                    buf[local_pos..local_pos + bytes.len()].copy_from_slice(bytes);
                }
                NodeKind::StringData { text } => {
                    // The trailing NUL is never written explicitly: the
                    // semantic pass already reserved `len() + 1` bytes for
                    // this node and `buf` starts zero-filled, so the NUL
                    // falls out of the buffer's initial state.
                    buf[local_pos..local_pos + text.len()].copy_from_slice(text.as_bytes());
                }
                _ => {}
            }
        }
        exec.add_section(&layout.name, layout.section_type, layout.load_address, &buf);
    }

    exec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::semantics::verify_semantics;
    use crate::syntax::make_syntax_tree;

    fn assemble(src: &[u8]) -> Executable {
        let tokens = lex(src).unwrap();
        let (mut tree, errors) = make_syntax_tree(&tokens);
        assert!(errors.is_empty(), "{errors:?}");
        verify_semantics(&mut tree).unwrap();
        emit(&mut tree)
    }

    #[test]
    fn emits_immediate_lda_and_brk() {
        let exec = assemble(b".text \"_start\"\nLDA #$05\nBRK");
        assert_eq!(exec.sections.len(), 1);
        assert_eq!(exec.sections[0].name, "_start");
        assert_eq!(exec.section_data(&exec.sections[0]), &[0xA9, 0x05, 0x00]);
    }

    #[test]
    fn empty_sections_are_skipped() {
        let exec = assemble(b".text \"empty\"\n.text \"_start\"\nNOP");
        assert_eq!(exec.sections.len(), 1);
        assert_eq!(exec.sections[0].name, "_start");
    }

    #[test]
    fn branch_offset_matches_formula() {
        let exec = assemble(b".text \"_start\"\nloop: NOP\nBNE loop");
        let bytes = exec.section_data(&exec.sections[0]);
        // NOP (1 byte) then BNE rel: distance = 0 - 1 - 2 = -3.
        assert_eq!(bytes[1], 0xD0); // BNE opcode
        assert_eq!(bytes[2] as i8, -3);
    }

    #[test]
    fn byte_data_is_copied_raw() {
        let exec = assemble(b".text \"_start\"\n.byte 1, 2, 3");
        assert_eq!(exec.section_data(&exec.sections[0]), &[1, 2, 3]);
    }

    #[test]
    fn string_data_is_nul_terminated() {
        let exec = assemble(b".text \"_start\"\n.string \"hi\"");
        assert_eq!(exec.section_data(&exec.sections[0]), b"hi\0");
    }

    #[test]
    fn constant_operand_resolves_to_its_value() {
        let exec = assemble(b".text \"_start\"\nfoo = $42\nLDA #foo");
        assert_eq!(exec.section_data(&exec.sections[0]), &[0xA9, 0x42]);
    }
}
