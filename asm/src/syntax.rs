//! Token list -> flat syntax-node sequence (spec.md §3, §4.4). The node
//! arena plus name-to-index maps is the shape spec.md §9 calls for:
//! identifiers own their strings, the maps hold only the borrowed name and
//! the node's stable index, and nothing points back from a node into a
//! map entry.

use std::collections::HashMap;

use dolly_core::isa::Mnemonic;

use crate::error::AsmError;
use crate::token::{Directive, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    Integer,
    Identifier,
    IntegerX,
    IntegerY,
    IdentifierX,
    IdentifierY,
    RelativeInt,
    RelativeIden,
    IndirectIndexedInt,
    IndexedIndirectInt,
    IndirectIndexedIden,
    IndexedIndirectIden,
    Accumulator,
    ImmediateInt,
    ImmediateIden,
    IndirectInt,
    IndirectIden,
    Implicit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Integer(u16),
    Identifier(String),
    None,
}

impl Operand {
    pub fn is_identifier(&self) -> bool {
        matches!(self, Operand::Identifier(_))
    }
}

#[derive(Debug, Clone)]
pub struct InstructionNode {
    pub instr: Mnemonic,
    pub operand: Operand,
    pub operand_type: OperandType,
    /// Filled in by the semantic pass.
    pub mode: Option<dolly_core::isa::AddressingMode>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Instruction(InstructionNode),
    Label { name: String },
    Constant { name: String, value: u16 },
    StringData { text: String },
    ByteData { bytes: Vec<u8> },
    Origin { address: u16 },
    SectionText { name: String },
    SectionData { name: String },
    Sentinel,
}

impl NodeKind {
    pub fn is_writable(&self) -> bool {
        matches!(self, NodeKind::Instruction(_) | NodeKind::ByteData { .. } | NodeKind::StringData { .. })
    }

    pub fn is_section(&self) -> bool {
        matches!(self, NodeKind::SectionText { .. } | NodeKind::SectionData { .. })
    }

    pub fn section_name(&self) -> Option<&str> {
        match self {
            NodeKind::SectionText { name } | NodeKind::SectionData { name } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub line: usize,
    pub column: usize,
    pub bin_offset: u32,
    pub section_number: u8,
}

impl SyntaxNode {
    fn new(kind: NodeKind, line: usize, column: usize) -> Self {
        SyntaxNode { kind, line, column, bin_offset: 0, section_number: 0 }
    }
}

#[derive(Debug, Default)]
pub struct SyntaxTree {
    pub nodes: Vec<SyntaxNode>,
    pub identifiers: HashMap<String, usize>,
    pub section_names: HashMap<String, usize>,
}

impl SyntaxTree {
    fn add(&mut self, node: SyntaxNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Forward scan from `start` (inclusive) for the first node matching
    /// `pred`.
    pub fn find(&self, start: usize, pred: impl Fn(&NodeKind) -> bool) -> Option<usize> {
        (start..self.nodes.len()).find(|&i| pred(&self.nodes[i].kind))
    }

    /// Backward scan from `end` (exclusive) for the last node matching
    /// `pred`.
    pub fn rfind(&self, end: usize, pred: impl Fn(&NodeKind) -> bool) -> Option<usize> {
        (0..end).rev().find(|&i| pred(&self.nodes[i].kind))
    }
}

const IMPLIED_ONLY: [Mnemonic; 25] = {
    use Mnemonic::*;
    [BRK, CLC, CLD, CLI, CLV, DEY, DEX, INY, INX, NOP, PHP, PLA, PLP, RTI,
     RTS, SEC, SED, SEI, TAX, TAY, TSX, TYA, TXA, PHA, TXS]
};

fn operand_pattern(kind: OperandType) -> &'static [TokenKind] {
    use OperandType::*;
    use TokenKind as T;
    match kind {
        Integer => &[T::INTEGER],
        Identifier => &[T::IDENTIFIER],
        IntegerX => &[T::INTEGER, T::COMMA, T::X],
        IntegerY => &[T::INTEGER, T::COMMA, T::Y],
        IdentifierX => &[T::IDENTIFIER, T::COMMA, T::X],
        IdentifierY => &[T::IDENTIFIER, T::COMMA, T::Y],
        RelativeInt => &[T::ASTERISK, T::INTEGER],
        RelativeIden => &[T::ASTERISK, T::IDENTIFIER],
        IndirectIndexedInt => &[T::OPEN_BRACKET, T::INTEGER, T::CLOSE_BRACKET, T::COMMA, T::Y],
        IndexedIndirectInt => &[T::OPEN_BRACKET, T::INTEGER, T::COMMA, T::X, T::CLOSE_BRACKET],
        IndirectIndexedIden => &[T::OPEN_BRACKET, T::IDENTIFIER, T::CLOSE_BRACKET, T::COMMA, T::Y],
        IndexedIndirectIden => &[T::OPEN_BRACKET, T::IDENTIFIER, T::COMMA, T::X, T::CLOSE_BRACKET],
        Accumulator => &[T::A],
        ImmediateInt => &[T::HASH, T::INTEGER],
        ImmediateIden => &[T::HASH, T::IDENTIFIER],
        IndirectInt => &[T::OPEN_BRACKET, T::INTEGER, T::CLOSE_BRACKET],
        IndirectIden => &[T::OPEN_BRACKET, T::IDENTIFIER, T::CLOSE_BRACKET],
        Implicit => &[],
    }
}

const ALL_OPERAND_TYPES: [OperandType; 17] = {
    use OperandType::*;
    [Integer, Identifier, IntegerX, IntegerY, IdentifierX, IdentifierY,
     RelativeInt, RelativeIden, IndirectIndexedInt, IndexedIndirectInt,
     IndirectIndexedIden, IndexedIndirectIden, Accumulator, ImmediateInt,
     ImmediateIden, IndirectInt, IndirectIden]
};

/// Returns `Some(token_count)` if `tokens[start..]` begins with exactly
/// this pattern.
fn match_pattern(tokens: &[Token], start: usize, pattern: &[TokenKind]) -> Option<usize> {
    if start + pattern.len() > tokens.len() {
        return None;
    }
    for (i, kind) in pattern.iter().enumerate() {
        if !tokens[start + i].kind.intersects(*kind) {
            return None;
        }
    }
    Some(pattern.len())
}

fn match_single(tokens: &[Token], start: usize, kind: TokenKind) -> bool {
    tokens.get(start).is_some_and(|t| t.kind.intersects(kind))
}

struct Parser<'a> {
    tokens: &'a [Token],
    tree: SyntaxTree,
    errors: Vec<AsmError>,
}

impl<'a> Parser<'a> {
    fn read_identifier(&mut self, index: &mut usize) {
        let token = &self.tokens[*index];
        let name = token.as_text().unwrap().to_string();

        if let Some(&prev_idx) = self.tree.identifiers.get(&name) {
            let prev = &self.tree.nodes[prev_idx];
            self.errors.push(AsmError::DuplicateSymbol {
                line: token.line,
                column: token.column,
                name,
                previous_line: prev.line,
                previous_column: prev.column,
            });
            if match_single(self.tokens, *index + 1, TokenKind::EQUALS | TokenKind::COLON) {
                *index += 1;
            }
            return;
        }

        if match_single(self.tokens, *index + 1, TokenKind::EQUALS) {
            if !match_single(self.tokens, *index + 2, TokenKind::INTEGER) {
                let found = self.tokens.get(*index + 2).map(|t| t.describe()).unwrap_or_else(|| "end of input".to_string());
                self.errors.push(AsmError::UnexpectedTokenForDirective {
                    line: token.line,
                    column: token.column,
                    expected: "integer for constant definition".to_string(),
                    found,
                });
                *index += 1;
                return;
            }
            let value = self.tokens[*index + 2].as_integer().unwrap();
            self.tree.identifiers.insert(name.clone(), self.tree.nodes.len());
            self.tree.add(SyntaxNode::new(
                NodeKind::Constant { name, value },
                token.line,
                token.column,
            ));
            *index += 2;
        } else {
            if match_single(self.tokens, *index + 1, TokenKind::COLON) {
                *index += 1;
            }
            self.tree.identifiers.insert(name.clone(), self.tree.nodes.len());
            self.tree.add(SyntaxNode::new(NodeKind::Label { name }, token.line, token.column));
        }
    }

    fn read_directive(&mut self, index: &mut usize) {
        let token = &self.tokens[*index];
        let directive = token.as_directive().unwrap();
        let line = token.line;
        let column = token.column;

        match directive {
            Directive::Origin => {
                if !match_single(self.tokens, *index + 1, TokenKind::INTEGER) {
                    let found = self.tokens.get(*index + 1).map(|t| t.describe()).unwrap_or_else(|| "end of input".to_string());
                    self.errors.push(AsmError::UnexpectedTokenForDirective {
                        line, column, expected: "address after .org directive".to_string(), found,
                    });
                    return;
                }
                let address = self.tokens[*index + 1].as_integer().unwrap();
                self.tree.add(SyntaxNode::new(NodeKind::Origin { address }, line, column));
                *index += 1;
            }
            Directive::Byte => {
                let mut matches = 0;
                while match_single(self.tokens, *index + 1 + matches, TokenKind::INTEGER) {
                    matches += 1;
                }
                if matches < 1 {
                    let found = self.tokens.get(*index + 1).map(|t| t.describe()).unwrap_or_else(|| "end of input".to_string());
                    self.errors.push(AsmError::UnexpectedTokenForDirective {
                        line, column, expected: "at least one integer after .byte directive".to_string(), found,
                    });
                    return;
                }
                let mut bytes = Vec::with_capacity(matches);
                for i in 0..matches {
                    let val = self.tokens[*index + 1 + i].as_integer().unwrap() as i32;
                    let signed = val as i16;
                    if val > u8::MAX as i32 || signed < i8::MIN as i16 {
                        self.errors.push(AsmError::IntegerOverflow {
                            line, column, text: ".byte directive requires 8-bit integers".to_string(),
                        });
                        *index += i + 1;
                        return;
                    }
                    bytes.push(val as u8);
                }
                self.tree.add(SyntaxNode::new(NodeKind::ByteData { bytes }, line, column));
                *index += matches;
            }
            Directive::StringLit => {
                if !match_single(self.tokens, *index + 1, TokenKind::STRING) {
                    let found = self.tokens.get(*index + 1).map(|t| t.describe()).unwrap_or_else(|| "end of input".to_string());
                    self.errors.push(AsmError::UnexpectedTokenForDirective {
                        line, column, expected: "string after .string directive".to_string(), found,
                    });
                    *index += 1;
                    return;
                }
                let text = self.tokens[*index + 1].as_text().unwrap().to_string();
                self.tree.add(SyntaxNode::new(NodeKind::StringData { text }, line, column));
                *index += 1;
            }
            Directive::Text | Directive::Data => {
                if !match_single(self.tokens, *index + 1, TokenKind::STRING) {
                    let found = self.tokens.get(*index + 1).map(|t| t.describe()).unwrap_or_else(|| "end of input".to_string());
                    self.errors.push(AsmError::UnexpectedTokenForDirective {
                        line, column,
                        expected: format!("section name string after {} directive",
                            if directive == Directive::Text { ".text" } else { ".data" }),
                        found,
                    });
                    *index += 1;
                    return;
                }
                let name = self.tokens[*index + 1].as_text().unwrap().to_string();
                if let Some(&prev_idx) = self.tree.section_names.get(&name) {
                    let prev = &self.tree.nodes[prev_idx];
                    self.errors.push(AsmError::DuplicateSection {
                        line, column, name,
                        previous_line: prev.line, previous_column: prev.column,
                    });
                    *index += 1;
                    return;
                }
                self.tree.section_names.insert(name.clone(), self.tree.nodes.len());
                let kind = if directive == Directive::Text {
                    NodeKind::SectionText { name }
                } else {
                    NodeKind::SectionData { name }
                };
                self.tree.add(SyntaxNode::new(kind, line, column));
                *index += 1;
            }
        }
    }

    fn read_instruction(&mut self, index: &mut usize) {
        let token = &self.tokens[*index];
        let instr = token.as_instruction().unwrap();
        let line = token.line;
        let column = token.column;

        if IMPLIED_ONLY.contains(&instr) {
            self.tree.add(SyntaxNode::new(
                NodeKind::Instruction(InstructionNode {
                    instr, operand: Operand::None, operand_type: OperandType::Implicit, mode: None,
                }),
                line, column,
            ));
            return;
        }

        let mut best: Option<(OperandType, usize)> = None;
        for &candidate in ALL_OPERAND_TYPES.iter() {
            let pattern = operand_pattern(candidate);
            if let Some(n) = match_pattern(self.tokens, *index + 1, pattern) {
                if best.map(|(_, size)| n > size).unwrap_or(true) {
                    best = Some((candidate, n));
                }
            }
        }

        let Some((operand_type, size)) = best else {
            let at = self.tokens.get(*index + 1);
            let (l, c) = at.map(|t| (t.line, t.column)).unwrap_or((line, column));
            self.errors.push(AsmError::InvalidOperand { line: l, column: c });
            return;
        };

        let operand = match operand_type {
            OperandType::Integer | OperandType::IntegerX | OperandType::IntegerY => {
                Operand::Integer(self.tokens[*index + 1].as_integer().unwrap())
            }
            OperandType::Identifier | OperandType::IdentifierX | OperandType::IdentifierY => {
                Operand::Identifier(self.tokens[*index + 1].as_text().unwrap().to_string())
            }
            OperandType::RelativeInt
            | OperandType::IndirectIndexedInt
            | OperandType::IndexedIndirectInt
            | OperandType::ImmediateInt
            | OperandType::IndirectInt => {
                Operand::Integer(self.tokens[*index + 2].as_integer().unwrap())
            }
            OperandType::RelativeIden
            | OperandType::IndirectIndexedIden
            | OperandType::IndexedIndirectIden
            | OperandType::IndirectIden
            | OperandType::ImmediateIden => {
                Operand::Identifier(self.tokens[*index + 2].as_text().unwrap().to_string())
            }
            OperandType::Accumulator | OperandType::Implicit => Operand::None,
        };

        self.tree.add(SyntaxNode::new(
            NodeKind::Instruction(InstructionNode { instr, operand, operand_type, mode: None }),
            line, column,
        ));
        *index += size;
    }
}

/// Builds the flat syntax-node sequence from a token list, inserting the
/// default `__default__` text section first and a sentinel node last.
pub fn make_syntax_tree(tokens: &[Token]) -> (SyntaxTree, Vec<AsmError>) {
    let mut parser = Parser { tokens, tree: SyntaxTree::default(), errors: Vec::new() };

    parser.tree.section_names.insert("__default__".to_string(), 0);
    parser.tree.add(SyntaxNode::new(
        NodeKind::SectionText { name: "__default__".to_string() },
        0, 0,
    ));

    let mut index = 0;
    while index < tokens.len() {
        let token = &tokens[index];
        match token.kind {
            TokenKind::DIRECTIVE => parser.read_directive(&mut index),
            TokenKind::INSTRUCTION => parser.read_instruction(&mut index),
            TokenKind::IDENTIFIER => parser.read_identifier(&mut index),
            _ => {
                parser.errors.push(AsmError::UnexpectedToken {
                    line: token.line, column: token.column, found: token.describe(),
                });
            }
        }
        index += 1;
    }

    parser.tree.add(SyntaxNode::new(NodeKind::Sentinel, 0, 0));

    (parser.tree, parser.errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse(src: &[u8]) -> (SyntaxTree, Vec<AsmError>) {
        let tokens = lex(src).unwrap();
        make_syntax_tree(&tokens)
    }

    #[test]
    fn inserts_default_section_first() {
        let (tree, errors) = parse(b"NOP");
        assert!(errors.is_empty());
        assert!(matches!(tree.nodes[0].kind, NodeKind::SectionText { .. }));
    }

    #[test]
    fn appends_sentinel_last() {
        let (tree, _) = parse(b"NOP");
        assert!(matches!(tree.nodes.last().unwrap().kind, NodeKind::Sentinel));
    }

    #[test]
    fn implicit_instruction_has_no_operand() {
        let (tree, _) = parse(b"DEX");
        let NodeKind::Instruction(instr) = &tree.nodes[1].kind else { panic!() };
        assert_eq!(instr.operand_type, OperandType::Implicit);
    }

    #[test]
    fn picks_longest_operand_pattern() {
        let (tree, errors) = parse(b"LDA $10,X");
        assert!(errors.is_empty());
        let NodeKind::Instruction(instr) = &tree.nodes[1].kind else { panic!() };
        assert_eq!(instr.operand_type, OperandType::IntegerX);
    }

    #[test]
    fn duplicate_symbol_is_an_error() {
        let (_, errors) = parse(b"foo: NOP\nfoo: NOP");
        assert!(matches!(errors[0], AsmError::DuplicateSymbol { .. }));
    }

    #[test]
    fn duplicate_section_is_an_error() {
        let (_, errors) = parse(b".text \"a\"\n.text \"a\"");
        assert!(matches!(errors[0], AsmError::DuplicateSection { .. }));
    }

    #[test]
    fn constant_definition() {
        let (tree, errors) = parse(b"FOO = $20");
        assert!(errors.is_empty());
        assert!(matches!(tree.nodes[1].kind, NodeKind::Constant { value: 0x20, .. }));
    }

    #[test]
    fn indexed_indirect_and_indirect_indexed_are_distinct() {
        let (tree, errors) = parse(b"LDA ($10,X)\nLDA ($10),Y");
        assert!(errors.is_empty());
        let NodeKind::Instruction(a) = &tree.nodes[1].kind else { panic!() };
        let NodeKind::Instruction(b) = &tree.nodes[2].kind else { panic!() };
        assert_eq!(a.operand_type, OperandType::IndexedIndirectInt);
        assert_eq!(b.operand_type, OperandType::IndirectIndexedInt);
    }
}
