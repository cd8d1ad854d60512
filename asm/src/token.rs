//! Token types produced by the lexer and consumed by the syntax-tree
//! builder (spec.md §3, §4.3).

use bitflags::bitflags;
use dolly_core::isa::Mnemonic;

bitflags! {
    /// Token tags as a bitset so operand-pattern matching (§4.4) can test
    /// "is this token one of these kinds" with a single `&`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TokenKind: u16 {
        const DIRECTIVE     = 1 << 0;
        const INSTRUCTION   = 1 << 1;
        const IDENTIFIER    = 1 << 2;
        const INTEGER       = 1 << 3;
        const STRING        = 1 << 4;
        const HASH          = 1 << 5;
        const COMMA         = 1 << 6;
        const OPEN_BRACKET  = 1 << 7;
        const CLOSE_BRACKET = 1 << 8;
        const COLON         = 1 << 9;
        const EQUALS        = 1 << 10;
        const X             = 1 << 11;
        const Y             = 1 << 12;
        const A             = 1 << 13;
        const ASTERISK      = 1 << 14;
    }
}

impl TokenKind {
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::DIRECTIVE => "directive",
            TokenKind::INSTRUCTION => "instruction",
            TokenKind::IDENTIFIER => "identifier",
            TokenKind::INTEGER => "integer",
            TokenKind::STRING => "string",
            TokenKind::HASH => "'#'",
            TokenKind::COMMA => "','",
            TokenKind::OPEN_BRACKET => "'('",
            TokenKind::CLOSE_BRACKET => "')'",
            TokenKind::COLON => "':'",
            TokenKind::EQUALS => "'='",
            TokenKind::X => "'X'",
            TokenKind::Y => "'Y'",
            TokenKind::A => "'A'",
            TokenKind::ASTERISK => "'*'",
            _ => "token",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Origin,
    Byte,
    StringLit,
    Text,
    Data,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    None,
    Directive(Directive),
    Instruction(Mnemonic),
    Integer(u16),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
    pub payload: Payload,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize, column: usize, payload: Payload) -> Self {
        Token { kind, line, column, payload }
    }

    pub fn describe(&self) -> String {
        match &self.payload {
            Payload::Text(s) if self.kind == TokenKind::IDENTIFIER => format!("identifier '{s}'"),
            Payload::Text(s) => format!("string \"{s}\""),
            Payload::Integer(v) => format!("integer {v}"),
            Payload::Instruction(m) => format!("instruction '{}'", m.name()),
            Payload::Directive(_) => "directive".to_string(),
            Payload::None => self.kind.describe().to_string(),
        }
    }

    pub fn as_integer(&self) -> Option<u16> {
        match self.payload {
            Payload::Integer(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_instruction(&self) -> Option<Mnemonic> {
        match self.payload {
            Payload::Instruction(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_directive(&self) -> Option<Directive> {
        match self.payload {
            Payload::Directive(d) => Some(d),
            _ => None,
        }
    }
}
