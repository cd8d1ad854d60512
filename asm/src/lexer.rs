//! Single-pass lexer with a one-character accumulator (spec.md §4.3).
//! Self-delimiting punctuation flushes the accumulator and emits its own
//! token; whitespace flushes; `;` starts a line comment. Errors are
//! accumulated so the lexer can surface as many as possible in one run.

use dolly_core::isa::Mnemonic;

use crate::error::AsmError;
use crate::token::{Directive, Payload, Token, TokenKind};

fn mnemonic_from_str(s: &str) -> Option<Mnemonic> {
    use Mnemonic::*;
    Some(match s.to_ascii_uppercase().as_str() {
        "ADC" => ADC, "AND" => AND, "ASL" => ASL, "BCC" => BCC, "BCS" => BCS,
        "BEQ" => BEQ, "BIT" => BIT, "BMI" => BMI, "BNE" => BNE, "BPL" => BPL,
        "BRK" => BRK, "BVC" => BVC, "BVS" => BVS, "CLC" => CLC, "CLI" => CLI,
        "CLV" => CLV, "CMP" => CMP, "CPX" => CPX, "CPY" => CPY, "DEC" => DEC,
        "DEX" => DEX, "DEY" => DEY, "EOR" => EOR, "INC" => INC, "INX" => INX,
        "INY" => INY, "JMP" => JMP, "JSR" => JSR, "LDX" => LDX, "LDY" => LDY,
        "LSR" => LSR, "NOP" => NOP, "ORA" => ORA, "PHA" => PHA, "PHP" => PHP,
        "PLA" => PLA, "PLP" => PLP, "ROL" => ROL, "ROR" => ROR, "RTI" => RTI,
        "RTS" => RTS, "SBC" => SBC, "SED" => SED, "SEI" => SEI, "STA" => STA,
        "STX" => STX, "STY" => STY, "TAX" => TAX, "TAY" => TAY, "TSX" => TSX,
        "TXA" => TXA, "TXS" => TXS, "TYA" => TYA, "SEC" => SEC, "LDA" => LDA,
        "CLD" => CLD,
        _ => return None,
    })
}

fn dec_str_to_int(s: &str) -> Option<i32> {
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut value: i64 = 0;
    for b in digits.bytes() {
        value = value * 10 + (b - b'0') as i64;
    }
    Some(if neg { -value } else { value } as i32)
}

fn hex_str_to_int(s: &str) -> Option<i32> {
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let mut value: i64 = 0;
    for b in digits.bytes() {
        let d = (b as char).to_ascii_lowercase();
        let digit = if d.is_ascii_digit() { d as i64 - '0' as i64 } else { d as i64 - 'a' as i64 + 10 };
        value = value * 16 + digit;
    }
    Some(if neg { -value } else { value } as i32)
}

fn classify_multichar(text: &str, line: usize, column: usize) -> Result<Token, AsmError> {
    if let Some(rest) = text.strip_prefix('.') {
        let directive = match rest.to_ascii_uppercase().as_str() {
            "ORG" => Directive::Origin,
            "BYTE" => Directive::Byte,
            "STRING" => Directive::StringLit,
            "TEXT" => Directive::Text,
            "DATA" => Directive::Data,
            _ => {
                return Err(AsmError::UnrecognisedDirective { line, column, text: text.to_string() })
            }
        };
        return Ok(Token::new(TokenKind::DIRECTIVE, line, column, Payload::Directive(directive)));
    }

    if text.len() == 3 {
        if let Some(mnemonic) = mnemonic_from_str(text) {
            return Ok(Token::new(TokenKind::INSTRUCTION, line, column, Payload::Instruction(mnemonic)));
        }
    }

    let first = text.as_bytes()[0];
    if first == b'$' || first.is_ascii_digit() || first == b'-' || first == b'+' {
        let value = if let Some(hex) = text.strip_prefix('$') {
            hex_str_to_int(hex)
        } else {
            dec_str_to_int(text)
        };
        if let Some(value) = value {
            if !(i16::MIN as i32..=u16::MAX as i32).contains(&value) {
                return Err(AsmError::IntegerOverflow { line, column, text: text.to_string() });
            }
            return Ok(Token::new(TokenKind::INTEGER, line, column, Payload::Integer(value as u16)));
        }
    }

    if text.eq_ignore_ascii_case("x") {
        return Ok(Token::new(TokenKind::X, line, column, Payload::None));
    }
    if text.eq_ignore_ascii_case("y") {
        return Ok(Token::new(TokenKind::Y, line, column, Payload::None));
    }
    if text.eq_ignore_ascii_case("a") {
        return Ok(Token::new(TokenKind::A, line, column, Payload::None));
    }

    let valid_identifier = {
        let mut chars = text.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    };

    if valid_identifier {
        return Ok(Token::new(TokenKind::IDENTIFIER, line, column, Payload::Text(text.to_string())));
    }

    Err(AsmError::UnrecognisedToken { line, column, text: text.to_string() })
}

struct Lexer<'a> {
    bytes: &'a [u8],
    line: usize,
    column: usize,
    accumulator: String,
    acc_start_column: usize,
    tokens: Vec<Token>,
    errors: Vec<AsmError>,
}

impl<'a> Lexer<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Lexer {
            bytes,
            line: 1,
            column: 1,
            accumulator: String::new(),
            acc_start_column: 1,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn flush(&mut self) {
        if self.accumulator.is_empty() {
            return;
        }
        match classify_multichar(&self.accumulator, self.line, self.acc_start_column) {
            Ok(token) => self.tokens.push(token),
            Err(err) => self.errors.push(err),
        }
        self.accumulator.clear();
    }

    fn push_punct(&mut self, kind: TokenKind) {
        self.flush();
        self.tokens.push(Token::new(kind, self.line, self.column, Payload::None));
    }

    fn parse_string(&mut self, start: usize) -> usize {
        let line = self.line;
        let column = self.column;
        let mut out = String::new();
        let mut i = start + 1;
        loop {
            if i >= self.bytes.len() {
                self.errors.push(AsmError::UnterminatedString { line, column });
                return i;
            }
            let c = self.bytes[i];
            if c == b'"' {
                break;
            }
            if !c.is_ascii_graphic() && c != b' ' {
                self.errors.push(AsmError::IllegalCharacterInString { line, column });
                return i;
            }
            if c == b'\\' {
                if i + 1 >= self.bytes.len() {
                    self.errors.push(AsmError::UnterminatedString { line, column });
                    return i;
                }
                let escaped = match self.bytes[i + 1] {
                    b'n' => b'\n',
                    b't' => b'\t',
                    b'\\' => b'\\',
                    b'"' => b'"',
                    _ => {
                        self.errors.push(AsmError::UnrecognisedEscape { line, column });
                        return i;
                    }
                };
                out.push(escaped as char);
                i += 2;
            } else {
                out.push(c as char);
                i += 1;
            }
        }
        self.tokens.push(Token::new(TokenKind::STRING, line, column, Payload::Text(out)));
        i
    }

    fn run(mut self) -> (Vec<Token>, Vec<AsmError>) {
        let mut index = 0;
        while index < self.bytes.len() {
            let c = self.bytes[index];
            match c {
                b'(' => self.push_punct(TokenKind::OPEN_BRACKET),
                b')' => self.push_punct(TokenKind::CLOSE_BRACKET),
                b'#' => self.push_punct(TokenKind::HASH),
                b':' => self.push_punct(TokenKind::COLON),
                b'=' => self.push_punct(TokenKind::EQUALS),
                b',' => self.push_punct(TokenKind::COMMA),
                b'*' => self.push_punct(TokenKind::ASTERISK),
                b';' => {
                    self.flush();
                    while index < self.bytes.len() && self.bytes[index] != b'\n' {
                        index += 1;
                    }
                    continue;
                }
                b'\n' => {
                    self.flush();
                    self.line += 1;
                    self.column = 0;
                }
                b'\r' | b'\t' | b' ' => self.flush(),
                b'"' => {
                    self.flush();
                    index = self.parse_string(index);
                }
                _ => {
                    if self.accumulator.is_empty() {
                        self.acc_start_column = self.column;
                    }
                    self.accumulator.push(c as char);
                }
            }
            self.column += 1;
            index += 1;
        }
        self.flush();
        (self.tokens, self.errors)
    }
}

/// Lexes `text` into a token stream. Returns `Ok` with all tokens produced
/// only if no lexical error occurred; otherwise the caller should report
/// every error in `errors` and abort (spec.md §7's pass-level policy).
pub fn lex(text: &[u8]) -> Result<Vec<Token>, Vec<AsmError>> {
    let (tokens, errors) = Lexer::new(text).run();
    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_simple_instruction() {
        let tokens = lex(b"LDA #$05").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, TokenKind::INSTRUCTION);
        assert_eq!(tokens[1].kind, TokenKind::HASH);
        assert_eq!(tokens[2].as_integer(), Some(5));
    }

    #[test]
    fn lexes_label_and_colon() {
        let tokens = lex(b"loop: DEX").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::IDENTIFIER);
        assert_eq!(tokens[1].kind, TokenKind::COLON);
        assert_eq!(tokens[2].kind, TokenKind::INSTRUCTION);
    }

    #[test]
    fn lexes_comment_to_eol() {
        let tokens = lex(b"NOP ; ignored rest\nNOP").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].kind, TokenKind::INSTRUCTION);
        assert_eq!(tokens[1].kind, TokenKind::INSTRUCTION);
    }

    #[test]
    fn lexes_string_with_escapes() {
        let tokens = lex(br#".string "hi\n""#).unwrap();
        assert_eq!(tokens[0].as_directive(), Some(Directive::StringLit));
        assert_eq!(tokens[1].as_text(), Some("hi\n"));
    }

    #[test]
    fn negative_decimal_folds_to_u16() {
        let tokens = lex(b"-3").unwrap();
        assert_eq!(tokens[0].as_integer(), Some((-3i16) as u16));
    }

    #[test]
    fn integer_overflow_is_an_error() {
        let err = lex(b"99999").unwrap_err();
        assert!(matches!(err[0], AsmError::IntegerOverflow { .. }));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = lex(b"\"abc").unwrap_err();
        assert!(matches!(err[0], AsmError::UnterminatedString { .. }));
    }

    #[test]
    fn continues_past_errors_to_find_more() {
        let err = lex(b"%%% ^^^").unwrap_err();
        assert_eq!(err.len(), 2);
    }

    #[test]
    fn register_letters() {
        let tokens = lex(b"$10,X").unwrap();
        assert_eq!(tokens[2].kind, TokenKind::X);
    }
}
