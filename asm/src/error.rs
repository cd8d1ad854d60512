//! The assembler front end's error taxonomy (spec.md §7, user-input family).
//! Every variant carries the source position it was raised at; `report`
//! prints it in the ANSI red "Error:" banner format.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AsmError {
    #[error("Illegal character in string")]
    IllegalCharacterInString { line: usize, column: usize },
    #[error("Unexpected end of string")]
    UnterminatedString { line: usize, column: usize },
    #[error("Unrecognised escape character")]
    UnrecognisedEscape { line: usize, column: usize },
    #[error("Unrecognised token '{text}'")]
    UnrecognisedToken { line: usize, column: usize, text: String },
    #[error("Unrecognised or unsupported directive '{text}'")]
    UnrecognisedDirective { line: usize, column: usize, text: String },
    #[error("Integer overflow: '{text}'")]
    IntegerOverflow { line: usize, column: usize, text: String },
    #[error("Unexpected {found} for directive, expected {expected}")]
    UnexpectedTokenForDirective { line: usize, column: usize, expected: String, found: String },
    #[error("Duplicate symbol definition '{name}'")]
    DuplicateSymbol { line: usize, column: usize, name: String, previous_line: usize, previous_column: usize },
    #[error("Duplicate section name '{name}'")]
    DuplicateSection { line: usize, column: usize, name: String, previous_line: usize, previous_column: usize },
    #[error("No identifier named '{name}' defined")]
    MissingIdentifier { line: usize, column: usize, name: String },
    #[error("Incompatible addressing mode: instruction '{instr}' does not support {mode} mode")]
    IncompatibleAddressingMode { line: usize, column: usize, instr: String, mode: String },
    #[error("Label '{name}' is out of range of branch (distance: {distance} bytes)")]
    BranchOutOfRange { line: usize, column: usize, name: String, distance: i32 },
    #[error("Origin directives cannot go backwards within a section")]
    OriginBackwards { line: usize, column: usize },
    #[error("Unexpected {found}")]
    UnexpectedToken { line: usize, column: usize, found: String },
    #[error("Invalid operand type")]
    InvalidOperand { line: usize, column: usize },
}

impl AsmError {
    pub fn position(&self) -> (usize, usize) {
        use AsmError::*;
        match self {
            IllegalCharacterInString { line, column }
            | UnterminatedString { line, column }
            | UnrecognisedEscape { line, column }
            | UnrecognisedToken { line, column, .. }
            | UnrecognisedDirective { line, column, .. }
            | IntegerOverflow { line, column, .. }
            | UnexpectedTokenForDirective { line, column, .. }
            | DuplicateSymbol { line, column, .. }
            | DuplicateSection { line, column, .. }
            | MissingIdentifier { line, column, .. }
            | IncompatibleAddressingMode { line, column, .. }
            | BranchOutOfRange { line, column, .. }
            | OriginBackwards { line, column }
            | UnexpectedToken { line, column, .. }
            | InvalidOperand { line, column } => (*line, *column),
        }
    }
}

/// Prints one diagnostic line in the `filename:line:column` + red
/// "Error:" banner shape.
pub fn report(filename: &str, err: &AsmError) {
    let (line, column) = err.position();
    eprintln!("\x1b[31mError:\x1b[0m {filename}:{line}:{column}: {err}");
}
