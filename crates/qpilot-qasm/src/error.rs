//! Error types for the QASM front end.

use thiserror::Error;

/// Errors that can occur while reading or writing circuit text.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Lexer error (invalid token).
    #[error("Lexer error at line {line}: invalid token '{fragment}'")]
    LexerError { line: usize, fragment: String },

    /// Unexpected token.
    #[error("Unexpected token at line {line}: expected {expected}, found {found}")]
    UnexpectedToken {
        line: usize,
        expected: String,
        found: String,
    },

    /// Unexpected end of input.
    #[error("Unexpected end of input: {0}")]
    UnexpectedEof(String),

    /// Missing or unsupported version header.
    #[error("Invalid OPENQASM version: {0}")]
    InvalidVersion(String),

    /// Source declares a dialect other than the one requested.
    #[error("Expected OPENQASM {expected}, found version {found}")]
    DialectMismatch { expected: u8, found: String },

    /// Register used before declaration.
    #[error("Undefined register at line {line}: {name}")]
    UndefinedRegister { line: usize, name: String },

    /// Unknown gate or wrong parameter count.
    #[error("Unknown gate at line {line}: {name} with {params} parameter(s)")]
    UnknownGate {
        line: usize,
        name: String,
        params: usize,
    },

    /// Index out of bounds.
    #[error("Index {index} out of bounds for register '{register}' of size {size}")]
    IndexOutOfBounds {
        register: String,
        index: u64,
        size: u32,
    },

    /// Broadcast over registers of different sizes.
    #[error("Register size mismatch at line {line}: {detail}")]
    RegisterSizeMismatch { line: usize, detail: String },

    /// Construct outside the supported subset.
    #[error("Unsupported construct at line {line}: {what}")]
    Unsupported { line: usize, what: String },

    /// Emitter target cannot express an instruction.
    #[error("Cannot emit '{instruction}' as {target}")]
    Unrepresentable {
        instruction: String,
        target: &'static str,
    },

    /// IR error during circuit construction.
    #[error("Circuit error: {0}")]
    CircuitError(#[from] qpilot_ir::IrError),
}

/// Result type for parsing and emission.
pub type ParseResult<T> = Result<T, ParseError>;
