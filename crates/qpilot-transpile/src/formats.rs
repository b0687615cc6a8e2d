//! Built-in format tags.
//!
//! Formats are opaque strings; a format becomes known to a registry as soon
//! as a registered converter names it. These are the tags the built-in
//! converters and pilots use.

/// Structured in-memory circuit ([`qpilot_ir::Circuit`]).
pub const IR: &str = "IR";

/// JSON serialization of the IR.
pub const IR_JSON: &str = "IR_JSON";

/// OpenQASM 2.0 source text.
pub const QASM2: &str = "QASM2";

/// OpenQASM 3.0 source text.
pub const QASM3: &str = "QASM3";

/// Quil source text (output only).
pub const QUIL: &str = "QUIL";

/// Circuit-building script; only reachable through unsafe preprocessing.
pub const PYTHON: &str = "PYTHON";
