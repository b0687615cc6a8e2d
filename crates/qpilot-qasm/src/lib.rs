//! `OpenQASM` front end for qpilot
//!
//! Reads `OpenQASM` 2.0 and 3.0 programs into [`qpilot_ir::Circuit`] and
//! writes circuits back out as `OpenQASM` 2.0, `OpenQASM` 3.0 or Quil. These
//! functions back the built-in `QASM2`, `QASM3` and `QUIL` converters of the
//! transpiler registry.
//!
//! # Supported Features
//!
//! | Feature | QASM 2 | QASM 3 |
//! |---------|--------|--------|
//! | Registers | `qreg q[2]; creg c[2];` | `qubit[2] q; bit[2] c;` |
//! | Gate calls | `u3(pi/2, 0, pi) q[0];` | `u(pi/2, 0, pi) q[0];` |
//! | Broadcast | `h q;` | `h q;` |
//! | Measurement | `measure q -> c;` | `c = measure q;` |
//! | Reset / barrier | ✅ | ✅ |
//!
//! # Example: Round-Trip
//!
//! ```rust
//! use qpilot_qasm::{emit_qasm3, parse_qasm2, parse_qasm3};
//!
//! let source = r#"
//! OPENQASM 2.0;
//! include "qelib1.inc";
//! qreg q[2];
//! creg c[2];
//! h q[0];
//! cx q[0], q[1];
//! measure q -> c;
//! "#;
//!
//! let circuit = parse_qasm2(source).unwrap();
//! let qasm3 = emit_qasm3(&circuit).unwrap();
//! assert_eq!(parse_qasm3(&qasm3).unwrap(), circuit);
//! ```

mod emitter;
mod error;
mod lexer;
mod parser;

pub use emitter::{emit_qasm2, emit_qasm3, emit_quil};
pub use error::{ParseError, ParseResult};
pub use parser::{Dialect, parse, parse_qasm2, parse_qasm3};
