//! Circuit format conversion for qpilot.
//!
//! Circuit formats form a directed graph: every registered [`Transpiler`]
//! is an edge from the format it reads to the format it writes. Converting a
//! circuit means finding the cheapest admissible chain of edges from any
//! format the circuit is already available in to the format a pilot wants,
//! then applying each step in order.
//!
//! # Example
//!
//! ```rust
//! use qpilot_transpile::{CircuitData, TranspileOptions, TranspilerRegistry, formats};
//!
//! let registry = TranspilerRegistry::with_builtins();
//! let qasm2 = "OPENQASM 2.0;\ninclude \"qelib1.inc\";\nqreg q[1];\nh q[0];\n";
//!
//! let chain = registry
//!     .find_chain(&[formats::QASM2], formats::QASM3, &TranspileOptions::default())
//!     .unwrap();
//! assert_eq!(chain.names(), vec!["qasm2_to_ir", "ir_to_qasm3"]);
//!
//! let out = registry
//!     .transpile_circuit(
//!         formats::QASM3,
//!         vec![(formats::QASM2.into(), CircuitData::Text(qasm2.into()))],
//!         &TranspileOptions::default(),
//!     )
//!     .unwrap();
//! assert!(out.as_text().unwrap().starts_with("OPENQASM 3.0;"));
//! ```
//!
//! # Built-in converters
//!
//! | Name | Source | Target |
//! |------|--------|--------|
//! | `qasm2_to_ir` / `ir_to_qasm2` | `QASM2` | `IR` |
//! | `qasm3_to_ir` / `ir_to_qasm3` | `QASM3` | `IR` |
//! | `ir_json_to_ir` / `ir_to_ir_json` | `IR_JSON` | `IR` |
//! | `ir_to_quil` | `IR` | `QUIL` |
//!
//! # Preprocessing
//!
//! Stored programs are strings. [`PreprocessingRegistry`] turns them into
//! live [`CircuitData`] before conversion; languages executed by an external
//! interpreter are unsafe and honor the same exclusion flag as converters.

mod builtin;
mod data;
mod error;
mod executor;
pub mod formats;
mod preprocessing;
mod registry;
mod search;
mod transpiler;

pub use data::CircuitData;
pub use error::{ConversionError, TranspileError, TranspileResult};
pub use executor::Transpiled;
pub use preprocessing::{
    IrJsonPreprocessor, PreprocessingRegistry, Preprocessor, ScriptPreprocessor,
};
pub use registry::TranspilerRegistry;
pub use search::{SearchPolicy, TranspileChain, TranspileOptions};
pub use transpiler::{FnTranspiler, Transpiler};
