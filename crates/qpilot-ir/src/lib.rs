//! qpilot circuit representation
//!
//! This crate provides the structured, in-memory circuit form that the
//! transpiler graph knows as format `IR`. Every textual dialect the system
//! understands (OpenQASM 2, OpenQASM 3, Quil) is converted through it, and
//! its serde form is the `IR_JSON` format.
//!
//! # Core Components
//!
//! - **Bits and registers**: [`QubitId`], [`ClbitId`] address flat wires;
//!   [`Register`] groups them under a name (`q[0]`, `c[1]`)
//! - **Gates**: [`Gate`] for the supported standard gate set
//! - **Instructions**: [`Instruction`] combining a gate or directive with operands
//! - **Circuit**: [`Circuit`] ordered instruction list plus register layout
//!
//! # Example: Building a Bell State
//!
//! ```rust
//! use qpilot_ir::{Circuit, ClbitId, QubitId};
//!
//! let mut circuit = Circuit::with_size("bell", 2, 2);
//! circuit
//!     .h(QubitId(0)).unwrap()
//!     .cx(QubitId(0), QubitId(1)).unwrap()
//!     .measure(QubitId(0), ClbitId(0)).unwrap()
//!     .measure(QubitId(1), ClbitId(1)).unwrap();
//!
//! assert_eq!(circuit.num_qubits(), 2);
//! assert_eq!(circuit.depth(), 3);
//! ```
//!
//! # Supported Gates
//!
//! | Gate | Qubits | Description |
//! |------|--------|-------------|
//! | `id`, `x`, `y`, `z` | 1 | Identity and Pauli gates |
//! | `h`, `s`, `sdg`, `t`, `tdg`, `sx` | 1 | Clifford+T gates |
//! | `rx`, `ry`, `rz`, `p` | 1 | Rotation and phase gates |
//! | `u` | 1 | Universal single-qubit gate U(θ,φ,λ) |
//! | `cx`, `cy`, `cz`, `ch`, `swap` | 2 | Two-qubit gates |
//! | `crz`, `cp` | 2 | Controlled rotations |
//! | `ccx`, `cswap` | 3 | Toffoli and Fredkin |

pub mod circuit;
pub mod error;
pub mod gate;
pub mod instruction;
pub mod qubit;

pub use circuit::Circuit;
pub use error::{IrError, IrResult};
pub use gate::Gate;
pub use instruction::{Instruction, InstructionKind};
pub use qubit::{ClbitId, QubitId, Register};
