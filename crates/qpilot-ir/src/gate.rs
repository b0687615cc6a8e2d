//! Standard gate set.

use serde::{Deserialize, Serialize};

/// Gates with known semantics. Angles are in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "params", rename_all = "lowercase")]
pub enum Gate {
    /// Identity gate.
    Id,
    /// Pauli-X gate.
    X,
    /// Pauli-Y gate.
    Y,
    /// Pauli-Z gate.
    Z,
    /// Hadamard gate.
    H,
    /// S gate (sqrt(Z)).
    S,
    /// S-dagger gate.
    Sdg,
    /// T gate.
    T,
    /// T-dagger gate.
    Tdg,
    /// sqrt(X) gate.
    SX,
    /// Rotation around X.
    Rx(f64),
    /// Rotation around Y.
    Ry(f64),
    /// Rotation around Z.
    Rz(f64),
    /// Phase gate.
    P(f64),
    /// Universal single-qubit gate U(θ, φ, λ).
    U(f64, f64, f64),
    /// Controlled-X (CNOT).
    CX,
    /// Controlled-Y.
    CY,
    /// Controlled-Z.
    CZ,
    /// Controlled-Hadamard.
    CH,
    /// SWAP.
    Swap,
    /// Controlled Z rotation.
    CRz(f64),
    /// Controlled phase.
    CP(f64),
    /// Toffoli.
    CCX,
    /// Fredkin.
    CSwap,
}

impl Gate {
    /// Lower-case mnemonic shared by OpenQASM 2 and 3.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Gate::Id => "id",
            Gate::X => "x",
            Gate::Y => "y",
            Gate::Z => "z",
            Gate::H => "h",
            Gate::S => "s",
            Gate::Sdg => "sdg",
            Gate::T => "t",
            Gate::Tdg => "tdg",
            Gate::SX => "sx",
            Gate::Rx(_) => "rx",
            Gate::Ry(_) => "ry",
            Gate::Rz(_) => "rz",
            Gate::P(_) => "p",
            Gate::U(..) => "u",
            Gate::CX => "cx",
            Gate::CY => "cy",
            Gate::CZ => "cz",
            Gate::CH => "ch",
            Gate::Swap => "swap",
            Gate::CRz(_) => "crz",
            Gate::CP(_) => "cp",
            Gate::CCX => "ccx",
            Gate::CSwap => "cswap",
        }
    }

    /// Number of qubits this gate acts on.
    #[inline]
    pub fn num_qubits(&self) -> usize {
        match self {
            Gate::CX | Gate::CY | Gate::CZ | Gate::CH | Gate::Swap | Gate::CRz(_) | Gate::CP(_) => {
                2
            }
            Gate::CCX | Gate::CSwap => 3,
            _ => 1,
        }
    }

    /// Angle parameters in declaration order.
    pub fn params(&self) -> Vec<f64> {
        match *self {
            Gate::Rx(a) | Gate::Ry(a) | Gate::Rz(a) | Gate::P(a) | Gate::CRz(a) | Gate::CP(a) => {
                vec![a]
            }
            Gate::U(a, b, c) => vec![a, b, c],
            _ => vec![],
        }
    }

    /// Build a gate from its mnemonic and evaluated parameters.
    ///
    /// Accepts the aliases used by the QASM standard libraries (`cnot`,
    /// `u3`, `u1`, `phase`, `toffoli`). Returns `None` for unknown names or
    /// a wrong parameter count.
    pub fn from_name(name: &str, params: &[f64]) -> Option<Gate> {
        let gate = match (name, params) {
            ("id" | "i", []) => Gate::Id,
            ("x", []) => Gate::X,
            ("y", []) => Gate::Y,
            ("z", []) => Gate::Z,
            ("h", []) => Gate::H,
            ("s", []) => Gate::S,
            ("sdg", []) => Gate::Sdg,
            ("t", []) => Gate::T,
            ("tdg", []) => Gate::Tdg,
            ("sx", []) => Gate::SX,
            ("rx", [a]) => Gate::Rx(*a),
            ("ry", [a]) => Gate::Ry(*a),
            ("rz", [a]) => Gate::Rz(*a),
            ("p" | "u1" | "phase", [a]) => Gate::P(*a),
            ("u" | "u3" | "U", [a, b, c]) => Gate::U(*a, *b, *c),
            ("cx" | "cnot" | "CX", []) => Gate::CX,
            ("cy", []) => Gate::CY,
            ("cz", []) => Gate::CZ,
            ("ch", []) => Gate::CH,
            ("swap", []) => Gate::Swap,
            ("crz", [a]) => Gate::CRz(*a),
            ("cp" | "cu1" | "cphase", [a]) => Gate::CP(*a),
            ("ccx" | "toffoli", []) => Gate::CCX,
            ("cswap", []) => Gate::CSwap,
            _ => return None,
        };
        Some(gate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_aliases() {
        assert_eq!(Gate::from_name("cnot", &[]), Some(Gate::CX));
        assert_eq!(Gate::from_name("u1", &[0.5]), Some(Gate::P(0.5)));
        assert_eq!(
            Gate::from_name("u3", &[1.0, 2.0, 3.0]),
            Some(Gate::U(1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn test_from_name_rejects_bad_arity() {
        assert_eq!(Gate::from_name("rx", &[]), None);
        assert_eq!(Gate::from_name("h", &[1.0]), None);
        assert_eq!(Gate::from_name("frobnicate", &[]), None);
    }

    #[test]
    fn test_name_round_trips_through_from_name() {
        for gate in [Gate::H, Gate::CRz(0.25), Gate::CSwap, Gate::U(0.1, 0.2, 0.3)] {
            assert_eq!(Gate::from_name(gate.name(), &gate.params()), Some(gate));
            assert!(gate.num_qubits() >= 1);
        }
    }
}
