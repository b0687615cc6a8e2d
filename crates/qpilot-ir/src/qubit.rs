//! Wire identifiers and registers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Flat index of a qubit within a circuit.
///
/// Qubits are numbered across registers in declaration order, so in a
/// circuit declaring `qreg a[2]; qreg b[1];` the qubit `b[0]` is `QubitId(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QubitId(pub u32);

impl fmt::Display for QubitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

impl From<u32> for QubitId {
    fn from(id: u32) -> Self {
        QubitId(id)
    }
}

/// Flat index of a classical bit within a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClbitId(pub u32);

impl fmt::Display for ClbitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

impl From<u32> for ClbitId {
    fn from(id: u32) -> Self {
        ClbitId(id)
    }
}

/// A named, contiguous block of qubits or classical bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Register {
    /// Register name as written in source (`q`, `c`, `meas`).
    pub name: String,
    /// Number of bits in the register.
    pub size: u32,
}

impl Register {
    /// Create a register.
    pub fn new(name: impl Into<String>, size: u32) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.size)
    }
}

/// Resolve a flat index into `(register, offset)` given a register layout.
pub(crate) fn locate(registers: &[Register], flat: u32) -> Option<(&Register, u32)> {
    let mut base = 0u32;
    for reg in registers {
        if flat < base + reg.size {
            return Some((reg, flat - base));
        }
        base += reg.size;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        assert_eq!(QubitId(0).to_string(), "q0");
        assert_eq!(ClbitId(3).to_string(), "c3");
        assert_eq!(Register::new("meas", 4).to_string(), "meas[4]");
    }

    #[test]
    fn test_locate_across_registers() {
        let regs = vec![Register::new("a", 2), Register::new("b", 3)];
        let (reg, off) = locate(&regs, 3).unwrap();
        assert_eq!(reg.name, "b");
        assert_eq!(off, 1);
        assert!(locate(&regs, 5).is_none());
    }
}
