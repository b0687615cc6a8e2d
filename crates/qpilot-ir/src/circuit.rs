//! High-level circuit builder.

use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};
use crate::gate::Gate;
use crate::instruction::{Instruction, InstructionKind};
use crate::qubit::{ClbitId, QubitId, Register, locate};

/// A quantum circuit: register layout plus an ordered instruction list.
///
/// Instructions are validated on insertion, so every operand of a stored
/// instruction refers to a declared wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    name: String,
    qregs: Vec<Register>,
    cregs: Vec<Register>,
    instructions: Vec<Instruction>,
}

impl Circuit {
    /// Create an empty circuit.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qregs: vec![],
            cregs: vec![],
            instructions: vec![],
        }
    }

    /// Create a circuit with one quantum register `q` and one classical register `c`.
    pub fn with_size(name: impl Into<String>, num_qubits: u32, num_clbits: u32) -> Self {
        let mut circuit = Self::new(name);
        if num_qubits > 0 {
            circuit.qregs.push(Register::new("q", num_qubits));
        }
        if num_clbits > 0 {
            circuit.cregs.push(Register::new("c", num_clbits));
        }
        circuit
    }

    // =========================================================================
    // Registers
    // =========================================================================

    /// Declare a quantum register, returning the ids of its qubits.
    pub fn add_qreg(&mut self, name: impl Into<String>, size: u32) -> IrResult<Vec<QubitId>> {
        let name = name.into();
        self.check_register_name(&name)?;
        let base = self.num_qubits() as u32;
        self.qregs.push(Register::new(name, size));
        Ok((base..base + size).map(QubitId).collect())
    }

    /// Declare a classical register, returning the ids of its bits.
    pub fn add_creg(&mut self, name: impl Into<String>, size: u32) -> IrResult<Vec<ClbitId>> {
        let name = name.into();
        self.check_register_name(&name)?;
        let base = self.num_clbits() as u32;
        self.cregs.push(Register::new(name, size));
        Ok((base..base + size).map(ClbitId).collect())
    }

    fn check_register_name(&self, name: &str) -> IrResult<()> {
        if self.qregs.iter().chain(&self.cregs).any(|r| r.name == name) {
            return Err(IrError::DuplicateRegister(name.to_string()));
        }
        Ok(())
    }

    /// Look up a quantum register by name, returning its first flat index and size.
    pub fn qreg(&self, name: &str) -> Option<(u32, u32)> {
        find_register(&self.qregs, name)
    }

    /// Look up a classical register by name, returning its first flat index and size.
    pub fn creg(&self, name: &str) -> Option<(u32, u32)> {
        find_register(&self.cregs, name)
    }

    /// Register and offset of a qubit, for emitting `name[i]`.
    pub fn locate_qubit(&self, qubit: QubitId) -> Option<(&Register, u32)> {
        locate(&self.qregs, qubit.0)
    }

    /// Register and offset of a classical bit.
    pub fn locate_clbit(&self, clbit: ClbitId) -> Option<(&Register, u32)> {
        locate(&self.cregs, clbit.0)
    }

    // =========================================================================
    // Instructions
    // =========================================================================

    /// Validate and append an instruction.
    pub fn push(&mut self, instruction: Instruction) -> IrResult<&mut Self> {
        self.validate(&instruction)?;
        self.instructions.push(instruction);
        Ok(self)
    }

    fn validate(&self, instruction: &Instruction) -> IrResult<()> {
        let gate_name = || Some(instruction.name().to_string());
        let nq = self.num_qubits() as u32;
        let nc = self.num_clbits() as u32;

        for (i, q) in instruction.qubits.iter().enumerate() {
            if q.0 >= nq {
                return Err(IrError::QubitNotFound {
                    qubit: *q,
                    gate_name: gate_name(),
                });
            }
            if instruction.qubits[..i].contains(q) {
                return Err(IrError::DuplicateQubit {
                    qubit: *q,
                    gate_name: gate_name(),
                });
            }
        }
        for c in &instruction.clbits {
            if c.0 >= nc {
                return Err(IrError::ClbitNotFound { clbit: *c });
            }
        }

        match &instruction.kind {
            InstructionKind::Gate(g) if g.num_qubits() != instruction.qubits.len() => {
                Err(IrError::QubitCountMismatch {
                    gate_name: g.name().to_string(),
                    expected: g.num_qubits(),
                    got: instruction.qubits.len(),
                })
            }
            InstructionKind::Measure if instruction.qubits.len() != instruction.clbits.len() => {
                Err(IrError::QubitCountMismatch {
                    gate_name: "measure".into(),
                    expected: instruction.clbits.len(),
                    got: instruction.qubits.len(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Apply any standard gate.
    pub fn gate(
        &mut self,
        gate: Gate,
        qubits: impl IntoIterator<Item = QubitId>,
    ) -> IrResult<&mut Self> {
        self.push(Instruction::gate(gate, qubits))
    }

    /// Apply Hadamard.
    pub fn h(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate(Gate::H, [qubit])
    }

    /// Apply Pauli-X.
    pub fn x(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate(Gate::X, [qubit])
    }

    /// Apply RX(θ).
    pub fn rx(&mut self, theta: f64, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate(Gate::Rx(theta), [qubit])
    }

    /// Apply RZ(θ).
    pub fn rz(&mut self, theta: f64, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate(Gate::Rz(theta), [qubit])
    }

    /// Apply CNOT.
    pub fn cx(&mut self, control: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.gate(Gate::CX, [control, target])
    }

    /// Apply controlled phase.
    pub fn cp(&mut self, theta: f64, control: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.gate(Gate::CP(theta), [control, target])
    }

    /// Measure a qubit into a classical bit.
    pub fn measure(&mut self, qubit: QubitId, clbit: ClbitId) -> IrResult<&mut Self> {
        self.push(Instruction::measure(qubit, clbit))
    }

    /// Measure every qubit into the classical bit with the same index,
    /// adding a `meas` register if the circuit is short of classical bits.
    pub fn measure_all(&mut self) -> IrResult<&mut Self> {
        let nq = self.num_qubits() as u32;
        let nc = self.num_clbits() as u32;
        if nc < nq {
            self.add_creg("meas", nq - nc)?;
        }
        for i in 0..nq {
            self.measure(QubitId(i), ClbitId(i))?;
        }
        Ok(self)
    }

    /// Reset a qubit to |0⟩.
    pub fn reset(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::reset(qubit))
    }

    /// Barrier over the given qubits.
    pub fn barrier(&mut self, qubits: impl IntoIterator<Item = QubitId>) -> IrResult<&mut Self> {
        self.push(Instruction::barrier(qubits))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the circuit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of qubits.
    pub fn num_qubits(&self) -> usize {
        self.qregs.iter().map(|r| r.size as usize).sum()
    }

    /// Get the number of classical bits.
    pub fn num_clbits(&self) -> usize {
        self.cregs.iter().map(|r| r.size as usize).sum()
    }

    /// Quantum registers in declaration order.
    pub fn qregs(&self) -> &[Register] {
        &self.qregs
    }

    /// Classical registers in declaration order.
    pub fn cregs(&self) -> &[Register] {
        &self.cregs
    }

    /// Instructions in program order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Number of instructions, barriers excluded.
    pub fn size(&self) -> usize {
        self.instructions.iter().filter(|i| !i.is_barrier()).count()
    }

    /// Circuit depth: the longest chain of non-barrier instructions sharing wires.
    pub fn depth(&self) -> usize {
        let mut qdepth = vec![0usize; self.num_qubits()];
        let mut cdepth = vec![0usize; self.num_clbits()];
        for inst in &self.instructions {
            let q_iter = inst.qubits.iter().map(|q| qdepth[q.0 as usize]);
            let c_iter = inst.clbits.iter().map(|c| cdepth[c.0 as usize]);
            let start = q_iter.chain(c_iter).max().unwrap_or(0);
            let level = if inst.is_barrier() { start } else { start + 1 };
            for q in &inst.qubits {
                qdepth[q.0 as usize] = level;
            }
            for c in &inst.clbits {
                cdepth[c.0 as usize] = level;
            }
        }
        qdepth.into_iter().chain(cdepth).max().unwrap_or(0)
    }

    // =========================================================================
    // Serialized form
    // =========================================================================

    /// Encode as the `IR_JSON` document.
    pub fn to_json(&self) -> IrResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode an `IR_JSON` document, re-validating every instruction.
    pub fn from_json(value: serde_json::Value) -> IrResult<Self> {
        let Circuit {
            name,
            qregs,
            cregs,
            instructions,
        } = serde_json::from_value(value)?;
        let mut circuit = Circuit {
            name,
            qregs,
            cregs,
            instructions: Vec::with_capacity(instructions.len()),
        };
        for inst in instructions {
            circuit.push(inst)?;
        }
        Ok(circuit)
    }

    // =========================================================================
    // Pre-built circuits
    // =========================================================================

    /// Create a Bell state circuit.
    pub fn bell() -> IrResult<Self> {
        let mut circuit = Self::with_size("bell", 2, 2);
        circuit
            .h(QubitId(0))?
            .cx(QubitId(0), QubitId(1))?
            .measure(QubitId(0), ClbitId(0))?
            .measure(QubitId(1), ClbitId(1))?;
        Ok(circuit)
    }

    /// Create a GHZ state circuit.
    pub fn ghz(n: u32) -> IrResult<Self> {
        if n == 0 {
            return Ok(Self::new("ghz_0"));
        }
        let mut circuit = Self::with_size("ghz", n, n);
        circuit.h(QubitId(0))?;
        for i in 0..n - 1 {
            circuit.cx(QubitId(i), QubitId(i + 1))?;
        }
        for i in 0..n {
            circuit.measure(QubitId(i), ClbitId(i))?;
        }
        Ok(circuit)
    }
}

fn find_register(registers: &[Register], name: &str) -> Option<(u32, u32)> {
    let mut base = 0;
    for reg in registers {
        if reg.name == name {
            return Some((base, reg.size));
        }
        base += reg.size;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_new_circuit() {
        let circuit = Circuit::new("test");
        assert_eq!(circuit.name(), "test");
        assert_eq!(circuit.num_qubits(), 0);
        assert_eq!(circuit.num_clbits(), 0);
    }

    #[test]
    fn test_add_registers() {
        let mut circuit = Circuit::new("test");
        let a = circuit.add_qreg("a", 2).unwrap();
        let b = circuit.add_qreg("b", 3).unwrap();
        assert_eq!(a, vec![QubitId(0), QubitId(1)]);
        assert_eq!(b[0], QubitId(2));
        assert_eq!(circuit.qreg("b"), Some((2, 3)));
        assert!(matches!(
            circuit.add_creg("a", 1),
            Err(IrError::DuplicateRegister(_))
        ));
    }

    #[test]
    fn test_bell_state() {
        let circuit = Circuit::bell().unwrap();
        assert_eq!(circuit.num_qubits(), 2);
        assert_eq!(circuit.num_clbits(), 2);
        assert_eq!(circuit.depth(), 3);
        assert_eq!(circuit.size(), 4);
    }

    #[test]
    fn test_ghz_state() {
        let circuit = Circuit::ghz(5).unwrap();
        assert_eq!(circuit.num_qubits(), 5);
        assert_eq!(circuit.depth(), 6);
    }

    #[test]
    fn test_rejects_unknown_qubit() {
        let mut circuit = Circuit::with_size("test", 1, 0);
        let err = circuit.cx(QubitId(0), QubitId(1)).unwrap_err();
        assert!(matches!(err, IrError::QubitNotFound { .. }));
    }

    #[test]
    fn test_rejects_duplicate_operand() {
        let mut circuit = Circuit::with_size("test", 2, 0);
        let err = circuit.cx(QubitId(1), QubitId(1)).unwrap_err();
        assert!(matches!(err, IrError::DuplicateQubit { .. }));
    }

    #[test]
    fn test_rejects_wrong_arity() {
        let mut circuit = Circuit::with_size("test", 2, 0);
        let err = circuit.gate(Gate::H, [QubitId(0), QubitId(1)]).unwrap_err();
        assert!(matches!(err, IrError::QubitCountMismatch { expected: 1, got: 2, .. }));
    }

    #[test]
    fn test_measure_all_adds_register() {
        let mut circuit = Circuit::with_size("test", 3, 0);
        circuit.h(QubitId(0)).unwrap().measure_all().unwrap();
        assert_eq!(circuit.num_clbits(), 3);
        assert_eq!(circuit.cregs()[0].name, "meas");
    }

    #[test]
    fn test_barrier_does_not_add_depth() {
        let mut circuit = Circuit::with_size("test", 2, 0);
        circuit
            .h(QubitId(0))
            .unwrap()
            .barrier([QubitId(0), QubitId(1)])
            .unwrap()
            .rx(PI / 2.0, QubitId(1))
            .unwrap();
        assert_eq!(circuit.depth(), 2);
    }

    #[test]
    fn test_json_round_trip() {
        let mut circuit = Circuit::bell().unwrap();
        circuit.rz(0.5, QubitId(1)).unwrap();
        let value = circuit.to_json().unwrap();
        assert_eq!(value["instructions"][0]["kind"]["gate"]["name"], "h");
        let decoded = Circuit::from_json(value).unwrap();
        assert_eq!(decoded, circuit);
    }

    #[test]
    fn test_from_json_revalidates() {
        let value = serde_json::json!({
            "name": "bad",
            "qregs": [{"name": "q", "size": 1}],
            "cregs": [],
            "instructions": [{"kind": {"gate": {"name": "x"}}, "qubits": [4]}]
        });
        assert!(matches!(
            Circuit::from_json(value),
            Err(IrError::QubitNotFound { .. })
        ));
    }
}
