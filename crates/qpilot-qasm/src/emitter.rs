//! Text emitters: `OpenQASM` 2, `OpenQASM` 3 and Quil.

use std::fmt::Write as _;

use qpilot_ir::{Circuit, ClbitId, Gate, Instruction, InstructionKind, QubitId};

use crate::error::{ParseError, ParseResult};

/// Emit a circuit as `OpenQASM` 3.0 source.
pub fn emit_qasm3(circuit: &Circuit) -> ParseResult<String> {
    QasmEmitter::new(circuit, false).emit()
}

/// Emit a circuit as `OpenQASM` 2.0 source.
///
/// Gates outside `qelib1.inc` are written under their legacy aliases
/// (`u1`, `u3`, `cu1`).
pub fn emit_qasm2(circuit: &Circuit) -> ParseResult<String> {
    QasmEmitter::new(circuit, true).emit()
}

struct QasmEmitter<'a> {
    circuit: &'a Circuit,
    legacy: bool,
    output: String,
}

impl<'a> QasmEmitter<'a> {
    fn new(circuit: &'a Circuit, legacy: bool) -> Self {
        Self {
            circuit,
            legacy,
            output: String::new(),
        }
    }

    fn writeln(&mut self, line: &str) {
        self.output.push_str(line);
        self.output.push('\n');
    }

    fn emit(mut self) -> ParseResult<String> {
        if self.legacy {
            self.writeln("OPENQASM 2.0;");
            self.writeln("include \"qelib1.inc\";");
        } else {
            self.writeln("OPENQASM 3.0;");
            self.writeln("include \"stdgates.inc\";");
        }

        for reg in self.circuit.qregs() {
            let decl = if self.legacy {
                format!("qreg {}[{}];", reg.name, reg.size)
            } else {
                format!("qubit[{}] {};", reg.size, reg.name)
            };
            self.writeln(&decl);
        }
        for reg in self.circuit.cregs() {
            let decl = if self.legacy {
                format!("creg {}[{}];", reg.name, reg.size)
            } else {
                format!("bit[{}] {};", reg.size, reg.name)
            };
            self.writeln(&decl);
        }

        for instruction in self.circuit.instructions() {
            self.emit_instruction(instruction)?;
        }
        Ok(self.output)
    }

    fn emit_instruction(&mut self, instruction: &Instruction) -> ParseResult<()> {
        let qubits = instruction
            .qubits
            .iter()
            .map(|q| self.qubit(*q))
            .collect::<ParseResult<Vec<_>>>()?
            .join(", ");

        match &instruction.kind {
            InstructionKind::Gate(gate) => {
                let name = if self.legacy {
                    legacy_name(gate)
                } else {
                    gate.name()
                };
                let params = gate.params();
                if params.is_empty() {
                    self.writeln(&format!("{name} {qubits};"));
                } else {
                    let params = params.iter().map(f64::to_string).collect::<Vec<_>>();
                    self.writeln(&format!("{name}({}) {qubits};", params.join(", ")));
                }
            }
            InstructionKind::Measure => {
                for (q, c) in instruction.qubits.iter().zip(&instruction.clbits) {
                    let q = self.qubit(*q)?;
                    let c = self.clbit(*c)?;
                    if self.legacy {
                        self.writeln(&format!("measure {q} -> {c};"));
                    } else {
                        self.writeln(&format!("{c} = measure {q};"));
                    }
                }
            }
            InstructionKind::Reset => self.writeln(&format!("reset {qubits};")),
            InstructionKind::Barrier => self.writeln(&format!("barrier {qubits};")),
        }
        Ok(())
    }

    fn qubit(&self, q: QubitId) -> ParseResult<String> {
        let (reg, idx) = self
            .circuit
            .locate_qubit(q)
            .ok_or_else(|| qpilot_ir::IrError::QubitNotFound {
                qubit: q,
                gate_name: None,
            })?;
        Ok(format!("{}[{idx}]", reg.name))
    }

    fn clbit(&self, c: ClbitId) -> ParseResult<String> {
        let (reg, idx) = self
            .circuit
            .locate_clbit(c)
            .ok_or(qpilot_ir::IrError::ClbitNotFound { clbit: c })?;
        Ok(format!("{}[{idx}]", reg.name))
    }
}

fn legacy_name(gate: &Gate) -> &'static str {
    match gate {
        Gate::P(_) => "u1",
        Gate::U(..) => "u3",
        Gate::CP(_) => "cu1",
        other => other.name(),
    }
}

/// Emit a circuit as a Quil program.
///
/// Qubits are addressed by flat index; each classical register becomes a
/// `DECLARE name BIT[n]` memory region. Gates without a Quil primitive are
/// expressed with `DAGGER`/`CONTROLLED` modifiers or decomposed (`u` into
/// `RZ·RY·RZ`, `sx` into `RX(pi/2)`, both up to global phase). Barriers
/// have no Quil counterpart and are written as comments.
pub fn emit_quil(circuit: &Circuit) -> ParseResult<String> {
    let mut out = String::new();
    for reg in circuit.cregs() {
        let _ = writeln!(out, "DECLARE {} BIT[{}]", reg.name, reg.size);
    }

    for instruction in circuit.instructions() {
        let qubits = instruction
            .qubits
            .iter()
            .map(|q| q.0.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        match &instruction.kind {
            InstructionKind::Gate(gate) => {
                for line in quil_gate(gate, &qubits) {
                    let _ = writeln!(out, "{line}");
                }
            }
            InstructionKind::Measure => {
                for (q, c) in instruction.qubits.iter().zip(&instruction.clbits) {
                    let (reg, idx) = circuit.locate_clbit(*c).ok_or_else(|| {
                        ParseError::Unrepresentable {
                            instruction: format!("measure {q} -> {c}"),
                            target: "Quil",
                        }
                    })?;
                    let _ = writeln!(out, "MEASURE {} {}[{idx}]", q.0, reg.name);
                }
            }
            InstructionKind::Reset => {
                let _ = writeln!(out, "RESET {qubits}");
            }
            InstructionKind::Barrier => {
                let _ = writeln!(out, "# barrier {qubits}");
            }
        }
    }
    Ok(out)
}

fn quil_gate(gate: &Gate, qubits: &str) -> Vec<String> {
    let simple = |name: &str| vec![format!("{name} {qubits}")];
    let rotation = |name: &str, angle: f64| vec![format!("{name}({angle}) {qubits}")];
    match *gate {
        Gate::Id => simple("I"),
        Gate::X => simple("X"),
        Gate::Y => simple("Y"),
        Gate::Z => simple("Z"),
        Gate::H => simple("H"),
        Gate::S => simple("S"),
        Gate::Sdg => simple("DAGGER S"),
        Gate::T => simple("T"),
        Gate::Tdg => simple("DAGGER T"),
        Gate::SX => rotation("RX", std::f64::consts::FRAC_PI_2),
        Gate::Rx(a) => rotation("RX", a),
        Gate::Ry(a) => rotation("RY", a),
        Gate::Rz(a) => rotation("RZ", a),
        Gate::P(a) => rotation("PHASE", a),
        Gate::U(theta, phi, lambda) => vec![
            format!("RZ({lambda}) {qubits}"),
            format!("RY({theta}) {qubits}"),
            format!("RZ({phi}) {qubits}"),
        ],
        Gate::CX => simple("CNOT"),
        Gate::CY => simple("CONTROLLED Y"),
        Gate::CZ => simple("CZ"),
        Gate::CH => simple("CONTROLLED H"),
        Gate::Swap => simple("SWAP"),
        Gate::CRz(a) => rotation("CONTROLLED RZ", a),
        Gate::CP(a) => rotation("CPHASE", a),
        Gate::CCX => simple("CCNOT"),
        Gate::CSwap => simple("CSWAP"),
    }
}
