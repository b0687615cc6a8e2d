//! Sampling a circuit on the statevector.

use std::collections::BTreeMap;

use qpilot_core::normalize::RegisterLayout;
use qpilot_ir::{Circuit, InstructionKind};
use rand::Rng;
use tracing::debug;

use crate::statevector::Statevector;

/// Name of the register used when a circuit declares no classical bits.
const IMPLICIT_REGISTER: &str = "meas";

/// Outcome of sampling one circuit.
#[derive(Debug, Clone, PartialEq)]
pub struct Sampled {
    /// Binary keys, last register first, clbit 0 rightmost.
    pub counts: BTreeMap<String, u64>,
    pub registers: Vec<RegisterLayout>,
    /// Number of distinct qubits read out.
    pub measured_qubits: usize,
    pub shots: u32,
}

impl Sampled {
    /// Empirical distribution over keys.
    pub fn probabilities(&self) -> impl Iterator<Item = (String, f64)> + '_ {
        let shots = f64::from(self.shots.max(1));
        self.counts.iter().map(move |(k, n)| (k.clone(), *n as f64 / shots))
    }

    /// Mean and variance of the all-Z parity of the measured bits.
    pub fn parity_expectation(&self) -> (f64, f64) {
        if self.shots == 0 {
            return (0.0, 1.0);
        }
        let total: i64 = self
            .counts
            .iter()
            .map(|(k, n)| {
                let ones = k.bytes().filter(|b| *b == b'1').count();
                let sign = if ones % 2 == 0 { 1 } else { -1 };
                sign * *n as i64
            })
            .sum();
        let value = total as f64 / f64::from(self.shots);
        (value, 1.0 - value * value)
    }
}

/// Run `shots` executions of a circuit.
///
/// Circuits whose measurements all come after the last gate are simulated
/// once and sampled; anything else is simulated shot by shot with collapse.
pub fn sample_circuit<R: Rng>(circuit: &Circuit, shots: u32, rng: &mut R) -> Sampled {
    let num_qubits = circuit.num_qubits();
    let mut registers: Vec<RegisterLayout> = circuit
        .cregs()
        .iter()
        .map(|r| RegisterLayout {
            name: r.name.clone(),
            size: r.size,
        })
        .collect();

    // (qubit, clbit) pairs in program order.
    let mut readout: Vec<(usize, usize)> = circuit
        .instructions()
        .iter()
        .filter(|i| i.is_measure())
        .flat_map(|i| {
            i.qubits
                .iter()
                .zip(&i.clbits)
                .map(|(q, c)| (q.0 as usize, c.0 as usize))
        })
        .collect();
    let mut num_clbits = circuit.num_clbits();
    if num_clbits == 0 {
        readout = (0..num_qubits).map(|q| (q, q)).collect();
        num_clbits = num_qubits;
        registers = vec![RegisterLayout {
            name: IMPLICIT_REGISTER.to_string(),
            size: num_qubits as u32,
        }];
    }

    let mut measured: Vec<usize> = readout.iter().map(|(q, _)| *q).collect();
    measured.sort_unstable();
    measured.dedup();

    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut bits = vec![false; num_clbits];

    if measurements_are_terminal(circuit) {
        debug!(num_qubits, shots, "Sampling final state");
        let mut sv = Statevector::new(num_qubits);
        for inst in circuit.instructions() {
            sv.apply(inst, rng);
        }
        for _ in 0..shots {
            let outcome = sv.sample(rng);
            bits.fill(false);
            for &(q, c) in &readout {
                bits[c] = outcome & (1 << q) != 0;
            }
            *counts.entry(key(&bits, &registers)).or_default() += 1;
        }
    } else {
        debug!(num_qubits, shots, "Simulating shot by shot");
        for _ in 0..shots {
            let mut sv = Statevector::new(num_qubits);
            bits.fill(false);
            for inst in circuit.instructions() {
                if inst.is_measure() {
                    for (q, c) in inst.qubits.iter().zip(&inst.clbits) {
                        bits[c.0 as usize] = sv.measure(q.0 as usize, rng);
                    }
                } else {
                    sv.apply(inst, rng);
                }
            }
            *counts.entry(key(&bits, &registers)).or_default() += 1;
        }
    }

    Sampled {
        counts,
        registers,
        measured_qubits: measured.len(),
        shots,
    }
}

/// No reset anywhere and nothing but measurements and barriers after the
/// first measurement.
fn measurements_are_terminal(circuit: &Circuit) -> bool {
    let mut seen_measure = false;
    for inst in circuit.instructions() {
        match inst.kind {
            InstructionKind::Reset => return false,
            InstructionKind::Measure => seen_measure = true,
            InstructionKind::Gate(_) if seen_measure => return false,
            _ => {}
        }
    }
    true
}

/// Render classical bits as one binary word per register, last register
/// first, highest bit leftmost.
fn key(bits: &[bool], registers: &[RegisterLayout]) -> String {
    let mut words = Vec::with_capacity(registers.len());
    let mut base = 0usize;
    for reg in registers {
        let size = reg.size as usize;
        let word: String = bits[base..base + size]
            .iter()
            .rev()
            .map(|b| if *b { '1' } else { '0' })
            .collect();
        words.push(word);
        base += size;
    }
    words.reverse();
    words.join(" ")
}
