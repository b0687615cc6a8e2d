//! Statevector simulation engine.

use num_complex::Complex64;
use rand::Rng;
use std::f64::consts::PI;

use qpilot_ir::{Gate, Instruction, InstructionKind};

/// A statevector representing a quantum state.
///
/// Basis index bit `k` is the state of qubit `k`.
#[derive(Debug, Clone)]
pub struct Statevector {
    /// The state amplitudes (2^n complex numbers).
    amplitudes: Vec<Complex64>,
    /// Number of qubits.
    num_qubits: usize,
}

impl Statevector {
    /// Create a new statevector initialized to |0...0⟩.
    pub fn new(num_qubits: usize) -> Self {
        let size = 1 << num_qubits;
        let mut amplitudes = vec![Complex64::new(0.0, 0.0); size];
        amplitudes[0] = Complex64::new(1.0, 0.0);
        Self {
            amplitudes,
            num_qubits,
        }
    }

    /// Apply a unitary or reset instruction.
    ///
    /// Measurements and barriers leave the state untouched; the caller
    /// decides whether to collapse with [`measure`](Self::measure).
    pub fn apply<R: Rng>(&mut self, instruction: &Instruction, rng: &mut R) {
        let qubits: Vec<usize> = instruction.qubits.iter().map(|q| q.0 as usize).collect();
        match &instruction.kind {
            InstructionKind::Gate(gate) => self.apply_gate(gate, &qubits),
            InstructionKind::Reset => {
                for &q in &qubits {
                    if self.measure(q, rng) {
                        self.apply_x(q);
                    }
                }
            }
            InstructionKind::Measure | InstructionKind::Barrier => {}
        }
    }

    /// Apply a gate to specific qubits.
    pub fn apply_gate(&mut self, gate: &Gate, qubits: &[usize]) {
        match *gate {
            // Single-qubit gates
            Gate::Id => {}
            Gate::X => self.apply_x(qubits[0]),
            Gate::Y => self.apply_y(qubits[0]),
            Gate::Z => self.apply_phase(qubits[0], PI),
            Gate::H => self.apply_h(qubits[0]),
            Gate::S => self.apply_phase(qubits[0], PI / 2.0),
            Gate::Sdg => self.apply_phase(qubits[0], -PI / 2.0),
            Gate::T => self.apply_phase(qubits[0], PI / 4.0),
            Gate::Tdg => self.apply_phase(qubits[0], -PI / 4.0),
            Gate::SX => self.apply_rx(qubits[0], PI / 2.0),
            Gate::Rx(theta) => self.apply_rx(qubits[0], theta),
            Gate::Ry(theta) => self.apply_ry(qubits[0], theta),
            Gate::Rz(theta) => self.apply_rz(qubits[0], theta),
            Gate::P(theta) => self.apply_phase(qubits[0], theta),
            Gate::U(theta, phi, lambda) => self.apply_u(qubits[0], theta, phi, lambda),

            // Two-qubit gates
            Gate::CX => self.apply_controlled(&[qubits[0]], |sv| sv.apply_x(qubits[1])),
            Gate::CY => self.apply_controlled(&[qubits[0]], |sv| sv.apply_y(qubits[1])),
            Gate::CZ => self.apply_controlled(&[qubits[0]], |sv| sv.apply_phase(qubits[1], PI)),
            Gate::CH => self.apply_controlled(&[qubits[0]], |sv| sv.apply_h(qubits[1])),
            Gate::Swap => self.apply_swap(qubits[0], qubits[1]),
            Gate::CRz(theta) => {
                self.apply_controlled(&[qubits[0]], |sv| sv.apply_rz(qubits[1], theta));
            }
            Gate::CP(theta) => {
                self.apply_controlled(&[qubits[0]], |sv| sv.apply_phase(qubits[1], theta));
            }

            // Three-qubit gates
            Gate::CCX => {
                self.apply_controlled(&[qubits[0], qubits[1]], |sv| sv.apply_x(qubits[2]));
            }
            Gate::CSwap => {
                self.apply_controlled(&[qubits[0]], |sv| sv.apply_swap(qubits[1], qubits[2]));
            }
        }
    }

    /// Probability of reading 1 on `qubit`.
    pub fn probability_one(&self, qubit: usize) -> f64 {
        let mask = 1 << qubit;
        self.amplitudes
            .iter()
            .enumerate()
            .filter(|(i, _)| i & mask != 0)
            .map(|(_, a)| a.norm_sqr())
            .sum()
    }

    /// Measure one qubit, collapsing the state. Returns the bit read.
    pub fn measure<R: Rng>(&mut self, qubit: usize, rng: &mut R) -> bool {
        let p1 = self.probability_one(qubit);
        let outcome = rng.r#gen::<f64>() < p1;
        let keep = if outcome { p1 } else { 1.0 - p1 };
        let norm = keep.sqrt();
        let mask = 1 << qubit;
        for (i, amp) in self.amplitudes.iter_mut().enumerate() {
            if (i & mask != 0) == outcome {
                if norm > 0.0 {
                    *amp /= norm;
                }
            } else {
                *amp = Complex64::new(0.0, 0.0);
            }
        }
        outcome
    }

    /// Sample a full basis state without collapsing.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> usize {
        let r: f64 = rng.r#gen();
        let mut cumulative = 0.0;
        for (i, amp) in self.amplitudes.iter().enumerate() {
            cumulative += amp.norm_sqr();
            if r < cumulative {
                return i;
            }
        }
        // Rounding can leave the total just below 1.
        self.amplitudes.len() - 1
    }

    // =========================================================================
    // Gate kernels
    // =========================================================================

    fn apply_controlled(&mut self, controls: &[usize], gate: impl FnOnce(&mut Self)) {
        let mask = controls.iter().fold(0usize, |m, &c| m | (1 << c));
        let saved = self.amplitudes.clone();
        gate(self);
        for (i, amp) in self.amplitudes.iter_mut().enumerate() {
            if i & mask != mask {
                *amp = saved[i];
            }
        }
    }

    fn apply_single(&mut self, qubit: usize, m: [[Complex64; 2]; 2]) {
        let mask = 1 << qubit;
        for i in 0..(1 << self.num_qubits) {
            if i & mask == 0 {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = m[0][0] * a + m[0][1] * b;
                self.amplitudes[j] = m[1][0] * a + m[1][1] * b;
            }
        }
    }

    fn apply_x(&mut self, qubit: usize) {
        let mask = 1 << qubit;
        for i in 0..(1 << self.num_qubits) {
            if i & mask == 0 {
                self.amplitudes.swap(i, i | mask);
            }
        }
    }

    fn apply_y(&mut self, qubit: usize) {
        let zero = Complex64::new(0.0, 0.0);
        let i_val = Complex64::new(0.0, 1.0);
        self.apply_single(qubit, [[zero, -i_val], [i_val, zero]]);
    }

    fn apply_h(&mut self, qubit: usize) {
        let h = Complex64::new(1.0 / 2.0_f64.sqrt(), 0.0);
        self.apply_single(qubit, [[h, h], [h, -h]]);
    }

    fn apply_phase(&mut self, qubit: usize, theta: f64) {
        let mask = 1 << qubit;
        let phase = Complex64::from_polar(1.0, theta);
        for (i, amp) in self.amplitudes.iter_mut().enumerate() {
            if i & mask != 0 {
                *amp *= phase;
            }
        }
    }

    fn apply_rx(&mut self, qubit: usize, theta: f64) {
        let c = Complex64::new((theta / 2.0).cos(), 0.0);
        let s = Complex64::new(0.0, -(theta / 2.0).sin());
        self.apply_single(qubit, [[c, s], [s, c]]);
    }

    fn apply_ry(&mut self, qubit: usize, theta: f64) {
        let c = Complex64::new((theta / 2.0).cos(), 0.0);
        let s = Complex64::new((theta / 2.0).sin(), 0.0);
        self.apply_single(qubit, [[c, -s], [s, c]]);
    }

    fn apply_rz(&mut self, qubit: usize, theta: f64) {
        let zero = Complex64::new(0.0, 0.0);
        let p0 = Complex64::from_polar(1.0, -theta / 2.0);
        let p1 = Complex64::from_polar(1.0, theta / 2.0);
        self.apply_single(qubit, [[p0, zero], [zero, p1]]);
    }

    fn apply_u(&mut self, qubit: usize, theta: f64, phi: f64, lambda: f64) {
        let c = (theta / 2.0).cos();
        let s = (theta / 2.0).sin();
        self.apply_single(
            qubit,
            [
                [
                    Complex64::new(c, 0.0),
                    -Complex64::from_polar(s, lambda),
                ],
                [
                    Complex64::from_polar(s, phi),
                    Complex64::from_polar(c, phi + lambda),
                ],
            ],
        );
    }

    fn apply_swap(&mut self, q1: usize, q2: usize) {
        let mask1 = 1 << q1;
        let mask2 = 1 << q2;
        for i in 0..(1 << self.num_qubits) {
            if i & mask1 != 0 && i & mask2 == 0 {
                let j = (i & !mask1) | mask2;
                self.amplitudes.swap(i, j);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn approx_eq(a: Complex64, b: Complex64) -> bool {
        (a - b).norm() < 1e-10
    }

    #[test]
    fn test_initial_state() {
        let sv = Statevector::new(2);
        assert!(approx_eq(sv.amplitudes[0], Complex64::new(1.0, 0.0)));
        assert!(sv.amplitudes[1..].iter().all(|a| a.norm() < 1e-12));
    }

    #[test]
    fn test_bell_state() {
        let mut sv = Statevector::new(2);
        sv.apply_gate(&Gate::H, &[0]);
        sv.apply_gate(&Gate::CX, &[0, 1]);

        let sqrt2_inv = 1.0 / 2.0_f64.sqrt();
        assert!(approx_eq(sv.amplitudes[0], Complex64::new(sqrt2_inv, 0.0)));
        assert!(approx_eq(sv.amplitudes[1], Complex64::new(0.0, 0.0)));
        assert!(approx_eq(sv.amplitudes[2], Complex64::new(0.0, 0.0)));
        assert!(approx_eq(sv.amplitudes[3], Complex64::new(sqrt2_inv, 0.0)));
    }

    #[test]
    fn test_toffoli_needs_both_controls() {
        let mut sv = Statevector::new(3);
        sv.apply_gate(&Gate::X, &[0]);
        sv.apply_gate(&Gate::CCX, &[0, 1, 2]);
        assert!(approx_eq(sv.amplitudes[0b001], Complex64::new(1.0, 0.0)));

        sv.apply_gate(&Gate::X, &[1]);
        sv.apply_gate(&Gate::CCX, &[0, 1, 2]);
        assert!(approx_eq(sv.amplitudes[0b111], Complex64::new(1.0, 0.0)));
    }

    #[test]
    fn test_rx_pi_flips() {
        let mut sv = Statevector::new(1);
        sv.apply_gate(&Gate::Rx(PI), &[0]);
        assert!((sv.probability_one(0) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_measure_collapses() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut sv = Statevector::new(2);
        sv.apply_gate(&Gate::H, &[0]);
        sv.apply_gate(&Gate::CX, &[0, 1]);
        let first = sv.measure(0, &mut rng);
        // The partner qubit is now determined.
        let p1 = sv.probability_one(1);
        assert!((p1 - if first { 1.0 } else { 0.0 }).abs() < 1e-10);
    }

    #[test]
    fn test_reset_returns_to_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut sv = Statevector::new(1);
        sv.apply_gate(&Gate::H, &[0]);
        sv.apply(&Instruction::reset(qpilot_ir::QubitId(0)), &mut rng);
        assert!(sv.probability_one(0) < 1e-10);
    }

    #[test]
    fn test_sample_deterministic() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut sv = Statevector::new(1);
        sv.apply_gate(&Gate::X, &[0]);
        for _ in 0..100 {
            assert_eq!(sv.sample(&mut rng), 1);
        }
    }
}
