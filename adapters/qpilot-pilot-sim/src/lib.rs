//! qpilot Local Statevector Simulator
//!
//! A synchronous pilot for the `LOCAL` provider. Programs arrive as IR,
//! are simulated on a full statevector and sampled; results are returned
//! directly from [`Pilot::run`](qpilot_core::Pilot::run), so no transient
//! state is ever recorded.
//!
//! # Job types
//!
//! | Job type | Result |
//! |----------|--------|
//! | `RUNNER` | `COUNTS` with derived probabilities |
//! | `SAMPLER` | `QUASI_DIST` from the empirical distribution |
//! | `ESTIMATOR` | `VALUE_AND_VARIANCE` of the all-Z parity of measured qubits |
//!
//! Error mitigation is not supported.
//!
//! # Performance
//!
//! | Qubits | Memory |
//! |--------|--------|
//! | 10 | ~16 KB |
//! | 15 | ~512 KB |
//! | 20 | ~16 MB |
//! | 25 | ~512 MB |
//!
//! Circuits with measurements only at the end are simulated once and
//! sampled; mid-circuit measurements and resets are simulated per shot.
//!
//! # Example
//!
//! ```ignore
//! use qpilot_pilot_sim::SimulatorPilot;
//! use qpilot_sched::PilotRegistry;
//!
//! let pilots = PilotRegistry::new().with(Arc::new(SimulatorPilot::new().with_seed(7)))?;
//! ```

mod pilot;
mod simulator;
mod statevector;

pub use pilot::{DEVICE, PROVIDER, SimulatorPilot};
