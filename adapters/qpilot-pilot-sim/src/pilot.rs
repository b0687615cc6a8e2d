//! The local simulator pilot.

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use tracing::{debug, instrument};

use qpilot_core::normalize::{counts_result, quasi_dist_result};
use qpilot_core::{
    AssemblerLanguage, CoreError, CoreResult, Deployment, Device, ErrorMitigation, Job,
    JobResult, JobType, Pilot, PilotContext, PilotOutcome, PreparedProgram, Provider,
    QuantumProgram, StandardJob,
};
use qpilot_transpile::formats;

use crate::simulator::sample_circuit;

/// Provider served by [`SimulatorPilot`].
pub const PROVIDER: &str = "LOCAL";

/// Name of the simulator device.
pub const DEVICE: &str = "local-sim";

const BELL_QASM: &str = "OPENQASM 2.0;
include \"qelib1.inc\";
qreg q[2];
creg c[2];
h q[0];
cx q[0],q[1];
measure q[0] -> c[0];
measure q[1] -> c[1];
";

/// Runs jobs synchronously on a statevector simulator.
///
/// Runner jobs yield COUNTS, Sampler jobs QUASI_DIST and Estimator jobs the
/// VALUE_AND_VARIANCE of the all-Z parity of the measured qubits.
#[derive(Debug, Clone)]
pub struct SimulatorPilot {
    max_qubits: u32,
    seed: Option<u64>,
}

impl SimulatorPilot {
    /// Create a simulator pilot with default settings.
    pub fn new() -> Self {
        Self {
            max_qubits: 20,
            seed: None,
        }
    }

    /// Limit the circuit width.
    pub fn with_max_qubits(mut self, max_qubits: u32) -> Self {
        self.max_qubits = max_qubits;
        self
    }

    /// Make sampling reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn max_qubits(&self) -> u32 {
        self.max_qubits
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Simulate every program; per-program failures become ERROR results.
    #[instrument(skip(self, job, programs), fields(job_id = %job.id, job_type = %job.job_type))]
    fn execute(&self, job: &Job, programs: &[PreparedProgram]) -> CoreResult<Vec<JobResult>> {
        if job.error_mitigation != ErrorMitigation::None {
            return Err(CoreError::Unsupported(format!(
                "error mitigation {:?} on provider {PROVIDER}",
                job.error_mitigation
            )));
        }
        if job.shots == 0 {
            return Err(CoreError::Backend("shots must be positive".to_string()));
        }

        let mut rng = self.rng();
        let results = programs
            .iter()
            .map(|program| {
                self.simulate(job, program, &mut rng)
                    .unwrap_or_else(|e| JobResult::error(job.id, Some(program.program_id), &e))
            })
            .collect();
        Ok(results)
    }

    fn simulate(
        &self,
        job: &Job,
        program: &PreparedProgram,
        rng: &mut StdRng,
    ) -> CoreResult<JobResult> {
        let circuit = program
            .data
            .clone()
            .into_ir()
            .map_err(|e| CoreError::Backend(format!("simulator input: {e}")))?;
        if circuit.num_qubits() > self.max_qubits as usize {
            return Err(CoreError::Backend(format!(
                "Circuit has {} qubits but simulator only supports {}",
                circuit.num_qubits(),
                self.max_qubits
            )));
        }

        let sampled = sample_circuit(&circuit, job.shots, rng);
        debug!(
            program = %program.program_id,
            outcomes = sampled.counts.len(),
            "Simulated program"
        );
        let pid = Some(program.program_id);
        match job.job_type {
            JobType::Runner => counts_result(
                job.id,
                pid,
                sampled.counts.iter().map(|(k, n)| (k.clone(), *n)),
                &sampled.registers,
            ),
            JobType::Sampler => quasi_dist_result(
                job.id,
                pid,
                sampled.probabilities(),
                &sampled.registers,
                u64::from(sampled.shots),
            ),
            JobType::Estimator => {
                let (value, variance) = sampled.parity_expectation();
                Ok(JobResult::value_and_variance(
                    job.id,
                    pid,
                    value,
                    variance,
                    json!({
                        "observable": "Z".repeat(sampled.measured_qubits),
                        "shots": sampled.shots,
                    }),
                ))
            }
            other => Err(CoreError::Unsupported(format!(
                "job type {other} on provider {PROVIDER}"
            ))),
        }
    }
}

impl Default for SimulatorPilot {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pilot for SimulatorPilot {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn supported_formats(&self) -> &[&'static str] {
        &[formats::IR]
    }

    async fn run(
        &self,
        job: &Job,
        programs: &[PreparedProgram],
        _ctx: &PilotContext,
    ) -> CoreResult<PilotOutcome> {
        Ok(PilotOutcome::Completed(self.execute(job, programs)?))
    }

    async fn execute_provider_specific(
        &self,
        job: &Job,
        programs: &[PreparedProgram],
        _ctx: &PilotContext,
    ) -> CoreResult<PilotOutcome> {
        match job.job_type {
            JobType::Sampler | JobType::Estimator => {
                Ok(PilotOutcome::Completed(self.execute(job, programs)?))
            }
            other => Err(CoreError::Unsupported(format!(
                "job type {other} on provider {PROVIDER}"
            ))),
        }
    }

    async fn is_device_available(&self, _device: &Device, _token: Option<&str>) -> CoreResult<bool> {
        Ok(true)
    }

    fn standard_provider(&self) -> Provider {
        Provider {
            name: PROVIDER.to_string(),
            with_token: false,
            supported_languages: vec![
                AssemblerLanguage::Qasm2,
                AssemblerLanguage::Qasm3,
                AssemblerLanguage::IrJson,
                AssemblerLanguage::Python,
            ],
        }
    }

    fn standard_devices(&self) -> Vec<Device> {
        vec![Device {
            name: DEVICE.to_string(),
            provider: PROVIDER.to_string(),
            num_qubits: self.max_qubits,
            is_simulator: true,
            is_local: true,
        }]
    }

    fn standard_job_with_deployment(&self, device: &Device) -> Option<StandardJob> {
        let deployment = Deployment::new(
            format!("{}-bell", device.name),
            vec![QuantumProgram::new(BELL_QASM, AssemblerLanguage::Qasm2)],
        );
        let job = Job::new(
            format!("{} bell", device.name),
            device.name.clone(),
            Some(deployment.id),
            1024,
        );
        Some(StandardJob { deployment, job })
    }
}
