//! Persisted records: deployments, jobs, devices, providers and transient state.
//!
//! The job state machine:
//!
//! ```text
//!   create ──→ READY ──→ RUNNING ──→ FINISHED
//!               │  ↑        │
//!               │  │        ├──→ ERROR
//!               ↓  │        │
//!             BLOCKED       └──→ CANCELED ←── READY
//! ```
//!
//! FINISHED, ERROR and CANCELED are terminal: [`Job::transition`] refuses to
//! leave them. Only an explicit [`Job::reset`] (a rerun) starts over.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an identifier from its string form.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a [`Job`].
    JobId
);
uuid_id!(
    /// Identifier of a [`Deployment`].
    DeploymentId
);
uuid_id!(
    /// Identifier of a [`QuantumProgram`].
    ProgramId
);
uuid_id!(
    /// Identifier of a [`TransientState`] entry.
    TransientStateId
);

/// Language a stored program is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssemblerLanguage {
    Qasm2,
    Qasm3,
    IrJson,
    Quil,
    Python,
}

impl AssemblerLanguage {
    /// Tag used to look up a preprocessor.
    pub fn tag(self) -> &'static str {
        match self {
            AssemblerLanguage::Qasm2 => "QASM2",
            AssemblerLanguage::Qasm3 => "QASM3",
            AssemblerLanguage::IrJson => "IR_JSON",
            AssemblerLanguage::Quil => "QUIL",
            AssemblerLanguage::Python => "PYTHON",
        }
    }

    /// Format of the value preprocessing produces for this language.
    pub fn format(self) -> &'static str {
        use qpilot_transpile::formats;
        match self {
            AssemblerLanguage::Qasm2 | AssemblerLanguage::Python => formats::QASM2,
            AssemblerLanguage::Qasm3 => formats::QASM3,
            AssemblerLanguage::IrJson => formats::IR,
            AssemblerLanguage::Quil => formats::QUIL,
        }
    }
}

impl fmt::Display for AssemblerLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for AssemblerLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "QASM2" => Ok(AssemblerLanguage::Qasm2),
            "QASM3" => Ok(AssemblerLanguage::Qasm3),
            "IR_JSON" => Ok(AssemblerLanguage::IrJson),
            "QUIL" => Ok(AssemblerLanguage::Quil),
            "PYTHON" => Ok(AssemblerLanguage::Python),
            other => Err(format!("unknown assembler language: {other}")),
        }
    }
}

/// One stored program of a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantumProgram {
    pub id: ProgramId,
    pub quantum_circuit: String,
    pub assembler_language: AssemblerLanguage,
}

impl QuantumProgram {
    /// Create a program with a fresh id.
    pub fn new(quantum_circuit: impl Into<String>, assembler_language: AssemblerLanguage) -> Self {
        Self {
            id: ProgramId::new(),
            quantum_circuit: quantum_circuit.into(),
            assembler_language,
        }
    }
}

/// A named bundle of programs, executed in order by every job referencing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub name: String,
    pub owner: Option<String>,
    pub programs: Vec<QuantumProgram>,
    pub deployed_at: DateTime<Utc>,
}

impl Deployment {
    /// Create a deployment with a fresh id.
    pub fn new(name: impl Into<String>, programs: Vec<QuantumProgram>) -> Self {
        Self {
            id: DeploymentId::new(),
            name: name.into(),
            owner: None,
            programs,
            deployed_at: Utc::now(),
        }
    }

    /// Set the owner.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Replace the programs and bump `deployed_at`.
    pub fn update_programs(&mut self, programs: Vec<QuantumProgram>) {
        self.programs = programs;
        self.deployed_at = Utc::now();
    }
}

/// What a job asks the pilot to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    /// Run circuits and return counts.
    #[default]
    Runner,
    /// Return a quasi-probability distribution.
    Sampler,
    /// Return an expectation value and variance.
    Estimator,
    /// Vendor-specific program upload.
    IbmUpload,
    /// Vendor-specific run of an uploaded program.
    IbmRun,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobType::Runner => "RUNNER",
            JobType::Sampler => "SAMPLER",
            JobType::Estimator => "ESTIMATOR",
            JobType::IbmUpload => "IBM_UPLOAD",
            JobType::IbmRun => "IBM_RUN",
        };
        f.write_str(s)
    }
}

/// Error mitigation requested for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorMitigation {
    #[default]
    None,
    ReadoutMitigation,
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Ready,
    Running,
    Finished,
    Error,
    Canceled,
    Blocked,
}

impl JobState {
    /// Whether the state is final.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Finished | JobState::Error | JobState::Canceled
        )
    }

    /// Whether `self → to` is allowed.
    ///
    /// Terminal states are permanent and READY is only re-entered from the
    /// BLOCKED hold. A RUNNING job cannot be started again.
    pub fn can_transition_to(self, to: JobState) -> bool {
        match (self, to) {
            (from, _) if from.is_terminal() => false,
            (JobState::Blocked | JobState::Ready, JobState::Ready) => true,
            (_, JobState::Ready) => false,
            (JobState::Running, JobState::Running) => false,
            _ => true,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Ready => "READY",
            JobState::Running => "RUNNING",
            JobState::Finished => "FINISHED",
            JobState::Error => "ERROR",
            JobState::Canceled => "CANCELED",
            JobState::Blocked => "BLOCKED",
        };
        f.write_str(s)
    }
}

/// A request to execute a deployment on a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub executed_by: Option<String>,
    pub device: String,
    pub deployment_id: Option<DeploymentId>,
    pub shots: u32,
    pub job_type: JobType,
    pub error_mitigation: ErrorMitigation,
    pub state: JobState,
    pub progress: u8,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a READY runner job.
    pub fn new(
        name: impl Into<String>,
        device: impl Into<String>,
        deployment_id: Option<DeploymentId>,
        shots: u32,
    ) -> Self {
        Self {
            id: JobId::new(),
            name: name.into(),
            executed_by: None,
            device: device.into(),
            deployment_id,
            shots,
            job_type: JobType::Runner,
            error_mitigation: ErrorMitigation::None,
            state: JobState::Ready,
            progress: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Set the job type.
    pub fn with_type(mut self, job_type: JobType) -> Self {
        self.job_type = job_type;
        self
    }

    /// Set the error mitigation.
    pub fn with_error_mitigation(mut self, mitigation: ErrorMitigation) -> Self {
        self.error_mitigation = mitigation;
        self
    }

    /// Set the submitting user.
    pub fn with_executed_by(mut self, user: impl Into<String>) -> Self {
        self.executed_by = Some(user.into());
        self
    }

    /// Move to `to`, stamping completion on terminal states.
    pub fn transition(&mut self, to: JobState) -> CoreResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(CoreError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        if to.is_terminal() {
            self.progress = 100;
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Start over from READY, as for a rerun. `started_at` is kept.
    pub fn reset(&mut self) {
        self.state = JobState::Ready;
        self.progress = 0;
        self.finished_at = None;
    }
}

/// Pilot-owned tracking data for in-flight remote work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransientState {
    pub id: TransientStateId,
    pub job_id: JobId,
    pub program_id: Option<ProgramId>,
    pub circuit_fragment_id: Option<String>,
    /// Tag of the pilot tracking scheme that owns this entry.
    pub scheme: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TransientState {
    /// Create an entry stamped now.
    pub fn new(
        job_id: JobId,
        program_id: Option<ProgramId>,
        scheme: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: TransientStateId::new(),
            job_id,
            program_id,
            circuit_fragment_id: None,
            scheme: scheme.into(),
            data,
            created_at: Utc::now(),
        }
    }
}

/// A backend target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub provider: String,
    pub num_qubits: u32,
    pub is_simulator: bool,
    pub is_local: bool,
}

/// A vendor, served by exactly one pilot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    /// Whether jobs need a user token.
    pub with_token: bool,
    pub supported_languages: Vec<AssemblerLanguage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_are_permanent() {
        let mut job = Job::new("j", "dev", None, 10);
        job.transition(JobState::Running).unwrap();
        job.transition(JobState::Finished).unwrap();
        assert_eq!(job.progress, 100);
        assert!(job.finished_at.is_some());

        for to in [JobState::Running, JobState::Error, JobState::Canceled] {
            assert!(matches!(
                job.transition(to),
                Err(CoreError::InvalidTransition { from: JobState::Finished, .. })
            ));
        }
        assert_eq!(job.state, JobState::Finished);
    }

    #[test]
    fn test_ready_only_from_hold() {
        assert!(JobState::Blocked.can_transition_to(JobState::Ready));
        assert!(!JobState::Running.can_transition_to(JobState::Ready));
        assert!(JobState::Ready.can_transition_to(JobState::Canceled));
        assert!(JobState::Ready.can_transition_to(JobState::Blocked));
    }

    #[test]
    fn test_running_job_cannot_start_again() {
        let mut job = Job::new("j", "dev", None, 10);
        job.transition(JobState::Running).unwrap();
        assert!(matches!(
            job.transition(JobState::Running),
            Err(CoreError::InvalidTransition {
                from: JobState::Running,
                to: JobState::Running
            })
        ));
        assert!(JobState::Blocked.can_transition_to(JobState::Running));
    }

    #[test]
    fn test_reset_keeps_started_at() {
        let mut job = Job::new("j", "dev", None, 10);
        let started = job.started_at;
        job.transition(JobState::Running).unwrap();
        job.transition(JobState::Error).unwrap();
        job.reset();
        assert_eq!(job.state, JobState::Ready);
        assert_eq!(job.progress, 0);
        assert!(job.finished_at.is_none());
        assert_eq!(job.started_at, started);
    }

    #[test]
    fn test_language_formats() {
        assert_eq!(AssemblerLanguage::Python.format(), "QASM2");
        assert_eq!(AssemblerLanguage::IrJson.format(), "IR");
        assert_eq!(AssemblerLanguage::IrJson.tag(), "IR_JSON");
        assert_eq!("qasm3".parse::<AssemblerLanguage>(), Ok(AssemblerLanguage::Qasm3));
        assert!("brainfuck".parse::<AssemblerLanguage>().is_err());
    }

    #[test]
    fn test_serde_uses_upper_case_tags() {
        let json = serde_json::to_string(&JobType::IbmUpload).unwrap();
        assert_eq!(json, "\"IBM_UPLOAD\"");
        let state: JobState = serde_json::from_str("\"CANCELED\"").unwrap();
        assert_eq!(state, JobState::Canceled);
    }

    #[test]
    fn test_update_programs_bumps_deployed_at() {
        let mut dep = Deployment::new("d", vec![]);
        let before = dep.deployed_at;
        dep.update_programs(vec![QuantumProgram::new("x", AssemblerLanguage::Qasm2)]);
        assert_eq!(dep.programs.len(), 1);
        assert!(dep.deployed_at >= before);
    }
}
