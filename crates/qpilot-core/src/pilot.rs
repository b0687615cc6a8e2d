//! The pilot contract: one backend adapter per provider.
//!
//! A pilot receives programs already converted into one of its
//! [`supported_formats`](Pilot::supported_formats) and either returns
//! results inline or submits remote work, records [`TransientState`] under
//! its [`transient_scheme`](Pilot::transient_scheme), and later answers
//! [`poll`](Pilot::poll) for each entry.
//!
//! | Method | Kind | Default |
//! |--------|------|---------|
//! | `provider()` | sync | required |
//! | `supported_formats()` | sync | required |
//! | `transient_scheme()` | sync | `None` |
//! | `run()` | async | required |
//! | `execute_provider_specific()` | async | `Unsupported` |
//! | `cancel_provider_specific()` | async | `Unsupported` |
//! | `poll()` | async | `Unsupported` |
//! | `is_device_available()` | async | required |
//! | `standard_provider()` / `standard_devices()` | sync | required |
//! | `standard_job_with_deployment()` | sync | `None` |

use std::sync::Arc;

use async_trait::async_trait;
use qpilot_transpile::CircuitData;

use crate::error::{CoreError, CoreResult};
use crate::model::{Deployment, Device, Job, ProgramId, Provider, TransientState};
use crate::result::JobResult;
use crate::store::JobStore;

/// A program converted into a format the pilot accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedProgram {
    pub program_id: ProgramId,
    /// One of the pilot's supported formats.
    pub format: String,
    pub data: CircuitData,
}

/// What the pilot needs from its surroundings during a call.
#[derive(Clone)]
pub struct PilotContext {
    /// Where transient state is recorded.
    pub store: Arc<dyn JobStore>,
    /// User token for providers that require one.
    pub token: Option<String>,
}

impl PilotContext {
    /// Context without a token.
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store, token: None }
    }

    /// Attach a user token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl std::fmt::Debug for PilotContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PilotContext")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

/// Result of [`Pilot::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum PilotOutcome {
    /// Results are available now, one or more per program in order.
    Completed(Vec<JobResult>),
    /// Work was submitted; transient state has been persisted.
    Submitted,
}

/// Remote status of one transient entry.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Still queued or running; ask again later.
    Pending,
    /// Finished; canonical results for the entry.
    Done(Vec<JobResult>),
    /// The remote side reported a terminal failure.
    Failed { message: String },
    /// The remote side answered with something unrecognized.
    Unknown { raw: serde_json::Value },
}

/// A seed deployment and a job that runs it on the pilot's device.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardJob {
    pub deployment: Deployment,
    pub job: Job,
}

/// Backend adapter for one provider.
#[async_trait]
pub trait Pilot: Send + Sync {
    /// Provider name this pilot serves.
    fn provider(&self) -> &str;

    /// Formats `run` accepts, most preferred first.
    fn supported_formats(&self) -> &[&'static str];

    /// Tag of the transient entries this pilot records, if it runs remotely.
    fn transient_scheme(&self) -> Option<&str> {
        None
    }

    /// Execute a runner job.
    async fn run(
        &self,
        job: &Job,
        programs: &[PreparedProgram],
        ctx: &PilotContext,
    ) -> CoreResult<PilotOutcome>;

    /// Execute any job type other than `Runner`.
    async fn execute_provider_specific(
        &self,
        job: &Job,
        _programs: &[PreparedProgram],
        _ctx: &PilotContext,
    ) -> CoreResult<PilotOutcome> {
        Err(CoreError::Unsupported(format!(
            "job type {} on provider {}",
            job.job_type,
            self.provider()
        )))
    }

    /// Cancel a running job remotely.
    async fn cancel_provider_specific(&self, _job: &Job, _ctx: &PilotContext) -> CoreResult<()> {
        Err(CoreError::Unsupported(format!(
            "cancellation on provider {}",
            self.provider()
        )))
    }

    /// Query the remote status of one transient entry.
    async fn poll(&self, entry: &TransientState, _ctx: &PilotContext) -> CoreResult<PollOutcome> {
        Err(CoreError::Unsupported(format!(
            "polling scheme {} on provider {}",
            entry.scheme,
            self.provider()
        )))
    }

    /// Whether the device can take work right now.
    async fn is_device_available(&self, device: &Device, token: Option<&str>) -> CoreResult<bool>;

    /// Seed provider row.
    fn standard_provider(&self) -> Provider;

    /// Seed device rows.
    fn standard_devices(&self) -> Vec<Device>;

    /// Seed deployment and job, if the pilot has one.
    fn standard_job_with_deployment(&self, _device: &Device) -> Option<StandardJob> {
        None
    }
}
