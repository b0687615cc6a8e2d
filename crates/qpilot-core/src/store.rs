//! Persistence contract.
//!
//! The store is the single source of truth shared by the dispatcher, the
//! result watcher and pilots. Every method is one atomic commit: once it
//! returns, any later reader observes the write.

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::model::{
    Deployment, DeploymentId, Device, Job, JobId, JobState, ProgramId, Provider,
    TransientState, TransientStateId,
};
use crate::result::JobResult;

/// Criteria for [`JobStore::list_jobs`]; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub state: Option<JobState>,
    pub deployment_id: Option<DeploymentId>,
    pub executed_by: Option<String>,
}

impl JobFilter {
    /// Match any job.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one state.
    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = Some(state);
        self
    }

    /// Restrict to one deployment.
    pub fn with_deployment(mut self, id: DeploymentId) -> Self {
        self.deployment_id = Some(id);
        self
    }

    /// Restrict to one submitting user.
    pub fn with_executed_by(mut self, user: impl Into<String>) -> Self {
        self.executed_by = Some(user.into());
        self
    }

    /// Whether `job` satisfies every set criterion.
    pub fn matches(&self, job: &Job) -> bool {
        self.state.is_none_or(|s| job.state == s)
            && self
                .deployment_id
                .is_none_or(|d| job.deployment_id == Some(d))
            && self
                .executed_by
                .as_ref()
                .is_none_or(|u| job.executed_by.as_ref() == Some(u))
    }
}

/// Storage for every record the control plane persists.
#[async_trait]
pub trait JobStore: Send + Sync {
    // Jobs

    /// Insert or replace a job.
    async fn save_job(&self, job: &Job) -> CoreResult<()>;

    /// Load a job.
    async fn load_job(&self, id: JobId) -> CoreResult<Option<Job>>;

    /// Apply [`Job::transition`] and persist the result in one commit.
    ///
    /// Fails with `NotFound` for an unknown job and `InvalidTransition`
    /// (leaving the stored job unchanged) for a forbidden move.
    async fn transition_job(&self, id: JobId, to: JobState) -> CoreResult<Job>;

    /// Jobs matching a filter, oldest first.
    async fn list_jobs(&self, filter: &JobFilter) -> CoreResult<Vec<Job>>;

    // Deployments

    /// Insert or replace a deployment.
    async fn save_deployment(&self, deployment: &Deployment) -> CoreResult<()>;

    /// Load a deployment.
    async fn load_deployment(&self, id: DeploymentId) -> CoreResult<Option<Deployment>>;

    /// Find a deployment by name.
    async fn find_deployment(&self, name: &str) -> CoreResult<Option<Deployment>>;

    /// Delete a deployment no job references.
    ///
    /// Returns whether it existed; fails with `DeploymentInUse` otherwise.
    async fn delete_deployment(&self, id: DeploymentId) -> CoreResult<bool>;

    // Devices and providers

    /// Insert or replace a provider, keyed by name.
    async fn upsert_provider(&self, provider: &Provider) -> CoreResult<()>;

    /// Load a provider by name.
    async fn load_provider(&self, name: &str) -> CoreResult<Option<Provider>>;

    /// All providers, sorted by name.
    async fn list_providers(&self) -> CoreResult<Vec<Provider>>;

    /// Insert or replace a device, keyed by name.
    async fn upsert_device(&self, device: &Device) -> CoreResult<()>;

    /// Load a device by name.
    async fn load_device(&self, name: &str) -> CoreResult<Option<Device>>;

    /// All devices, sorted by name.
    async fn list_devices(&self) -> CoreResult<Vec<Device>>;

    // Results

    /// Replace every result of a job.
    async fn replace_results(&self, job_id: JobId, results: Vec<JobResult>) -> CoreResult<()>;

    /// Append results to a job.
    async fn append_results(&self, job_id: JobId, results: Vec<JobResult>) -> CoreResult<()>;

    /// Results of a job in insertion order.
    async fn load_results(&self, job_id: JobId) -> CoreResult<Vec<JobResult>>;

    /// Stably reorder a job's results by the position of their program in
    /// `programs`. Results of other programs or of no program go last.
    async fn order_results(&self, job_id: JobId, programs: &[ProgramId]) -> CoreResult<()>;

    // Transient state

    /// Insert or replace a transient entry.
    async fn save_transient(&self, entry: &TransientState) -> CoreResult<()>;

    /// Entries of a job, optionally restricted to one scheme, oldest first.
    async fn list_transient(
        &self,
        job_id: JobId,
        scheme: Option<&str>,
    ) -> CoreResult<Vec<TransientState>>;

    /// Delete an entry, returning whether it was still present.
    async fn delete_transient(&self, id: TransientStateId) -> CoreResult<bool>;
}
