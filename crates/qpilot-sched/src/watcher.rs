//! Reconciliation of remotely executing jobs.
//!
//! A pilot that submits work records one [`TransientState`] per program
//! under its scheme. Each reconciliation pass polls every entry, removes the
//! ones that reached a final remote status and only then appends their
//! results. A reader deriving "still running" from "entries remain" never
//! sees a job that already has final results.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use qpilot_core::{
    CoreError, Job, JobId, JobResult, JobState, JobStore, Pilot, PilotContext, PollOutcome,
    TransientState,
};
use tracing::{debug, info, instrument, warn};

use crate::error::{SchedError, SchedResult};
use crate::registry::PilotRegistry;

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Entries remain; try again later.
    Pending,
    /// No entries remain; the job is in this state.
    Done(JobState),
}

/// Derived state of a job given how many tracking entries it still has.
///
/// A RUNNING job with no remaining entries counts as FINISHED even before
/// the transition is recorded.
pub fn effective_state(job: &Job, remaining_markers: usize) -> JobState {
    match job.state {
        JobState::Running if remaining_markers == 0 => JobState::Finished,
        state => state,
    }
}

/// Polls pilot transient state and settles jobs.
#[derive(Clone)]
pub struct ResultWatcher {
    store: Arc<dyn JobStore>,
    pilots: Arc<PilotRegistry>,
    stale_after: Duration,
}

/// What to do with one entry after polling it.
struct Settled {
    entry: TransientState,
    results: Vec<JobResult>,
}

impl ResultWatcher {
    /// Create a watcher discarding entries older than `stale_after`.
    pub fn new(store: Arc<dyn JobStore>, pilots: Arc<PilotRegistry>, stale_after: Duration) -> Self {
        Self {
            store,
            pilots,
            stale_after,
        }
    }

    /// Run one pass without a user token.
    pub async fn reconcile(&self, job_id: JobId) -> SchedResult<WatchOutcome> {
        let ctx = PilotContext::new(Arc::clone(&self.store));
        self.reconcile_with(job_id, &ctx).await
    }

    /// Run one pass.
    ///
    /// Safe to run concurrently or repeatedly for the same job: an entry
    /// another pass already removed contributes no results.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn reconcile_with(
        &self,
        job_id: JobId,
        ctx: &PilotContext,
    ) -> SchedResult<WatchOutcome> {
        let Some((job, pilot)) = self.running(job_id).await? else {
            return self.current(job_id).await;
        };
        let Some(scheme) = pilot.transient_scheme() else {
            return self.settle(&job, 0).await;
        };

        let entries = self.store.list_transient(job_id, Some(scheme)).await?;
        let mut settled = Vec::new();
        let mut pending = 0usize;
        for entry in entries {
            match self.check(pilot.as_ref(), &job, entry, ctx).await {
                Some(s) => settled.push(s),
                None => pending += 1,
            }
        }
        debug!(pending, settled = settled.len(), "Polled transient state");
        self.commit(&job, scheme, settled).await
    }

    /// Give up on a job whose watch ran out of time.
    ///
    /// Every remaining entry is settled with an ERROR result without polling,
    /// so the job always reaches a terminal state.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn expire(&self, job_id: JobId, timeout: Duration) -> SchedResult<WatchOutcome> {
        let Some((job, pilot)) = self.running(job_id).await? else {
            return self.current(job_id).await;
        };
        let Some(scheme) = pilot.transient_scheme() else {
            return self.settle(&job, 0).await;
        };

        let entries = self.store.list_transient(job_id, Some(scheme)).await?;
        warn!(entries = entries.len(), ?timeout, "Watch timed out, abandoning remote work");
        let settled = entries
            .into_iter()
            .map(|entry| {
                abandoned(
                    &job,
                    entry,
                    format!(
                        "Remote execution was still pending when the watch stopped after {}s",
                        timeout.as_secs()
                    ),
                )
            })
            .collect();
        self.commit(&job, scheme, settled).await
    }

    /// The job and its pilot, or `None` once the job is terminal.
    async fn running(&self, job_id: JobId) -> SchedResult<Option<(Job, Arc<dyn Pilot>)>> {
        let job = self
            .store
            .load_job(job_id)
            .await?
            .ok_or(SchedError::JobNotFound(job_id))?;
        if job.state.is_terminal() {
            debug!(state = %job.state, "Job already settled");
            return Ok(None);
        }
        let device = self
            .store
            .load_device(&job.device)
            .await?
            .ok_or_else(|| SchedError::DeviceNotFound(job.device.clone()))?;
        let pilot = self.pilots.resolve(&device.provider)?;
        Ok(Some((job, pilot)))
    }

    async fn current(&self, job_id: JobId) -> SchedResult<WatchOutcome> {
        let job = self
            .store
            .load_job(job_id)
            .await?
            .ok_or(SchedError::JobNotFound(job_id))?;
        Ok(WatchOutcome::Done(job.state))
    }

    /// Delete settled entries, then append their results and settle the job
    /// once no entries of `scheme` remain.
    async fn commit(
        &self,
        job: &Job,
        scheme: &str,
        settled: Vec<Settled>,
    ) -> SchedResult<WatchOutcome> {
        // All deletions commit before any result is appended.
        let mut results = Vec::new();
        for s in settled {
            if self.store.delete_transient(s.entry.id).await? {
                results.extend(s.results);
            } else {
                debug!(entry = %s.entry.id, "Entry already reconciled elsewhere");
            }
        }
        if !results.is_empty() {
            self.store.append_results(job.id, results).await?;
        }

        let remaining = self.store.list_transient(job.id, Some(scheme)).await?.len();
        debug!(remaining, "Reconciliation pass complete");
        if remaining > 0 {
            return Ok(WatchOutcome::Pending);
        }
        self.settle(job, remaining).await
    }

    /// Poll one entry; `None` means keep it.
    async fn check(
        &self,
        pilot: &dyn Pilot,
        job: &Job,
        entry: TransientState,
        ctx: &PilotContext,
    ) -> Option<Settled> {
        let age = Utc::now().signed_duration_since(entry.created_at);
        if age.to_std().is_ok_and(|age| age > self.stale_after) {
            warn!(entry = %entry.id, ?age, "Discarding stale transient state");
            let message = format!(
                "Remote execution did not finish within {}s",
                self.stale_after.as_secs()
            );
            return Some(abandoned(job, entry, message));
        }

        let results = match pilot.poll(&entry, ctx).await {
            Ok(PollOutcome::Pending) => return None,
            Ok(PollOutcome::Done(results)) => results,
            Ok(PollOutcome::Failed { message }) => {
                vec![JobResult::error_message(
                    job.id,
                    entry.program_id,
                    message.clone(),
                    message,
                )]
            }
            Ok(PollOutcome::Unknown { raw }) => {
                let mut result = JobResult::error_message(
                    job.id,
                    entry.program_id,
                    "Unexpected response from remote backend",
                    raw.to_string(),
                );
                result.meta["raw_response"] = raw;
                vec![result]
            }
            Err(e @ CoreError::Network(_)) => {
                warn!(entry = %entry.id, error = %e, "Polling failed, will retry");
                return None;
            }
            Err(e) => {
                warn!(entry = %entry.id, error = %e, "Polling failed permanently");
                vec![JobResult::error(job.id, entry.program_id, &e)]
            }
        };
        Some(Settled { entry, results })
    }

    /// Record the terminal state of a job with no remaining entries.
    ///
    /// Results are put in deployment order first, since remote programs
    /// finish in any order.
    async fn settle(&self, job: &Job, remaining: usize) -> SchedResult<WatchOutcome> {
        if effective_state(job, remaining) != JobState::Finished {
            return Ok(WatchOutcome::Done(job.state));
        }
        if let Some(id) = job.deployment_id {
            if let Some(deployment) = self.store.load_deployment(id).await? {
                let order: Vec<_> = deployment.programs.iter().map(|p| p.id).collect();
                self.store.order_results(job.id, &order).await?;
            }
        }
        let failed = self
            .store
            .load_results(job.id)
            .await?
            .iter()
            .any(JobResult::is_error);
        let target = if failed {
            JobState::Error
        } else {
            JobState::Finished
        };
        match self.store.transition_job(job.id, target).await {
            Ok(job) => {
                info!(job_id = %job.id, state = %job.state, "Job settled");
                Ok(WatchOutcome::Done(job.state))
            }
            // A concurrent pass or a cancel got there first.
            Err(CoreError::InvalidTransition { from, .. }) => Ok(WatchOutcome::Done(from)),
            Err(e) => Err(e.into()),
        }
    }
}

/// An entry given up on without a remote verdict.
fn abandoned(job: &Job, entry: TransientState, message: String) -> Settled {
    let result = JobResult::error_message(
        job.id,
        entry.program_id,
        message,
        format!("transient state {} created at {}", entry.id, entry.created_at),
    );
    Settled {
        entry,
        results: vec![result],
    }
}

impl std::fmt::Debug for ResultWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultWatcher")
            .field("pilots", &self.pilots)
            .field("stale_after", &self.stale_after)
            .finish_non_exhaustive()
    }
}
