//! Job creation, dispatch, cancellation and rerun.
//!
//! The dispatcher owns the per-job sequence: mark the job RUNNING, convert
//! every program of its deployment into a format the device's pilot accepts,
//! hand the programs to the pilot and record the outcome. Pilots that finish
//! synchronously settle the job immediately; pilots that submit remote work
//! leave it RUNNING and the [`ResultWatcher`] takes over on the task queue.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use qpilot_core::{
    CoreError, DeploymentId, ErrorMitigation, Job, JobId, JobResult, JobState, JobStore, JobType,
    Pilot, PilotContext, PilotOutcome, PreparedProgram, ProgramId, QuantumProgram,
};
use qpilot_transpile::{
    PreprocessingRegistry, TranspileError, TranspileOptions, TranspilerRegistry,
};
use rustc_hash::FxHashMap;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{SchedError, SchedResult};
use crate::queue::{Attempt, BackoffPolicy, RecurringTask, Task, TaskHandle, TaskQueue};
use crate::registry::PilotRegistry;
use crate::watcher::{ResultWatcher, WatchOutcome};

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Refuse unsafe converters and unsafe preprocessing.
    pub exclude_unsafe: bool,
    /// Run dispatch on the task queue instead of inline.
    pub background: bool,
    /// Backoff of the result watcher.
    pub watch: BackoffPolicy,
    /// Age after which a transient entry is given up on.
    pub stale_after: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            exclude_unsafe: true,
            background: false,
            watch: BackoffPolicy::default(),
            stale_after: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Parameters of a new job.
#[derive(Clone)]
pub struct JobRequest {
    pub name: String,
    pub device: String,
    pub deployment_id: Option<DeploymentId>,
    pub shots: u32,
    pub job_type: JobType,
    pub error_mitigation: ErrorMitigation,
    pub executed_by: Option<String>,
    /// Provider token passed to the pilot.
    pub token: Option<String>,
}

impl JobRequest {
    /// A runner job without mitigation.
    pub fn new(
        name: impl Into<String>,
        device: impl Into<String>,
        deployment_id: Option<DeploymentId>,
        shots: u32,
    ) -> Self {
        Self {
            name: name.into(),
            device: device.into(),
            deployment_id,
            shots,
            job_type: JobType::Runner,
            error_mitigation: ErrorMitigation::None,
            executed_by: None,
            token: None,
        }
    }

    pub fn with_type(mut self, job_type: JobType) -> Self {
        self.job_type = job_type;
        self
    }

    pub fn with_error_mitigation(mut self, mitigation: ErrorMitigation) -> Self {
        self.error_mitigation = mitigation;
        self
    }

    pub fn with_executed_by(mut self, user: impl Into<String>) -> Self {
        self.executed_by = Some(user.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl std::fmt::Debug for JobRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRequest")
            .field("name", &self.name)
            .field("device", &self.device)
            .field("deployment_id", &self.deployment_id)
            .field("shots", &self.shots)
            .field("job_type", &self.job_type)
            .field("error_mitigation", &self.error_mitigation)
            .field("executed_by", &self.executed_by)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// A program that could not be prepared for the pilot.
type Rejected = (ProgramId, TranspileError);

/// Drives jobs through their lifecycle.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    pilots: Arc<PilotRegistry>,
    transpilers: Arc<TranspilerRegistry>,
    preprocessors: Arc<PreprocessingRegistry>,
    queue: Arc<dyn TaskQueue>,
    config: DispatchConfig,
    /// Background dispatch or watch task per job.
    tasks: Arc<Mutex<FxHashMap<JobId, TaskHandle>>>,
    tokens: Arc<Mutex<FxHashMap<JobId, String>>>,
    watcher: ResultWatcher,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        pilots: Arc<PilotRegistry>,
        transpilers: Arc<TranspilerRegistry>,
        preprocessors: Arc<PreprocessingRegistry>,
        queue: Arc<dyn TaskQueue>,
        config: DispatchConfig,
    ) -> Self {
        let watcher = ResultWatcher::new(Arc::clone(&store), Arc::clone(&pilots), config.stale_after);
        Self {
            store,
            pilots,
            transpilers,
            preprocessors,
            queue,
            config,
            tasks: Arc::default(),
            tokens: Arc::default(),
            watcher,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn pilots(&self) -> &PilotRegistry {
        &self.pilots
    }

    pub fn watcher(&self) -> &ResultWatcher {
        &self.watcher
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Persist a READY job.
    ///
    /// The device, its pilot and the deployment are resolved before anything
    /// is written, so a request no pilot can serve leaves no trace.
    pub async fn create_job(&self, request: JobRequest) -> SchedResult<Job> {
        self.pilot_for(&request.device).await?;
        if let Some(id) = request.deployment_id {
            if self.store.load_deployment(id).await?.is_none() {
                return Err(SchedError::DeploymentNotFound(id));
            }
        }

        let mut job = Job::new(request.name, request.device, request.deployment_id, request.shots)
            .with_type(request.job_type)
            .with_error_mitigation(request.error_mitigation);
        job.executed_by = request.executed_by;
        self.store.save_job(&job).await?;
        if let Some(token) = request.token {
            lock(&self.tokens).insert(job.id, token);
        }

        info!(job_id = %job.id, device = %job.device, job_type = %job.job_type, "Created job");
        Ok(job)
    }

    /// Create a job and dispatch it.
    ///
    /// In background mode the dispatch is queued and the READY job is
    /// returned; otherwise the job is returned as dispatch left it.
    pub async fn create_and_run(&self, request: JobRequest) -> SchedResult<Job> {
        let job = self.create_job(request).await?;
        if !self.config.background {
            self.dispatch(job.id).await?;
            return self.load(job.id).await;
        }

        let this = self.clone();
        let job_id = job.id;
        let handle = {
            // Hold the map while submitting so the task cannot record a watch
            // handle before its own dispatch handle is stored.
            let mut tasks = lock(&self.tasks);
            let handle = self.queue.submit(Box::pin(async move {
                if let Err(e) = this.dispatch(job_id).await {
                    error!(job_id = %job_id, error = %e, "Background dispatch failed");
                }
            }));
            tasks.insert(job_id, handle);
            handle
        };
        debug!(job_id = %job_id, ?handle, "Queued dispatch");
        Ok(job)
    }

    /// Run a READY job.
    ///
    /// Returns the state the job is left in. A job that is not READY is
    /// refused with [`SchedError::InvalidTransition`]. Transpilation failures
    /// mark the job ERROR and are returned as [`SchedError::Transpilation`];
    /// pilot failures mark it ERROR and return `Ok(JobState::Error)`.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn dispatch(&self, job_id: JobId) -> SchedResult<JobState> {
        let job = self.load(job_id).await?;
        let pilot = self.pilot_for(&job.device).await?;
        let deployment = match job.deployment_id {
            Some(id) => Some(
                self.store
                    .load_deployment(id)
                    .await?
                    .ok_or(SchedError::DeploymentNotFound(id))?,
            ),
            None => None,
        };

        if job.state != JobState::Ready {
            return Err(SchedError::InvalidTransition {
                job_id,
                state: job.state,
                action: "dispatch",
            });
        }
        // The store refuses RUNNING -> RUNNING, so only one of two racing
        // dispatches gets past this point.
        let job = self
            .store
            .transition_job(job_id, JobState::Running)
            .await
            .map_err(|e| invalid(job_id, "dispatch", e))?;
        lock(&self.tasks).remove(&job_id);
        self.store.replace_results(job_id, Vec::new()).await?;

        let programs = deployment.map(|d| d.programs).unwrap_or_default();
        let (prepared, rejected) = self.prepare(programs, pilot.supported_formats()).await?;
        if !rejected.is_empty() {
            let failed = rejected.len();
            let results = rejected
                .iter()
                .map(|(program_id, e)| JobResult::error(job_id, Some(*program_id), e))
                .collect();
            self.store.append_results(job_id, results).await?;
            self.finish(job_id, JobState::Error).await?;
            warn!(failed, "Programs failed to transpile");
            return Err(SchedError::Transpilation { job_id, failed });
        }

        let ctx = self.context(job_id);
        let outcome = match job.job_type {
            JobType::Runner => pilot.run(&job, &prepared, &ctx).await,
            _ => pilot.execute_provider_specific(&job, &prepared, &ctx).await,
        };

        match outcome {
            Ok(PilotOutcome::Completed(results)) => {
                let target = if results.iter().any(JobResult::is_error) {
                    JobState::Error
                } else {
                    JobState::Finished
                };
                info!(results = results.len(), state = %target, "Pilot completed");
                self.store.append_results(job_id, results).await?;
                self.finish(job_id, target).await
            }
            Ok(PilotOutcome::Submitted) => {
                info!(provider = pilot.provider(), "Pilot submitted remote work");
                self.watch(job_id, ctx);
                Ok(JobState::Running)
            }
            Err(e) => {
                warn!(provider = pilot.provider(), error = %e, "Pilot failed");
                let result = JobResult::error(job_id, None, &e);
                self.store.append_results(job_id, vec![result]).await?;
                self.finish(job_id, JobState::Error).await
            }
        }
    }

    /// Cancel a READY or RUNNING job.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn cancel(&self, job_id: JobId) -> SchedResult<Job> {
        let job = self.load(job_id).await?;
        match job.state {
            JobState::Ready => {
                self.revoke(job_id);
            }
            JobState::Running => {
                let pilot = self.pilot_for(&job.device).await?;
                pilot
                    .cancel_provider_specific(&job, &self.context(job_id))
                    .await?;
                self.revoke(job_id);
                if let Some(scheme) = pilot.transient_scheme() {
                    for entry in self.store.list_transient(job_id, Some(scheme)).await? {
                        self.store.delete_transient(entry.id).await?;
                    }
                }
            }
            state => {
                return Err(SchedError::InvalidTransition {
                    job_id,
                    state,
                    action: "cancel",
                });
            }
        }

        let job = self
            .store
            .transition_job(job_id, JobState::Canceled)
            .await
            .map_err(|e| invalid(job_id, "cancel", e))?;
        self.release(job_id);
        info!("Job canceled");
        Ok(job)
    }

    /// Run a terminal job again, replacing its results.
    ///
    /// Tokens are dropped once a job settles, so a provider that needs one
    /// must be given it again here.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn rerun(&self, job_id: JobId, token: Option<String>) -> SchedResult<JobState> {
        let mut job = self.load(job_id).await?;
        if !job.state.is_terminal() {
            return Err(SchedError::InvalidTransition {
                job_id,
                state: job.state,
                action: "rerun",
            });
        }
        job.reset();
        self.store.save_job(&job).await?;
        self.store.replace_results(job_id, Vec::new()).await?;
        for entry in self.store.list_transient(job_id, None).await? {
            self.store.delete_transient(entry.id).await?;
        }
        if let Some(token) = token {
            lock(&self.tokens).insert(job_id, token);
        }
        info!("Rerunning job");
        self.dispatch(job_id).await
    }

    async fn load(&self, job_id: JobId) -> SchedResult<Job> {
        self.store
            .load_job(job_id)
            .await?
            .ok_or(SchedError::JobNotFound(job_id))
    }

    async fn pilot_for(&self, device: &str) -> SchedResult<Arc<dyn Pilot>> {
        let device = self
            .store
            .load_device(device)
            .await?
            .ok_or_else(|| SchedError::DeviceNotFound(device.to_string()))?;
        self.pilots.resolve(&device.provider)
    }

    fn context(&self, job_id: JobId) -> PilotContext {
        let ctx = PilotContext::new(Arc::clone(&self.store));
        match lock(&self.tokens).get(&job_id) {
            Some(token) => ctx.with_token(token.clone()),
            None => ctx,
        }
    }

    /// Preprocess and convert every program off the async workers.
    async fn prepare(
        &self,
        programs: Vec<QuantumProgram>,
        formats: &[&'static str],
    ) -> SchedResult<(Vec<PreparedProgram>, Vec<Rejected>)> {
        let transpilers = Arc::clone(&self.transpilers);
        let preprocessors = Arc::clone(&self.preprocessors);
        let formats = formats.to_vec();
        let exclude_unsafe = self.config.exclude_unsafe;

        tokio::task::spawn_blocking(move || {
            let options = TranspileOptions {
                exclude_unsafe,
                ..TranspileOptions::default()
            };
            let mut prepared = Vec::with_capacity(programs.len());
            let mut rejected = Vec::new();
            for program in programs {
                let lang = program.assembler_language;
                let converted = preprocessors
                    .preprocess(lang.tag(), &program.quantum_circuit, exclude_unsafe)
                    .and_then(|data| {
                        transpilers.transpile_to_any(
                            &formats,
                            vec![(lang.format().to_string(), data)],
                            &options,
                        )
                    });
                match converted {
                    Ok(t) => {
                        debug!(program = %program.id, format = %t.format, steps = ?t.steps, "Prepared program");
                        prepared.push(PreparedProgram {
                            program_id: program.id,
                            format: t.format,
                            data: t.data,
                        });
                    }
                    Err(e) => rejected.push((program.id, e)),
                }
            }
            (prepared, rejected)
        })
        .await
        .map_err(|e| {
            SchedError::from(CoreError::Backend(format!(
                "program preparation task failed: {e}"
            )))
        })
    }

    /// Record a terminal state unless a concurrent cancel got there first.
    async fn finish(&self, job_id: JobId, target: JobState) -> SchedResult<JobState> {
        let state = match self.store.transition_job(job_id, target).await {
            Ok(job) => job.state,
            Err(CoreError::InvalidTransition { from, .. }) => {
                debug!(job_id = %job_id, state = %from, "Job settled concurrently");
                from
            }
            Err(e) => return Err(e.into()),
        };
        self.release(job_id);
        Ok(state)
    }

    fn watch(&self, job_id: JobId, ctx: PilotContext) {
        let this = self.clone();
        let task: RecurringTask = Box::new(move || {
            let this = this.clone();
            let ctx = ctx.clone();
            Box::pin(async move {
                match this.watcher.reconcile_with(job_id, &ctx).await {
                    Ok(WatchOutcome::Pending) => Attempt::Retry,
                    Ok(WatchOutcome::Done(state)) => {
                        debug!(job_id = %job_id, %state, "Watch finished");
                        this.release(job_id);
                        Attempt::Done
                    }
                    Err(SchedError::JobNotFound(_)) => {
                        this.release(job_id);
                        Attempt::Done
                    }
                    Err(e) => {
                        warn!(job_id = %job_id, error = %e, "Reconciliation failed, will retry");
                        Attempt::Retry
                    }
                }
            })
        });

        let this = self.clone();
        let timeout = self.config.watch.timeout;
        let on_timeout: Task = Box::pin(async move {
            match this.watcher.expire(job_id, timeout).await {
                Ok(outcome) => debug!(job_id = %job_id, ?outcome, "Expired watch"),
                Err(e) => error!(job_id = %job_id, error = %e, "Failed to expire job"),
            }
            this.release(job_id);
        });

        let handle = self
            .queue
            .schedule_recurring(task, self.config.watch, on_timeout);
        lock(&self.tasks).insert(job_id, handle);
    }

    /// Forget the token and task handle of a job that reached a final state.
    fn release(&self, job_id: JobId) {
        lock(&self.tasks).remove(&job_id);
        lock(&self.tokens).remove(&job_id);
    }

    /// Jobs with a token or a task handle still held in memory.
    pub fn tracked_jobs(&self) -> usize {
        let tasks = lock(&self.tasks);
        let tokens = lock(&self.tokens);
        tasks
            .keys()
            .chain(tokens.keys().filter(|id| !tasks.contains_key(id)))
            .count()
    }

    fn revoke(&self, job_id: JobId) {
        let handle = lock(&self.tasks).remove(&job_id);
        if let Some(handle) = handle {
            if self.queue.revoke(handle) {
                debug!(job_id = %job_id, ?handle, "Revoked job task");
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pilots", &self.pilots)
            .field("preprocessors", &self.preprocessors)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn invalid(job_id: JobId, action: &'static str, e: CoreError) -> SchedError {
    match e {
        CoreError::InvalidTransition { from, .. } => SchedError::InvalidTransition {
            job_id,
            state: from,
            action,
        },
        e => e.into(),
    }
}
