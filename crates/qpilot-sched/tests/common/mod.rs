//! Shared fixtures: mock pilots and a store that records write order.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use qpilot_core::normalize::counts_result;
use qpilot_core::{
    AssemblerLanguage, CoreError, CoreResult, Deployment, DeploymentId, Device, Job, JobFilter,
    JobId, JobResult, JobState, JobStore, MemoryStore, Pilot, PilotContext, PilotOutcome,
    PollOutcome, PreparedProgram, ProgramId, Provider, QuantumProgram, TransientState,
    TransientStateId,
};
use qpilot_pilot_sim::SimulatorPilot;
use qpilot_sched::{
    BackoffPolicy, DispatchConfig, Dispatcher, PilotRegistry, RecurringTask, Task, TaskHandle,
    TaskQueue, TokioTaskQueue,
};
use qpilot_transpile::{PreprocessingRegistry, TranspilerRegistry, formats};
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

pub const BELL_QASM2: &str = "OPENQASM 2.0;
include \"qelib1.inc\";
qreg q[2];
creg c[2];
h q[0];
cx q[0],q[1];
measure q -> c;
";

pub const FLIP_QASM3: &str = "OPENQASM 3.0;
include \"stdgates.inc\";
qubit[1] q;
bit[1] c;
x q[0];
c[0] = measure q[0];
";

pub const REMOTE_PROVIDER: &str = "REMOTE";
pub const REMOTE_DEVICE: &str = "remote-qpu";
pub const REMOTE_SCHEME: &str = "MOCK";

/// A pilot that submits work and reports whatever status the test sets.
///
/// Statuses: `PENDING`, `DONE`, `FAILED`, `TRANSPORT` (network error),
/// `UNAUTHORIZED` (authentication error), anything else is an unrecognized
/// response.
#[derive(Default)]
pub struct ScriptedPilot {
    statuses: Mutex<FxHashMap<ProgramId, String>>,
    polls: Mutex<u32>,
    tokens: Mutex<Vec<Option<String>>>,
    pub cancellable: bool,
    pub fail_run: bool,
}

impl ScriptedPilot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancellable() -> Self {
        Self {
            cancellable: true,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_run: true,
            ..Self::default()
        }
    }

    pub fn set_status(&self, program: ProgramId, status: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(program, status.to_string());
    }

    pub fn set_all(&self, programs: &[ProgramId], status: &str) {
        for p in programs {
            self.set_status(*p, status);
        }
    }

    pub fn polls(&self) -> u32 {
        *self.polls.lock().unwrap()
    }

    /// Tokens seen by `run`, in call order.
    pub fn tokens(&self) -> Vec<Option<String>> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pilot for ScriptedPilot {
    fn provider(&self) -> &str {
        REMOTE_PROVIDER
    }

    fn supported_formats(&self) -> &[&'static str] {
        &[formats::QASM2]
    }

    fn transient_scheme(&self) -> Option<&str> {
        Some(REMOTE_SCHEME)
    }

    async fn run(
        &self,
        job: &Job,
        programs: &[PreparedProgram],
        ctx: &PilotContext,
    ) -> CoreResult<PilotOutcome> {
        self.tokens.lock().unwrap().push(ctx.token.clone());
        if self.fail_run {
            return Err(CoreError::Backend("remote rejected the job".to_string()));
        }
        for program in programs {
            self.set_status(program.program_id, "PENDING");
            let entry = TransientState::new(
                job.id,
                Some(program.program_id),
                REMOTE_SCHEME,
                json!({ "request_id": program.program_id.to_string() }),
            );
            ctx.store.save_transient(&entry).await?;
        }
        Ok(PilotOutcome::Submitted)
    }

    async fn cancel_provider_specific(&self, job: &Job, _ctx: &PilotContext) -> CoreResult<()> {
        if self.cancellable {
            Ok(())
        } else {
            Err(CoreError::Unsupported(format!(
                "cancellation of job {} on provider {REMOTE_PROVIDER}",
                job.id
            )))
        }
    }

    async fn poll(&self, entry: &TransientState, _ctx: &PilotContext) -> CoreResult<PollOutcome> {
        *self.polls.lock().unwrap() += 1;
        let Some(program) = entry.program_id else {
            return Ok(PollOutcome::Unknown { raw: Value::Null });
        };
        let status = self
            .statuses
            .lock()
            .unwrap()
            .get(&program)
            .cloned()
            .unwrap_or_default();
        match status.as_str() {
            "PENDING" => Ok(PollOutcome::Pending),
            "DONE" => {
                let result = counts_result(
                    entry.job_id,
                    Some(program),
                    [("11".to_string(), 60), ("00".to_string(), 40)],
                    &[],
                )?;
                Ok(PollOutcome::Done(vec![result]))
            }
            "FAILED" => Ok(PollOutcome::Failed {
                message: "calibration drift".to_string(),
            }),
            "TRANSPORT" => Err(CoreError::Network("connection reset".to_string())),
            "UNAUTHORIZED" => Err(CoreError::Authentication("token rejected".to_string())),
            other => Ok(PollOutcome::Unknown {
                raw: json!({ "status": other }),
            }),
        }
    }

    async fn is_device_available(&self, _device: &Device, _token: Option<&str>) -> CoreResult<bool> {
        Ok(true)
    }

    fn standard_provider(&self) -> Provider {
        Provider {
            name: REMOTE_PROVIDER.to_string(),
            with_token: true,
            supported_languages: vec![AssemblerLanguage::Qasm2],
        }
    }

    fn standard_devices(&self) -> Vec<Device> {
        vec![Device {
            name: REMOTE_DEVICE.to_string(),
            provider: REMOTE_PROVIDER.to_string(),
            num_qubits: 5,
            is_simulator: false,
            is_local: false,
        }]
    }
}

/// [`MemoryStore`] that logs result appends and transient deletes.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    events: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn save_job(&self, job: &Job) -> CoreResult<()> {
        self.inner.save_job(job).await
    }

    async fn load_job(&self, id: JobId) -> CoreResult<Option<Job>> {
        self.inner.load_job(id).await
    }

    async fn transition_job(&self, id: JobId, to: JobState) -> CoreResult<Job> {
        let job = self.inner.transition_job(id, to).await?;
        self.record(format!("state:{to}"));
        Ok(job)
    }

    async fn list_jobs(&self, filter: &JobFilter) -> CoreResult<Vec<Job>> {
        self.inner.list_jobs(filter).await
    }

    async fn save_deployment(&self, deployment: &Deployment) -> CoreResult<()> {
        self.inner.save_deployment(deployment).await
    }

    async fn load_deployment(&self, id: DeploymentId) -> CoreResult<Option<Deployment>> {
        self.inner.load_deployment(id).await
    }

    async fn find_deployment(&self, name: &str) -> CoreResult<Option<Deployment>> {
        self.inner.find_deployment(name).await
    }

    async fn delete_deployment(&self, id: DeploymentId) -> CoreResult<bool> {
        self.inner.delete_deployment(id).await
    }

    async fn upsert_provider(&self, provider: &Provider) -> CoreResult<()> {
        self.inner.upsert_provider(provider).await
    }

    async fn load_provider(&self, name: &str) -> CoreResult<Option<Provider>> {
        self.inner.load_provider(name).await
    }

    async fn list_providers(&self) -> CoreResult<Vec<Provider>> {
        self.inner.list_providers().await
    }

    async fn upsert_device(&self, device: &Device) -> CoreResult<()> {
        self.inner.upsert_device(device).await
    }

    async fn load_device(&self, name: &str) -> CoreResult<Option<Device>> {
        self.inner.load_device(name).await
    }

    async fn list_devices(&self) -> CoreResult<Vec<Device>> {
        self.inner.list_devices().await
    }

    async fn replace_results(&self, job_id: JobId, results: Vec<JobResult>) -> CoreResult<()> {
        self.inner.replace_results(job_id, results).await
    }

    async fn append_results(&self, job_id: JobId, results: Vec<JobResult>) -> CoreResult<()> {
        self.record(format!("append:{}", results.len()));
        self.inner.append_results(job_id, results).await
    }

    async fn load_results(&self, job_id: JobId) -> CoreResult<Vec<JobResult>> {
        self.inner.load_results(job_id).await
    }

    async fn order_results(&self, job_id: JobId, programs: &[ProgramId]) -> CoreResult<()> {
        self.inner.order_results(job_id, programs).await
    }

    async fn save_transient(&self, entry: &TransientState) -> CoreResult<()> {
        self.inner.save_transient(entry).await
    }

    async fn list_transient(
        &self,
        job_id: JobId,
        scheme: Option<&str>,
    ) -> CoreResult<Vec<TransientState>> {
        self.inner.list_transient(job_id, scheme).await
    }

    async fn delete_transient(&self, id: TransientStateId) -> CoreResult<bool> {
        let existed = self.inner.delete_transient(id).await?;
        self.record(format!("delete:{existed}"));
        Ok(existed)
    }
}

/// Task queue that never runs anything; tests drive reconciliation by hand.
#[derive(Default)]
pub struct ManualQueue {
    next: AtomicU64,
    submitted: Mutex<Vec<TaskHandle>>,
    recurring: Mutex<Vec<BackoffPolicy>>,
    timeouts: Mutex<Vec<Task>>,
    revoked: Mutex<Vec<TaskHandle>>,
}

impl ManualQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn recurring(&self) -> Vec<BackoffPolicy> {
        self.recurring.lock().unwrap().clone()
    }

    pub fn revoked(&self) -> usize {
        self.revoked.lock().unwrap().len()
    }

    /// Run the timeout hooks of every recurring task, as if all had given up.
    pub async fn time_out_all(&self) {
        let hooks: Vec<Task> = self.timeouts.lock().unwrap().drain(..).collect();
        for hook in hooks {
            hook.await;
        }
    }

    fn handle(&self) -> TaskHandle {
        TaskHandle::from_raw(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl TaskQueue for ManualQueue {
    fn submit(&self, _task: Task) -> TaskHandle {
        let handle = self.handle();
        self.submitted.lock().unwrap().push(handle);
        handle
    }

    fn schedule_recurring(
        &self,
        _task: RecurringTask,
        policy: BackoffPolicy,
        on_timeout: Task,
    ) -> TaskHandle {
        self.recurring.lock().unwrap().push(policy);
        self.timeouts.lock().unwrap().push(on_timeout);
        self.handle()
    }

    fn revoke(&self, handle: TaskHandle) -> bool {
        self.revoked.lock().unwrap().push(handle);
        true
    }
}

/// Dispatcher over `store` with the given pilots, seeded.
pub async fn dispatcher(
    store: Arc<dyn JobStore>,
    pilots: Vec<Arc<dyn Pilot>>,
    config: DispatchConfig,
) -> Dispatcher {
    dispatcher_with_queue(store, pilots, config, Arc::new(TokioTaskQueue::new())).await
}

/// Like [`dispatcher`] with a caller-supplied task queue.
pub async fn dispatcher_with_queue(
    store: Arc<dyn JobStore>,
    pilots: Vec<Arc<dyn Pilot>>,
    config: DispatchConfig,
    queue: Arc<dyn TaskQueue>,
) -> Dispatcher {
    let mut registry = PilotRegistry::new();
    for pilot in pilots {
        registry.register(pilot).unwrap();
    }
    registry.seed(store.as_ref()).await.unwrap();
    Dispatcher::new(
        store,
        Arc::new(registry),
        Arc::new(TranspilerRegistry::with_builtins()),
        Arc::new(PreprocessingRegistry::with_builtins("python3")),
        queue,
        config,
    )
}

/// Dispatcher with only a seeded simulator pilot.
pub async fn sim_dispatcher(store: Arc<dyn JobStore>) -> Dispatcher {
    let sim: Arc<dyn Pilot> = Arc::new(SimulatorPilot::new().with_seed(1234));
    dispatcher(store, vec![sim], DispatchConfig::default()).await
}

/// Save a deployment of the given programs and return it.
pub async fn deploy(
    store: &dyn JobStore,
    name: &str,
    programs: Vec<(&str, AssemblerLanguage)>,
) -> Deployment {
    let programs = programs
        .into_iter()
        .map(|(src, lang)| QuantumProgram::new(src, lang))
        .collect();
    let deployment = Deployment::new(name, programs);
    store.save_deployment(&deployment).await.unwrap();
    deployment
}
