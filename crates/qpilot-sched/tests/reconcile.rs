//! Reconciling jobs whose pilot submitted remote work.

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::*;
use qpilot_core::{
    AssemblerLanguage, CoreError, Deployment, Job, JobState, JobStore, Pilot, ProgramId,
    ResultType, TransientState,
};
use qpilot_sched::{DispatchConfig, Dispatcher, JobRequest, SchedError, WatchOutcome};
use serde_json::json;

struct Fixture {
    store: Arc<RecordingStore>,
    pilot: Arc<ScriptedPilot>,
    queue: Arc<ManualQueue>,
    dispatcher: Dispatcher,
}

impl Fixture {
    async fn new(pilot: ScriptedPilot) -> Self {
        let store = Arc::new(RecordingStore::new());
        let pilot = Arc::new(pilot);
        let queue = Arc::new(ManualQueue::new());
        let dispatcher = dispatcher_with_queue(
            store.clone(),
            vec![pilot.clone() as Arc<dyn Pilot>],
            DispatchConfig::default(),
            queue.clone(),
        )
        .await;
        Self {
            store,
            pilot,
            queue,
            dispatcher,
        }
    }

    /// Dispatch a job of `n` programs; it is left RUNNING with one entry each.
    async fn submit(&self, n: usize) -> (Job, Deployment) {
        let programs = vec![(BELL_QASM2, AssemblerLanguage::Qasm2); n];
        let deployment = deploy(self.store.as_ref(), "remote", programs).await;
        let job = self
            .dispatcher
            .create_job(
                JobRequest::new("remote", REMOTE_DEVICE, Some(deployment.id), 100)
                    .with_token("user-token"),
            )
            .await
            .unwrap();
        let state = self.dispatcher.dispatch(job.id).await.unwrap();
        assert_eq!(state, JobState::Running);
        (job, deployment)
    }

    async fn entries(&self, job: &Job) -> usize {
        self.store
            .list_transient(job.id, Some(REMOTE_SCHEME))
            .await
            .unwrap()
            .len()
    }

    async fn state(&self, job: &Job) -> JobState {
        self.store.load_job(job.id).await.unwrap().unwrap().state
    }
}

fn ids(deployment: &Deployment) -> Vec<ProgramId> {
    deployment.programs.iter().map(|p| p.id).collect()
}

#[tokio::test]
async fn test_submission_schedules_watch() {
    let fx = Fixture::new(ScriptedPilot::new()).await;
    let (job, _) = fx.submit(2).await;

    assert_eq!(fx.entries(&job).await, 2);
    assert_eq!(fx.queue.recurring().len(), 1);
    assert_eq!(fx.queue.recurring()[0], DispatchConfig::default().watch);
    assert_eq!(fx.pilot.tokens(), vec![Some("user-token".to_string())]);
    assert!(fx.store.load_results(job.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pending_then_partial_then_done() {
    let fx = Fixture::new(ScriptedPilot::new()).await;
    let (job, deployment) = fx.submit(2).await;
    let programs = ids(&deployment);
    let watcher = fx.dispatcher.watcher();

    assert_eq!(watcher.reconcile(job.id).await.unwrap(), WatchOutcome::Pending);
    assert_eq!(fx.pilot.polls(), 2);
    assert_eq!(fx.entries(&job).await, 2);

    fx.pilot.set_status(programs[0], "DONE");
    assert_eq!(watcher.reconcile(job.id).await.unwrap(), WatchOutcome::Pending);
    assert_eq!(fx.entries(&job).await, 1);
    assert_eq!(fx.store.load_results(job.id).await.unwrap().len(), 1);
    assert_eq!(fx.state(&job).await, JobState::Running);

    fx.pilot.set_status(programs[1], "DONE");
    assert_eq!(
        watcher.reconcile(job.id).await.unwrap(),
        WatchOutcome::Done(JobState::Finished)
    );
    let results = fx.store.load_results(job.id).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.result_type == ResultType::Counts));
    assert_eq!(results[0].data["counts"], json!({ "0x0": 40, "0x3": 60 }));
    assert_eq!(fx.state(&job).await, JobState::Finished);
}

#[tokio::test]
async fn test_deletes_commit_before_results() {
    let fx = Fixture::new(ScriptedPilot::new()).await;
    let (job, deployment) = fx.submit(2).await;
    fx.pilot.set_all(&ids(&deployment), "DONE");

    let before = fx.store.events().len();
    fx.dispatcher.watcher().reconcile(job.id).await.unwrap();
    let events = fx.store.events()[before..].to_vec();
    assert_eq!(
        events,
        vec!["delete:true", "delete:true", "append:2", "state:FINISHED"]
    );
}

#[tokio::test]
async fn test_repeated_reconcile_is_idempotent() {
    let fx = Fixture::new(ScriptedPilot::new()).await;
    let (job, deployment) = fx.submit(3).await;
    fx.pilot.set_all(&ids(&deployment), "DONE");
    let watcher = fx.dispatcher.watcher().clone();

    let (a, b) = tokio::join!(watcher.reconcile(job.id), watcher.reconcile(job.id));
    assert!(matches!(a.unwrap(), WatchOutcome::Done(JobState::Finished)));
    assert!(matches!(b.unwrap(), WatchOutcome::Done(JobState::Finished)));

    let again = watcher.reconcile(job.id).await.unwrap();
    assert_eq!(again, WatchOutcome::Done(JobState::Finished));
    assert_eq!(fx.store.load_results(job.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_remote_failure_marks_job_error() {
    let fx = Fixture::new(ScriptedPilot::new()).await;
    let (job, deployment) = fx.submit(2).await;
    let programs = ids(&deployment);
    fx.pilot.set_status(programs[0], "DONE");
    fx.pilot.set_status(programs[1], "FAILED");

    let outcome = fx.dispatcher.watcher().reconcile(job.id).await.unwrap();
    assert_eq!(outcome, WatchOutcome::Done(JobState::Error));

    let results = fx.store.load_results(job.id).await.unwrap();
    assert_eq!(results.len(), 2);
    let failed = results.iter().find(|r| r.is_error()).unwrap();
    assert_eq!(failed.program_id, Some(programs[1]));
    assert_eq!(failed.exception_message(), Some("calibration drift"));
}

#[tokio::test]
async fn test_unknown_response_is_kept_in_meta() {
    let fx = Fixture::new(ScriptedPilot::new()).await;
    let (job, deployment) = fx.submit(1).await;
    fx.pilot.set_all(&ids(&deployment), "WEIRD");

    let outcome = fx.dispatcher.watcher().reconcile(job.id).await.unwrap();
    assert_eq!(outcome, WatchOutcome::Done(JobState::Error));
    let results = fx.store.load_results(job.id).await.unwrap();
    assert_eq!(results[0].meta["raw_response"], json!({ "status": "WEIRD" }));
}

#[tokio::test]
async fn test_transport_error_keeps_entry() {
    let fx = Fixture::new(ScriptedPilot::new()).await;
    let (job, deployment) = fx.submit(1).await;
    fx.pilot.set_all(&ids(&deployment), "TRANSPORT");

    let outcome = fx.dispatcher.watcher().reconcile(job.id).await.unwrap();
    assert_eq!(outcome, WatchOutcome::Pending);
    assert_eq!(fx.entries(&job).await, 1);
    assert!(fx.store.load_results(job.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stale_entry_is_discarded() {
    let fx = Fixture::new(ScriptedPilot::new()).await;
    let (job, deployment) = fx.submit(1).await;

    // Replace the fresh entry with one two days old.
    let fresh = fx.store.list_transient(job.id, None).await.unwrap();
    fx.store.delete_transient(fresh[0].id).await.unwrap();
    let mut old = TransientState::new(
        job.id,
        Some(deployment.programs[0].id),
        REMOTE_SCHEME,
        json!({}),
    );
    old.created_at = Utc::now() - chrono::Duration::hours(48);
    fx.store.save_transient(&old).await.unwrap();

    let outcome = fx.dispatcher.watcher().reconcile(job.id).await.unwrap();
    assert_eq!(outcome, WatchOutcome::Done(JobState::Error));
    assert_eq!(fx.pilot.polls(), 0);
    let results = fx.store.load_results(job.id).await.unwrap();
    assert!(results[0].exception_message().unwrap().contains("did not finish"));
}

#[tokio::test]
async fn test_cancel_running_job() {
    let fx = Fixture::new(ScriptedPilot::cancellable()).await;
    let (job, _) = fx.submit(2).await;

    let canceled = fx.dispatcher.cancel(job.id).await.unwrap();
    assert_eq!(canceled.state, JobState::Canceled);
    assert_eq!(fx.entries(&job).await, 0);
    assert_eq!(fx.queue.revoked(), 1);

    let outcome = fx.dispatcher.watcher().reconcile(job.id).await.unwrap();
    assert_eq!(outcome, WatchOutcome::Done(JobState::Canceled));
}

#[tokio::test]
async fn test_cancel_running_without_remote_support() {
    let fx = Fixture::new(ScriptedPilot::new()).await;
    let (job, _) = fx.submit(1).await;

    let err = fx.dispatcher.cancel(job.id).await.unwrap_err();
    assert!(matches!(err, SchedError::Core(CoreError::Unsupported(_))));
    assert_eq!(fx.state(&job).await, JobState::Running);
    assert_eq!(fx.entries(&job).await, 1);
}

#[tokio::test]
async fn test_rerun_clears_transient_state() {
    let fx = Fixture::new(ScriptedPilot::cancellable()).await;
    let (job, deployment) = fx.submit(1).await;
    fx.pilot.set_all(&ids(&deployment), "DONE");
    fx.dispatcher.watcher().reconcile(job.id).await.unwrap();
    assert_eq!(fx.state(&job).await, JobState::Finished);

    let state = fx
        .dispatcher
        .rerun(job.id, Some("fresh-token".to_string()))
        .await
        .unwrap();
    assert_eq!(state, JobState::Running);
    assert_eq!(fx.entries(&job).await, 1);
    assert!(fx.store.load_results(job.id).await.unwrap().is_empty());
    assert_eq!(fx.queue.recurring().len(), 2);
    assert_eq!(fx.pilot.tokens().last(), Some(&Some("fresh-token".to_string())));
}

#[tokio::test]
async fn test_results_follow_program_order() {
    let fx = Fixture::new(ScriptedPilot::new()).await;
    let (job, deployment) = fx.submit(3).await;
    let programs = ids(&deployment);
    let watcher = fx.dispatcher.watcher();

    // Programs finish back to front.
    for program in programs.iter().rev() {
        fx.pilot.set_status(*program, "DONE");
        watcher.reconcile(job.id).await.unwrap();
    }

    assert_eq!(fx.state(&job).await, JobState::Finished);
    let order: Vec<_> = fx
        .store
        .load_results(job.id)
        .await
        .unwrap()
        .iter()
        .map(|r| r.program_id)
        .collect();
    assert_eq!(order, programs.into_iter().map(Some).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_dispatch_refuses_running_job() {
    let fx = Fixture::new(ScriptedPilot::new()).await;
    let (job, _) = fx.submit(2).await;

    let err = fx.dispatcher.dispatch(job.id).await.unwrap_err();
    assert!(matches!(
        err,
        SchedError::InvalidTransition {
            state: JobState::Running,
            action: "dispatch",
            ..
        }
    ));
    assert_eq!(fx.entries(&job).await, 2);
    assert_eq!(fx.queue.recurring().len(), 1);
    assert_eq!(fx.pilot.tokens().len(), 1);
}

#[tokio::test]
async fn test_watch_timeout_abandons_pending_entries() {
    let fx = Fixture::new(ScriptedPilot::new()).await;
    let (job, deployment) = fx.submit(2).await;
    let programs = ids(&deployment);
    fx.pilot.set_status(programs[0], "DONE");
    fx.dispatcher.watcher().reconcile(job.id).await.unwrap();
    assert_eq!(fx.entries(&job).await, 1);
    assert_eq!(fx.dispatcher.tracked_jobs(), 1);

    fx.queue.time_out_all().await;

    assert_eq!(fx.state(&job).await, JobState::Error);
    assert_eq!(fx.entries(&job).await, 0);
    assert_eq!(fx.dispatcher.tracked_jobs(), 0);
    let results = fx.store.load_results(job.id).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(!results[0].is_error());
    assert_eq!(results[1].program_id, Some(programs[1]));
    assert!(results[1].exception_message().unwrap().contains("still pending"));
}

#[tokio::test]
async fn test_timeout_after_settle_changes_nothing() {
    let fx = Fixture::new(ScriptedPilot::new()).await;
    let (job, deployment) = fx.submit(1).await;
    fx.pilot.set_all(&ids(&deployment), "DONE");
    fx.dispatcher.watcher().reconcile(job.id).await.unwrap();

    fx.queue.time_out_all().await;
    assert_eq!(fx.state(&job).await, JobState::Finished);
    assert_eq!(fx.store.load_results(job.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejected_credentials_fail_the_program() {
    let fx = Fixture::new(ScriptedPilot::new()).await;
    let (job, deployment) = fx.submit(2).await;
    let programs = ids(&deployment);
    fx.pilot.set_status(programs[0], "UNAUTHORIZED");

    let outcome = fx.dispatcher.watcher().reconcile(job.id).await.unwrap();
    assert_eq!(outcome, WatchOutcome::Pending);
    assert_eq!(fx.entries(&job).await, 1);

    fx.pilot.set_status(programs[1], "DONE");
    let outcome = fx.dispatcher.watcher().reconcile(job.id).await.unwrap();
    assert_eq!(outcome, WatchOutcome::Done(JobState::Error));
    let results = fx.store.load_results(job.id).await.unwrap();
    assert_eq!(results[0].program_id, Some(programs[0]));
    assert!(results[0].exception_message().unwrap().contains("Authentication failed"));
}

#[tokio::test]
async fn test_cancel_drops_token() {
    let fx = Fixture::new(ScriptedPilot::cancellable()).await;
    let (job, _) = fx.submit(1).await;
    assert_eq!(fx.dispatcher.tracked_jobs(), 1);

    fx.dispatcher.cancel(job.id).await.unwrap();
    assert_eq!(fx.dispatcher.tracked_jobs(), 0);
}
