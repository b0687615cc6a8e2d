//! Background task execution with capped exponential backoff.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use rustc_hash::FxHashMap;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Retry schedule for a recurring task.
///
/// The delay before retry `n` (0-based) is `min(initial * factor^n, max_interval)`.
/// The loop gives up once the next delay would end past `timeout`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub factor: f64,
    pub max_interval: Duration,
    pub timeout: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            factor: 2.0,
            max_interval: Duration::from_secs(60),
            timeout: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

/// Verdict of one invocation of a recurring task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Not finished; run again after the next delay.
    Retry,
    /// Finished; stop.
    Done,
}

/// How a recurring task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The task reported [`Attempt::Done`].
    Completed { attempts: u32 },
    /// The policy timeout elapsed first.
    TimedOut { attempts: u32 },
}

/// A one-shot background task.
pub type Task = BoxFuture<'static, ()>;

/// A task invoked repeatedly until it reports [`Attempt::Done`].
pub type RecurringTask = Box<dyn FnMut() -> BoxFuture<'static, Attempt> + Send>;

/// Opaque handle used to revoke a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

impl TaskHandle {
    /// Handle for a task tracked by a custom [`TaskQueue`].
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Background execution facility.
pub trait TaskQueue: Send + Sync {
    /// Run a task in the background.
    fn submit(&self, task: Task) -> TaskHandle;

    /// Run a task repeatedly under `policy`, then `on_timeout` if the policy
    /// timeout elapsed before the task reported [`Attempt::Done`].
    fn schedule_recurring(
        &self,
        task: RecurringTask,
        policy: BackoffPolicy,
        on_timeout: Task,
    ) -> TaskHandle;

    /// Stop a task that has not finished. Returns whether it was still live.
    fn revoke(&self, handle: TaskHandle) -> bool;
}

/// Drive a recurring task to completion or timeout in the current task.
pub async fn run_with_backoff(mut task: RecurringTask, policy: BackoffPolicy) -> TaskOutcome {
    let deadline = Instant::now() + policy.timeout;
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        if task().await == Attempt::Done {
            return TaskOutcome::Completed { attempts };
        }
        let delay = policy.delay(attempts - 1);
        if Instant::now() + delay > deadline {
            warn!(attempts, timeout = ?policy.timeout, "Recurring task timed out");
            return TaskOutcome::TimedOut { attempts };
        }
        debug!(attempts, ?delay, "Recurring task pending, backing off");
        tokio::time::sleep(delay).await;
    }
}

/// [`TaskQueue`] running tasks on the ambient tokio runtime.
#[derive(Default)]
pub struct TokioTaskQueue {
    next: AtomicU64,
    live: Mutex<FxHashMap<TaskHandle, AbortHandle>>,
}

impl TokioTaskQueue {
    /// Create a queue; tasks are spawned on the current runtime.
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, abort: AbortHandle) -> TaskHandle {
        let handle = TaskHandle(self.next.fetch_add(1, Ordering::Relaxed));
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        live.retain(|_, a| !a.is_finished());
        live.insert(handle, abort);
        handle
    }

    /// Number of tracked tasks that have not finished.
    pub fn live_tasks(&self) -> usize {
        let live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        live.values().filter(|a| !a.is_finished()).count()
    }
}

impl TaskQueue for TokioTaskQueue {
    fn submit(&self, task: Task) -> TaskHandle {
        self.track(tokio::spawn(task).abort_handle())
    }

    fn schedule_recurring(
        &self,
        task: RecurringTask,
        policy: BackoffPolicy,
        on_timeout: Task,
    ) -> TaskHandle {
        let join = tokio::spawn(async move {
            if let TaskOutcome::TimedOut { .. } = run_with_backoff(task, policy).await {
                on_timeout.await;
            }
        });
        self.track(join.abort_handle())
    }

    fn revoke(&self, handle: TaskHandle) -> bool {
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        match live.remove(&handle) {
            Some(abort) if !abort.is_finished() => {
                abort.abort();
                debug!(?handle, "Revoked task");
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for TokioTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioTaskQueue")
            .field("live_tasks", &self.live_tasks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(100),
            factor: 2.0,
            max_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_delay_is_capped() {
        let p = policy();
        assert_eq!(p.delay(0), Duration::from_millis(100));
        assert_eq!(p.delay(1), Duration::from_millis(200));
        assert_eq!(p.delay(2), Duration::from_millis(400));
        assert_eq!(p.delay(3), Duration::from_millis(500));
        assert_eq!(p.delay(u32::MAX), Duration::from_millis(500));
    }

    fn counting(done_after: u32, calls: &Arc<AtomicU32>) -> RecurringTask {
        let calls = Arc::clone(calls);
        Box::new(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move {
                if n >= done_after {
                    Attempt::Done
                } else {
                    Attempt::Retry
                }
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_between_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let outcome = run_with_backoff(counting(4, &calls), policy()).await;
        assert_eq!(outcome, TaskOutcome::Completed { attempts: 4 });
        // 100 + 200 + 400 ms between the four attempts
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_times_out() {
        let calls = Arc::new(AtomicU32::new(0));
        let p = BackoffPolicy {
            timeout: Duration::from_secs(2),
            ..policy()
        };
        let outcome = run_with_backoff(counting(u32::MAX, &calls), p).await;
        // Sleeps of 100+200+400+500+500 ms reach 1.7s; the next one would end past 2s.
        assert_eq!(outcome, TaskOutcome::TimedOut { attempts: 6 });
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_revoke_stops_live_task() {
        let queue = TokioTaskQueue::new();
        let handle = queue.submit(Box::pin(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }));
        assert_eq!(queue.live_tasks(), 1);
        assert!(queue.revoke(handle));
        assert!(!queue.revoke(handle));
    }

    #[tokio::test]
    async fn test_recurring_task_runs_to_completion() {
        let queue = TokioTaskQueue::new();
        let calls = Arc::new(AtomicU32::new(0));
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let counter = Arc::clone(&calls);
        let task: RecurringTask = Box::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let tx = Arc::clone(&tx);
            Box::pin(async move {
                if n < 3 {
                    return Attempt::Retry;
                }
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
                Attempt::Done
            })
        });
        let fast = BackoffPolicy {
            initial: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            ..policy()
        };
        let timed_out = Arc::new(AtomicU32::new(0));
        let flag = Arc::clone(&timed_out);
        queue.schedule_recurring(
            task,
            fast,
            Box::pin(async move {
                flag.fetch_add(1, Ordering::SeqCst);
            }),
        );
        rx.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(timed_out.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_hook_runs_when_task_gives_up() {
        let queue = TokioTaskQueue::new();
        let calls = Arc::new(AtomicU32::new(0));
        let (tx, rx) = tokio::sync::oneshot::channel();
        let p = BackoffPolicy {
            timeout: Duration::from_secs(2),
            ..policy()
        };
        queue.schedule_recurring(
            counting(u32::MAX, &calls),
            p,
            Box::pin(async move {
                let _ = tx.send(());
            }),
        );
        rx.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }
}
