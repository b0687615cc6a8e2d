//! qpilot job scheduling
//!
//! This crate turns stored deployments into executed jobs.
//!
//! # Overview
//!
//! - [`PilotRegistry`] holds one [`Pilot`](qpilot_core::Pilot) per provider,
//!   built once at startup.
//! - [`Dispatcher`] creates jobs, converts their programs into a format the
//!   device's pilot accepts and records the outcome.
//! - [`ResultWatcher`] reconciles jobs whose pilot submitted remote work,
//!   driven by a [`TaskQueue`] with capped exponential backoff.
//! - [`Config`] loads dispatcher, watcher and pilot settings from YAML and
//!   `QPILOT_*` environment variables.
//!
//! # Job lifecycle
//!
//! ```text
//! READY ──dispatch──> RUNNING ──results──> FINISHED
//!   │                   │  └──failure───> ERROR
//!   └──cancel──┐        └──cancel──┐
//!              v                   v
//!           CANCELED            CANCELED
//! ```
//!
//! FINISHED, ERROR and CANCELED are final; [`Dispatcher::rerun`] resets a
//! final job to READY and dispatches it again.
//! A watch that runs out of time settles the remaining programs as ERROR.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use qpilot_core::MemoryStore;
//! use qpilot_pilot_sim::SimulatorPilot;
//! use qpilot_sched::{Config, Dispatcher, JobRequest, PilotRegistry, TokioTaskQueue};
//! use qpilot_transpile::{PreprocessingRegistry, TranspilerRegistry};
//!
//! let config = Config::load(None)?;
//! let store = Arc::new(MemoryStore::new());
//! let pilots = PilotRegistry::new().with(Arc::new(SimulatorPilot::new()))?;
//! pilots.seed(store.as_ref()).await?;
//!
//! let dispatcher = Dispatcher::new(
//!     store,
//!     Arc::new(pilots),
//!     Arc::new(TranspilerRegistry::with_builtins()),
//!     Arc::new(PreprocessingRegistry::with_builtins("python3")),
//!     Arc::new(TokioTaskQueue::new()),
//!     config.dispatch_config(),
//! );
//! let job = dispatcher
//!     .create_and_run(JobRequest::new("bell", "local-sim", Some(deployment_id), 1024))
//!     .await?;
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod registry;
pub mod watcher;

pub use config::{Config, ConfigError};
pub use dispatcher::{DispatchConfig, Dispatcher, JobRequest};
pub use error::{SchedError, SchedResult};
pub use queue::{
    Attempt, BackoffPolicy, RecurringTask, Task, TaskHandle, TaskOutcome, TaskQueue,
    TokioTaskQueue, run_with_backoff,
};
pub use registry::PilotRegistry;
pub use watcher::{ResultWatcher, WatchOutcome, effective_state};
