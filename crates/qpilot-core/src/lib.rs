//! Job model, canonical results and the contracts between qpilot components.
//!
//! - [`model`]: deployments, jobs and their state machine, devices,
//!   providers and pilot transient state.
//! - [`result`] and [`normalize`]: canonical results and conversion of
//!   provider-native measurement data into them.
//! - [`store`]: the persistence contract, with [`MemoryStore`] as the
//!   in-process implementation.
//! - [`pilot`]: the backend adapter contract.
//!
//! # Example
//!
//! ```rust
//! use qpilot_core::{Job, JobState, JobStore, MemoryStore};
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! rt.block_on(async {
//!     let store = MemoryStore::new();
//!     let job = Job::new("bell", "local-sim", None, 1024);
//!     store.save_job(&job).await.unwrap();
//!
//!     let job = store.transition_job(job.id, JobState::Running).await.unwrap();
//!     assert_eq!(job.state, JobState::Running);
//! });
//! ```

pub mod error;
pub mod memory;
pub mod model;
pub mod normalize;
pub mod pilot;
pub mod result;
pub mod store;

pub use error::{CoreError, CoreResult};
pub use memory::MemoryStore;
pub use model::{
    AssemblerLanguage, Deployment, DeploymentId, Device, ErrorMitigation, Job, JobId, JobState,
    JobType, ProgramId, Provider, QuantumProgram, TransientState, TransientStateId,
};
pub use pilot::{
    Pilot, PilotContext, PilotOutcome, PollOutcome, PreparedProgram, StandardJob,
};
pub use result::{JobResult, ResultType, stack_trace};
pub use store::{JobFilter, JobStore};
