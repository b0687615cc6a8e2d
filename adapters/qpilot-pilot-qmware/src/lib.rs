//! qpilot pilot for QMware
//!
//! Submits runner jobs to the QMware cloud REST API and tracks each
//! submitted program as a transient entry of scheme `QMWARE` until the
//! result watcher collects it.
//!
//! | Endpoint | Use |
//! |----------|-----|
//! | `POST /v0/requests` | submit one QASM 2 program |
//! | `GET /v0/requests/{id}` | poll status and counts |
//! | `DELETE /v0/requests/{id}` | cancel |
//!
//! | QMware status | Poll outcome |
//! |---------------|--------------|
//! | `ACCEPTED`, `QUEUED`, `RUNNING` | pending |
//! | `SUCCESS`, `COMPLETED` | COUNTS result |
//! | `FAILED`, `TIMEOUT`, `CANCELLED` | failed |
//! | anything else | unknown, raw body kept |
//!
//! # Authentication
//!
//! The provider requires a user token. It travels with the job
//! (`JobRequest::with_token`) and reaches the pilot through the
//! `PilotContext`; requests without one fail with an authentication error.
//!
//! # Example
//!
//! ```ignore
//! use qpilot_pilot_qmware::QmwarePilot;
//!
//! let pilot = QmwarePilot::with_endpoint("https://api.qmware.net")?;
//! let pilots = PilotRegistry::new().with(Arc::new(pilot))?;
//! ```

mod api;
mod error;
mod pilot;

pub use api::{
    BASE_URL, QmwareApi, QmwareClient, RequestPhase, StatusResponse, SubmitRequest,
    SubmitResponse,
};
pub use error::{QmwareError, QmwareResult};
pub use pilot::{DEVICE, PROVIDER, QmwarePilot, SCHEME};
