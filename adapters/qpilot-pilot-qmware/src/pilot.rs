//! The QMware pilot: submits QASM 2 programs and tracks them as transient
//! state until the watcher collects their counts.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use qpilot_core::normalize::counts_result;
use qpilot_core::{
    AssemblerLanguage, CoreError, CoreResult, Device, ErrorMitigation, Job, Pilot,
    PilotContext, PilotOutcome, PollOutcome, PreparedProgram, Provider, TransientState,
};
use qpilot_transpile::formats;

use crate::api::{QmwareApi, QmwareClient, RequestPhase, SubmitRequest};
use crate::error::{QmwareError, QmwareResult};

/// Provider served by [`QmwarePilot`].
pub const PROVIDER: &str = "QMWARE";

/// Transient state scheme of submitted requests.
pub const SCHEME: &str = "QMWARE";

/// Default device name.
pub const DEVICE: &str = "qmware_simulator";

const REQUEST_ID: &str = "request_id";

/// Runs runner jobs on QMware.
///
/// Every program becomes one remote request; its id is stored as a
/// transient entry `{"request_id": ...}` and resolved by [`Pilot::poll`].
#[derive(Clone)]
pub struct QmwarePilot {
    api: Arc<dyn QmwareApi>,
    device: String,
    num_qubits: u32,
}

impl std::fmt::Debug for QmwarePilot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QmwarePilot")
            .field("device", &self.device)
            .field("num_qubits", &self.num_qubits)
            .finish_non_exhaustive()
    }
}

impl QmwarePilot {
    /// Pilot talking to the production endpoint.
    pub fn new() -> QmwareResult<Self> {
        Ok(Self::with_api(Arc::new(QmwareClient::new()?)))
    }

    /// Pilot talking to a custom endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> QmwareResult<Self> {
        Ok(Self::with_api(Arc::new(QmwareClient::with_base_url(
            endpoint,
        )?)))
    }

    /// Pilot over any API implementation.
    pub fn with_api(api: Arc<dyn QmwareApi>) -> Self {
        Self {
            api,
            device: DEVICE.to_string(),
            num_qubits: 40,
        }
    }

    /// Device name registered by [`Pilot::standard_devices`].
    pub fn with_device(mut self, name: impl Into<String>, num_qubits: u32) -> Self {
        self.device = name.into();
        self.num_qubits = num_qubits;
        self
    }

    fn token(ctx: &PilotContext) -> QmwareResult<&str> {
        ctx.token.as_deref().ok_or(QmwareError::MissingToken)
    }

    /// Submit programs in order, recording each entry as soon as it exists.
    async fn submit_all(
        &self,
        job: &Job,
        programs: &[PreparedProgram],
        ctx: &PilotContext,
        token: &str,
        entries: &mut Vec<TransientState>,
    ) -> CoreResult<()> {
        for (i, program) in programs.iter().enumerate() {
            let circuit = program.data.as_text().ok_or_else(|| {
                QmwareError::InvalidProgram(format!(
                    "program {} arrived as {}",
                    program.program_id,
                    program.data.kind()
                ))
            })?;
            let req = SubmitRequest::qasm2(format!("{}-{i}", job.name), circuit, job.shots);
            let resp = self.api.submit(token, &req).await?;
            debug!(program = %program.program_id, request_id = %resp.id, "Submitted");

            let entry = TransientState::new(
                job.id,
                Some(program.program_id),
                SCHEME,
                json!({ REQUEST_ID: resp.id }),
            );
            ctx.store.save_transient(&entry).await?;
            entries.push(entry);
        }
        Ok(())
    }

    /// Undo a partial submission.
    async fn abandon(&self, entries: &[TransientState], ctx: &PilotContext, token: &str) {
        for entry in entries {
            if let Some(id) = request_id(entry) {
                if let Err(e) = self.api.cancel(token, id).await {
                    warn!(request_id = id, error = %e, "Could not cancel abandoned request");
                }
            }
            if let Err(e) = ctx.store.delete_transient(entry.id).await {
                warn!(entry = %entry.id, error = %e, "Could not delete abandoned entry");
            }
        }
    }
}

fn request_id(entry: &TransientState) -> Option<&str> {
    entry.data.get(REQUEST_ID).and_then(|v| v.as_str())
}

#[async_trait]
impl Pilot for QmwarePilot {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn supported_formats(&self) -> &[&'static str] {
        &[formats::QASM2]
    }

    fn transient_scheme(&self) -> Option<&str> {
        Some(SCHEME)
    }

    #[instrument(skip_all, fields(job_id = %job.id, programs = programs.len()))]
    async fn run(
        &self,
        job: &Job,
        programs: &[PreparedProgram],
        ctx: &PilotContext,
    ) -> CoreResult<PilotOutcome> {
        let token = Self::token(ctx)?;
        if job.error_mitigation != ErrorMitigation::None {
            return Err(CoreError::Unsupported(format!(
                "error mitigation {:?} on provider {PROVIDER}",
                job.error_mitigation
            )));
        }

        let mut submitted = Vec::with_capacity(programs.len());
        if let Err(e) = self
            .submit_all(job, programs, ctx, token, &mut submitted)
            .await
        {
            self.abandon(&submitted, ctx, token).await;
            return Err(e);
        }
        info!(requests = submitted.len(), "Submitted job to QMware");
        Ok(PilotOutcome::Submitted)
    }

    #[instrument(skip_all, fields(job_id = %job.id))]
    async fn cancel_provider_specific(&self, job: &Job, ctx: &PilotContext) -> CoreResult<()> {
        let token = Self::token(ctx)?;
        for entry in ctx.store.list_transient(job.id, Some(SCHEME)).await? {
            let Some(id) = request_id(&entry) else {
                continue;
            };
            match self.api.cancel(token, id).await {
                Ok(()) | Err(QmwareError::RequestNotFound(_)) => {
                    debug!(request_id = id, "Cancelled request");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(entry = %entry.id))]
    async fn poll(&self, entry: &TransientState, ctx: &PilotContext) -> CoreResult<PollOutcome> {
        let Some(id) = request_id(entry) else {
            return Ok(PollOutcome::Unknown {
                raw: entry.data.clone(),
            });
        };
        let token = Self::token(ctx)?;
        let resp = match self.api.status(token, id).await {
            Ok(resp) => resp,
            Err(QmwareError::RequestNotFound(_)) => {
                return Ok(PollOutcome::Failed {
                    message: format!("QMware no longer knows request {id}"),
                });
            }
            Err(e) => return Err(e.into()),
        };

        match resp.phase() {
            RequestPhase::Pending => Ok(PollOutcome::Pending),
            RequestPhase::Succeeded => {
                let Some(counts) = resp.counts else {
                    return Ok(PollOutcome::Unknown {
                        raw: serde_json::to_value(&resp)?,
                    });
                };
                let result = counts_result(entry.job_id, entry.program_id, counts, &[])?;
                Ok(PollOutcome::Done(vec![result]))
            }
            RequestPhase::Failed => Ok(PollOutcome::Failed {
                message: resp.message.unwrap_or_else(|| {
                    format!("QMware request {id} ended with status {}", resp.status)
                }),
            }),
            RequestPhase::Unrecognized => Ok(PollOutcome::Unknown {
                raw: serde_json::to_value(&resp)?,
            }),
        }
    }

    async fn is_device_available(&self, device: &Device, token: Option<&str>) -> CoreResult<bool> {
        Ok(device.name == self.device && token.is_some())
    }

    fn standard_provider(&self) -> Provider {
        Provider {
            name: PROVIDER.to_string(),
            with_token: true,
            supported_languages: vec![
                AssemblerLanguage::Qasm2,
                AssemblerLanguage::Qasm3,
                AssemblerLanguage::IrJson,
            ],
        }
    }

    fn standard_devices(&self) -> Vec<Device> {
        vec![Device {
            name: self.device.clone(),
            provider: PROVIDER.to_string(),
            num_qubits: self.num_qubits,
            is_simulator: true,
            is_local: false,
        }]
    }
}
