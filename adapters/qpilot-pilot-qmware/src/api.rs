//! QMware REST API client.
//!
//! Requests are created with `POST /v0/requests`, polled with
//! `GET /v0/requests/{id}` and cancelled with `DELETE /v0/requests/{id}`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{QmwareError, QmwareResult};

/// QMware cloud API base URL.
pub const BASE_URL: &str = "https://api.qmware.net";

/// The calls the pilot makes against QMware.
#[async_trait]
pub trait QmwareApi: Send + Sync {
    /// Create a request; returns its id.
    async fn submit(&self, token: &str, req: &SubmitRequest) -> QmwareResult<SubmitResponse>;

    /// Current status of a request, with counts once it succeeded.
    async fn status(&self, token: &str, request_id: &str) -> QmwareResult<StatusResponse>;

    /// Cancel a request. Already finished requests are not an error.
    async fn cancel(&self, token: &str, request_id: &str) -> QmwareResult<()>;
}

/// `reqwest` implementation of [`QmwareApi`].
pub struct QmwareClient {
    client: Client,
    /// API base URL (without trailing slash).
    base_url: String,
}

impl std::fmt::Debug for QmwareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QmwareClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl QmwareClient {
    /// Client for the production endpoint.
    pub fn new() -> QmwareResult<Self> {
        Self::with_base_url(BASE_URL)
    }

    /// Client targeting a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> QmwareResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Deserialize a success body or turn the status into an error.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
        request_id: Option<&str>,
    ) -> QmwareResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let message = response.text().await.unwrap_or_default();
        match (status, request_id) {
            (StatusCode::NOT_FOUND, Some(id)) => Err(QmwareError::RequestNotFound(id.to_string())),
            _ => Err(QmwareError::ApiError {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

#[async_trait]
impl QmwareApi for QmwareClient {
    #[instrument(skip_all, fields(name = %req.name, shots = req.shots))]
    async fn submit(&self, token: &str, req: &SubmitRequest) -> QmwareResult<SubmitResponse> {
        let url = self.url("v0/requests");
        debug!("POST {}", url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(req)
            .send()
            .await?;
        Self::handle_response(resp, None).await
    }

    #[instrument(skip(self, token))]
    async fn status(&self, token: &str, request_id: &str) -> QmwareResult<StatusResponse> {
        let url = self.url(&format!("v0/requests/{request_id}"));
        debug!("GET {}", url);
        let resp = self.client.get(&url).bearer_auth(token).send().await?;
        Self::handle_response(resp, Some(request_id)).await
    }

    #[instrument(skip(self, token))]
    async fn cancel(&self, token: &str, request_id: &str) -> QmwareResult<()> {
        let url = self.url(&format!("v0/requests/{request_id}"));
        debug!("DELETE {}", url);
        let resp = self.client.delete(&url).bearer_auth(token).send().await?;

        let status = resp.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            // 409: the request already reached a final state.
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            Err(QmwareError::RequestNotFound(request_id.to_string()))
        } else {
            let message = resp.text().await.unwrap_or_default();
            Err(QmwareError::ApiError {
                status: status.as_u16(),
                message,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response serde types
// ---------------------------------------------------------------------------

/// Body of `POST /v0/requests`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub name: String,
    /// Circuit source in `language`.
    pub circuit: String,
    pub language: String,
    pub shots: u32,
}

impl SubmitRequest {
    /// An OpenQASM 2 request.
    pub fn qasm2(name: impl Into<String>, circuit: impl Into<String>, shots: u32) -> Self {
        Self {
            name: name.into(),
            circuit: circuit.into(),
            language: "qasm2".to_string(),
            shots,
        }
    }
}

/// Response of `POST /v0/requests`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Assigned request id.
    pub id: String,
}

/// Response of `GET /v0/requests/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    /// Measurement counts keyed by bitstring, present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts: Option<BTreeMap<String, u64>>,
    /// Failure reason, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// How a QMware status string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Pending,
    Succeeded,
    Failed,
    Unrecognized,
}

impl StatusResponse {
    /// Classify the status string, ignoring case.
    pub fn phase(&self) -> RequestPhase {
        match self.status.to_ascii_uppercase().as_str() {
            "ACCEPTED" | "QUEUED" | "RUNNING" => RequestPhase::Pending,
            "SUCCESS" | "COMPLETED" => RequestPhase::Succeeded,
            "FAILED" | "TIMEOUT" | "CANCELLED" => RequestPhase::Failed,
            _ => RequestPhase::Unrecognized,
        }
    }
}
