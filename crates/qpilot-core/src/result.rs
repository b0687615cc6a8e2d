//! Canonical, provider-independent results.

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::model::{JobId, ProgramId};

/// Kind of a [`JobResult`]; decides the shape of `data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultType {
    /// `{"counts": {key: n}, "probabilities": {key: p}}`
    Counts,
    /// `{"probabilities": {key: p}}`
    Probabilities,
    /// `{"quasi_dist": {key: p}}`
    QuasiDist,
    /// `{"value": v, "variance": s}`
    ValueAndVariance,
    /// `{"exception_message": m}`, with `meta.stack_trace`
    Error,
    /// Vendor upload acknowledgement.
    UploadSuccessful,
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultType::Counts => "COUNTS",
            ResultType::Probabilities => "PROBABILITIES",
            ResultType::QuasiDist => "QUASI_DIST",
            ResultType::ValueAndVariance => "VALUE_AND_VARIANCE",
            ResultType::Error => "ERROR",
            ResultType::UploadSuccessful => "UPLOAD_SUCCESSFUL",
        };
        f.write_str(s)
    }
}

/// One outcome of a job, usually one per program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub program_id: Option<ProgramId>,
    pub result_type: ResultType,
    pub data: Value,
    pub meta: Value,
}

impl JobResult {
    /// Create a result of any type.
    pub fn new(
        job_id: JobId,
        program_id: Option<ProgramId>,
        result_type: ResultType,
        data: Value,
        meta: Value,
    ) -> Self {
        Self {
            job_id,
            program_id,
            result_type,
            data,
            meta,
        }
    }

    /// An ERROR result carrying the message and the full cause chain.
    pub fn error(
        job_id: JobId,
        program_id: Option<ProgramId>,
        error: &(dyn StdError + 'static),
    ) -> Self {
        Self::error_message(job_id, program_id, error.to_string(), stack_trace(error))
    }

    /// An ERROR result from a plain message and trace.
    pub fn error_message(
        job_id: JobId,
        program_id: Option<ProgramId>,
        message: impl Into<String>,
        stack_trace: impl Into<String>,
    ) -> Self {
        Self::new(
            job_id,
            program_id,
            ResultType::Error,
            json!({ "exception_message": message.into() }),
            json!({ "stack_trace": stack_trace.into() }),
        )
    }

    /// A VALUE_AND_VARIANCE result.
    pub fn value_and_variance(
        job_id: JobId,
        program_id: Option<ProgramId>,
        value: f64,
        variance: f64,
        meta: Value,
    ) -> Self {
        Self::new(
            job_id,
            program_id,
            ResultType::ValueAndVariance,
            json!({ "value": value, "variance": variance }),
            meta,
        )
    }

    /// Whether this is an ERROR result.
    pub fn is_error(&self) -> bool {
        self.result_type == ResultType::Error
    }

    /// The error message of an ERROR result.
    pub fn exception_message(&self) -> Option<&str> {
        self.data.get("exception_message").and_then(Value::as_str)
    }
}

/// Render an error and its `source()` chain, one cause per line.
pub fn stack_trace(error: &(dyn StdError + 'static)) -> String {
    let mut lines = vec![format!("{error}")];
    let mut current = error.source();
    while let Some(cause) = current {
        lines.push(format!("caused by: {cause}"));
        current = cause.source();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "step failed")
        }
    }

    impl StdError for Outer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_error_result_shape() {
        let err = Outer(std::io::Error::other("disk on fire"));
        let r = JobResult::error(JobId::new(), None, &err);
        assert!(r.is_error());
        assert_eq!(r.exception_message(), Some("step failed"));
        assert_eq!(
            r.meta["stack_trace"],
            "step failed\ncaused by: disk on fire"
        );
    }

    #[test]
    fn test_result_type_serde() {
        let s = serde_json::to_string(&ResultType::ValueAndVariance).unwrap();
        assert_eq!(s, "\"VALUE_AND_VARIANCE\"");
        assert_eq!(ResultType::QuasiDist.to_string(), "QUASI_DIST");
    }
}
