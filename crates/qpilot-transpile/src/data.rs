//! Live circuit values flowing through converter chains.

use qpilot_ir::Circuit;
use serde::{Deserialize, Serialize};

use crate::error::ConversionError;

/// A circuit in some format, as handed to and returned from converters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CircuitData {
    /// Structured circuit.
    Ir(Circuit),
    /// Source text of a textual dialect.
    Text(String),
    /// A JSON document.
    Json(serde_json::Value),
}

impl CircuitData {
    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            CircuitData::Ir(_) => "ir",
            CircuitData::Text(_) => "text",
            CircuitData::Json(_) => "json",
        }
    }

    /// Unwrap a structured circuit or report what was found instead.
    pub fn into_ir(self) -> Result<Circuit, ConversionError> {
        match self {
            CircuitData::Ir(c) => Ok(c),
            other => Err(ConversionError::UnexpectedInput {
                expected: "ir",
                found: other.kind(),
            }),
        }
    }

    /// Unwrap source text or report what was found instead.
    pub fn into_text(self) -> Result<String, ConversionError> {
        match self {
            CircuitData::Text(s) => Ok(s),
            other => Err(ConversionError::UnexpectedInput {
                expected: "text",
                found: other.kind(),
            }),
        }
    }

    /// Borrow the text, if this is a textual value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CircuitData::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Abbreviated rendering used in error context.
    pub fn preview(&self) -> String {
        const LIMIT: usize = 120;
        let full = match self {
            CircuitData::Ir(c) => format!(
                "<ir '{}': {} qubits, {} instructions>",
                c.name(),
                c.num_qubits(),
                c.instructions().len()
            ),
            CircuitData::Text(s) => s.clone(),
            CircuitData::Json(v) => v.to_string(),
        };
        if full.chars().count() <= LIMIT {
            full
        } else {
            let cut: String = full.chars().take(LIMIT).collect();
            format!("{cut}...")
        }
    }
}

impl From<Circuit> for CircuitData {
    fn from(c: Circuit) -> Self {
        CircuitData::Ir(c)
    }
}

impl From<String> for CircuitData {
    fn from(s: String) -> Self {
        CircuitData::Text(s)
    }
}
