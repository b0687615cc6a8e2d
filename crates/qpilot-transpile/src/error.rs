//! Error types for format conversion.

use thiserror::Error;

/// Failure inside a single converter or preprocessor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConversionError {
    /// The converter was handed a value of the wrong shape.
    #[error("expected {expected} input, got {found}")]
    UnexpectedInput {
        expected: &'static str,
        found: &'static str,
    },

    /// IR construction or decoding failed.
    #[error(transparent)]
    Ir(#[from] qpilot_ir::IrError),

    /// QASM parsing or emission failed.
    #[error(transparent)]
    Qasm(#[from] qpilot_qasm::ParseError),

    /// JSON decoding failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Spawning or talking to a subprocess failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A script exited unsuccessfully.
    #[error("script exited with {status}: {stderr}")]
    Script { status: String, stderr: String },

    /// Any other converter-specific failure.
    #[error("{0}")]
    Other(String),
}

impl ConversionError {
    /// Build an [`ConversionError::Other`] from any message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Errors raised by the registry, path finder and executor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TranspileError {
    /// Format never named by any registered converter.
    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    /// No admissible chain connects the sources to the target.
    #[error("No transpile path from [{}] to {target}", .sources.join(", "))]
    NoPath {
        sources: Vec<String>,
        target: String,
    },

    /// `transpile_circuit` called without any circuit.
    #[error("No circuits supplied to transpile")]
    NoCircuits,

    /// Search called without candidate source formats.
    #[error("No source formats supplied")]
    EmptySources,

    /// `transpile_to_any` called without target formats.
    #[error("No target formats supplied")]
    NoTargets,

    /// The target format itself is excluded.
    #[error("Target format {0} is excluded")]
    TargetExcluded(String),

    /// Every candidate source format is excluded.
    #[error("All source formats are excluded: [{}]", .0.join(", "))]
    AllSourcesExcluded(Vec<String>),

    /// Converter declared a zero cost.
    #[error("Transpiler '{0}' must declare a positive cost")]
    InvalidCost(String),

    /// A converter with this name is already registered.
    #[error("Transpiler '{0}' is already registered")]
    DuplicateTranspiler(String),

    /// One step of a chain failed.
    #[error("Transpiler '{transpiler}' failed converting {source_format} to {target_format} (input: {input})")]
    Conversion {
        transpiler: String,
        source_format: String,
        target_format: String,
        /// Abbreviated rendering of the value being converted.
        input: String,
        #[source]
        error: ConversionError,
    },

    /// An unsafe preprocessor was requested while unsafe code paths are excluded.
    #[error("Preprocessing for language {0} executes program text and unsafe paths are excluded")]
    UnsafeExcluded(String),

    /// Preprocessing a stored program failed.
    #[error("Preprocessing {language} failed")]
    Preprocessing {
        language: String,
        #[source]
        error: ConversionError,
    },
}

/// Result type for transpile operations.
pub type TranspileResult<T> = Result<T, TranspileError>;
