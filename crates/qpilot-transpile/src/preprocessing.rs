//! Turning stored program text into live circuit values.
//!
//! Deployments store programs as strings tagged with an assembler language.
//! Languages whose stored form is already a transpilable text format need no
//! preprocessing; the rest register a [`Preprocessor`]. Preprocessors that
//! execute the program text are unsafe and are refused under the same
//! `exclude_unsafe` flag that removes unsafe converters from chain search.

use std::io::Write as _;
use std::process::{Command, Stdio};

use qpilot_ir::Circuit;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::data::CircuitData;
use crate::error::{ConversionError, TranspileError, TranspileResult};

/// Converts a stored program string into a live circuit value.
pub trait Preprocessor: Send + Sync {
    /// Produce the live value.
    fn preprocess(&self, source: &str) -> Result<CircuitData, ConversionError>;

    /// Whether preprocessing executes the program text.
    fn is_unsafe(&self) -> bool {
        false
    }
}

/// Decodes an `IR_JSON` document into a structured circuit.
#[derive(Debug, Default, Clone, Copy)]
pub struct IrJsonPreprocessor;

impl Preprocessor for IrJsonPreprocessor {
    fn preprocess(&self, source: &str) -> Result<CircuitData, ConversionError> {
        let value: serde_json::Value = serde_json::from_str(source)?;
        Ok(CircuitData::Ir(Circuit::from_json(value)?))
    }
}

/// Runs program text through an external interpreter.
///
/// The program is written to the interpreter's stdin; whatever it prints on
/// stdout is taken as OpenQASM 2 text.
#[derive(Debug, Clone)]
pub struct ScriptPreprocessor {
    interpreter: String,
    args: Vec<String>,
}

impl ScriptPreprocessor {
    /// Run programs with `interpreter`, reading the script from stdin.
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            args: vec!["-".into()],
        }
    }

    /// Replace the interpreter arguments.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl Preprocessor for ScriptPreprocessor {
    fn preprocess(&self, source: &str) -> Result<CircuitData, ConversionError> {
        debug!(interpreter = %self.interpreter, "Executing program script");
        let mut child = Command::new(&self.interpreter)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Feed stdin from another thread so a chatty script cannot block on a full stdout pipe.
        let stdin = child.stdin.take();
        let program = source.to_string();
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(program.as_bytes())?;
            }
            Ok(())
        });

        let output = child.wait_with_output()?;
        let written = writer
            .join()
            .map_err(|_| ConversionError::other("stdin writer thread panicked"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(status = %output.status, "Program script failed");
            return Err(ConversionError::Script {
                status: output.status.to_string(),
                stderr,
            });
        }
        // A script may exit successfully without reading all of its input.
        match written {
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("Program script closed stdin early");
            }
            other => other?,
        }
        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| ConversionError::other(format!("script output is not UTF-8: {e}")))?;
        Ok(CircuitData::Text(stdout))
    }

    fn is_unsafe(&self) -> bool {
        true
    }
}

/// Assembler-language tag → preprocessor.
#[derive(Default)]
pub struct PreprocessingRegistry {
    entries: FxHashMap<String, Box<dyn Preprocessor>>,
}

impl PreprocessingRegistry {
    /// Create an empty registry; every language passes through as text.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `IR_JSON` decoding and `PYTHON` scripts run by `interpreter`.
    pub fn with_builtins(interpreter: impl Into<String>) -> Self {
        let mut registry = Self::new();
        registry.register("IR_JSON", Box::new(IrJsonPreprocessor));
        registry.register("PYTHON", Box::new(ScriptPreprocessor::new(interpreter)));
        registry
    }

    /// Register (or replace) the preprocessor for a language.
    pub fn register(&mut self, language: impl Into<String>, preprocessor: Box<dyn Preprocessor>) {
        self.entries.insert(language.into(), preprocessor);
    }

    /// Whether preprocessing this language executes program text.
    pub fn is_unsafe(&self, language: &str) -> bool {
        self.entries.get(language).is_some_and(|p| p.is_unsafe())
    }

    /// Preprocess a stored program.
    ///
    /// Languages without an entry pass through as [`CircuitData::Text`].
    pub fn preprocess(
        &self,
        language: &str,
        source: &str,
        exclude_unsafe: bool,
    ) -> TranspileResult<CircuitData> {
        let Some(preprocessor) = self.entries.get(language) else {
            return Ok(CircuitData::Text(source.to_string()));
        };
        if exclude_unsafe && preprocessor.is_unsafe() {
            return Err(TranspileError::UnsafeExcluded(language.to_string()));
        }
        preprocessor
            .preprocess(source)
            .map_err(|error| TranspileError::Preprocessing {
                language: language.to_string(),
                error,
            })
    }
}

impl std::fmt::Debug for PreprocessingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut languages: Vec<_> = self.entries.keys().collect();
        languages.sort();
        f.debug_struct("PreprocessingRegistry")
            .field("languages", &languages)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_language_passes_through() {
        let registry = PreprocessingRegistry::with_builtins("python3");
        let out = registry
            .preprocess("QASM2", "OPENQASM 2.0;", true)
            .unwrap();
        assert_eq!(out, CircuitData::Text("OPENQASM 2.0;".into()));
    }

    #[test]
    fn test_ir_json_is_decoded() {
        let registry = PreprocessingRegistry::with_builtins("python3");
        let json = Circuit::bell().unwrap().to_json().unwrap().to_string();
        let out = registry.preprocess("IR_JSON", &json, true).unwrap();
        assert_eq!(out, CircuitData::Ir(Circuit::bell().unwrap()));
    }

    #[test]
    fn test_ir_json_failure_is_wrapped() {
        let registry = PreprocessingRegistry::with_builtins("python3");
        let err = registry.preprocess("IR_JSON", "{not json", false).unwrap_err();
        assert!(matches!(err, TranspileError::Preprocessing { ref language, .. } if language == "IR_JSON"));
    }

    #[test]
    fn test_unsafe_preprocessing_refused_when_excluded() {
        let registry = PreprocessingRegistry::with_builtins("python3");
        assert!(registry.is_unsafe("PYTHON"));
        assert!(!registry.is_unsafe("IR_JSON"));
        let err = registry
            .preprocess("PYTHON", "print('OPENQASM 2.0;')", true)
            .unwrap_err();
        assert!(matches!(err, TranspileError::UnsafeExcluded(l) if l == "PYTHON"));
    }

    #[cfg(unix)]
    #[test]
    fn test_script_output_becomes_text() {
        // `cat` echoes the program back, standing in for an interpreter.
        let pre = ScriptPreprocessor::new("cat").with_args(Vec::<String>::new());
        let out = pre.preprocess("OPENQASM 2.0;\nqreg q[1];\n").unwrap();
        assert_eq!(out, CircuitData::Text("OPENQASM 2.0;\nqreg q[1];\n".into()));
    }

    #[cfg(unix)]
    #[test]
    fn test_script_failure_reports_status() {
        let pre = ScriptPreprocessor::new("sh").with_args(["-c", "echo nope >&2; exit 3"]);
        let err = pre.preprocess("").unwrap_err();
        assert!(matches!(err, ConversionError::Script { ref stderr, .. } if stderr == "nope"));
    }

    #[cfg(unix)]
    #[test]
    fn test_script_may_ignore_its_input() {
        let pre = ScriptPreprocessor::new("sh").with_args(["-c", "echo 'OPENQASM 2.0;'"]);
        // Far more than a pipe buffer, so the write outlives the script.
        let program = "x".repeat(4 * 1024 * 1024);
        let out = pre.preprocess(&program).unwrap();
        assert_eq!(out, CircuitData::Text("OPENQASM 2.0;\n".into()));
    }

    #[test]
    fn test_missing_interpreter_is_io_error() {
        let pre = ScriptPreprocessor::new("qpilot-no-such-interpreter");
        assert!(matches!(pre.preprocess(""), Err(ConversionError::Io(_))));
    }
}
