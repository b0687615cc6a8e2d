//! Shared helpers for CLI commands.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;

use qpilot_core::{AssemblerLanguage, JobResult, JobStore, QuantumProgram, ResultType};
use qpilot_pilot_qmware::QmwarePilot;
use qpilot_pilot_sim::SimulatorPilot;
use qpilot_sched::{Config, Dispatcher, PilotRegistry, TokioTaskQueue};
use qpilot_transpile::{CircuitData, PreprocessingRegistry, TranspilerRegistry};

/// Pick the assembler language of a file.
///
/// An explicit language wins; `.qasm` files are told apart by their
/// `OPENQASM` header.
pub fn detect_language(path: &Path, source: &str, explicit: Option<&str>) -> Result<AssemblerLanguage> {
    if let Some(lang) = explicit {
        return lang.parse().map_err(|e: String| anyhow::anyhow!(e));
    }

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext.to_lowercase().as_str() {
        "qasm" => {
            let is_v3 = source
                .lines()
                .map(str::trim)
                .find(|l| l.starts_with("OPENQASM"))
                .is_some_and(|l| l.starts_with("OPENQASM 3"));
            Ok(if is_v3 {
                AssemblerLanguage::Qasm3
            } else {
                AssemblerLanguage::Qasm2
            })
        }
        "qasm3" => Ok(AssemblerLanguage::Qasm3),
        "json" => Ok(AssemblerLanguage::IrJson),
        "quil" => Ok(AssemblerLanguage::Quil),
        "py" => Ok(AssemblerLanguage::Python),
        other => anyhow::bail!(
            "Cannot tell the language of '{}' (extension '{other}'); pass --language",
            path.display()
        ),
    }
}

/// Read a file into a stored program.
pub fn load_program(path: &Path, explicit: Option<&str>) -> Result<QuantumProgram> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let language = detect_language(path, &source, explicit)?;
    Ok(QuantumProgram::new(source, language))
}

/// Text form of a converted circuit.
pub fn render(data: CircuitData) -> Result<String> {
    match data {
        CircuitData::Text(text) => Ok(text),
        CircuitData::Json(value) => Ok(serde_json::to_string_pretty(&value)?),
        CircuitData::Ir(circuit) => Ok(serde_json::to_string_pretty(&circuit.to_json()?)?),
    }
}

/// Pilots for every provider the CLI knows.
pub fn build_pilots(config: &Config) -> Result<PilotRegistry> {
    let sim = &config.pilots.simulator;
    let mut simulator = SimulatorPilot::new().with_max_qubits(sim.max_qubits);
    if let Some(seed) = sim.seed {
        simulator = simulator.with_seed(seed);
    }
    let qmware = QmwarePilot::with_endpoint(&config.pilots.qmware.endpoint)
        .context("Failed to set up the QMware client")?;

    Ok(PilotRegistry::new()
        .with(Arc::new(simulator))?
        .with(Arc::new(qmware))?)
}

/// A dispatcher over `store` with the store already seeded.
pub async fn build_dispatcher(config: &Config, store: Arc<dyn JobStore>) -> Result<Dispatcher> {
    let pilots = Arc::new(build_pilots(config)?);
    pilots.seed(store.as_ref()).await?;
    Ok(Dispatcher::new(
        store,
        pilots,
        Arc::new(TranspilerRegistry::with_builtins()),
        Arc::new(PreprocessingRegistry::with_builtins(
            &config.preprocessing.python_interpreter,
        )),
        Arc::new(TokioTaskQueue::new()),
        config.dispatch_config(),
    ))
}

/// Print one program's results.
pub fn print_result(index: usize, result: &JobResult) {
    let header = format!("Program {}", index + 1);
    match result.result_type {
        ResultType::Error => {
            println!(
                "\n{} {}: {}",
                style("✗").red().bold(),
                header,
                result.exception_message().unwrap_or("unknown error")
            );
        }
        ResultType::ValueAndVariance => {
            println!(
                "\n{} {}: value {} variance {}",
                style("✓").green().bold(),
                header,
                style(&result.data["value"]).yellow(),
                result.data["variance"]
            );
        }
        ResultType::UploadSuccessful => {
            println!("\n{} {}: uploaded {}", style("✓").green().bold(), header, result.data);
        }
        ResultType::Counts | ResultType::Probabilities | ResultType::QuasiDist => {
            let (field, is_counts) = match result.result_type {
                ResultType::Counts => ("counts", true),
                ResultType::Probabilities => ("probabilities", false),
                _ => ("quasi_dist", false),
            };
            println!("\n{} {} ({}):", style("✓").green().bold(), header, field);
            let Some(entries) = result.data[field].as_object() else {
                return;
            };
            let mut sorted: Vec<(&String, f64)> = entries
                .iter()
                .filter_map(|(k, v)| v.as_f64().map(|v| (k, v)))
                .collect();
            sorted.sort_by(|a, b| b.1.total_cmp(&a.1));
            let total: f64 = if is_counts {
                sorted.iter().map(|(_, v)| v).sum::<f64>().max(1.0)
            } else {
                1.0
            };

            for (key, value) in sorted.iter().take(16) {
                let prob = value / total * 100.0;
                let bar: String = "█".repeat((prob / 2.0).round().max(0.0) as usize);
                println!(
                    "  {:>8}: {:>8} ({:>5.2}%) {}",
                    style(key).cyan(),
                    value,
                    prob,
                    style(bar).green()
                );
            }
            if sorted.len() > 16 {
                println!("  ... and {} more outcomes", sorted.len() - 16);
            }
        }
    }
}
