//! Transpile command implementation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use qpilot_sched::Config;
use qpilot_transpile::{PreprocessingRegistry, TranspileOptions, TranspilerRegistry};

use super::common::{load_program, render};

/// Execute the transpile command.
pub fn execute(
    config: &Config,
    input: &Path,
    language: Option<&str>,
    to: &str,
    output: Option<&Path>,
) -> Result<()> {
    let program = load_program(input, language)?;
    let lang = program.assembler_language;
    let exclude_unsafe = config.dispatch.exclude_unsafe;

    let preprocessors = PreprocessingRegistry::with_builtins(&config.preprocessing.python_interpreter);
    let data = preprocessors.preprocess(lang.tag(), &program.quantum_circuit, exclude_unsafe)?;

    let registry = TranspilerRegistry::with_builtins();
    let mut options = TranspileOptions::default();
    if exclude_unsafe {
        options = options.safe_only();
    }
    let converted = registry.transpile_to_any(&[to], vec![(lang.format().to_string(), data)], &options)?;
    let text = render(converted.data)?;

    match output {
        Some(path) => {
            fs::write(path, &text)
                .with_context(|| format!("Failed to write file: {}", path.display()))?;
            eprintln!(
                "{} {} ({}) → {} via [{}]",
                style("✓").green().bold(),
                style(input.display()).green(),
                lang,
                style(path.display()).green(),
                converted.steps.join(", ")
            );
        }
        None => println!("{text}"),
    }
    Ok(())
}
