//! Path command implementation.

use anyhow::Result;
use console::style;

use qpilot_transpile::{TranspileOptions, Transpiler, TranspilerRegistry};

/// Execute the path command.
pub fn execute(from: &str, to: &str, safe_only: bool) -> Result<()> {
    let registry = TranspilerRegistry::with_builtins();
    let mut options = TranspileOptions::default();
    if safe_only {
        options = options.safe_only();
    }

    let chain = registry.find_chain(&[from], to, &options)?;
    if chain.is_empty() {
        println!("{} {} needs no conversion", style("✓").green().bold(), from);
        return Ok(());
    }

    println!(
        "{} {} → {} in {} step(s), cost {}",
        style("✓").green().bold(),
        style(from).green(),
        style(to).yellow(),
        chain.len(),
        chain.cost()
    );
    for step in chain.steps() {
        println!(
            "  {} {} → {}",
            style(step.name()).cyan(),
            step.source(),
            step.target()
        );
    }
    Ok(())
}
