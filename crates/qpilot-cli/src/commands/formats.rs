//! Formats command implementation.

use anyhow::Result;
use console::style;

use qpilot_transpile::{Transpiler, TranspilerRegistry};

/// Execute the formats command.
pub fn execute() -> Result<()> {
    let registry = TranspilerRegistry::with_builtins();

    let mut formats = registry.known_formats();
    formats.sort_unstable();
    println!("{} Known formats:\n", style("qpilot").cyan().bold());
    for format in formats {
        println!("  {}", style(format).bold());
    }

    println!("\n{} Converters:\n", style("qpilot").cyan().bold());
    let mut converters: Vec<_> = registry.iter().collect();
    converters.sort_by(|a, b| (a.source(), a.target()).cmp(&(b.source(), b.target())));
    for t in converters {
        println!(
            "  {:<8} → {:<8} cost {:>2}  {}{}",
            t.source(),
            t.target(),
            t.cost(),
            style(t.name()).cyan(),
            if t.is_unsafe() {
                style(" (unsafe)").red().to_string()
            } else {
                String::new()
            }
        );
    }
    Ok(())
}
