//! Providers command implementation.

use std::sync::Arc;

use anyhow::Result;
use console::style;

use qpilot_core::{JobStore, MemoryStore, Pilot};
use qpilot_sched::Config;

use super::common::build_pilots;

/// Execute the providers command.
pub async fn execute(config: &Config) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let pilots = build_pilots(config)?;
    pilots.seed(store.as_ref()).await?;

    let token = config.pilots.qmware.token.as_deref();
    let devices = store.list_devices().await?;
    println!("{} Providers:\n", style("qpilot").cyan().bold());

    for provider in store.list_providers().await? {
        let pilot = pilots.resolve(&provider.name)?;
        let languages: Vec<String> = provider
            .supported_languages
            .iter()
            .map(ToString::to_string)
            .collect();
        println!(
            "  {}{}",
            style(&provider.name).bold(),
            if provider.with_token {
                " (token required)"
            } else {
                ""
            }
        );
        println!("    Languages: {}", languages.join(", "));
        println!("    Formats: {}", pilot.supported_formats().join(", "));

        for device in devices.iter().filter(|d| d.provider == provider.name) {
            let available = pilot
                .is_device_available(device, token)
                .await
                .unwrap_or(false);
            println!(
                "    {} {} ({} qubits{})",
                if available {
                    style("●").green()
                } else {
                    style("○").yellow()
                },
                device.name,
                device.num_qubits,
                if device.is_simulator { ", simulator" } else { "" }
            );
        }
        println!();
    }
    Ok(())
}
