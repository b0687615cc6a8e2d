//! The fixed set of pilots, one per provider.

use std::sync::Arc;

use qpilot_core::{JobStore, Pilot};
use tracing::{debug, info};

use crate::error::{SchedError, SchedResult};

/// Pilots known to the dispatcher, built once at startup.
#[derive(Default, Clone)]
pub struct PilotRegistry {
    pilots: Vec<Arc<dyn Pilot>>,
}

impl PilotRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pilot; a provider may be served by only one.
    pub fn register(&mut self, pilot: Arc<dyn Pilot>) -> SchedResult<()> {
        if self.pilots.iter().any(|p| p.provider() == pilot.provider()) {
            return Err(SchedError::DuplicatePilot(pilot.provider().to_string()));
        }
        debug!(
            provider = pilot.provider(),
            formats = ?pilot.supported_formats(),
            "Registering pilot"
        );
        self.pilots.push(pilot);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, pilot: Arc<dyn Pilot>) -> SchedResult<Self> {
        self.register(pilot)?;
        Ok(self)
    }

    /// The pilot serving `provider`.
    pub fn resolve(&self, provider: &str) -> SchedResult<Arc<dyn Pilot>> {
        self.pilots
            .iter()
            .find(|p| p.provider() == provider)
            .cloned()
            .ok_or_else(|| SchedError::NoPilot(provider.to_string()))
    }

    /// Provider names in registration order.
    pub fn providers(&self) -> Vec<&str> {
        self.pilots.iter().map(|p| p.provider()).collect()
    }

    /// Iterate over the pilots.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Pilot>> {
        self.pilots.iter()
    }

    /// Upsert every pilot's seed provider, devices and standard job.
    ///
    /// Safe to call repeatedly: providers and devices are keyed by name and
    /// a standard deployment is only created if none with its name exists.
    pub async fn seed(&self, store: &dyn JobStore) -> SchedResult<()> {
        for pilot in &self.pilots {
            store.upsert_provider(&pilot.standard_provider()).await?;
            for device in pilot.standard_devices() {
                store.upsert_device(&device).await?;
                let Some(standard) = pilot.standard_job_with_deployment(&device) else {
                    continue;
                };
                if store
                    .find_deployment(&standard.deployment.name)
                    .await?
                    .is_some()
                {
                    continue;
                }
                store.save_deployment(&standard.deployment).await?;
                store.save_job(&standard.job).await?;
                info!(
                    provider = pilot.provider(),
                    device = %device.name,
                    deployment = %standard.deployment.name,
                    "Seeded standard job"
                );
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for PilotRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PilotRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}
