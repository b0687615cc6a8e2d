//! In-process store for tests, the CLI and single-node deployments.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::model::{
    Deployment, DeploymentId, Device, Job, JobId, JobState, ProgramId, Provider,
    TransientState, TransientStateId,
};
use crate::result::JobResult;
use crate::store::{JobFilter, JobStore};

#[derive(Default)]
struct Tables {
    jobs: FxHashMap<JobId, Job>,
    deployments: FxHashMap<DeploymentId, Deployment>,
    providers: BTreeMap<String, Provider>,
    devices: BTreeMap<String, Device>,
    results: FxHashMap<JobId, Vec<JobResult>>,
    transient: FxHashMap<TransientStateId, TransientState>,
}

/// [`JobStore`] backed by hash maps behind one `RwLock`.
///
/// Each method takes the lock once, so every call is a single commit.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn save_job(&self, job: &Job) -> CoreResult<()> {
        self.tables.write().await.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn load_job(&self, id: JobId) -> CoreResult<Option<Job>> {
        Ok(self.tables.read().await.jobs.get(&id).cloned())
    }

    async fn transition_job(&self, id: JobId, to: JobState) -> CoreResult<Job> {
        let mut tables = self.tables.write().await;
        let job = tables
            .jobs
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("Job", id))?;
        let from = job.state;
        job.transition(to)?;
        debug!(job_id = %id, %from, %to, "Job state changed");
        Ok(job.clone())
    }

    async fn list_jobs(&self, filter: &JobFilter) -> CoreResult<Vec<Job>> {
        let tables = self.tables.read().await;
        let mut jobs: Vec<Job> = tables
            .jobs
            .values()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn save_deployment(&self, deployment: &Deployment) -> CoreResult<()> {
        self.tables
            .write()
            .await
            .deployments
            .insert(deployment.id, deployment.clone());
        Ok(())
    }

    async fn load_deployment(&self, id: DeploymentId) -> CoreResult<Option<Deployment>> {
        Ok(self.tables.read().await.deployments.get(&id).cloned())
    }

    async fn find_deployment(&self, name: &str) -> CoreResult<Option<Deployment>> {
        Ok(self
            .tables
            .read()
            .await
            .deployments
            .values()
            .find(|d| d.name == name)
            .cloned())
    }

    async fn delete_deployment(&self, id: DeploymentId) -> CoreResult<bool> {
        let mut tables = self.tables.write().await;
        let users = tables
            .jobs
            .values()
            .filter(|j| j.deployment_id == Some(id))
            .count();
        if users > 0 {
            return Err(CoreError::DeploymentInUse(id, users));
        }
        Ok(tables.deployments.remove(&id).is_some())
    }

    async fn upsert_provider(&self, provider: &Provider) -> CoreResult<()> {
        self.tables
            .write()
            .await
            .providers
            .insert(provider.name.clone(), provider.clone());
        Ok(())
    }

    async fn load_provider(&self, name: &str) -> CoreResult<Option<Provider>> {
        Ok(self.tables.read().await.providers.get(name).cloned())
    }

    async fn list_providers(&self) -> CoreResult<Vec<Provider>> {
        Ok(self.tables.read().await.providers.values().cloned().collect())
    }

    async fn upsert_device(&self, device: &Device) -> CoreResult<()> {
        self.tables
            .write()
            .await
            .devices
            .insert(device.name.clone(), device.clone());
        Ok(())
    }

    async fn load_device(&self, name: &str) -> CoreResult<Option<Device>> {
        Ok(self.tables.read().await.devices.get(name).cloned())
    }

    async fn list_devices(&self) -> CoreResult<Vec<Device>> {
        Ok(self.tables.read().await.devices.values().cloned().collect())
    }

    async fn replace_results(&self, job_id: JobId, results: Vec<JobResult>) -> CoreResult<()> {
        self.tables.write().await.results.insert(job_id, results);
        Ok(())
    }

    async fn append_results(&self, job_id: JobId, results: Vec<JobResult>) -> CoreResult<()> {
        self.tables
            .write()
            .await
            .results
            .entry(job_id)
            .or_default()
            .extend(results);
        Ok(())
    }

    async fn load_results(&self, job_id: JobId) -> CoreResult<Vec<JobResult>> {
        Ok(self
            .tables
            .read()
            .await
            .results
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn order_results(&self, job_id: JobId, programs: &[ProgramId]) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(results) = tables.results.get_mut(&job_id) {
            results.sort_by_key(|r| {
                r.program_id
                    .and_then(|id| programs.iter().position(|p| *p == id))
                    .unwrap_or(usize::MAX)
            });
        }
        Ok(())
    }

    async fn save_transient(&self, entry: &TransientState) -> CoreResult<()> {
        self.tables
            .write()
            .await
            .transient
            .insert(entry.id, entry.clone());
        Ok(())
    }

    async fn list_transient(
        &self,
        job_id: JobId,
        scheme: Option<&str>,
    ) -> CoreResult<Vec<TransientState>> {
        let tables = self.tables.read().await;
        let mut entries: Vec<TransientState> = tables
            .transient
            .values()
            .filter(|t| t.job_id == job_id && scheme.is_none_or(|s| t.scheme == s))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(entries)
    }

    async fn delete_transient(&self, id: TransientStateId) -> CoreResult<bool> {
        Ok(self.tables.write().await.transient.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssemblerLanguage, QuantumProgram};
    use serde_json::json;

    #[tokio::test]
    async fn test_job_round_trip_and_filter() {
        let store = MemoryStore::new();
        let a = Job::new("a", "dev", None, 10).with_executed_by("alice");
        let b = Job::new("b", "dev", None, 10);
        store.save_job(&a).await.unwrap();
        store.save_job(&b).await.unwrap();

        assert_eq!(store.load_job(a.id).await.unwrap(), Some(a.clone()));
        let alice = store
            .list_jobs(&JobFilter::all().with_executed_by("alice"))
            .await
            .unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].id, a.id);

        store.transition_job(b.id, JobState::Running).await.unwrap();
        let running = store
            .list_jobs(&JobFilter::all().with_state(JobState::Running))
            .await
            .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, b.id);
    }

    #[tokio::test]
    async fn test_order_results_follows_program_order() {
        let store = MemoryStore::new();
        let job = JobId::new();
        let (p0, p1) = (ProgramId::new(), ProgramId::new());
        let late = JobResult::error_message(job, Some(p1), "p1", "");
        let early = JobResult::error_message(job, Some(p0), "p0", "");
        let global = JobResult::error_message(job, None, "job", "");
        store
            .append_results(job, vec![global, late, early])
            .await
            .unwrap();

        store.order_results(job, &[p0, p1]).await.unwrap();
        let order: Vec<_> = store
            .load_results(job)
            .await
            .unwrap()
            .iter()
            .map(|r| r.program_id)
            .collect();
        assert_eq!(order, vec![Some(p0), Some(p1), None]);

        // No results yet is fine.
        store.order_results(JobId::new(), &[p0]).await.unwrap();
    }

    #[tokio::test]
    async fn test_forbidden_transition_leaves_job_unchanged() {
        let store = MemoryStore::new();
        let job = Job::new("j", "dev", None, 1);
        store.save_job(&job).await.unwrap();
        store.transition_job(job.id, JobState::Canceled).await.unwrap();
        assert!(matches!(
            store.transition_job(job.id, JobState::Running).await,
            Err(CoreError::InvalidTransition { .. })
        ));
        let stored = store.load_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Canceled);

        assert!(matches!(
            store.transition_job(JobId::new(), JobState::Running).await,
            Err(CoreError::NotFound { kind: "Job", .. })
        ));
    }

    #[tokio::test]
    async fn test_referenced_deployment_cannot_be_deleted() {
        let store = MemoryStore::new();
        let dep = Deployment::new(
            "d",
            vec![QuantumProgram::new("x", AssemblerLanguage::Qasm2)],
        );
        store.save_deployment(&dep).await.unwrap();
        let job = Job::new("j", "dev", Some(dep.id), 1);
        store.save_job(&job).await.unwrap();

        assert!(matches!(
            store.delete_deployment(dep.id).await,
            Err(CoreError::DeploymentInUse(_, 1))
        ));
        assert_eq!(store.find_deployment("d").await.unwrap(), Some(dep.clone()));

        let unused = Deployment::new("e", vec![]);
        store.save_deployment(&unused).await.unwrap();
        assert!(store.delete_deployment(unused.id).await.unwrap());
        assert!(!store.delete_deployment(unused.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_transient_delete_reports_presence() {
        let store = MemoryStore::new();
        let job = JobId::new();
        let a = TransientState::new(job, None, "A", json!({}));
        let b = TransientState::new(job, None, "B", json!({}));
        store.save_transient(&a).await.unwrap();
        store.save_transient(&b).await.unwrap();

        assert_eq!(store.list_transient(job, None).await.unwrap().len(), 2);
        assert_eq!(store.list_transient(job, Some("A")).await.unwrap(), vec![a.clone()]);
        assert!(store.delete_transient(a.id).await.unwrap());
        assert!(!store.delete_transient(a.id).await.unwrap());
        assert!(store.list_transient(job, Some("A")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_results_replace_and_append() {
        let store = MemoryStore::new();
        let job = JobId::new();
        let r = |m: &str| JobResult::error_message(job, None, m, "");
        store.append_results(job, vec![r("a")]).await.unwrap();
        store.append_results(job, vec![r("b")]).await.unwrap();
        assert_eq!(store.load_results(job).await.unwrap().len(), 2);
        store.replace_results(job, vec![r("c")]).await.unwrap();
        let results = store.load_results(job).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].exception_message(), Some("c"));
    }
}
