//! Run command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use qpilot_core::{Deployment, JobId, JobState, JobStore, JobType, MemoryStore};
use qpilot_sched::{Config, Dispatcher, JobRequest};

use super::common::{build_dispatcher, load_program, print_result};

/// Job types the CLI can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum JobKind {
    Runner,
    Sampler,
    Estimator,
}

impl From<JobKind> for JobType {
    fn from(kind: JobKind) -> Self {
        match kind {
            JobKind::Runner => JobType::Runner,
            JobKind::Sampler => JobType::Sampler,
            JobKind::Estimator => JobType::Estimator,
        }
    }
}

/// Arguments of the run command.
#[derive(Debug)]
pub struct RunArgs {
    pub inputs: Vec<PathBuf>,
    pub device: String,
    pub shots: u32,
    pub job_type: JobKind,
    pub token: Option<String>,
    pub json: bool,
}

/// Execute the run command.
pub async fn execute(config: &Config, args: &RunArgs) -> Result<()> {
    let programs = args
        .inputs
        .iter()
        .map(|path| load_program(path, None))
        .collect::<Result<Vec<_>>>()?;
    let name = args
        .inputs
        .first()
        .and_then(|p| p.file_stem())
        .map_or_else(|| "job".to_string(), |s| s.to_string_lossy().into_owned());

    if !args.json {
        println!(
            "{} Running {} program(s) as '{}' on {} ({} shots)",
            style("→").cyan().bold(),
            programs.len(),
            style(&name).green(),
            style(&args.device).yellow(),
            args.shots
        );
    }

    let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
    let dispatcher = build_dispatcher(config, Arc::clone(&store)).await?;
    let deployment = Deployment::new(&name, programs);
    store.save_deployment(&deployment).await?;

    let mut request = JobRequest::new(&name, &args.device, Some(deployment.id), args.shots)
        .with_type(args.job_type.into());
    if let Some(token) = args
        .token
        .clone()
        .or_else(|| config.pilots.qmware.token.clone())
    {
        request = request.with_token(token);
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message("Dispatching job...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let job = dispatcher.create_and_run(request).await?;
    info!(job_id = %job.id, state = %job.state, "Job dispatched");
    spinner.set_message(format!("Job {} is {}...", job.id, job.state));
    let state = wait_for(&dispatcher, job.id, config.backoff().timeout).await;
    spinner.finish_and_clear();
    let state = state?;

    let results = store.load_results(job.id).await?;
    if args.json {
        let report = serde_json::json!({
            "job_id": job.id.to_string(),
            "state": state.to_string(),
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} Job {} finished in state {}",
            style("✓").green().bold(),
            job.id,
            style(state).yellow()
        );
        for (i, result) in results.iter().enumerate() {
            print_result(i, result);
        }
    }

    if state != JobState::Finished {
        anyhow::bail!("Job {} ended in state {state}", job.id);
    }
    Ok(())
}

/// Wait until the dispatcher or its watcher moves the job to a final state.
async fn wait_for(dispatcher: &Dispatcher, job_id: JobId, timeout: Duration) -> Result<JobState> {
    let poll = async {
        loop {
            let job = dispatcher
                .store()
                .load_job(job_id)
                .await?
                .with_context(|| format!("Job {job_id} disappeared"))?;
            if job.state.is_terminal() {
                return Ok::<_, anyhow::Error>(job.state);
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    };
    tokio::time::timeout(timeout, poll)
        .await
        .with_context(|| format!("Job {job_id} did not finish within {}s", timeout.as_secs()))?
}
