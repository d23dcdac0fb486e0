//! Long-running consumer workers

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinSet;
use vigil_bus::BusResult;
use vigil_core::Config;
use vigil_services::Pipeline;

/// Which consumers a process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSet {
    Scan,
    Ingest,
    Both,
}

impl WorkerSet {
    fn scans(self) -> bool {
        matches!(self, WorkerSet::Scan | WorkerSet::Both)
    }

    fn ingests(self) -> bool {
        matches!(self, WorkerSet::Ingest | WorkerSet::Both)
    }
}

/// Run the selected consumers until `shutdown` flips, then wait for in-flight
/// messages to settle
pub async fn run_workers(
    pipeline: &Pipeline,
    config: &Config,
    set: WorkerSet,
    workers: usize,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut tasks: Vec<JoinSet<BusResult<()>>> = Vec::new();

    if set.scans() {
        let consumer = std::sync::Arc::new(pipeline.scan_consumer(&config.bus.group_id));
        tracing::info!(
            group = %config.bus.group_id,
            channel = %config.bus.topics.upload_events,
            workers,
            "Starting scan workers"
        );
        tasks.push(consumer.spawn_workers(workers, shutdown.clone()));
    }

    if set.ingests() {
        let consumer =
            std::sync::Arc::new(pipeline.results_consumer(&config.bus.results_group_id));
        tracing::info!(
            group = %config.bus.results_group_id,
            channel = %config.bus.topics.scan_results,
            workers,
            "Starting result ingesters"
        );
        tasks.push(consumer.spawn_workers(workers, shutdown.clone()));
    }

    let mut failed = 0usize;
    for mut set in tasks {
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Consumer worker failed");
                    failed += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Consumer worker panicked");
                    failed += 1;
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} consumer worker(s) exited with an error", failed);
    }
    tracing::info!("All consumer workers stopped");
    Ok(())
}
