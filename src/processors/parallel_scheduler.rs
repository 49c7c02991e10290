use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::extraction_worker::ExtractionWorker;
use super::run_report::RunReport;
use crate::error::{Result, SkipStage};
use crate::models::{ExtractionRecord, RemoteFileDescriptor};
use crate::registry::ModelRegistry;
use crate::utils::constants::DEFAULT_MAX_WORKERS;
use crate::utils::progress::ProgressReporter;

/// Records from every file that produced any, plus the run's report.
#[derive(Debug, Default)]
pub struct BatchOutput {
    pub records: Vec<ExtractionRecord>,
    pub report: RunReport,
}

/// Runs one extraction per descriptor with at most `max_workers` in flight.
/// Completion waits for every task; failures only ever mark their own file
/// as skipped.
pub struct ParallelScheduler {
    max_workers: usize,
}

impl ParallelScheduler {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Every descriptor's spec is resolved before the first task starts, so a
    /// missing registry entry fails the run without touching the network.
    pub async fn run(
        &self,
        worker: Arc<ExtractionWorker>,
        registry: &ModelRegistry,
        descriptors: Vec<RemoteFileDescriptor>,
        progress: Option<&ProgressReporter>,
    ) -> Result<BatchOutput> {
        let tasks = descriptors
            .into_iter()
            .map(|d| registry.spec(d.model, d.element).map(|spec| (d, spec)))
            .collect::<Result<Vec<_>>>()?;

        let mut output = BatchOutput {
            records: Vec::new(),
            report: RunReport::new(tasks.len()),
        };

        info!(
            files = tasks.len(),
            workers = self.max_workers,
            "Scheduling extraction"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut set = JoinSet::new();
        let mut urls = HashMap::new();
        for (descriptor, spec) in tasks {
            let semaphore = Arc::clone(&semaphore);
            let worker = Arc::clone(&worker);
            let url = descriptor.url.clone();
            let handle = set.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                worker.extract(&descriptor, spec).await
            });
            urls.insert(handle.id(), url);
        }

        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((id, mut outcome)) => {
                    urls.remove(&id);
                    output.report.record_outcome(&outcome);
                    output.records.append(&mut outcome.records);
                }
                Err(e) => {
                    let url = urls.remove(&e.id()).unwrap_or_else(|| "unknown".to_string());
                    warn!(url = %url, "Extraction task failed: {}", e);
                    output.report.record_skip(&url, SkipStage::Worker, e.to_string());
                }
            }

            if let Some(p) = progress {
                p.increment(1);
            }
        }

        if let Some(p) = progress {
            p.finish_with_message(&format!(
                "Extracted {} files ({} skipped)",
                output.report.files_succeeded, output.report.files_skipped
            ));
        }

        Ok(output)
    }
}

impl Default for ParallelScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}
