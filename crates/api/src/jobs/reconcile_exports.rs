//! Export reconciliation background job.
//!
//! Export records stay PENDING or PROCESSING until the worker reports the
//! terminal state of their batch. This job polls the worker's job status
//! endpoint for every open batch and folds the result back into the ledger.

use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

use domain::models::{ExportStatus, WorkerJobStatus};
use persistence::repositories::ExportRecordRepository;

use crate::services::WorkerApi;

use super::scheduler::{Job, JobFrequency};

/// Maps a worker-side job status onto the ledger status, if the record
/// should move at all.
fn ledger_status(status: WorkerJobStatus) -> Option<ExportStatus> {
    match status {
        WorkerJobStatus::Completed => Some(ExportStatus::Sent),
        WorkerJobStatus::Failed => Some(ExportStatus::Failed),
        WorkerJobStatus::Processing => Some(ExportStatus::Processing),
        WorkerJobStatus::Pending => None,
    }
}

/// Background job that reconciles open export records with worker job state.
pub struct ExportReconciliationJob {
    pool: PgPool,
    worker: Arc<dyn WorkerApi>,
    interval_minutes: u64,
}

impl ExportReconciliationJob {
    pub fn new(pool: PgPool, worker: Arc<dyn WorkerApi>, interval_minutes: u64) -> Self {
        Self {
            pool,
            worker,
            interval_minutes,
        }
    }
}

#[async_trait::async_trait]
impl Job for ExportReconciliationJob {
    fn name(&self) -> &'static str {
        "export_reconciliation"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_minutes)
    }

    async fn execute(&self) -> Result<(), String> {
        let repo = ExportRecordRepository::new(self.pool.clone());
        let batch_ids = repo
            .open_batch_ids()
            .await
            .map_err(|e| format!("Failed to list open batches: {}", e))?;

        if batch_ids.is_empty() {
            return Ok(());
        }

        let mut updated = 0u64;

        for batch_id in &batch_ids {
            // A single unreachable batch must not stall the rest
            let handle = match self.worker.job_status(batch_id).await {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(batch_id = %batch_id, error = %e, "Job status lookup failed");
                    continue;
                }
            };

            let Some(status) = ledger_status(handle.status) else {
                continue;
            };

            match repo.update_status_for_batch(batch_id, status).await {
                Ok(rows) => updated += rows,
                Err(e) => {
                    warn!(batch_id = %batch_id, error = %e, "Ledger update failed");
                }
            }
        }

        if updated > 0 {
            info!(
                batches = batch_ids.len(),
                records_updated = updated,
                "Reconciled export records"
            );
        }

        Ok(())
    }
}
