//! Export orchestration service.
//!
//! Drives a single export invocation through its steps: select candidates,
//! partition into cohort batches, persist PENDING ledger rows, enqueue one
//! worker job per batch, link the returned job ids back onto the rows, and
//! summarize. Batches are isolated from each other: one cohort failing to
//! enqueue never stops the rest.
//!
//! Ledger rows are written before the worker is contacted. A row whose
//! batch_id is still NULL afterwards is the durable trace of an enqueue
//! that never completed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use domain::models::{
    BatchOutcome, BatchReport, EnqueueJobRequest, ExportCandidate, ExportRecord, ExportSummary,
    ExportType, JobPayload, ReportingWindow,
};
use domain::services::eligibility::{partition_into_batches, select_scheduled_candidates};
use persistence::repositories::{ExportRecordRepository, UserRepository};

use crate::config::ExportConfig;
use crate::services::worker_client::{WorkerApi, WorkerClientError};

/// What kicked off an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTrigger {
    /// The user asked for their own history. Bypasses the consent gate;
    /// the request itself is the consent.
    Manual { user_id: Uuid },
    /// Scheduled run over all consenting students.
    Scheduled,
}

impl ExportTrigger {
    pub fn export_type(&self) -> ExportType {
        match self {
            ExportTrigger::Manual { .. } => ExportType::Manual,
            ExportTrigger::Scheduled => ExportType::Scheduled,
        }
    }
}

/// Source of export candidates. Backed by the user table in production,
/// by an in-memory double in tests.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn student_candidates(&self) -> Result<Vec<ExportCandidate>, sqlx::Error>;
    async fn candidate_by_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ExportCandidate>, sqlx::Error>;
}

#[async_trait]
impl CandidateSource for UserRepository {
    async fn student_candidates(&self) -> Result<Vec<ExportCandidate>, sqlx::Error> {
        self.find_student_candidates().await
    }

    async fn candidate_by_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ExportCandidate>, sqlx::Error> {
        self.find_candidate_by_id(user_id).await
    }
}

/// Write surface of the export ledger used during orchestration.
#[async_trait]
pub trait ExportLedger: Send + Sync {
    async fn create_pending_batch(
        &self,
        candidates: &[ExportCandidate],
        export_type: ExportType,
        window: ReportingWindow,
        destination_email: &str,
        subject: &str,
    ) -> Result<Vec<ExportRecord>, sqlx::Error>;

    async fn attach_job(&self, record_ids: &[Uuid], job_id: &str) -> Result<u64, sqlx::Error>;
}

#[async_trait]
impl ExportLedger for ExportRecordRepository {
    async fn create_pending_batch(
        &self,
        candidates: &[ExportCandidate],
        export_type: ExportType,
        window: ReportingWindow,
        destination_email: &str,
        subject: &str,
    ) -> Result<Vec<ExportRecord>, sqlx::Error> {
        ExportRecordRepository::create_pending_batch(
            self,
            candidates,
            export_type,
            window,
            destination_email,
            subject,
        )
        .await
    }

    async fn attach_job(&self, record_ids: &[Uuid], job_id: &str) -> Result<u64, sqlx::Error> {
        ExportRecordRepository::attach_job(self, record_ids, job_id).await
    }
}

/// Errors that abort an entire invocation.
///
/// Per-batch failures never appear here; they are reported through the
/// summary's batch outcomes instead.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("User {0} not found")]
    UnknownUser(Uuid),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("All {failed} batches failed to enqueue: {detail}")]
    AllBatchesFailed { failed: usize, detail: String },
}

/// Tunables for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    /// Priority assigned to enqueued jobs.
    pub job_priority: i32,
    /// Maximum batches enqueued concurrently.
    pub enqueue_concurrency: usize,
    /// Attempts per batch, including the first.
    pub enqueue_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    pub enqueue_backoff_base: Duration,
    /// Budget for the enqueue phase; batches not attempted within it are
    /// reported NOT_ENQUEUED.
    pub invocation_deadline: Duration,
}

impl ExportSettings {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            job_priority: config.job_priority,
            enqueue_concurrency: config.enqueue_concurrency,
            enqueue_attempts: config.enqueue_attempts,
            enqueue_backoff_base: Duration::from_millis(config.enqueue_backoff_base_ms),
            invocation_deadline: Duration::from_secs(config.invocation_deadline_secs),
        }
    }
}

struct PreparedBatch {
    index: usize,
    group: String,
    user_ids: Vec<Uuid>,
    record_ids: Vec<Uuid>,
    subject: String,
}

/// Orchestrates export invocations end to end.
pub struct ExportOrchestrator {
    candidates: Arc<dyn CandidateSource>,
    ledger: Arc<dyn ExportLedger>,
    worker: Arc<dyn WorkerApi>,
    settings: ExportSettings,
}

impl ExportOrchestrator {
    pub fn new(
        candidates: Arc<dyn CandidateSource>,
        ledger: Arc<dyn ExportLedger>,
        worker: Arc<dyn WorkerApi>,
        settings: ExportSettings,
    ) -> Self {
        Self {
            candidates,
            ledger,
            worker,
            settings,
        }
    }

    /// Run one invocation. The caller has already authorized the trigger
    /// and resolved the reporting window and destination mailbox.
    pub async fn run(
        &self,
        trigger: ExportTrigger,
        window: ReportingWindow,
        destination_email: &str,
    ) -> Result<ExportSummary, OrchestrationError> {
        // Never silently default the destination; fail before any write.
        if destination_email.trim().is_empty() {
            return Err(OrchestrationError::Configuration(
                "destination email is not configured".to_string(),
            ));
        }

        let export_type = trigger.export_type();

        // SELECT: eligibility plus cohort partitioning
        let selected = match trigger {
            ExportTrigger::Scheduled => {
                let all = self.candidates.student_candidates().await?;
                select_scheduled_candidates(all)
            }
            ExportTrigger::Manual { user_id } => {
                let candidate = self
                    .candidates
                    .candidate_by_id(user_id)
                    .await?
                    .ok_or(OrchestrationError::UnknownUser(user_id))?;
                vec![candidate]
            }
        };

        if selected.is_empty() {
            info!(trigger = ?trigger, "No eligible export recipients; nothing to do");
            return Ok(ExportSummary::empty());
        }

        let batches: Vec<(String, Vec<ExportCandidate>)> =
            partition_into_batches(selected).into_iter().collect();
        let batch_count = batches.len();

        info!(
            trigger = ?trigger,
            batches = batch_count,
            "Export invocation selected batches"
        );

        // PERSIST: one multi-row insert per batch, before any worker call.
        // A failed insert is fatal for that batch only.
        let mut outcomes: Vec<Option<BatchOutcome>> = (0..batch_count).map(|_| None).collect();
        let mut reports_meta: Vec<(String, usize)> = Vec::with_capacity(batch_count);
        let mut prepared: Vec<PreparedBatch> = Vec::new();

        for (index, (group, members)) in batches.into_iter().enumerate() {
            let subject = match export_type {
                ExportType::Scheduled => format!("Monthly Report - {}", group),
                ExportType::Manual => format!("Data Export - {}", group),
            };
            reports_meta.push((group.clone(), members.len()));

            match self
                .ledger
                .create_pending_batch(&members, export_type, window, destination_email, &subject)
                .await
            {
                Ok(records) => {
                    prepared.push(PreparedBatch {
                        index,
                        group,
                        user_ids: members.iter().map(|m| m.user_id).collect(),
                        record_ids: records.iter().map(|r| r.id).collect(),
                        subject,
                    });
                }
                Err(e) => {
                    error!(group = %group, error = %e, "Failed to persist ledger rows for batch");
                    outcomes[index] = Some(BatchOutcome::PersistFailed {
                        error: e.to_string(),
                    });
                }
            }
        }

        // ENQUEUE: one worker call per batch, bounded concurrency, each
        // wrapped in bounded exponential backoff.
        let deadline = Instant::now() + self.settings.invocation_deadline;
        let semaphore = Arc::new(Semaphore::new(self.settings.enqueue_concurrency));
        let mut join_set: JoinSet<(usize, BatchOutcome)> = JoinSet::new();

        for batch in prepared {
            let worker = Arc::clone(&self.worker);
            let ledger = Arc::clone(&self.ledger);
            let semaphore = Arc::clone(&semaphore);
            let settings = self.settings.clone();
            let request = EnqueueJobRequest {
                job_type: export_type,
                priority: settings.job_priority,
                payload: JobPayload {
                    user_ids: batch.user_ids.clone(),
                    group_name: batch.group.clone(),
                    start_date: window.start_date,
                    end_date: window.end_date,
                    to_email: destination_email.to_string(),
                    subject: batch.subject.clone(),
                },
            };

            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");

                // Deadline exhausted before this batch got a turn: report
                // "never tried", distinct from "tried and rejected".
                if Instant::now() >= deadline {
                    warn!(group = %batch.group, "Deadline exceeded before batch was attempted");
                    return (batch.index, BatchOutcome::NotEnqueued);
                }

                match enqueue_with_retry(worker.as_ref(), &request, &settings, deadline).await {
                    Ok(job_id) => {
                        // Link every record of the batch to the job id. The
                        // job exists either way; an attach failure leaves
                        // NULL batch_ids as the queryable trace.
                        if let Err(e) = ledger.attach_job(&batch.record_ids, &job_id).await {
                            error!(
                                group = %batch.group,
                                job_id = %job_id,
                                error = %e,
                                "Enqueued batch but failed to attach job id to ledger"
                            );
                        } else {
                            info!(
                                group = %batch.group,
                                job_id = %job_id,
                                recipients = batch.record_ids.len(),
                                "Batch enqueued"
                            );
                        }
                        (batch.index, BatchOutcome::Enqueued { job_id })
                    }
                    Err(e) => {
                        warn!(group = %batch.group, error = %e, "Batch failed to enqueue");
                        (
                            batch.index,
                            BatchOutcome::EnqueueFailed {
                                error: e.to_string(),
                            },
                        )
                    }
                }
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => error!(error = %e, "Enqueue task failed to complete"),
            }
        }

        // SUMMARIZE
        let mut reports: Vec<BatchReport> = Vec::with_capacity(batch_count);
        for ((group, recipients), outcome) in reports_meta.into_iter().zip(outcomes) {
            reports.push(BatchReport {
                group,
                recipients,
                outcome: outcome.unwrap_or_else(|| BatchOutcome::EnqueueFailed {
                    error: "enqueue task did not complete".to_string(),
                }),
            });
        }

        let job_ids: Vec<String> = reports
            .iter()
            .filter_map(|r| match &r.outcome {
                BatchOutcome::Enqueued { job_id } => Some(job_id.clone()),
                _ => None,
            })
            .collect();
        let processed: usize = reports
            .iter()
            .filter(|r| matches!(r.outcome, BatchOutcome::Enqueued { .. }))
            .map(|r| r.recipients)
            .sum();
        let failed = reports
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    BatchOutcome::PersistFailed { .. } | BatchOutcome::EnqueueFailed { .. }
                )
            })
            .count();

        // Every batch failing means the system is broken, not a partial
        // degradation; surface it as an error.
        if failed == batch_count {
            let detail = reports
                .iter()
                .find_map(|r| match &r.outcome {
                    BatchOutcome::PersistFailed { error }
                    | BatchOutcome::EnqueueFailed { error } => Some(error.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            return Err(OrchestrationError::AllBatchesFailed { failed, detail });
        }

        let summary = ExportSummary {
            success: failed == 0 && job_ids.len() == batch_count,
            jobs_enqueued: job_ids.len(),
            estimated_time_minutes: ExportSummary::estimate_minutes(processed),
            job_ids,
            processed,
            batches: reports,
        };

        info!(
            jobs_enqueued = summary.jobs_enqueued,
            processed = summary.processed,
            failed_batches = failed,
            "Export invocation complete"
        );

        Ok(summary)
    }
}

/// Enqueue one batch with bounded exponential backoff.
///
/// Transport failures and 5xx rejections are retried; 4xx rejections are
/// permanent. Backoff never sleeps past the invocation deadline.
async fn enqueue_with_retry(
    worker: &dyn WorkerApi,
    request: &EnqueueJobRequest,
    settings: &ExportSettings,
    deadline: Instant,
) -> Result<String, WorkerClientError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match worker.enqueue(request).await {
            Ok(job_id) => return Ok(job_id),
            Err(e) => {
                let retryable = match &e {
                    WorkerClientError::Unavailable(_) => true,
                    WorkerClientError::Rejected { status, .. } => *status >= 500,
                    WorkerClientError::InvalidResponse(_) => false,
                };
                if !retryable || attempt >= settings.enqueue_attempts {
                    return Err(e);
                }

                // Cap the exponent so an oversized attempt budget cannot
                // overflow the multiplier.
                let delay = settings.enqueue_backoff_base * 2u32.pow((attempt - 1).min(16));
                if Instant::now() + delay >= deadline {
                    return Err(e);
                }

                warn!(attempt, error = %e, "Enqueue attempt failed, backing off");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
