//! End-to-end orchestration tests against in-memory doubles.
//!
//! These cover the full invocation pipeline (select, persist, enqueue,
//! summarize) without a database or a live worker.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use uuid::Uuid;

use domain::models::{
    BatchOutcome, EnqueueJobRequest, ExportCandidate, ExportRecord, ExportStatus, ExportType,
    JobHandle, ReportingWindow, UserRole, WorkerJobStatus,
};
use finclass_api::services::{
    CandidateSource, ExportLedger, ExportOrchestrator, ExportSettings, ExportTrigger,
    OrchestrationError, WorkerApi, WorkerClientError, WorkerHealth,
};

const DESTINATION: &str = "reports@example.com";

fn window() -> ReportingWindow {
    ReportingWindow {
        start_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        end_date: Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap(),
    }
}

fn candidate(name: &str, cohort: Option<&str>, consent: bool) -> ExportCandidate {
    ExportCandidate {
        user_id: Uuid::new_v4(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        name: name.to_string(),
        role: UserRole::Student,
        cohort_name: cohort.map(str::to_string),
        auto_export_consent: consent,
    }
}

fn settings() -> ExportSettings {
    ExportSettings {
        job_priority: 1,
        enqueue_concurrency: 2,
        enqueue_attempts: 1,
        enqueue_backoff_base: Duration::from_millis(1),
        invocation_deadline: Duration::from_secs(30),
    }
}

struct FakeCandidates {
    students: Vec<ExportCandidate>,
}

#[async_trait]
impl CandidateSource for FakeCandidates {
    async fn student_candidates(&self) -> Result<Vec<ExportCandidate>, sqlx::Error> {
        Ok(self.students.clone())
    }

    async fn candidate_by_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ExportCandidate>, sqlx::Error> {
        Ok(self.students.iter().find(|c| c.user_id == user_id).cloned())
    }
}

#[derive(Default)]
struct FakeLedger {
    records: Mutex<Vec<ExportRecord>>,
    fail_groups: HashSet<String>,
}

impl FakeLedger {
    fn with_failing_group(group: &str) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail_groups: HashSet::from([group.to_string()]),
        }
    }

    fn records(&self) -> Vec<ExportRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExportLedger for FakeLedger {
    async fn create_pending_batch(
        &self,
        candidates: &[ExportCandidate],
        export_type: ExportType,
        window: ReportingWindow,
        destination_email: &str,
        subject: &str,
    ) -> Result<Vec<ExportRecord>, sqlx::Error> {
        if self.fail_groups.iter().any(|g| subject.ends_with(g)) {
            return Err(sqlx::Error::PoolClosed);
        }

        let mut created = Vec::with_capacity(candidates.len());
        for c in candidates {
            created.push(ExportRecord {
                id: Uuid::new_v4(),
                user_id: c.user_id,
                user_email: c.email.clone(),
                user_name: c.name.clone(),
                export_type,
                status: ExportStatus::Pending,
                start_date: window.start_date,
                end_date: window.end_date,
                destination_email: destination_email.to_string(),
                subject: subject.to_string(),
                recipients_count: candidates.len() as i32,
                batch_id: None,
                created_at: Utc::now(),
            });
        }
        self.records.lock().unwrap().extend(created.clone());
        Ok(created)
    }

    async fn attach_job(&self, record_ids: &[Uuid], job_id: &str) -> Result<u64, sqlx::Error> {
        let mut records = self.records.lock().unwrap();
        let mut updated = 0;
        for record in records.iter_mut() {
            // Same guard as the SQL: only unlinked rows (or rows already
            // carrying this job id) are touched.
            let linkable =
                record.batch_id.is_none() || record.batch_id.as_deref() == Some(job_id);
            if record_ids.contains(&record.id) && linkable {
                record.batch_id = Some(job_id.to_string());
                updated += 1;
            }
        }
        Ok(updated)
    }
}

/// Scripted worker double. Accepted requests land in `queue`; rejected or
/// unreachable groups never do.
#[derive(Default)]
struct FakeWorker {
    queue: Mutex<Vec<EnqueueJobRequest>>,
    reject_groups: HashSet<String>,
    unavailable_groups: HashSet<String>,
    /// Fail this many enqueue calls with a transport error before accepting.
    fail_first: AtomicUsize,
    counter: AtomicUsize,
}

impl FakeWorker {
    fn rejecting(groups: &[&str]) -> Self {
        Self {
            reject_groups: groups.iter().map(|g| g.to_string()).collect(),
            ..Self::default()
        }
    }

    fn unreachable_for(groups: &[&str]) -> Self {
        Self {
            unavailable_groups: groups.iter().map(|g| g.to_string()).collect(),
            ..Self::default()
        }
    }

    fn flaky(failures: usize) -> Self {
        Self {
            fail_first: AtomicUsize::new(failures),
            ..Self::default()
        }
    }

    fn queued(&self) -> Vec<EnqueueJobRequest> {
        self.queue.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerApi for FakeWorker {
    async fn enqueue(&self, request: &EnqueueJobRequest) -> Result<String, WorkerClientError> {
        let group = &request.payload.group_name;
        if self.unavailable_groups.contains(group) {
            return Err(WorkerClientError::Unavailable(
                "connection refused".to_string(),
            ));
        }
        if self.reject_groups.contains(group) {
            return Err(WorkerClientError::Rejected {
                status: 400,
                body: "invalid payload".to_string(),
            });
        }
        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(WorkerClientError::Unavailable("timed out".to_string()));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.queue.lock().unwrap().push(request.clone());
        Ok(format!("job_{}", n))
    }

    async fn job_status(&self, job_id: &str) -> Result<JobHandle, WorkerClientError> {
        Ok(JobHandle {
            job_id: job_id.to_string(),
            status: WorkerJobStatus::Pending,
            priority: 0,
            payload: None,
            error_message: None,
        })
    }

    async fn list_queue(
        &self,
        _status: Option<WorkerJobStatus>,
    ) -> Result<Vec<JobHandle>, WorkerClientError> {
        Ok(Vec::new())
    }

    async fn health(&self) -> WorkerHealth {
        WorkerHealth {
            healthy: true,
            detail: None,
        }
    }
}

fn orchestrator(
    candidates: FakeCandidates,
    ledger: Arc<FakeLedger>,
    worker: Arc<FakeWorker>,
    settings: ExportSettings,
) -> ExportOrchestrator {
    ExportOrchestrator::new(Arc::new(candidates), ledger, worker, settings)
}

#[tokio::test]
async fn scheduled_run_excludes_non_consenting_and_groups_by_cohort() {
    let opted_out = candidate("Opted Out", Some("Class A"), false);
    let opted_out_id = opted_out.user_id;
    let students = vec![
        candidate("Alice", Some("Class A"), true),
        candidate("Bob", Some("Class A"), true),
        candidate("Carol", Some("Class B"), true),
        candidate("Dave", None, true),
        opted_out,
    ];

    let ledger = Arc::new(FakeLedger::default());
    let worker = Arc::new(FakeWorker::default());
    let orch = orchestrator(
        FakeCandidates { students },
        ledger.clone(),
        worker.clone(),
        settings(),
    );

    let summary = orch
        .run(ExportTrigger::Scheduled, window(), DESTINATION)
        .await
        .unwrap();

    assert!(summary.success);
    assert_eq!(summary.jobs_enqueued, 3);
    assert_eq!(summary.processed, 4);

    let queued = worker.queued();
    let groups: HashSet<String> = queued.iter().map(|r| r.payload.group_name.clone()).collect();
    assert_eq!(
        groups,
        HashSet::from([
            "Class A".to_string(),
            "Class B".to_string(),
            "Ungrouped".to_string()
        ])
    );

    // The opted-out student appears in no payload and no ledger row
    assert!(queued
        .iter()
        .all(|r| !r.payload.user_ids.contains(&opted_out_id)));
    assert!(ledger.records().iter().all(|r| r.user_id != opted_out_id));

    // Scheduled runs use the monthly subject line
    assert!(queued
        .iter()
        .all(|r| r.payload.subject.starts_with("Monthly Report - ")));
}

#[tokio::test]
async fn manual_run_is_single_batch_and_ignores_consent_flag() {
    let student = candidate("Alice", Some("Class A"), false);
    let user_id = student.user_id;

    let ledger = Arc::new(FakeLedger::default());
    let worker = Arc::new(FakeWorker::default());
    let orch = orchestrator(
        FakeCandidates {
            students: vec![student],
        },
        ledger.clone(),
        worker.clone(),
        settings(),
    );

    let summary = orch
        .run(ExportTrigger::Manual { user_id }, window(), DESTINATION)
        .await
        .unwrap();

    assert!(summary.success);
    assert_eq!(summary.jobs_enqueued, 1);
    assert_eq!(summary.processed, 1);

    let queued = worker.queued();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].payload.user_ids, vec![user_id]);
    assert_eq!(queued[0].payload.subject, "Data Export - Class A");

    let records = ledger.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].export_type, ExportType::Manual);
    assert_eq!(records[0].batch_id.as_deref(), Some("job_0"));
}

#[tokio::test]
async fn manual_run_for_unknown_user_fails() {
    let orch = orchestrator(
        FakeCandidates { students: vec![] },
        Arc::new(FakeLedger::default()),
        Arc::new(FakeWorker::default()),
        settings(),
    );

    let result = orch
        .run(
            ExportTrigger::Manual {
                user_id: Uuid::new_v4(),
            },
            window(),
            DESTINATION,
        )
        .await;

    assert!(matches!(result, Err(OrchestrationError::UnknownUser(_))));
}

#[tokio::test]
async fn zero_candidates_short_circuits_without_worker_calls() {
    let worker = Arc::new(FakeWorker::default());
    let ledger = Arc::new(FakeLedger::default());
    let orch = orchestrator(
        FakeCandidates {
            students: vec![candidate("Opted Out", Some("Class A"), false)],
        },
        ledger.clone(),
        worker.clone(),
        settings(),
    );

    let summary = orch
        .run(ExportTrigger::Scheduled, window(), DESTINATION)
        .await
        .unwrap();

    assert!(summary.success);
    assert_eq!(summary.jobs_enqueued, 0);
    assert!(summary.batches.is_empty());
    assert!(worker.queued().is_empty());
    assert!(ledger.records().is_empty());
}

#[tokio::test]
async fn rejected_batch_fails_alone_and_leaves_null_batch_ids() {
    let students = vec![
        candidate("Alice", Some("Class A"), true),
        candidate("Bob", Some("Class B"), true),
        candidate("Carol", Some("Class C"), true),
    ];

    let ledger = Arc::new(FakeLedger::default());
    let worker = Arc::new(FakeWorker::rejecting(&["Class B"]));
    let orch = orchestrator(
        FakeCandidates { students },
        ledger.clone(),
        worker.clone(),
        settings(),
    );

    let summary = orch
        .run(ExportTrigger::Scheduled, window(), DESTINATION)
        .await
        .unwrap();

    assert!(!summary.success);
    assert_eq!(summary.jobs_enqueued, 2);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.batches.len(), 3);

    let failed = summary
        .batches
        .iter()
        .find(|b| b.group == "Class B")
        .unwrap();
    assert!(matches!(failed.outcome, BatchOutcome::EnqueueFailed { .. }));

    // The failed batch's rows exist but are never linked to a job
    for record in ledger.records() {
        if record.subject.ends_with("Class B") {
            assert!(record.batch_id.is_none());
        } else {
            assert!(record.batch_id.is_some());
        }
    }

    // Nothing for the rejected group reached the worker's queue
    assert!(worker
        .queued()
        .iter()
        .all(|r| r.payload.group_name != "Class B"));
}

#[tokio::test]
async fn persist_failure_skips_worker_for_that_batch_only() {
    let students = vec![
        candidate("Alice", Some("Class A"), true),
        candidate("Bob", Some("Class B"), true),
    ];

    let ledger = Arc::new(FakeLedger::with_failing_group("Class A"));
    let worker = Arc::new(FakeWorker::default());
    let orch = orchestrator(
        FakeCandidates { students },
        ledger.clone(),
        worker.clone(),
        settings(),
    );

    let summary = orch
        .run(ExportTrigger::Scheduled, window(), DESTINATION)
        .await
        .unwrap();

    assert!(!summary.success);
    assert_eq!(summary.jobs_enqueued, 1);

    let failed = summary
        .batches
        .iter()
        .find(|b| b.group == "Class A")
        .unwrap();
    assert!(matches!(failed.outcome, BatchOutcome::PersistFailed { .. }));

    let queued = worker.queued();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].payload.group_name, "Class B");
}

#[tokio::test]
async fn all_batches_failing_is_an_error() {
    let students = vec![
        candidate("Alice", Some("Class A"), true),
        candidate("Bob", Some("Class B"), true),
    ];

    let worker = Arc::new(FakeWorker::unreachable_for(&["Class A", "Class B"]));
    let orch = orchestrator(
        FakeCandidates { students },
        Arc::new(FakeLedger::default()),
        worker,
        settings(),
    );

    let result = orch
        .run(ExportTrigger::Scheduled, window(), DESTINATION)
        .await;

    assert!(matches!(
        result,
        Err(OrchestrationError::AllBatchesFailed { failed: 2, .. })
    ));
}

#[tokio::test]
async fn transport_failures_are_retried_within_attempts() {
    let students = vec![candidate("Alice", Some("Class A"), true)];

    let mut retry_settings = settings();
    retry_settings.enqueue_attempts = 3;

    let worker = Arc::new(FakeWorker::flaky(2));
    let orch = orchestrator(
        FakeCandidates { students },
        Arc::new(FakeLedger::default()),
        worker.clone(),
        retry_settings,
    );

    let summary = orch
        .run(ExportTrigger::Scheduled, window(), DESTINATION)
        .await
        .unwrap();

    assert!(summary.success);
    assert_eq!(summary.jobs_enqueued, 1);
    assert_eq!(worker.queued().len(), 1);
}

#[tokio::test]
async fn exhausted_deadline_reports_not_enqueued_without_worker_calls() {
    let students = vec![
        candidate("Alice", Some("Class A"), true),
        candidate("Bob", Some("Class B"), true),
    ];

    let mut expired = settings();
    expired.invocation_deadline = Duration::ZERO;

    let worker = Arc::new(FakeWorker::default());
    let ledger = Arc::new(FakeLedger::default());
    let orch = orchestrator(
        FakeCandidates { students },
        ledger.clone(),
        worker.clone(),
        expired,
    );

    let summary = orch
        .run(ExportTrigger::Scheduled, window(), DESTINATION)
        .await
        .unwrap();

    // Skipped is not failed; the run degrades instead of erroring
    assert!(!summary.success);
    assert_eq!(summary.jobs_enqueued, 0);
    assert!(summary
        .batches
        .iter()
        .all(|b| b.outcome == BatchOutcome::NotEnqueued));
    assert!(worker.queued().is_empty());

    // Ledger rows were written first and stay unlinked
    assert!(ledger.records().iter().all(|r| r.batch_id.is_none()));
}

#[tokio::test]
async fn blank_destination_fails_before_any_write() {
    let students = vec![candidate("Alice", Some("Class A"), true)];

    let ledger = Arc::new(FakeLedger::default());
    let orch = orchestrator(
        FakeCandidates { students },
        ledger.clone(),
        Arc::new(FakeWorker::default()),
        settings(),
    );

    let result = orch.run(ExportTrigger::Scheduled, window(), "  ").await;

    assert!(matches!(result, Err(OrchestrationError::Configuration(_))));
    assert!(ledger.records().is_empty());
}

#[tokio::test]
async fn attach_job_is_idempotent_and_never_overwrites() {
    let students = vec![
        candidate("Alice", Some("Class A"), true),
        candidate("Bob", Some("Class A"), true),
    ];

    let ledger = FakeLedger::default();
    let records = ledger
        .create_pending_batch(
            &students,
            ExportType::Scheduled,
            window(),
            DESTINATION,
            "Monthly Report - Class A",
        )
        .await
        .unwrap();
    let record_ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();

    // First attachment links every row of the batch
    assert_eq!(ledger.attach_job(&record_ids, "job_1").await.unwrap(), 2);

    // Re-applying the same job id is a no-op on the stored linkage
    assert_eq!(ledger.attach_job(&record_ids, "job_1").await.unwrap(), 2);
    assert!(ledger
        .records()
        .iter()
        .all(|r| r.batch_id.as_deref() == Some("job_1")));

    // A conflicting job id touches nothing and overwrites nothing
    assert_eq!(ledger.attach_job(&record_ids, "job_2").await.unwrap(), 0);
    assert!(ledger
        .records()
        .iter()
        .all(|r| r.batch_id.as_deref() == Some("job_1")));
}

#[tokio::test]
async fn estimate_reflects_recipients_of_enqueued_batches() {
    let students: Vec<ExportCandidate> = (0..45)
        .map(|i| candidate(&format!("Student {}", i), Some("Class A"), true))
        .collect();

    let orch = orchestrator(
        FakeCandidates { students },
        Arc::new(FakeLedger::default()),
        Arc::new(FakeWorker::default()),
        settings(),
    );

    let summary = orch
        .run(ExportTrigger::Scheduled, window(), DESTINATION)
        .await
        .unwrap();

    assert_eq!(summary.processed, 45);
    // 45 recipients at 20 per unit, 2 minutes each: 3 units, 6 minutes
    assert_eq!(summary.estimated_time_minutes, 6);
}
