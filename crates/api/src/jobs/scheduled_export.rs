//! In-process scheduled export job.
//!
//! Most deployments trigger the scheduled export from an external cron via
//! the admin endpoint. This job covers deployments without one; it runs the
//! same orchestration over the previous calendar month.

use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use domain::services::reporting;
use persistence::repositories::{system_setting::ADMIN_NOTIFICATION_EMAIL, SystemSettingRepository};

use crate::services::{ExportOrchestrator, ExportTrigger};

use super::scheduler::{Job, JobFrequency};

/// Background job that runs the scheduled export for all consenting students.
pub struct ScheduledExportJob {
    pool: PgPool,
    orchestrator: Arc<ExportOrchestrator>,
    fallback_destination: String,
    interval_minutes: u64,
}

impl ScheduledExportJob {
    pub fn new(
        pool: PgPool,
        orchestrator: Arc<ExportOrchestrator>,
        fallback_destination: String,
        interval_minutes: u64,
    ) -> Self {
        Self {
            pool,
            orchestrator,
            fallback_destination,
            interval_minutes,
        }
    }

    async fn destination_email(&self) -> Result<String, String> {
        let settings = SystemSettingRepository::new(self.pool.clone());
        let destination = match settings
            .get(ADMIN_NOTIFICATION_EMAIL)
            .await
            .map_err(|e| format!("Failed to read destination setting: {}", e))?
        {
            Some(value) if !value.trim().is_empty() => value,
            _ => self.fallback_destination.clone(),
        };

        if destination.trim().is_empty() {
            return Err("Administrative destination email is not configured".to_string());
        }
        if !validator::ValidateEmail::validate_email(&destination) {
            return Err(format!(
                "Administrative destination email is invalid: {}",
                destination
            ));
        }

        Ok(destination)
    }
}

#[async_trait::async_trait]
impl Job for ScheduledExportJob {
    fn name(&self) -> &'static str {
        "scheduled_export"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_minutes)
    }

    async fn execute(&self) -> Result<(), String> {
        let destination = self.destination_email().await?;
        let window = reporting::previous_calendar_month(Utc::now());

        let summary = self
            .orchestrator
            .run(ExportTrigger::Scheduled, window, &destination)
            .await
            .map_err(|e| format!("Scheduled export failed: {}", e))?;

        info!(
            processed = summary.processed,
            jobs_enqueued = summary.jobs_enqueued,
            success = summary.success,
            "Scheduled export run finished"
        );

        Ok(())
    }
}
