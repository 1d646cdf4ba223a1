//! Export trigger and status endpoints.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use domain::models::{ExportRecord, ExportStatus, ExportSummary, ExportType};
use domain::services::reporting;
use persistence::repositories::{
    system_setting::ADMIN_NOTIFICATION_EMAIL, ExportRecordFilter, ExportRecordRepository,
    SystemSettingRepository, TransactionRepository,
};
use shared::crypto::secrets_match;
use validator::ValidateEmail;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::{AdminAuth, UserAuth};
use crate::services::ExportTrigger;

/// Upper bound for status query limits, whatever the caller asks for.
const MAX_STATUS_QUERY_LIMIT: i64 = 500;

/// Resolve the destination mailbox: the runtime setting wins, the static
/// configuration is the fallback. Missing both is a configuration error,
/// never a silent default.
async fn resolve_destination_email(state: &AppState) -> Result<String, ApiError> {
    let settings = SystemSettingRepository::new(state.pool.clone());
    let destination = match settings.get(ADMIN_NOTIFICATION_EMAIL).await? {
        Some(value) if !value.trim().is_empty() => value,
        _ => state.config.export.destination_email.clone(),
    };

    if destination.trim().is_empty() {
        return Err(ApiError::Configuration(
            "Administrative destination email is not configured".to_string(),
        ));
    }
    // The runtime setting is free-form text; catch a mangled override here
    // rather than enqueue jobs that can never be delivered.
    if !destination.validate_email() {
        return Err(ApiError::Configuration(format!(
            "Administrative destination email is invalid: {}",
            destination
        )));
    }

    Ok(destination)
}

/// Trigger a manual export of the requesting user's full history.
///
/// POST /api/v1/exports/manual
///
/// The authenticated request is itself the consent; the opt-in flag is not
/// consulted here.
pub async fn trigger_manual_export(
    State(state): State<AppState>,
    auth: UserAuth,
) -> Result<Json<ExportSummary>, ApiError> {
    let destination_email = resolve_destination_email(&state).await?;

    let transactions = TransactionRepository::new(state.pool.clone());
    let first_transaction = transactions.earliest_date_for_user(auth.user_id).await?;
    let window = reporting::full_history(first_transaction, Utc::now());

    info!(user_id = %auth.user_id, "Manual export requested");

    let summary = state
        .orchestrator
        .run(
            ExportTrigger::Manual {
                user_id: auth.user_id,
            },
            window,
            &destination_email,
        )
        .await?;

    Ok(Json(summary))
}

/// Trigger the scheduled export over all consenting students.
///
/// POST /api/v1/admin/exports/scheduled
///
/// Requires an admin token plus the X-Cron-Key shared secret, so a leaked
/// admin token alone cannot fire mass exports.
pub async fn trigger_scheduled_export(
    State(state): State<AppState>,
    auth: AdminAuth,
    headers: HeaderMap,
) -> Result<Json<ExportSummary>, ApiError> {
    let presented = headers
        .get("X-Cron-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !secrets_match(presented, &state.config.security.cron_secret) {
        return Err(ApiError::Forbidden("Invalid cron key".to_string()));
    }

    let destination_email = resolve_destination_email(&state).await?;
    let window = reporting::previous_calendar_month(Utc::now());

    info!(admin_id = %auth.user_id, "Scheduled export triggered");

    let summary = state
        .orchestrator
        .run(ExportTrigger::Scheduled, window, &destination_email)
        .await?;

    Ok(Json(summary))
}

/// Query parameters for the export status endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStatusQuery {
    pub user_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub export_type: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// One aggregate row in the status response.
#[derive(Debug, Serialize)]
pub struct ExportStatsEntry {
    pub status: ExportStatus,
    #[serde(rename = "type")]
    pub export_type: ExportType,
    pub count: i64,
}

/// Response body for the export status endpoint.
#[derive(Debug, Serialize)]
pub struct ExportStatusResponse {
    pub exports: Vec<ExportRecord>,
    pub stats: Vec<ExportStatsEntry>,
}

/// Export ledger dashboard: matching rows plus status×type counts.
///
/// GET /api/v1/admin/exports/status?userId=&type=&status=&limit=
pub async fn export_status(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Query(query): Query<ExportStatusQuery>,
) -> Result<Json<ExportStatusResponse>, ApiError> {
    let export_type = query
        .export_type
        .as_deref()
        .map(str::parse::<ExportType>)
        .transpose()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ExportStatus>)
        .transpose()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let limit = query
        .limit
        .unwrap_or(state.config.export.status_query_limit)
        .clamp(1, MAX_STATUS_QUERY_LIMIT);

    let filter = ExportRecordFilter {
        user_id: query.user_id,
        export_type,
        status,
    };

    let repo = ExportRecordRepository::new(state.pool.clone());
    let exports = repo.query(&filter, limit).await?;
    let stats = repo
        .count_by_status_and_type()
        .await?
        .into_iter()
        .map(|entry| ExportStatsEntry {
            status: entry.status,
            export_type: entry.export_type,
            count: entry.count,
        })
        .collect();

    Ok(Json(ExportStatusResponse { exports, stats }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_query_parses_optional_filters() {
        let query: ExportStatusQuery =
            serde_json::from_str(r#"{"type":"MANUAL","status":"PENDING","limit":10}"#).unwrap();
        assert_eq!(query.export_type.as_deref(), Some("MANUAL"));
        assert_eq!(query.status.as_deref(), Some("PENDING"));
        assert_eq!(query.limit, Some(10));
        assert!(query.user_id.is_none());
    }

    #[test]
    fn test_stats_entry_serialization() {
        let entry = ExportStatsEntry {
            status: ExportStatus::Sent,
            export_type: ExportType::Scheduled,
            count: 7,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "SENT");
        assert_eq!(json["type"], "SCHEDULED");
        assert_eq!(json["count"], 7);
    }
}
