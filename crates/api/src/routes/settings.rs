//! Administrative settings endpoints.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::ValidateEmail;

use persistence::repositories::{system_setting::ADMIN_NOTIFICATION_EMAIL, SystemSettingRepository};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::AdminAuth;

/// Request body for the notification email update.
#[derive(Debug, Deserialize)]
pub struct UpdateNotificationEmailRequest {
    pub email: String,
}

/// Response body for the notification email update.
#[derive(Debug, Serialize)]
pub struct UpdateNotificationEmailResponse {
    pub success: bool,
    pub email: String,
}

/// Set the runtime destination mailbox for export reports.
///
/// PUT /api/v1/admin/settings/notification-email
///
/// Overrides the statically configured destination for all future runs.
pub async fn update_notification_email(
    State(state): State<AppState>,
    auth: AdminAuth,
    Json(request): Json<UpdateNotificationEmailRequest>,
) -> Result<Json<UpdateNotificationEmailResponse>, ApiError> {
    let email = request.email.trim().to_string();
    if !email.validate_email() {
        return Err(ApiError::Validation(format!(
            "Not a valid email address: {}",
            email
        )));
    }

    let settings = SystemSettingRepository::new(state.pool.clone());
    settings.set(ADMIN_NOTIFICATION_EMAIL, &email).await?;

    info!(admin_id = %auth.user_id, email = %email, "Notification email updated");

    Ok(Json(UpdateNotificationEmailResponse {
        success: true,
        email,
    }))
}
