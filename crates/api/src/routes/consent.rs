//! Export consent endpoint.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use persistence::repositories::UserRepository;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

/// Request body for the consent update.
#[derive(Debug, Deserialize)]
pub struct UpdateConsentRequest {
    pub consent: bool,
}

/// Response body for the consent update.
#[derive(Debug, Serialize)]
pub struct UpdateConsentResponse {
    pub success: bool,
    pub consent: bool,
    pub message: String,
}

/// Update the caller's scheduled-export consent flag.
///
/// PUT /api/v1/users/me/export-consent
///
/// Only the user themselves can flip their flag; nothing else in the
/// system ever writes it.
pub async fn update_export_consent(
    State(state): State<AppState>,
    auth: UserAuth,
    Json(request): Json<UpdateConsentRequest>,
) -> Result<Json<UpdateConsentResponse>, ApiError> {
    let repo = UserRepository::new(state.pool.clone());

    // The token may outlive the account; verify it still exists
    let user = repo
        .find_by_id(auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    repo.update_export_consent(user.id, request.consent).await?;

    info!(user_id = %user.id, consent = request.consent, "Export consent updated");

    let message = if request.consent {
        "Automatic export enabled"
    } else {
        "Automatic export disabled"
    };

    Ok(Json(UpdateConsentResponse {
        success: true,
        consent: request.consent,
        message: message.to_string(),
    }))
}
