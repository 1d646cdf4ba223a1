//! JWT authentication extractors.
//!
//! Tokens are minted by the identity service; here they are only verified.
//! `UserAuth` accepts any valid token, `AdminAuth` additionally requires the
//! admin role claim.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use domain::models::UserRole;
use shared::jwt::extract_user_id;

use crate::app::AppState;
use crate::error::ApiError;

/// Authenticated user information from a validated JWT.
#[derive(Debug, Clone)]
pub struct UserAuth {
    /// User ID from the JWT subject claim.
    pub user_id: Uuid,
    /// Role from the JWT role claim.
    pub role: UserRole,
}

#[async_trait]
impl FromRequestParts<AppState> for UserAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| {
                ApiError::Unauthorized("Invalid Authorization header format".to_string())
            })?;

        let claims = state
            .jwt
            .validate_token(token)
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

        let user_id = extract_user_id(&claims)
            .map_err(|_| ApiError::Unauthorized("Invalid token subject".to_string()))?;

        Ok(UserAuth {
            user_id,
            role: claims.role.into(),
        })
    }
}

/// Authenticated admin. Rejects non-admin tokens with 403.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    pub user_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = UserAuth::from_request_parts(parts, state).await?;

        if auth.role != UserRole::Admin {
            return Err(ApiError::Forbidden("Admin role required".to_string()));
        }

        Ok(AdminAuth {
            user_id: auth.user_id,
        })
    }
}
