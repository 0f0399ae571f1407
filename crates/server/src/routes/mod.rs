//! HTTP routes of the dashboard API.

pub mod admin;
pub mod datasets;
pub mod invitations;

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use axum::response::Json as ResponseJson;
use axum::routing::get;
use axum::Router;
use db::models::user::UserProfile;
use services::services::auth::AuthError;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

/// The authenticated caller, resolved from the `Authorization` header.
pub struct CurrentUser {
    pub profile: UserProfile,
    pub token: String,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Auth(AuthError::InvalidToken))?;
        let profile = state.auth.resolve(token).await?;
        Ok(CurrentUser {
            profile,
            token: token.to_string(),
        })
    }
}

/// Reject non-admin callers.
pub fn require_admin(profile: &UserProfile) -> Result<(), ApiError> {
    if profile.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

pub async fn health() -> ResponseJson<ApiResponse<&'static str>> {
    ResponseJson(ApiResponse::success("ok"))
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .merge(datasets::router())
        .merge(invitations::router())
        .merge(admin::router());

    Router::new().nest("/api", api).with_state(state)
}
