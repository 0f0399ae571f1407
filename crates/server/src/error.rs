//! API error type mapping service failures onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use db::postgrest::StoreError;
use services::services::auth::AuthError;
use services::services::data_cache::DataCacheError;
use services::services::invitation::InvitationError;
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Cache(#[from] DataCacheError),
    #[error(transparent)]
    Invitation(#[from] InvitationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Auth(AuthError::Inactive) => StatusCode::FORBIDDEN,
            ApiError::Auth(AuthError::Store(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Invitation(InvitationError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Invitation(InvitationError::Expired) => StatusCode::GONE,
            ApiError::Invitation(InvitationError::AlreadySettled(_)) => StatusCode::CONFLICT,
            ApiError::Invitation(_) => StatusCode::BAD_GATEWAY,
            ApiError::Cache(_) | ApiError::Store(_) => StatusCode::BAD_GATEWAY,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_map_to_unauthorized() {
        assert_eq!(
            ApiError::Auth(AuthError::InvalidToken).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Auth(AuthError::Inactive).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn expired_invitations_map_to_gone() {
        assert_eq!(
            ApiError::Invitation(InvitationError::Expired).status_code(),
            StatusCode::GONE
        );
    }

    #[test]
    fn store_failures_map_to_bad_gateway() {
        assert_eq!(
            ApiError::Store(StoreError::Timeout).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
