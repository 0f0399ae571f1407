//! Routes for inviting users and completing invitations.

use axum::extract::State;
use axum::response::Json as ResponseJson;
use axum::routing::post;
use axum::{Json, Router};
use db::models::invitation::{CreateInvitation, UserInvitation};
use db::models::user::UserProfile;
use serde::Deserialize;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::{CurrentUser, require_admin};
use crate::AppState;

#[derive(Debug, Deserialize, TS)]
pub struct AcceptRequest {
    pub token: String,
    /// Auth identity the invitee just signed up with.
    pub user_id: Uuid,
}

/// Issue an invitation (admin only).
pub async fn create_invitation(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateInvitation>,
) -> Result<ResponseJson<ApiResponse<UserInvitation>>, ApiError> {
    require_admin(&user.profile)?;
    let invitation = state
        .invitations
        .invite(&payload, user.profile.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(invitation)))
}

/// Complete an invitation after the invitee signed up with the auth
/// provider. Unauthenticated: the caller does not have a profile yet.
pub async fn accept_invitation(
    State(state): State<AppState>,
    Json(payload): Json<AcceptRequest>,
) -> Result<ResponseJson<ApiResponse<UserProfile>>, ApiError> {
    let profile = state
        .invitations
        .accept(&payload.token, payload.user_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(profile)))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/invitations",
        Router::new()
            .route("/", post(create_invitation))
            .route("/accept", post(accept_invitation)),
    )
}
