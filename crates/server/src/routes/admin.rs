//! Admin-only listings of companies and users.

use axum::extract::State;
use axum::response::Json as ResponseJson;
use axum::routing::get;
use axum::Router;
use db::models::company::Company;
use db::models::user::UserProfile;
use utils::response::ApiResponse;

use crate::error::ApiError;
use crate::routes::{CurrentUser, require_admin};
use crate::AppState;

pub async fn list_companies(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<ResponseJson<ApiResponse<Vec<Company>>>, ApiError> {
    require_admin(&user.profile)?;
    let companies = Company::find_all_active(&state.store).await?;
    Ok(ResponseJson(ApiResponse::success(companies)))
}

pub async fn list_users(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<ResponseJson<ApiResponse<Vec<UserProfile>>>, ApiError> {
    require_admin(&user.profile)?;
    let users = UserProfile::find_all(&state.store).await?;
    Ok(ResponseJson(ApiResponse::success(users)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/companies", get(list_companies))
        .route("/users", get(list_users))
}
