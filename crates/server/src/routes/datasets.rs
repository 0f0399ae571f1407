//! Routes for loading, refreshing, and inspecting the work-order datasets.

use axum::extract::{Path, Query, State};
use axum::response::Json as ResponseJson;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use db::models::work_order::{Dataset, WorkOrder};
use serde::{Deserialize, Serialize};
use services::services::data_cache::{CacheEntryStatus, CacheStatus, DateRange, RefreshTarget};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::error::ApiError;
use crate::routes::CurrentUser;
use crate::AppState;

/// Optional opening-date window; both bounds or neither.
#[derive(Debug, Clone, Copy, Default, Deserialize, TS)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    fn range(self) -> Result<Option<DateRange>, ApiError> {
        match (self.start, self.end) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) if start <= end => Ok(Some((start, end))),
            (Some(_), Some(_)) => Err(ApiError::BadRequest(
                "start must not be after end".to_string(),
            )),
            _ => Err(ApiError::BadRequest(
                "start and end must be given together".to_string(),
            )),
        }
    }
}

/// Rows of one dataset, loaded through the session cache.
#[derive(Debug, Serialize, TS)]
pub struct DatasetRows {
    pub dataset: Dataset,
    pub records: usize,
    pub rows: Vec<WorkOrder>,
}

#[derive(Debug, Deserialize, TS)]
pub struct RefreshRequest {
    pub target: RefreshTarget,
    #[serde(flatten)]
    #[ts(flatten)]
    pub window: DateWindow,
}

#[derive(Debug, Deserialize, TS)]
pub struct ExpandRequest {
    pub target: RefreshTarget,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Load a dataset (cache-aware) and return its rows.
pub async fn get_dataset(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(dataset): Path<Dataset>,
    Query(window): Query<DateWindow>,
) -> Result<ResponseJson<ApiResponse<DatasetRows>>, ApiError> {
    let cache = state.sessions.cache_for(&user.profile);
    let rows = cache.load(dataset, window.range()?).await?;
    Ok(ResponseJson(ApiResponse::success(DatasetRows {
        dataset,
        records: rows.len(),
        rows: (*rows).clone(),
    })))
}

/// Kick off (or join) a load and return the entry snapshot.
pub async fn load_dataset(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(dataset): Path<Dataset>,
    window: Option<Json<DateWindow>>,
) -> Result<ResponseJson<ApiResponse<CacheEntryStatus>>, ApiError> {
    let window = window.map(|Json(window)| window).unwrap_or_default();
    let cache = state.sessions.cache_for(&user.profile);
    cache.load(dataset, window.range()?).await?;
    Ok(ResponseJson(ApiResponse::success(
        cache.entry(dataset).await.status(),
    )))
}

/// Invalidate the targeted entries and re-fetch them.
pub async fn refresh(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<RefreshRequest>,
) -> Result<ResponseJson<ApiResponse<CacheStatus>>, ApiError> {
    let cache = state.sessions.cache_for(&user.profile);
    cache.refresh(request.target, request.window.range()?).await?;
    Ok(ResponseJson(ApiResponse::success(cache.status().await)))
}

/// Widen the cached window, merging the newly covered rows.
pub async fn expand(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<ExpandRequest>,
) -> Result<ResponseJson<ApiResponse<CacheStatus>>, ApiError> {
    if request.start > request.end {
        return Err(ApiError::BadRequest(
            "start must not be after end".to_string(),
        ));
    }
    let cache = state.sessions.cache_for(&user.profile);
    cache
        .load_additional(request.target, (request.start, request.end))
        .await?;
    Ok(ResponseJson(ApiResponse::success(cache.status().await)))
}

/// Reset the session cache and forget the session (sign-out teardown).
pub async fn clear(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let cache = state.sessions.cache_for(&user.profile);
    cache.clear().await;
    state.sessions.drop_session(user.profile.id);
    state.auth.forget(&user.token);
    Ok(ResponseJson(ApiResponse::success(())))
}

/// Current state of both dataset entries.
pub async fn status(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<ResponseJson<ApiResponse<CacheStatus>>, ApiError> {
    let cache = state.sessions.cache_for(&user.profile);
    Ok(ResponseJson(ApiResponse::success(cache.status().await)))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/datasets",
        Router::new()
            .route("/status", get(status))
            .route("/refresh", post(refresh))
            .route("/expand", post(expand))
            .route("/clear", post(clear))
            .route("/{dataset}", get(get_dataset))
            .route("/{dataset}/load", post(load_dataset)),
    )
}
