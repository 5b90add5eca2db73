use application::{ActivityLogFilter, ActivityLogQuery};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use domain::{Page, PageRequest, Timestamp, UserActivityLog, UserId};
use serde::{Deserialize, Serialize};

use crate::{
    auth::CurrentUser,
    authorize::{require_menu, require_permission},
    error::ApiError,
    extract::{ApiJson, ApiQuery},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityLogParams {
    page: Option<u32>,
    page_size: Option<u32>,
    user_id: Option<UserId>,
    action: Option<String>,
    start_date: Option<Timestamp>,
    end_date: Option<Timestamp>,
}

#[derive(Debug, Default, Deserialize)]
struct MineParams {
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PurgePayload {
    before: Timestamp,
}

#[derive(Debug, Serialize)]
struct PurgeResult {
    removed: u64,
}

pub fn activity_log_routes(state: &AppState) -> Router<AppState> {
    let access = &state.access_control;
    Router::new()
        .route(
            "/api/activity-logs",
            get(query_logs).route_layer(require_menu(access, "user-log")),
        )
        .route("/api/activity-logs/mine", get(my_logs))
        .route(
            "/api/activity-logs/purge",
            post(purge_logs).route_layer(require_permission(access, "activity-log", "delete")),
        )
}

/// 分页查询，按时间倒序
async fn query_logs(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ActivityLogParams>,
) -> Result<Json<Page<UserActivityLog>>, ApiError> {
    let query = ActivityLogQuery {
        filter: ActivityLogFilter {
            user_id: params.user_id,
            action: params.action.filter(|a| !a.trim().is_empty()),
            start: params.start_date,
            end: params.end_date,
        },
        page: PageRequest::new(params.page, params.page_size),
    };
    Ok(Json(state.activity_log_service.query(query).await?))
}

async fn my_logs(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiQuery(params): ApiQuery<MineParams>,
) -> Result<Json<Vec<UserActivityLog>>, ApiError> {
    let logs = state
        .activity_log_service
        .user_logs(user.user_id, params.limit)
        .await?;
    Ok(Json(logs))
}

async fn purge_logs(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<PurgePayload>,
) -> Result<Json<PurgeResult>, ApiError> {
    let removed = state
        .activity_log_service
        .purge_older_than(payload.before)
        .await?;
    Ok(Json(PurgeResult { removed }))
}
