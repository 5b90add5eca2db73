use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use domain::{Permission, PermissionDraft, PermissionGroup, PermissionId};
use serde::Serialize;

use crate::{
    authorize::{require_permission, require_system_admin},
    envelope::ApiResponse,
    error::ApiError,
    extract::ApiJson,
    state::AppState,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    created: usize,
}

pub fn permission_routes(state: &AppState) -> Router<AppState> {
    let access = &state.access_control;
    let read = || require_permission(access, "permission", "read");
    // 权限目录为所有企业共享，写操作只开放给平台管理员
    let maintain = || require_system_admin(access);

    Router::new()
        .route("/api/permission", get(list_permissions).route_layer(read()))
        .route("/api/permission", post(create_permission).route_layer(maintain()))
        .route("/api/permission/grouped", get(grouped_permissions).route_layer(read()))
        .route(
            "/api/permission/by-resource/{resource}",
            get(permissions_by_resource).route_layer(read()),
        )
        .route(
            "/api/permission/by-code/{code}",
            get(permission_by_code).route_layer(read()),
        )
        .route(
            "/api/permission/initialize",
            post(initialize_permissions).route_layer(maintain()),
        )
        .route("/api/permission/{id}", get(get_permission).route_layer(read()))
        .route("/api/permission/{id}", put(update_permission).route_layer(maintain()))
        .route("/api/permission/{id}", delete(delete_permission).route_layer(maintain()))
}

async fn list_permissions(
    State(state): State<AppState>,
) -> Result<Json<Vec<Permission>>, ApiError> {
    Ok(Json(state.permission_service.list().await?))
}

async fn grouped_permissions(
    State(state): State<AppState>,
) -> Result<Json<Vec<PermissionGroup>>, ApiError> {
    Ok(Json(state.permission_service.grouped().await?))
}

async fn permissions_by_resource(
    State(state): State<AppState>,
    Path(resource): Path<String>,
) -> Result<Json<Vec<Permission>>, ApiError> {
    Ok(Json(state.permission_service.by_resource(&resource).await?))
}

async fn permission_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Permission>, ApiError> {
    Ok(Json(state.permission_service.get_by_code(&code).await?))
}

async fn get_permission(
    State(state): State<AppState>,
    Path(id): Path<PermissionId>,
) -> Result<Json<Permission>, ApiError> {
    Ok(Json(state.permission_service.get(id).await?))
}

async fn create_permission(
    State(state): State<AppState>,
    ApiJson(draft): ApiJson<PermissionDraft>,
) -> Result<(StatusCode, Json<Permission>), ApiError> {
    let permission = state.permission_service.create(draft).await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

async fn update_permission(
    State(state): State<AppState>,
    Path(id): Path<PermissionId>,
    ApiJson(draft): ApiJson<PermissionDraft>,
) -> Result<Json<Permission>, ApiError> {
    Ok(Json(state.permission_service.update(id, draft).await?))
}

async fn delete_permission(
    State(state): State<AppState>,
    Path(id): Path<PermissionId>,
) -> Result<ApiResponse<()>, ApiError> {
    state.permission_service.delete(id).await?;
    Ok(ApiResponse::done("权限已删除"))
}

/// 补齐默认权限目录，已存在的代码不会重复创建
async fn initialize_permissions(
    State(state): State<AppState>,
) -> Result<Json<InitializeResult>, ApiError> {
    let created = state.permission_service.initialize_defaults().await?;
    Ok(Json(InitializeResult { created }))
}
