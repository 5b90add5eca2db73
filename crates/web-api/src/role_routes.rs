use application::{CreateRoleRequest, RoleWithStats, UpdateRoleRequest};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use domain::{MenuId, PermissionId, Role, RoleId};
use serde::Deserialize;

use crate::{
    auth::CurrentUser,
    authorize::require_permission,
    envelope::ApiResponse,
    error::ApiError,
    extract::ApiJson,
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignMenusPayload {
    menu_ids: Vec<MenuId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignPermissionsPayload {
    permission_ids: Vec<PermissionId>,
}

pub fn role_routes(state: &AppState) -> Router<AppState> {
    let access = &state.access_control;
    let read = || require_permission(access, "role", "read");
    let update = || require_permission(access, "role", "update");

    Router::new()
        .route("/api/role", get(list_roles).route_layer(read()))
        .route(
            "/api/role",
            post(create_role).route_layer(require_permission(access, "role", "create")),
        )
        .route("/api/role/with-stats", get(list_roles_with_stats).route_layer(read()))
        .route("/api/role/{id}", get(get_role).route_layer(read()))
        .route("/api/role/{id}", put(update_role).route_layer(update()))
        .route(
            "/api/role/{id}",
            delete(delete_role).route_layer(require_permission(access, "role", "delete")),
        )
        .route("/api/role/{id}/menus", get(role_menus).route_layer(read()))
        .route("/api/role/{id}/menus", put(assign_menus).route_layer(update()))
        .route(
            "/api/role/{id}/permissions",
            put(assign_permissions).route_layer(update()),
        )
}

async fn list_roles(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<Role>>, ApiError> {
    let company_id = user.require_company()?;
    Ok(Json(state.role_service.list_roles(company_id).await?))
}

async fn list_roles_with_stats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<RoleWithStats>>, ApiError> {
    let company_id = user.require_company()?;
    Ok(Json(state.role_service.list_roles_with_stats(company_id).await?))
}

async fn get_role(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<RoleId>,
) -> Result<Json<Role>, ApiError> {
    let company_id = user.require_company()?;
    Ok(Json(state.role_service.get_role(company_id, id).await?))
}

async fn create_role(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(request): ApiJson<CreateRoleRequest>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    let company_id = user.require_company()?;
    let role = state.role_service.create_role(company_id, request).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

async fn update_role(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<RoleId>,
    ApiJson(request): ApiJson<UpdateRoleRequest>,
) -> Result<Json<Role>, ApiError> {
    let company_id = user.require_company()?;
    Ok(Json(
        state.role_service.update_role(company_id, id, request).await?,
    ))
}

async fn delete_role(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<RoleId>,
) -> Result<ApiResponse<()>, ApiError> {
    let company_id = user.require_company()?;
    state.role_service.delete_role(company_id, id).await?;
    Ok(ApiResponse::done("角色已删除"))
}

async fn role_menus(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<RoleId>,
) -> Result<Json<Vec<MenuId>>, ApiError> {
    let company_id = user.require_company()?;
    Ok(Json(state.role_service.role_menu_ids(company_id, id).await?))
}

async fn assign_menus(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<RoleId>,
    ApiJson(payload): ApiJson<AssignMenusPayload>,
) -> Result<Json<Role>, ApiError> {
    let company_id = user.require_company()?;
    let role = state
        .role_service
        .assign_menus(company_id, id, &payload.menu_ids)
        .await?;
    Ok(Json(role))
}

async fn assign_permissions(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<RoleId>,
    ApiJson(payload): ApiJson<AssignPermissionsPayload>,
) -> Result<Json<Role>, ApiError> {
    let company_id = user.require_company()?;
    let role = state
        .role_service
        .assign_permissions(company_id, id, &payload.permission_ids)
        .await?;
    Ok(Json(role))
}
