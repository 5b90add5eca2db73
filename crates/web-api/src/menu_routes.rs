use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use domain::{Menu, MenuDraft, MenuId, MenuTreeNode};
use serde::Deserialize;

use crate::{
    auth::CurrentUser,
    authorize::{require_permission, require_system_admin},
    envelope::ApiResponse,
    error::ApiError,
    extract::ApiJson,
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReorderPayload {
    menu_ids: Vec<MenuId>,
}

pub fn menu_routes(state: &AppState) -> Router<AppState> {
    let access = &state.access_control;
    let read = || require_permission(access, "menu", "read");
    // 菜单为所有企业共享，写操作只开放给平台管理员
    let maintain = || require_system_admin(access);

    Router::new()
        .route("/api/menu", get(list_menus).route_layer(read()))
        .route("/api/menu", post(create_menu).route_layer(maintain()))
        .route("/api/menu/tree", get(menu_tree).route_layer(read()))
        .route("/api/menu/user-menus", get(user_menus))
        .route("/api/menu/reorder", put(reorder_menus).route_layer(maintain()))
        .route("/api/menu/{id}", get(get_menu).route_layer(read()))
        .route("/api/menu/{id}", put(update_menu).route_layer(maintain()))
        .route("/api/menu/{id}", delete(delete_menu).route_layer(maintain()))
}

async fn list_menus(State(state): State<AppState>) -> Result<Json<Vec<Menu>>, ApiError> {
    Ok(Json(state.menu_service.list().await?))
}

async fn menu_tree(State(state): State<AppState>) -> Result<Json<Vec<MenuTreeNode>>, ApiError> {
    Ok(Json(state.menu_service.tree().await?))
}

/// 当前用户可见的菜单树
async fn user_menus(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<MenuTreeNode>>, ApiError> {
    Ok(Json(state.menu_service.user_menus(&user.subject()).await?))
}

async fn get_menu(
    State(state): State<AppState>,
    Path(id): Path<MenuId>,
) -> Result<Json<Menu>, ApiError> {
    Ok(Json(state.menu_service.get(id).await?))
}

async fn create_menu(
    State(state): State<AppState>,
    ApiJson(draft): ApiJson<MenuDraft>,
) -> Result<(StatusCode, Json<Menu>), ApiError> {
    let menu = state.menu_service.create(draft).await?;
    Ok((StatusCode::CREATED, Json(menu)))
}

async fn update_menu(
    State(state): State<AppState>,
    Path(id): Path<MenuId>,
    ApiJson(draft): ApiJson<MenuDraft>,
) -> Result<Json<Menu>, ApiError> {
    Ok(Json(state.menu_service.update(id, draft).await?))
}

async fn delete_menu(
    State(state): State<AppState>,
    Path(id): Path<MenuId>,
) -> Result<ApiResponse<()>, ApiError> {
    state.menu_service.delete(id).await?;
    Ok(ApiResponse::done("菜单已删除"))
}

async fn reorder_menus(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ReorderPayload>,
) -> Result<ApiResponse<()>, ApiError> {
    state.menu_service.reorder(&payload.menu_ids).await?;
    Ok(ApiResponse::done("菜单顺序已更新"))
}
