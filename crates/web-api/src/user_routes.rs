use application::{
    ChangePasswordRequest, CreateUserRequest, UpdateProfileRequest, UpdateUserRequest,
    UserPermissions, UserQuery, UserView,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use domain::{AppUser, Page, PageRequest, PermissionId, RoleId, UserId};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    auth::CurrentUser,
    authorize::require_permission,
    envelope::ApiResponse,
    error::ApiError,
    extract::{ApiJson, ApiQuery, ValidatedJson},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserListParams {
    page: Option<u32>,
    page_size: Option<u32>,
    keyword: Option<String>,
    is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckUsernameParams {
    username: String,
    exclude_user_id: Option<UserId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckEmailParams {
    email: String,
    exclude_user_id: Option<UserId>,
}

#[derive(Debug, Serialize)]
struct ExistsResponse {
    exists: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignRolesPayload {
    role_ids: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignPermissionsPayload {
    permission_ids: Vec<PermissionId>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordPayload {
    #[validate(length(min = 1, message = "当前密码不能为空"))]
    current_password: String,
    #[validate(length(min = 6, message = "新密码至少 6 位"))]
    new_password: String,
}

pub fn user_routes(state: &AppState) -> Router<AppState> {
    let access = &state.access_control;
    Router::new()
        .route(
            "/api/user",
            get(list_users).route_layer(require_permission(access, "user", "read")),
        )
        .route(
            "/api/user",
            post(create_user).route_layer(require_permission(access, "user", "create")),
        )
        .route("/api/user/my-permissions", get(my_permissions))
        .route("/api/user/profile", get(profile).put(update_profile))
        .route("/api/user/profile/password", put(change_password))
        .route("/api/user/check-username", get(check_username))
        .route("/api/user/check-email", get(check_email))
        .route(
            "/api/user/{id}",
            get(get_user).route_layer(require_permission(access, "user", "read")),
        )
        .route(
            "/api/user/{id}",
            put(update_user).route_layer(require_permission(access, "user", "update")),
        )
        .route(
            "/api/user/{id}",
            delete(delete_user).route_layer(require_permission(access, "user", "delete")),
        )
        .route(
            "/api/user/{id}/roles",
            put(assign_roles).route_layer(require_permission(access, "user", "update")),
        )
        .route(
            "/api/user/{id}/custom-permissions",
            post(assign_custom_permissions)
                .route_layer(require_permission(access, "user", "update")),
        )
        .route(
            "/api/user/{id}/activate",
            put(activate_user).route_layer(require_permission(access, "user", "update")),
        )
        .route(
            "/api/user/{id}/deactivate",
            put(deactivate_user).route_layer(require_permission(access, "user", "update")),
        )
}

async fn list_users(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiQuery(params): ApiQuery<UserListParams>,
) -> Result<Json<Page<UserView>>, ApiError> {
    let company_id = user.require_company()?;
    let query = UserQuery {
        keyword: params.keyword,
        is_active: params.is_active,
        page: PageRequest::new(params.page, params.page_size),
    };
    Ok(Json(state.user_service.list_users(company_id, query).await?))
}

async fn create_user(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(request): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    let company_id = user.require_company()?;
    let created = state.user_service.create_user(company_id, request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<UserId>,
) -> Result<Json<UserView>, ApiError> {
    let company_id = user.require_company()?;
    Ok(Json(state.user_service.get_user(company_id, id).await?))
}

async fn update_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<UserId>,
    ApiJson(request): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserView>, ApiError> {
    let company_id = user.require_company()?;
    let updated = state
        .user_service
        .update_user(&user.subject(), company_id, id, request)
        .await?;
    Ok(Json(updated))
}

async fn delete_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<UserId>,
) -> Result<ApiResponse<()>, ApiError> {
    let company_id = user.require_company()?;
    state
        .user_service
        .delete_user(&user.subject(), company_id, id)
        .await?;
    Ok(ApiResponse::done("用户已删除"))
}

async fn assign_roles(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<UserId>,
    ApiJson(payload): ApiJson<AssignRolesPayload>,
) -> Result<Json<UserView>, ApiError> {
    let company_id = user.require_company()?;
    let updated = state
        .user_service
        .assign_roles(&user.subject(), company_id, id, &payload.role_ids)
        .await?;
    Ok(Json(updated))
}

async fn assign_custom_permissions(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<UserId>,
    ApiJson(payload): ApiJson<AssignPermissionsPayload>,
) -> Result<Json<UserView>, ApiError> {
    let company_id = user.require_company()?;
    let updated = state
        .user_service
        .assign_custom_permissions(company_id, id, &payload.permission_ids)
        .await?;
    Ok(Json(updated))
}

async fn activate_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<UserId>,
) -> Result<Json<UserView>, ApiError> {
    set_active(&state, &user, id, true).await
}

async fn deactivate_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<UserId>,
) -> Result<Json<UserView>, ApiError> {
    set_active(&state, &user, id, false).await
}

async fn set_active(
    state: &AppState,
    user: &CurrentUser,
    id: UserId,
    is_active: bool,
) -> Result<Json<UserView>, ApiError> {
    let company_id = user.require_company()?;
    let updated = state
        .user_service
        .set_active(&user.subject(), company_id, id, is_active)
        .await?;
    Ok(Json(updated))
}

async fn profile(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<AppUser>, ApiError> {
    Ok(Json(state.user_service.profile(user.user_id).await?))
}

/// 用户名不可修改，请求中的其他字段被忽略
async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(request): ApiJson<UpdateProfileRequest>,
) -> Result<Json<AppUser>, ApiError> {
    Ok(Json(
        state
            .user_service
            .update_profile(user.user_id, request)
            .await?,
    ))
}

async fn check_username(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<CheckUsernameParams>,
) -> Result<Json<ExistsResponse>, ApiError> {
    let exists = state
        .user_service
        .username_exists(&params.username, params.exclude_user_id)
        .await?;
    Ok(Json(ExistsResponse { exists }))
}

async fn check_email(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<CheckEmailParams>,
) -> Result<Json<ExistsResponse>, ApiError> {
    let exists = state
        .user_service
        .email_exists(&params.email, params.exclude_user_id)
        .await?;
    Ok(Json(ExistsResponse { exists }))
}

async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(payload): ValidatedJson<ChangePasswordPayload>,
) -> Result<ApiResponse<()>, ApiError> {
    state
        .user_service
        .change_password(
            user.user_id,
            ChangePasswordRequest {
                current_password: payload.current_password,
                new_password: payload.new_password,
            },
        )
        .await?;
    Ok(ApiResponse::done("密码已修改"))
}

/// 当前用户在当前企业下的有效权限
async fn my_permissions(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<UserPermissions>, ApiError> {
    Ok(Json(
        state
            .access_control
            .user_permissions(&user.subject())
            .await?,
    ))
}
