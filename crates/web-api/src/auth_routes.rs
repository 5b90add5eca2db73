use application::{AuthenticatedUser, LoginRequest, RegisterUserRequest, Subject};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use domain::{AppUser, Company, CompanyId, UserId};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    auth::{CurrentUser, IssuedToken},
    envelope::ApiResponse,
    error::ApiError,
    extract::ValidatedJson,
    state::AppState,
};

#[derive(Debug, Deserialize, Validate)]
struct LoginPayload {
    #[validate(length(min = 1, message = "用户名不能为空"))]
    username: String,
    #[validate(length(min = 1, message = "密码不能为空"))]
    password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct RegisterPayload {
    #[validate(length(min = 3, max = 50, message = "用户名长度需在 3 到 50 之间"))]
    username: String,
    #[validate(length(min = 6, message = "密码至少 6 位"))]
    password: String,
    #[validate(email(message = "邮箱格式不正确"))]
    email: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenPayload {
    #[validate(length(min = 1, message = "刷新令牌不能为空"))]
    refresh_token: String,
}

/// 注册响应：新用户及其个人企业，附带已签发的令牌
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    user: AppUser,
    company: Company,
    #[serde(flatten)]
    token: IssuedToken,
}

/// 登录响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(flatten)]
    pub token: IssuedToken,
    pub current_user: AuthenticatedUser,
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/refresh-token", post(refresh_token))
        .route("/api/auth/current-user", get(current_user))
        .route("/api/auth/logout", post(logout))
}

async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    let authenticated = state
        .auth_service
        .login(LoginRequest {
            username: payload.username,
            password: payload.password,
        })
        .await?;

    let token = state.jwt_service.generate_token(
        authenticated.user.id,
        &authenticated.user.username,
        authenticated.user.current_company_id,
    )?;

    Ok(Json(LoginResponse {
        token,
        current_user: authenticated,
    }))
}

/// 自助注册，创建个人企业并直接登录
async fn register(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterPayload>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let registration = state
        .company_service
        .register_user(RegisterUserRequest {
            username: payload.username,
            password: payload.password,
            email: payload.email,
            display_name: payload.display_name,
        })
        .await?;
    let token = state.jwt_service.generate_token(
        registration.admin.id,
        &registration.admin.username,
        Some(registration.company.id),
    )?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: registration.admin,
            company: registration.company,
            token,
        }),
    ))
}

/// 用刷新令牌换取新的令牌对；用户被禁用或删除后刷新失败
async fn refresh_token(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RefreshTokenPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    let claims = state
        .jwt_service
        .verify_refresh_token(payload.refresh_token.trim())?;
    let subject = Subject::new(
        UserId::from(claims.sub),
        claims.company_id.map(CompanyId::from),
    );
    let refreshed = state.auth_service.refresh(&subject).await?;

    let token = state.jwt_service.generate_token(
        refreshed.user.id,
        &refreshed.user.username,
        refreshed.user.current_company_id,
    )?;
    Ok(Json(LoginResponse {
        token,
        current_user: refreshed,
    }))
}

async fn current_user(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<AuthenticatedUser>, ApiError> {
    let current = state.auth_service.current_user(&user.subject()).await?;
    Ok(Json(current))
}

/// 令牌无状态，登出只记录日志，由客户端丢弃令牌
async fn logout(user: CurrentUser) -> ApiResponse<()> {
    tracing::info!(user_id = %user.user_id, username = %user.username, "user logged out");
    ApiResponse::done("登出成功")
}
