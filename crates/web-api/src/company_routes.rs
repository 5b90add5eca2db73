use application::{CompanyMembershipView, RegisterCompanyRequest, UpdateCompanyRequest};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use domain::{AppUser, Company, CompanyId};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{CurrentUser, IssuedToken},
    authorize::require_permission,
    error::ApiError,
    extract::ApiJson,
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwitchCompanyPayload {
    target_company_id: CompanyId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterCompanyResponse {
    company: Company,
    admin: AppUser,
    #[serde(flatten)]
    token: IssuedToken,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwitchCompanyResponse {
    company: Company,
    user: AppUser,
    #[serde(flatten)]
    token: IssuedToken,
}

pub fn company_routes(state: &AppState) -> Router<AppState> {
    let access = &state.access_control;
    Router::new()
        .route("/api/company/register", post(register_company))
        .route("/api/company/current", get(current_company))
        .route(
            "/api/company/current",
            put(update_current_company).route_layer(require_permission(access, "company", "update")),
        )
        .route("/api/company/switch", post(switch_company))
        .route("/api/company/my-companies", get(my_companies))
}

/// 注册企业，同时创建管理员并直接签发令牌
async fn register_company(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterCompanyRequest>,
) -> Result<(StatusCode, Json<RegisterCompanyResponse>), ApiError> {
    let registration = state.company_service.register_company(request).await?;
    let token = state.jwt_service.generate_token(
        registration.admin.id,
        &registration.admin.username,
        Some(registration.company.id),
    )?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterCompanyResponse {
            company: registration.company,
            admin: registration.admin,
            token,
        }),
    ))
}

async fn current_company(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Company>, ApiError> {
    Ok(Json(state.company_service.get_current(&user.subject()).await?))
}

async fn update_current_company(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(request): ApiJson<UpdateCompanyRequest>,
) -> Result<Json<Company>, ApiError> {
    let company = state
        .company_service
        .update_current(&user.subject(), request)
        .await?;
    Ok(Json(company))
}

/// 切换企业后令牌中的企业信息随之变化，因此重新签发
async fn switch_company(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(payload): ApiJson<SwitchCompanyPayload>,
) -> Result<Json<SwitchCompanyResponse>, ApiError> {
    let updated = state
        .company_service
        .switch_company(user.user_id, payload.target_company_id)
        .await?;
    let company = state.company_service.get(payload.target_company_id).await?;
    let token = state.jwt_service.generate_token(
        updated.id,
        &updated.username,
        updated.current_company_id,
    )?;

    Ok(Json(SwitchCompanyResponse {
        company,
        user: updated,
        token,
    }))
}

async fn my_companies(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<CompanyMembershipView>>, ApiError> {
    Ok(Json(state.company_service.my_companies(&user.subject()).await?))
}
