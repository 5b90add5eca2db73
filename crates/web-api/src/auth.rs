//! JWT 认证
//!
//! 提供令牌签发与校验、全局认证中间件以及 [`CurrentUser`] 提取器。
//! 访问令牌与刷新令牌使用同一密钥签发，靠 `use` 声明区分，互相不能替代。

use application::Subject;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use config::JwtConfig;
use domain::{CompanyId, UserId};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// 令牌用途
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    #[default]
    Access,
    Refresh,
}

/// JWT Claims 结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    #[serde(rename = "companyId", default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<Uuid>,
    #[serde(rename = "use", default)]
    pub token_use: TokenUse,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// 已签发的令牌
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: i64,
    pub refresh_token: String,
    pub refresh_expires_at: i64,
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成访问令牌和配套的刷新令牌
    pub fn generate_token(
        &self,
        user_id: UserId,
        username: &str,
        company_id: Option<CompanyId>,
    ) -> Result<IssuedToken, ApiError> {
        let now = Utc::now();
        let access = self.claims(
            user_id,
            username,
            company_id,
            TokenUse::Access,
            now + chrono::Duration::hours(self.config.expiration_hours),
        );
        let refresh = self.claims(
            user_id,
            username,
            company_id,
            TokenUse::Refresh,
            now + chrono::Duration::days(self.config.refresh_expiration_days),
        );

        Ok(IssuedToken {
            token: self.sign(&access)?,
            token_type: "Bearer",
            expires_at: access.exp,
            refresh_token: self.sign(&refresh)?,
            refresh_expires_at: refresh.exp,
        })
    }

    fn claims(
        &self,
        user_id: UserId,
        username: &str,
        company_id: Option<CompanyId>,
        token_use: TokenUse,
        expires_at: DateTime<Utc>,
    ) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: user_id.into(),
            username: username.to_owned(),
            company_id: company_id.map(Uuid::from),
            token_use,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            iat: now,
            nbf: now,
            exp: expires_at.timestamp(),
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String, ApiError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(ApiError::internal_server_error)
    }

    /// 校验访问令牌
    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        self.verify(token, TokenUse::Access)
    }

    /// 校验刷新令牌；访问令牌不能用来刷新
    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, ApiError> {
        self.verify(token, TokenUse::Refresh)
    }

    /// 校验签名、签发者、受众、有效期与用途，不允许时钟偏差
    fn verify(&self, token: &str, expected: TokenUse) -> Result<Claims, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&[self.config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|token_data| token_data.claims)
            .map_err(|err| {
                tracing::debug!(error = %err, "token rejected");
                ApiError::unauthorized("认证令牌无效或已过期")
            })?;
        if claims.token_use != expected {
            tracing::debug!(expected = ?expected, actual = ?claims.token_use, "token used for the wrong purpose");
            return Err(ApiError::unauthorized("认证令牌无效或已过期"));
        }
        Ok(claims)
    }

    /// 从 headers 中提取和验证 token
    pub fn extract_claims_from_headers(&self, headers: &HeaderMap) -> Result<Claims, ApiError> {
        let auth_header = headers
            .get(AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("未提供认证令牌"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::unauthorized("认证头格式错误"))?;

        self.verify_token(token)
    }
}

/// 通过认证的调用者
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: UserId,
    pub username: String,
    pub company_id: Option<CompanyId>,
}

impl CurrentUser {
    pub fn subject(&self) -> Subject {
        Subject::new(self.user_id, self.company_id)
    }

    pub fn require_company(&self) -> Result<CompanyId, ApiError> {
        Ok(self.subject().require_company()?)
    }
}

impl From<Claims> for CurrentUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: UserId::from(claims.sub),
            username: claims.username,
            company_id: claims.company_id.map(CompanyId::from),
        }
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("未提供有效的认证令牌"))
    }
}

/// 路径是否命中公开前缀（大小写不敏感）
pub fn is_public_path(path: &str, public_paths: &[String]) -> bool {
    let path = path.to_lowercase();
    public_paths
        .iter()
        .any(|prefix| path.starts_with(&prefix.to_lowercase()))
}

/// 全局认证中间件
///
/// 公开路径直接放行；其余请求必须携带有效的 Bearer 令牌。认证结果同时写入请求和
/// 响应扩展，后者供外层的活动日志中间件读取。
pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if is_public_path(req.uri().path(), &state.config.auth.public_paths) {
        return next.run(req).await;
    }

    let current_user = match state.jwt_service.extract_claims_from_headers(req.headers()) {
        Ok(claims) => CurrentUser::from(claims),
        Err(err) => {
            tracing::debug!(path = %req.uri().path(), "unauthenticated request rejected");
            return err.into_response();
        }
    };

    req.extensions_mut().insert(current_user.clone());
    let mut response = next.run(req).await;
    response.extensions_mut().insert(current_user);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_config() -> JwtConfig {
        JwtConfig {
            secret: "unit-test-secret-with-at-least-32-bytes!".into(),
            issuer: "Platform.ApiService".into(),
            audience: "Platform.Web".into(),
            expiration_hours: 1,
            refresh_expiration_days: 7,
        }
    }

    #[test]
    fn issued_token_round_trips() {
        let service = JwtService::new(jwt_config());
        let user_id = UserId::generate();
        let company_id = CompanyId::generate();
        let issued = service
            .generate_token(user_id, "alice", Some(company_id))
            .unwrap();

        let current = CurrentUser::from(service.verify_token(&issued.token).unwrap());
        assert_eq!(current.user_id, user_id);
        assert_eq!(current.username, "alice");
        assert_eq!(current.company_id, Some(company_id));
    }

    #[test]
    fn audience_and_issuer_are_enforced() {
        let issued = JwtService::new(jwt_config())
            .generate_token(UserId::generate(), "bob", None)
            .unwrap();

        let other_audience = JwtService::new(JwtConfig {
            audience: "Other.Web".into(),
            ..jwt_config()
        });
        assert!(other_audience.verify_token(&issued.token).is_err());

        let other_issuer = JwtService::new(JwtConfig {
            issuer: "Other.Issuer".into(),
            ..jwt_config()
        });
        assert!(other_issuer.verify_token(&issued.token).is_err());
    }

    #[test]
    fn expired_token_is_rejected_without_leeway() {
        let service = JwtService::new(jwt_config());
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            username: "carol".into(),
            company_id: None,
            token_use: TokenUse::Access,
            iss: "Platform.ApiService".into(),
            aud: "Platform.Web".into(),
            iat: now - 120,
            nbf: now - 120,
            exp: now - 1,
        };
        let token = encode(&Header::default(), &claims, &service.encoding_key).unwrap();
        assert!(service.verify_token(&token).is_err());
    }

    #[test]
    fn refresh_and_access_tokens_are_not_interchangeable() {
        let service = JwtService::new(jwt_config());
        let user_id = UserId::generate();
        let issued = service.generate_token(user_id, "dave", None).unwrap();
        assert!(issued.refresh_expires_at > issued.expires_at);

        let refreshed = service.verify_refresh_token(&issued.refresh_token).unwrap();
        assert_eq!(UserId::from(refreshed.sub), user_id);
        assert!(service.verify_token(&issued.refresh_token).is_err());
        assert!(service.verify_refresh_token(&issued.token).is_err());
    }

    #[test]
    fn malformed_authorization_header() {
        let service = JwtService::new(jwt_config());
        let mut headers = HeaderMap::new();
        assert!(service.extract_claims_from_headers(&headers).is_err());
        headers.insert(AUTHORIZATION, "Token abc".parse().unwrap());
        assert!(service.extract_claims_from_headers(&headers).is_err());
        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        assert!(service.extract_claims_from_headers(&headers).is_err());
    }

    #[test]
    fn public_paths_match_prefix_case_insensitively() {
        let public = vec!["/health".to_owned(), "/api/auth/login".to_owned()];
        assert!(is_public_path("/HEALTH", &public));
        assert!(is_public_path("/api/Auth/Login", &public));
        assert!(!is_public_path("/api/auth/logout", &public));
    }
}
