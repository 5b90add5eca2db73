//! 路由级访问守卫
//!
//! [`AccessLayer`] 挂在单个路由上（`route_layer`），在处理器执行前检查
//! 权限代码或菜单。未认证返回 401，企业管理员直接放行，其余未授权返回 403。
//! 全局菜单和权限目录的维护只对平台管理员开放，企业管理员不能越过。

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use application::{AccessControl, ApplicationError, Subject};
use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use domain::PermissionCode;
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use crate::{auth::CurrentUser, error::ApiError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessRule {
    Permission {
        resource: &'static str,
        action: &'static str,
    },
    Menu(&'static str),
    /// 平台管理员，不受企业管理员放行影响
    SystemAdmin,
}

impl AccessRule {
    async fn allows(
        &self,
        access: &dyn AccessControl,
        subject: &Subject,
    ) -> Result<bool, ApplicationError> {
        if let AccessRule::SystemAdmin = self {
            return access.is_system_admin(subject).await;
        }
        if access.is_super_admin(subject).await? {
            return Ok(true);
        }
        match self {
            AccessRule::Permission { resource, action } => {
                let code = PermissionCode::new(resource, action)?;
                access.has_permission(subject, &code).await
            }
            AccessRule::Menu(name) => access.has_menu(subject, name).await,
            AccessRule::SystemAdmin => Ok(false),
        }
    }

    fn denied(&self) -> ApiError {
        match self {
            AccessRule::Permission { resource, action } => {
                ApiError::forbidden(format!("无权执行此操作，需要权限 {resource}:{action}"))
            }
            AccessRule::Menu(name) => ApiError::forbidden(format!("无权访问菜单 {name}")),
            AccessRule::SystemAdmin => ApiError::forbidden("仅平台管理员可以维护全局菜单和权限"),
        }
    }
}

/// 要求当前用户拥有 `resource:action` 权限
pub fn require_permission(
    access: &Arc<dyn AccessControl>,
    resource: &'static str,
    action: &'static str,
) -> AccessLayer {
    AccessLayer::new(access.clone(), AccessRule::Permission { resource, action })
}

/// 要求当前用户能访问指定菜单
pub fn require_menu(access: &Arc<dyn AccessControl>, name: &'static str) -> AccessLayer {
    AccessLayer::new(access.clone(), AccessRule::Menu(name))
}

/// 要求当前用户是平台管理员
pub fn require_system_admin(access: &Arc<dyn AccessControl>) -> AccessLayer {
    AccessLayer::new(access.clone(), AccessRule::SystemAdmin)
}

#[derive(Clone)]
pub struct AccessLayer {
    access: Arc<dyn AccessControl>,
    rule: Arc<AccessRule>,
}

impl AccessLayer {
    pub fn new(access: Arc<dyn AccessControl>, rule: AccessRule) -> Self {
        Self {
            access,
            rule: Arc::new(rule),
        }
    }
}

impl<S> Layer<S> for AccessLayer {
    type Service = AccessService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessService {
            inner,
            access: self.access.clone(),
            rule: self.rule.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AccessService<S> {
    inner: S,
    access: Arc<dyn AccessControl>,
    rule: Arc<AccessRule>,
}

impl<S> Service<Request> for AccessService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // 取走已就绪的实例，留下克隆体供下次 poll_ready
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let access = self.access.clone();
        let rule = self.rule.clone();

        Box::pin(async move {
            let Some(user) = req.extensions().get::<CurrentUser>().cloned() else {
                return Ok(ApiError::unauthorized("未提供有效的认证令牌").into_response());
            };
            match rule.allows(access.as_ref(), &user.subject()).await {
                Ok(true) => inner.call(req).await,
                Ok(false) => {
                    tracing::info!(
                        user_id = %user.user_id,
                        path = %req.uri().path(),
                        rule = ?rule,
                        "access denied"
                    );
                    Ok(rule.denied().into_response())
                }
                Err(err) => Ok(ApiError::from(err).into_response()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use application::access::MockAccessControl;
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use domain::{CompanyId, UserId};
    use tower::ServiceExt;

    fn user() -> CurrentUser {
        CurrentUser {
            user_id: UserId::generate(),
            username: "tester".into(),
            company_id: Some(CompanyId::generate()),
        }
    }

    fn app(access: MockAccessControl, layer: fn(&Arc<dyn AccessControl>) -> AccessLayer) -> Router {
        let access: Arc<dyn AccessControl> = Arc::new(access);
        Router::new().route("/guarded", get(|| async { "ok" }).route_layer(layer(&access)))
    }

    fn user_read(access: &Arc<dyn AccessControl>) -> AccessLayer {
        require_permission(access, "user", "read")
    }

    fn user_log_menu(access: &Arc<dyn AccessControl>) -> AccessLayer {
        require_menu(access, "user-log")
    }

    fn system_admin(access: &Arc<dyn AccessControl>) -> AccessLayer {
        require_system_admin(access)
    }

    async fn call(app: Router, user: Option<CurrentUser>) -> StatusCode {
        let mut request = Request::builder().uri("/guarded").body(Body::empty()).unwrap();
        if let Some(user) = user {
            request.extensions_mut().insert(user);
        }
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn missing_user_is_unauthorized() {
        let mut access = MockAccessControl::new();
        access.expect_is_super_admin().times(0);
        assert_eq!(call(app(access, user_read), None).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn super_admin_bypasses_permission_lookup() {
        let mut access = MockAccessControl::new();
        access.expect_is_super_admin().returning(|_| Ok(true));
        access.expect_has_permission().times(0);
        assert_eq!(call(app(access, user_read), Some(user())).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_permission_is_forbidden() {
        let mut access = MockAccessControl::new();
        access.expect_is_super_admin().returning(|_| Ok(false));
        access
            .expect_has_permission()
            .withf(|_, code| code.as_str() == "user:read")
            .returning(|_, _| Ok(false));
        assert_eq!(
            call(app(access, user_read), Some(user())).await,
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn granted_permission_reaches_handler() {
        let mut access = MockAccessControl::new();
        access.expect_is_super_admin().returning(|_| Ok(false));
        access.expect_has_permission().returning(|_, _| Ok(true));
        assert_eq!(call(app(access, user_read), Some(user())).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn menu_rule_checks_menu_name() {
        let mut access = MockAccessControl::new();
        access.expect_is_super_admin().returning(|_| Ok(false));
        access
            .expect_has_menu()
            .withf(|_, name| name == "user-log")
            .returning(|_, _| Ok(false));
        assert_eq!(
            call(app(access, user_log_menu), Some(user())).await,
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn lookup_failure_is_internal_error() {
        let mut access = MockAccessControl::new();
        access
            .expect_is_super_admin()
            .returning(|_| Err(ApplicationError::infrastructure("down")));
        assert_eq!(
            call(app(access, user_read), Some(user())).await,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn company_admin_cannot_maintain_global_catalogue() {
        let mut access = MockAccessControl::new();
        access.expect_is_super_admin().times(0);
        access.expect_is_system_admin().returning(|_| Ok(false));
        assert_eq!(
            call(app(access, system_admin), Some(user())).await,
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn system_admin_reaches_handler() {
        let mut access = MockAccessControl::new();
        access.expect_is_system_admin().returning(|_| Ok(true));
        assert_eq!(
            call(app(access, system_admin), Some(user())).await,
            StatusCode::OK
        );
    }
}
