use std::sync::Arc;

use domain::{AppUser, Company};
use serde::{Deserialize, Serialize};

use crate::{
    access::{RoleResolver, Subject},
    clock::Clock,
    error::ApplicationError,
    password::PasswordHasher,
    repository::{CompanyRepository, RoleRepository, UserCompanyRepository, UserRepository},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 已认证用户及其当前企业上下文
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub user: AppUser,
    pub company: Option<Company>,
    pub role_names: Vec<String>,
    pub is_super_admin: bool,
}

pub struct AuthServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub company_repository: Arc<dyn CompanyRepository>,
    pub membership_repository: Arc<dyn UserCompanyRepository>,
    pub role_repository: Arc<dyn RoleRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

pub struct AuthService {
    deps: AuthServiceDependencies,
    resolver: RoleResolver,
}

impl AuthService {
    pub fn new(deps: AuthServiceDependencies) -> Self {
        let resolver = RoleResolver {
            user_repository: Arc::clone(&deps.user_repository),
            membership_repository: Arc::clone(&deps.membership_repository),
            role_repository: Arc::clone(&deps.role_repository),
        };
        Self { deps, resolver }
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthenticatedUser, ApplicationError> {
        let mut user = self
            .deps
            .user_repository
            .find_by_username(request.username.trim())
            .await?
            .ok_or_else(|| ApplicationError::authentication("用户名或密码错误"))?;

        let password_ok = self
            .deps
            .password_hasher
            .verify(&request.password, &user.password_hash)
            .await?;
        if !password_ok {
            tracing::warn!(username = %user.username, "login rejected: wrong password");
            return Err(ApplicationError::authentication("用户名或密码错误"));
        }
        if !user.is_active {
            return Err(ApplicationError::authentication("用户已被禁用"));
        }

        if user.current_company_id.is_none() {
            user.current_company_id = self
                .deps
                .membership_repository
                .list_by_user(user.id)
                .await?
                .into_iter()
                .find(|m| m.is_active())
                .map(|m| m.company_id);
        }
        user.record_login(self.deps.clock.now());
        let user = self.deps.user_repository.update(user).await?;

        tracing::info!(user_id = %user.id, username = %user.username, "user logged in");
        self.describe(user).await
    }

    /// 当前登录用户的信息；用户已被删除或禁用时视为未认证
    pub async fn current_user(
        &self,
        subject: &Subject,
    ) -> Result<AuthenticatedUser, ApplicationError> {
        let mut user = self
            .deps
            .user_repository
            .find_by_id(subject.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ApplicationError::authentication("用户不存在或已被禁用"))?;
        if subject.company_id.is_some() {
            user.current_company_id = subject.company_id;
        }
        self.describe(user).await
    }

    /// 刷新令牌前重新确认用户仍然有效；令牌里的企业已不再接纳该用户时回到用户当前企业
    pub async fn refresh(&self, subject: &Subject) -> Result<AuthenticatedUser, ApplicationError> {
        let mut user = self
            .deps
            .user_repository
            .find_by_id(subject.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ApplicationError::authentication("用户不存在或已被禁用"))?;
        if let Some(company_id) = subject.company_id {
            let still_member = self
                .deps
                .membership_repository
                .find(user.id, company_id)
                .await?
                .is_some_and(|m| m.is_active());
            if still_member {
                user.current_company_id = Some(company_id);
            }
        }
        tracing::debug!(user_id = %user.id, "token refreshed");
        self.describe(user).await
    }

    async fn describe(&self, user: AppUser) -> Result<AuthenticatedUser, ApplicationError> {
        let subject = Subject::new(user.id, user.current_company_id);
        let grants = self.resolver.grants(&subject).await?;
        let company = match user.current_company_id {
            Some(id) => self.deps.company_repository.find_by_id(id).await?,
            None => None,
        };
        Ok(AuthenticatedUser {
            is_super_admin: grants.is_super_admin(),
            role_names: grants.roles.iter().map(|r| r.name.clone()).collect(),
            company,
            user,
        })
    }
}
