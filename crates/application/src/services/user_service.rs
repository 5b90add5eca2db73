use std::collections::HashSet;
use std::sync::Arc;

use domain::{
    AppUser, CompanyId, DomainError, Page, PageRequest, PermissionId, RoleId, UserCompany, UserId,
};
use serde::{Deserialize, Serialize};

use crate::{
    access::Subject,
    clock::Clock,
    error::ApplicationError,
    password::{validate_password, PasswordHasher},
    repository::{PermissionRepository, RoleRepository, UserCompanyRepository, UserRepository},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role_ids: Vec<RoleId>,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role_ids: Option<Vec<RoleId>>,
}

/// 本人可修改的资料
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub keyword: Option<String>,
    pub is_active: Option<bool>,
    pub page: PageRequest,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// 企业视角下的用户
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[serde(flatten)]
    pub user: AppUser,
    pub role_ids: Vec<RoleId>,
    pub is_admin: bool,
}

pub struct UserServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub membership_repository: Arc<dyn UserCompanyRepository>,
    pub role_repository: Arc<dyn RoleRepository>,
    pub permission_repository: Arc<dyn PermissionRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

pub struct UserService {
    deps: UserServiceDependencies,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self { deps }
    }

    /// 在当前企业下创建用户
    pub async fn create_user(
        &self,
        company_id: CompanyId,
        request: CreateUserRequest,
    ) -> Result<UserView, ApplicationError> {
        let username = request.username.trim().to_owned();
        if self
            .deps
            .user_repository
            .find_by_username(&username)
            .await?
            .is_some()
        {
            return Err(DomainError::resource_already_exists("user", &username).into());
        }
        validate_password(&request.password)?;
        let role_ids = self.company_role_ids(company_id, &request.role_ids).await?;

        let now = self.deps.clock.now();
        let password_hash = self.deps.password_hasher.hash(&request.password).await?;
        let mut user = AppUser::new(username, request.email, password_hash, now)?;
        user.display_name = request.display_name;
        user.current_company_id = Some(company_id);
        let user = self.deps.user_repository.create(user).await?;

        let mut membership = UserCompany::new(user.id, company_id, now);
        membership.role_ids = role_ids;
        membership.is_admin = request.is_admin;
        let membership = self.deps.membership_repository.upsert(membership).await?;

        tracing::info!(company_id = %company_id, user = %user.username, "user created");
        Ok(UserView {
            user,
            role_ids: membership.role_ids,
            is_admin: membership.is_admin,
        })
    }

    pub async fn get_user(
        &self,
        company_id: CompanyId,
        id: UserId,
    ) -> Result<UserView, ApplicationError> {
        let membership = self.membership(company_id, id).await?;
        let user = self.load_user(id).await?;
        Ok(UserView {
            user,
            role_ids: membership.role_ids,
            is_admin: membership.is_admin,
        })
    }

    pub async fn list_users(
        &self,
        company_id: CompanyId,
        query: UserQuery,
    ) -> Result<Page<UserView>, ApplicationError> {
        let memberships = self
            .deps
            .membership_repository
            .list_by_company(company_id)
            .await?;
        let ids: Vec<UserId> = memberships.iter().map(|m| m.user_id).collect();
        let users = self.deps.user_repository.list_by_ids(&ids).await?;

        let keyword = query
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase);

        let mut views: Vec<UserView> = users
            .into_iter()
            .filter(|user| query.is_active.map_or(true, |active| user.is_active == active))
            .filter(|user| {
                keyword.as_deref().map_or(true, |keyword| {
                    user.username.to_lowercase().contains(keyword)
                        || user
                            .email
                            .as_deref()
                            .is_some_and(|e| e.to_lowercase().contains(keyword))
                        || user
                            .display_name
                            .as_deref()
                            .is_some_and(|n| n.to_lowercase().contains(keyword))
                })
            })
            .filter_map(|user| {
                memberships
                    .iter()
                    .find(|m| m.user_id == user.id)
                    .map(|m| UserView {
                        role_ids: m.role_ids.clone(),
                        is_admin: m.is_admin,
                        user,
                    })
            })
            .collect();
        views.sort_by(|a, b| b.user.created_at.cmp(&a.user.created_at));

        Ok(Page::slice(views, query.page))
    }

    /// 更新用户资料；不允许修改自己的角色
    pub async fn update_user(
        &self,
        actor: &Subject,
        company_id: CompanyId,
        id: UserId,
        request: UpdateUserRequest,
    ) -> Result<UserView, ApplicationError> {
        if request.role_ids.is_some() && actor.user_id == id {
            return Err(ApplicationError::invalid_operation("不能修改自己的角色"));
        }
        let mut user = self.load_user(id).await?;
        let mut membership = self.membership(company_id, id).await?;

        // 先校验全部输入，再写入
        if let Some(email) = &request.email {
            AppUser::validate_email(email)?;
        }
        let role_ids = match &request.role_ids {
            Some(role_ids) => Some(self.company_role_ids(company_id, role_ids).await?),
            None => None,
        };

        let now = self.deps.clock.now();
        if let Some(email) = request.email {
            user.email = Some(email);
        }
        if let Some(display_name) = request.display_name {
            user.display_name = Some(display_name);
        }
        user.touch(now);
        self.deps.user_repository.update(user).await?;

        if let Some(role_ids) = role_ids {
            membership.role_ids = role_ids;
            membership.updated_at = now;
            self.deps.membership_repository.upsert(membership).await?;
        }
        self.get_user(company_id, id).await
    }

    pub async fn assign_roles(
        &self,
        actor: &Subject,
        company_id: CompanyId,
        id: UserId,
        role_ids: &[RoleId],
    ) -> Result<UserView, ApplicationError> {
        if actor.user_id == id {
            return Err(ApplicationError::invalid_operation("不能修改自己的角色"));
        }
        let mut membership = self.membership(company_id, id).await?;
        membership.role_ids = self.company_role_ids(company_id, role_ids).await?;
        membership.updated_at = self.deps.clock.now();
        self.deps.membership_repository.upsert(membership).await?;

        tracing::info!(company_id = %company_id, user_id = %id, roles = role_ids.len(), "user roles assigned");
        self.get_user(company_id, id).await
    }

    pub async fn assign_custom_permissions(
        &self,
        company_id: CompanyId,
        id: UserId,
        permission_ids: &[PermissionId],
    ) -> Result<UserView, ApplicationError> {
        self.membership(company_id, id).await?;
        let mut user = self.load_user(id).await?;

        let mut seen = HashSet::new();
        let requested: Vec<PermissionId> = permission_ids
            .iter()
            .copied()
            .filter(|pid| seen.insert(*pid))
            .collect();
        let found = self
            .deps
            .permission_repository
            .list_by_ids(&requested)
            .await?;
        if let Some(missing) = requested
            .iter()
            .find(|pid| !found.iter().any(|p| p.id == **pid))
        {
            return Err(ApplicationError::not_found("permission", missing));
        }

        user.custom_permission_ids = requested;
        user.touch(self.deps.clock.now());
        self.deps.user_repository.update(user).await?;
        self.get_user(company_id, id).await
    }

    pub async fn set_active(
        &self,
        actor: &Subject,
        company_id: CompanyId,
        id: UserId,
        is_active: bool,
    ) -> Result<UserView, ApplicationError> {
        if actor.user_id == id && !is_active {
            return Err(ApplicationError::invalid_operation("不能禁用自己的账户"));
        }
        self.membership(company_id, id).await?;
        let mut user = self.load_user(id).await?;
        user.is_active = is_active;
        user.touch(self.deps.clock.now());
        self.deps.user_repository.update(user).await?;
        self.get_user(company_id, id).await
    }

    /// 软删除用户并移除其在当前企业的成员关系
    pub async fn delete_user(
        &self,
        actor: &Subject,
        company_id: CompanyId,
        id: UserId,
    ) -> Result<(), ApplicationError> {
        if actor.user_id == id {
            return Err(ApplicationError::invalid_operation("不能删除自己的账户"));
        }
        self.membership(company_id, id).await?;
        let mut user = self.load_user(id).await?;

        self.deps.membership_repository.remove(id, company_id).await?;
        user.is_deleted = true;
        user.touch(self.deps.clock.now());
        self.deps.user_repository.update(user).await?;

        tracing::info!(company_id = %company_id, user_id = %id, "user deleted");
        Ok(())
    }

    pub async fn change_password(
        &self,
        id: UserId,
        request: ChangePasswordRequest,
    ) -> Result<(), ApplicationError> {
        let mut user = self.load_user(id).await?;
        let matches = self
            .deps
            .password_hasher
            .verify(&request.current_password, &user.password_hash)
            .await?;
        if !matches {
            return Err(ApplicationError::business(
                "INVALID_PASSWORD",
                400,
                "当前密码不正确",
            ));
        }
        validate_password(&request.new_password)?;
        user.password_hash = self.deps.password_hasher.hash(&request.new_password).await?;
        user.touch(self.deps.clock.now());
        self.deps.user_repository.update(user).await?;
        Ok(())
    }

    pub async fn profile(&self, id: UserId) -> Result<AppUser, ApplicationError> {
        self.load_user(id).await
    }

    /// 修改本人资料；空字符串清除对应字段，邮箱不能与其他用户重复
    pub async fn update_profile(
        &self,
        id: UserId,
        request: UpdateProfileRequest,
    ) -> Result<AppUser, ApplicationError> {
        let mut user = self.load_user(id).await?;
        if let Some(email) = request.email {
            let email = email.trim().to_owned();
            if email.is_empty() {
                user.email = None;
            } else {
                AppUser::validate_email(&email)?;
                let taken = self
                    .deps
                    .user_repository
                    .find_by_email(&email)
                    .await?
                    .is_some_and(|other| other.id != id);
                if taken {
                    return Err(DomainError::resource_already_exists("email", &email).into());
                }
                user.email = Some(email);
            }
        }
        if let Some(display_name) = request.display_name {
            let display_name = display_name.trim().to_owned();
            user.display_name = (!display_name.is_empty()).then_some(display_name);
        }
        user.touch(self.deps.clock.now());
        let user = self.deps.user_repository.update(user).await?;
        tracing::info!(user_id = %id, "profile updated");
        Ok(user)
    }

    /// 用户名是否已被其他用户占用，`exclude` 为编辑中的用户本人
    pub async fn username_exists(
        &self,
        username: &str,
        exclude: Option<UserId>,
    ) -> Result<bool, ApplicationError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ApplicationError::invalid_argument("用户名不能为空"));
        }
        Ok(self
            .deps
            .user_repository
            .find_by_username(username)
            .await?
            .is_some_and(|user| Some(user.id) != exclude))
    }

    pub async fn email_exists(
        &self,
        email: &str,
        exclude: Option<UserId>,
    ) -> Result<bool, ApplicationError> {
        let email = email.trim();
        AppUser::validate_email(email)?;
        Ok(self
            .deps
            .user_repository
            .find_by_email(email)
            .await?
            .is_some_and(|user| Some(user.id) != exclude))
    }

    pub async fn load_user(&self, id: UserId) -> Result<AppUser, ApplicationError> {
        self.deps
            .user_repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("user", id))
    }

    async fn membership(
        &self,
        company_id: CompanyId,
        id: UserId,
    ) -> Result<UserCompany, ApplicationError> {
        self.deps
            .membership_repository
            .find(id, company_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("user", id))
    }

    /// 校验角色属于该企业，去重并保持顺序
    async fn company_role_ids(
        &self,
        company_id: CompanyId,
        role_ids: &[RoleId],
    ) -> Result<Vec<RoleId>, ApplicationError> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut seen = HashSet::new();
        let requested: Vec<RoleId> = role_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        let roles = self.deps.role_repository.list_by_ids(&requested).await?;
        for id in &requested {
            let belongs = roles
                .iter()
                .any(|role| role.id == *id && role.company_id == company_id);
            if !belongs {
                return Err(ApplicationError::not_found("role", id));
            }
        }
        Ok(requested)
    }
}
