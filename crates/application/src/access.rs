//! 访问控制查询
//!
//! HTTP 层的权限守卫只依赖 [`AccessControl`]，具体的角色/权限/菜单解析由
//! [`RbacAccessControl`] 完成。

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use domain::{CompanyId, MenuId, Permission, PermissionCode, PermissionId, Role, UserId};
use serde::Serialize;

use crate::error::ApplicationError;
use crate::repository::{
    MenuRepository, PermissionRepository, RoleRepository, UserCompanyRepository, UserRepository,
};

/// 请求主体：已认证用户及其当前企业
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subject {
    pub user_id: UserId,
    pub company_id: Option<CompanyId>,
}

impl Subject {
    pub fn new(user_id: UserId, company_id: Option<CompanyId>) -> Self {
        Self {
            user_id,
            company_id,
        }
    }

    /// 需要企业上下文的操作使用
    pub fn require_company(&self) -> Result<CompanyId, ApplicationError> {
        self.company_id
            .ok_or_else(|| ApplicationError::invalid_operation("未找到当前企业信息"))
    }
}

/// 用户的有效权限
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPermissions {
    pub role_names: Vec<String>,
    pub role_permissions: Vec<Permission>,
    pub custom_permissions: Vec<Permission>,
    pub all_permission_codes: Vec<String>,
    pub is_super_admin: bool,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AccessControl: Send + Sync {
    async fn is_super_admin(&self, subject: &Subject) -> Result<bool, ApplicationError>;
    async fn has_permission(
        &self,
        subject: &Subject,
        code: &PermissionCode,
    ) -> Result<bool, ApplicationError>;
    async fn has_menu(&self, subject: &Subject, menu_name: &str)
        -> Result<bool, ApplicationError>;
    /// 平台管理员可维护所有企业共享的菜单和权限目录
    async fn is_system_admin(&self, subject: &Subject) -> Result<bool, ApplicationError>;
    async fn user_permissions(&self, subject: &Subject)
        -> Result<UserPermissions, ApplicationError>;
}

pub struct AccessControlDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub membership_repository: Arc<dyn UserCompanyRepository>,
    pub role_repository: Arc<dyn RoleRepository>,
    pub permission_repository: Arc<dyn PermissionRepository>,
    pub menu_repository: Arc<dyn MenuRepository>,
}

/// 基于企业内角色的访问控制
pub struct RbacAccessControl {
    deps: AccessControlDependencies,
    resolver: RoleResolver,
}

pub(crate) struct Grants {
    pub(crate) roles: Vec<Role>,
    pub(crate) custom_permission_ids: Vec<PermissionId>,
}

impl Grants {
    fn empty() -> Self {
        Self {
            roles: Vec::new(),
            custom_permission_ids: Vec::new(),
        }
    }

    pub(crate) fn is_super_admin(&self) -> bool {
        self.roles.iter().any(Role::is_super_admin)
    }

    fn role_permission_ids(&self) -> Vec<PermissionId> {
        let ids: BTreeSet<_> = self
            .roles
            .iter()
            .flat_map(|role| role.permission_ids.iter().copied())
            .collect();
        ids.into_iter().collect()
    }

    pub(crate) fn menu_ids(&self) -> Vec<MenuId> {
        let ids: BTreeSet<_> = self
            .roles
            .iter()
            .flat_map(|role| role.menu_ids.iter().copied())
            .collect();
        ids.into_iter().collect()
    }
}

/// 解析用户在企业中生效的角色，供访问控制和菜单查询共用
#[derive(Clone)]
pub(crate) struct RoleResolver {
    pub(crate) user_repository: Arc<dyn UserRepository>,
    pub(crate) membership_repository: Arc<dyn UserCompanyRepository>,
    pub(crate) role_repository: Arc<dyn RoleRepository>,
}

impl RoleResolver {
    /// 解析用户在当前企业中生效的角色与自定义权限。
    ///
    /// 用户不存在、已禁用或不是企业的有效成员时返回空授权。
    pub(crate) async fn grants(&self, subject: &Subject) -> Result<Grants, ApplicationError> {
        let Some(user) = self.user_repository.find_by_id(subject.user_id).await? else {
            return Ok(Grants::empty());
        };
        if !user.is_active {
            return Ok(Grants::empty());
        }

        let custom_permission_ids = user.custom_permission_ids.clone();
        let Some(company_id) = subject.company_id.or(user.current_company_id) else {
            return Ok(Grants {
                roles: Vec::new(),
                custom_permission_ids,
            });
        };

        let membership = self
            .membership_repository
            .find(user.id, company_id)
            .await?
            .filter(|m| m.is_active());
        let roles = match membership {
            Some(membership) if !membership.role_ids.is_empty() => self
                .role_repository
                .list_by_ids(&membership.role_ids)
                .await?
                .into_iter()
                .filter(|role| role.is_active && role.company_id == company_id)
                .collect(),
            _ => Vec::new(),
        };

        Ok(Grants {
            roles,
            custom_permission_ids,
        })
    }
}

impl RbacAccessControl {
    pub fn new(deps: AccessControlDependencies) -> Self {
        let resolver = RoleResolver {
            user_repository: Arc::clone(&deps.user_repository),
            membership_repository: Arc::clone(&deps.membership_repository),
            role_repository: Arc::clone(&deps.role_repository),
        };
        Self { deps, resolver }
    }

    async fn grants(&self, subject: &Subject) -> Result<Grants, ApplicationError> {
        self.resolver.grants(subject).await
    }
}

#[async_trait]
impl AccessControl for RbacAccessControl {
    async fn is_super_admin(&self, subject: &Subject) -> Result<bool, ApplicationError> {
        Ok(self.grants(subject).await?.is_super_admin())
    }

    async fn has_permission(
        &self,
        subject: &Subject,
        code: &PermissionCode,
    ) -> Result<bool, ApplicationError> {
        let grants = self.grants(subject).await?;
        let mut ids = grants.role_permission_ids();
        ids.extend(grants.custom_permission_ids.iter().copied());
        if ids.is_empty() {
            return Ok(false);
        }
        let permissions = self.deps.permission_repository.list_by_ids(&ids).await?;
        Ok(permissions.iter().any(|p| &p.code == code))
    }

    async fn has_menu(
        &self,
        subject: &Subject,
        menu_name: &str,
    ) -> Result<bool, ApplicationError> {
        let menu_ids = self.grants(subject).await?.menu_ids();
        if menu_ids.is_empty() {
            return Ok(false);
        }
        let menus = self.deps.menu_repository.list_by_ids(&menu_ids).await?;
        Ok(menus
            .iter()
            .any(|menu| menu.is_enabled && menu.name == menu_name))
    }

    async fn is_system_admin(&self, subject: &Subject) -> Result<bool, ApplicationError> {
        Ok(self
            .deps
            .user_repository
            .find_by_id(subject.user_id)
            .await?
            .is_some_and(|user| user.is_active && user.is_system_admin))
    }

    async fn user_permissions(
        &self,
        subject: &Subject,
    ) -> Result<UserPermissions, ApplicationError> {
        let grants = self.grants(subject).await?;
        let is_super_admin = grants.is_super_admin();

        let role_permissions = self
            .deps
            .permission_repository
            .list_by_ids(&grants.role_permission_ids())
            .await?;
        let custom_permissions = self
            .deps
            .permission_repository
            .list_by_ids(&grants.custom_permission_ids)
            .await?;

        let all_permission_codes: BTreeSet<String> = if is_super_admin {
            self.deps
                .permission_repository
                .list_all()
                .await?
                .into_iter()
                .map(|p| p.code.to_string())
                .collect()
        } else {
            role_permissions
                .iter()
                .chain(custom_permissions.iter())
                .map(|p| p.code.to_string())
                .collect()
        };

        let mut seen = HashSet::new();
        let role_names = grants
            .roles
            .iter()
            .filter(|role| seen.insert(role.name.clone()))
            .map(|role| role.name.clone())
            .collect();

        Ok(UserPermissions {
            role_names,
            role_permissions,
            custom_permissions,
            all_permission_codes: all_permission_codes.into_iter().collect(),
            is_super_admin,
        })
    }
}
