use std::collections::HashSet;
use std::sync::Arc;

use domain::{
    CompanyId, DomainError, MenuId, PermissionId, Role, RoleId, UserCompany, WELCOME_MENU,
};
use serde::{Deserialize, Serialize};

use crate::{
    clock::Clock,
    error::ApplicationError,
    repository::{MenuRepository, PermissionRepository, RoleRepository, UserCompanyRepository},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub menu_ids: Vec<MenuId>,
    #[serde(default)]
    pub permission_ids: Vec<PermissionId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub menu_ids: Option<Vec<MenuId>>,
    pub permission_ids: Option<Vec<PermissionId>>,
    pub is_active: Option<bool>,
}

/// 带统计信息的角色
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleWithStats {
    #[serde(flatten)]
    pub role: Role,
    pub user_count: usize,
    pub menu_count: usize,
    pub permission_count: usize,
}

pub struct RoleServiceDependencies {
    pub role_repository: Arc<dyn RoleRepository>,
    pub membership_repository: Arc<dyn UserCompanyRepository>,
    pub menu_repository: Arc<dyn MenuRepository>,
    pub permission_repository: Arc<dyn PermissionRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct RoleService {
    deps: RoleServiceDependencies,
}

impl RoleService {
    pub fn new(deps: RoleServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn list_roles(&self, company_id: CompanyId) -> Result<Vec<Role>, ApplicationError> {
        let mut roles = self.deps.role_repository.list_by_company(company_id).await?;
        roles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(roles)
    }

    pub async fn list_roles_with_stats(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<RoleWithStats>, ApplicationError> {
        let roles = self.list_roles(company_id).await?;
        let memberships = self
            .deps
            .membership_repository
            .list_by_company(company_id)
            .await?;

        Ok(roles
            .into_iter()
            .map(|role| {
                let user_count = memberships
                    .iter()
                    .filter(|m| m.role_ids.contains(&role.id))
                    .count();
                RoleWithStats {
                    user_count,
                    menu_count: role.menu_ids.len(),
                    permission_count: role.permission_ids.len(),
                    role,
                }
            })
            .collect())
    }

    /// 获取本企业的角色，其他企业的角色视为不存在
    pub async fn get_role(
        &self,
        company_id: CompanyId,
        id: RoleId,
    ) -> Result<Role, ApplicationError> {
        self.deps
            .role_repository
            .find_by_id(id)
            .await?
            .filter(|role| role.company_id == company_id)
            .ok_or_else(|| ApplicationError::not_found("role", id))
    }

    pub async fn create_role(
        &self,
        company_id: CompanyId,
        request: CreateRoleRequest,
    ) -> Result<Role, ApplicationError> {
        let mut role = Role::new(
            company_id,
            request.name,
            request.description,
            self.deps.clock.now(),
        )?;
        self.ensure_name_available(company_id, &role.name, None)
            .await?;
        role.menu_ids = self.valid_menu_ids(&request.menu_ids).await?;
        role.permission_ids = self.valid_permission_ids(&request.permission_ids).await?;

        let stored = self.deps.role_repository.create(role).await?;
        tracing::info!(company_id = %company_id, role = %stored.name, "role created");
        Ok(stored)
    }

    pub async fn update_role(
        &self,
        company_id: CompanyId,
        id: RoleId,
        request: UpdateRoleRequest,
    ) -> Result<Role, ApplicationError> {
        let mut role = self.get_role(company_id, id).await?;

        if let Some(name) = request.name {
            let name = name.trim().to_owned();
            Role::validate_name(&name)?;
            if name != role.name {
                if role.is_protected() {
                    return Err(ApplicationError::invalid_operation("系统内置角色不能改名"));
                }
                self.ensure_name_available(company_id, &name, Some(id))
                    .await?;
                role.name = name;
            }
        }
        if let Some(description) = request.description {
            role.description = Some(description);
        }
        if let Some(menu_ids) = request.menu_ids {
            role.menu_ids = self.menu_ids_with_fallback(&menu_ids).await?;
        }
        if let Some(permission_ids) = request.permission_ids {
            role.permission_ids = self.valid_permission_ids(&permission_ids).await?;
        }
        if let Some(is_active) = request.is_active {
            if !is_active && role.is_super_admin() {
                return Err(ApplicationError::invalid_operation("不能禁用超级管理员角色"));
            }
            role.is_active = is_active;
        }
        role.updated_at = self.deps.clock.now();

        Ok(self.deps.role_repository.update(role).await?)
    }

    /// 删除角色，并从成员关系中移除；不能让管理员失去全部角色
    pub async fn delete_role(
        &self,
        company_id: CompanyId,
        id: RoleId,
    ) -> Result<(), ApplicationError> {
        let mut role = self.get_role(company_id, id).await?;
        if role.is_protected() {
            return Err(ApplicationError::business(
                "ROLE_PROTECTED",
                400,
                format!("系统内置角色 {} 不能删除", role.name),
            ));
        }

        let memberships: Vec<UserCompany> = self
            .deps
            .membership_repository
            .list_by_role(id)
            .await?
            .into_iter()
            .filter(|m| m.company_id == company_id)
            .collect();

        // 管理员失去唯一角色时，企业里必须还有另一位有效管理员
        let orphaned_admins: Vec<_> = memberships
            .iter()
            .filter(|m| m.is_admin && m.is_active() && m.role_ids.iter().all(|r| *r == id))
            .map(|m| m.user_id)
            .collect();
        if !orphaned_admins.is_empty() {
            let company_admins: Vec<_> = self
                .deps
                .membership_repository
                .list_by_company(company_id)
                .await?
                .into_iter()
                .filter(|m| m.is_admin && m.is_active())
                .map(|m| m.user_id)
                .collect();
            let last_admin = orphaned_admins.iter().any(|user_id| {
                !company_admins.iter().any(|other| other != user_id)
            });
            if last_admin {
                return Err(ApplicationError::business(
                    "LAST_ADMIN_ROLE",
                    400,
                    "不能移除最后一个管理员的角色，必须至少保留一个管理员",
                ));
            }
        }

        let now = self.deps.clock.now();
        let affected = memberships.len();
        for mut membership in memberships {
            membership.role_ids.retain(|role_id| *role_id != id);
            membership.updated_at = now;
            self.deps.membership_repository.upsert(membership).await?;
        }

        role.is_deleted = true;
        role.updated_at = now;
        self.deps.role_repository.update(role).await?;

        tracing::info!(company_id = %company_id, role_id = %id, affected, "role deleted");
        Ok(())
    }

    /// 分配菜单；无效或禁用的菜单被忽略，全部无效时兜底分配欢迎页
    pub async fn assign_menus(
        &self,
        company_id: CompanyId,
        id: RoleId,
        menu_ids: &[MenuId],
    ) -> Result<Role, ApplicationError> {
        let mut role = self.get_role(company_id, id).await?;
        role.menu_ids = self.menu_ids_with_fallback(menu_ids).await?;
        role.updated_at = self.deps.clock.now();
        Ok(self.deps.role_repository.update(role).await?)
    }

    pub async fn assign_permissions(
        &self,
        company_id: CompanyId,
        id: RoleId,
        permission_ids: &[PermissionId],
    ) -> Result<Role, ApplicationError> {
        let mut role = self.get_role(company_id, id).await?;
        role.permission_ids = self.valid_permission_ids(permission_ids).await?;
        role.updated_at = self.deps.clock.now();
        Ok(self.deps.role_repository.update(role).await?)
    }

    pub async fn role_menu_ids(
        &self,
        company_id: CompanyId,
        id: RoleId,
    ) -> Result<Vec<MenuId>, ApplicationError> {
        Ok(self.get_role(company_id, id).await?.menu_ids)
    }

    async fn ensure_name_available(
        &self,
        company_id: CompanyId,
        name: &str,
        current: Option<RoleId>,
    ) -> Result<(), ApplicationError> {
        match self
            .deps
            .role_repository
            .find_by_name(company_id, name)
            .await?
        {
            Some(existing) if Some(existing.id) != current => {
                Err(DomainError::resource_already_exists("role", name).into())
            }
            _ => Ok(()),
        }
    }

    async fn valid_menu_ids(&self, menu_ids: &[MenuId]) -> Result<Vec<MenuId>, ApplicationError> {
        if menu_ids.is_empty() {
            return Ok(Vec::new());
        }
        let requested: Vec<MenuId> = dedup(menu_ids);
        let found: HashSet<MenuId> = self
            .deps
            .menu_repository
            .list_by_ids(&requested)
            .await?
            .into_iter()
            .filter(|menu| menu.is_enabled)
            .map(|menu| menu.id)
            .collect();
        let valid: Vec<MenuId> = requested
            .into_iter()
            .filter(|id| found.contains(id))
            .collect();
        if valid.len() < menu_ids.len() {
            tracing::warn!(
                requested = menu_ids.len(),
                valid = valid.len(),
                "ignored invalid or disabled menu ids"
            );
        }
        Ok(valid)
    }

    async fn menu_ids_with_fallback(
        &self,
        menu_ids: &[MenuId],
    ) -> Result<Vec<MenuId>, ApplicationError> {
        let valid = self.valid_menu_ids(menu_ids).await?;
        if !valid.is_empty() {
            return Ok(valid);
        }
        let welcome = self
            .deps
            .menu_repository
            .find_by_name(WELCOME_MENU)
            .await?
            .filter(|menu| menu.is_enabled)
            .ok_or_else(|| {
                ApplicationError::invalid_operation("没有有效的菜单可分配，且系统缺少欢迎页菜单")
            })?;
        Ok(vec![welcome.id])
    }

    async fn valid_permission_ids(
        &self,
        permission_ids: &[PermissionId],
    ) -> Result<Vec<PermissionId>, ApplicationError> {
        if permission_ids.is_empty() {
            return Ok(Vec::new());
        }
        let requested = dedup(permission_ids);
        let found: HashSet<PermissionId> = self
            .deps
            .permission_repository
            .list_by_ids(&requested)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        if let Some(missing) = requested.iter().find(|id| !found.contains(id)) {
            return Err(ApplicationError::not_found("permission", missing));
        }
        Ok(requested)
    }
}

fn dedup<T: Copy + Eq + std::hash::Hash>(ids: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
