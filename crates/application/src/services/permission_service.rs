use std::sync::Arc;

use domain::{
    default_permission_catalogue, group_permissions, DomainError, Permission, PermissionCode,
    PermissionDraft, PermissionGroup, PermissionId,
};

use crate::{
    clock::Clock,
    error::ApplicationError,
    repository::{PermissionRepository, RoleRepository, UserRepository},
};

pub struct PermissionServiceDependencies {
    pub permission_repository: Arc<dyn PermissionRepository>,
    pub role_repository: Arc<dyn RoleRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct PermissionService {
    deps: PermissionServiceDependencies,
}

impl PermissionService {
    pub fn new(deps: PermissionServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn list(&self) -> Result<Vec<Permission>, ApplicationError> {
        let mut permissions = self.deps.permission_repository.list_all().await?;
        permissions.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(permissions)
    }

    pub async fn get(&self, id: PermissionId) -> Result<Permission, ApplicationError> {
        self.deps
            .permission_repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("permission", id))
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Permission, ApplicationError> {
        let code = PermissionCode::parse(code)?;
        self.deps
            .permission_repository
            .find_by_code(code.as_str())
            .await?
            .ok_or_else(|| ApplicationError::not_found("permission", code))
    }

    pub async fn by_resource(&self, resource: &str) -> Result<Vec<Permission>, ApplicationError> {
        let mut permissions = self
            .deps
            .permission_repository
            .list_by_resource(&resource.trim().to_lowercase())
            .await?;
        permissions.sort_by(|a, b| a.action.cmp(&b.action));
        Ok(permissions)
    }

    pub async fn by_codes(&self, codes: &[String]) -> Result<Vec<Permission>, ApplicationError> {
        let wanted: Vec<PermissionCode> = codes
            .iter()
            .filter_map(|code| PermissionCode::parse(code).ok())
            .collect();
        let permissions = self.deps.permission_repository.list_all().await?;
        Ok(permissions
            .into_iter()
            .filter(|p| wanted.contains(&p.code))
            .collect())
    }

    pub async fn grouped(&self) -> Result<Vec<PermissionGroup>, ApplicationError> {
        let permissions = self.deps.permission_repository.list_all().await?;
        Ok(group_permissions(permissions))
    }

    pub async fn create(&self, draft: PermissionDraft) -> Result<Permission, ApplicationError> {
        let permission = Permission::new(draft, self.deps.clock.now())?;
        self.ensure_code_available(&permission.code, None).await?;

        let stored = self.deps.permission_repository.create(permission).await?;
        tracing::info!(code = %stored.code, "permission created");
        Ok(stored)
    }

    pub async fn update(
        &self,
        id: PermissionId,
        draft: PermissionDraft,
    ) -> Result<Permission, ApplicationError> {
        let mut permission = self.get(id).await?;
        permission.apply(draft, self.deps.clock.now())?;
        self.ensure_code_available(&permission.code, Some(id)).await?;

        Ok(self.deps.permission_repository.update(permission).await?)
    }

    /// 删除权限，同时清理角色和用户上的引用
    pub async fn delete(&self, id: PermissionId) -> Result<(), ApplicationError> {
        let mut permission = self.get(id).await?;

        let roles = self.deps.role_repository.remove_permission(id).await?;
        let users = self.deps.user_repository.remove_custom_permission(id).await?;

        permission.is_deleted = true;
        permission.updated_at = self.deps.clock.now();
        self.deps.permission_repository.update(permission).await?;

        tracing::info!(permission_id = %id, roles, users, "permission deleted");
        Ok(())
    }

    /// 补齐内置权限目录，返回新建数量
    pub async fn initialize_defaults(&self) -> Result<usize, ApplicationError> {
        let mut created = 0;
        for draft in default_permission_catalogue() {
            let code = PermissionCode::new(&draft.resource_name, &draft.action)?;
            if self
                .deps
                .permission_repository
                .find_by_code(code.as_str())
                .await?
                .is_some()
            {
                continue;
            }
            let permission = Permission::new(draft, self.deps.clock.now())?;
            self.deps.permission_repository.create(permission).await?;
            created += 1;
        }
        if created > 0 {
            tracing::info!(created, "default permissions initialized");
        }
        Ok(created)
    }

    async fn ensure_code_available(
        &self,
        code: &PermissionCode,
        current: Option<PermissionId>,
    ) -> Result<(), ApplicationError> {
        match self
            .deps
            .permission_repository
            .find_by_code(code.as_str())
            .await?
        {
            Some(existing) if Some(existing.id) != current => {
                Err(DomainError::resource_already_exists("permission", code.as_str()).into())
            }
            _ => Ok(()),
        }
    }
}
