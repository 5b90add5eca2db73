//! 企业内角色定义

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{CompanyId, MenuId, PermissionId, RoleId, Timestamp};

/// 超级管理员角色名，拥有该角色的用户跳过所有权限检查。
pub const SUPER_ADMIN_ROLE: &str = "admin";

/// 受保护的角色名，不允许删除。
pub const PROTECTED_ROLE_NAMES: [&str; 2] = [SUPER_ADMIN_ROLE, "系统管理员"];

/// 角色实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: RoleId,
    pub company_id: CompanyId,
    pub name: String,
    pub description: Option<String>,
    pub menu_ids: Vec<MenuId>,
    pub permission_ids: Vec<PermissionId>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing, default)]
    pub is_deleted: bool,
}

impl Role {
    pub fn new(
        company_id: CompanyId,
        name: impl Into<String>,
        description: Option<String>,
        now: Timestamp,
    ) -> DomainResult<Self> {
        let name = name.into().trim().to_owned();
        Self::validate_name(&name)?;
        Ok(Self {
            id: RoleId::generate(),
            company_id,
            name,
            description,
            menu_ids: Vec::new(),
            permission_ids: Vec::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        })
    }

    pub fn validate_name(name: &str) -> DomainResult<()> {
        if name.is_empty() {
            return Err(DomainError::validation_error("name", "角色名称不能为空"));
        }
        if name.chars().count() > 50 {
            return Err(DomainError::validation_error(
                "name",
                "角色名称不能超过50个字符",
            ));
        }
        Ok(())
    }

    pub fn is_super_admin(&self) -> bool {
        self.name == SUPER_ADMIN_ROLE
    }

    pub fn is_protected(&self) -> bool {
        PROTECTED_ROLE_NAMES.contains(&self.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn admin_role_is_protected_super_admin() {
        let role = Role::new(CompanyId::generate(), "admin", None, Utc::now()).unwrap();
        assert!(role.is_super_admin());
        assert!(role.is_protected());

        let editor = Role::new(CompanyId::generate(), "editor", None, Utc::now()).unwrap();
        assert!(!editor.is_super_admin());
        assert!(!editor.is_protected());
    }

    #[test]
    fn blank_role_name_is_rejected() {
        assert!(Role::new(CompanyId::generate(), "   ", None, Utc::now()).is_err());
    }
}
