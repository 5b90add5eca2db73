//! 权限目录
//!
//! 权限代码统一为 `resource:action`，全局唯一。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::DomainResult;
use crate::value_objects::{PermissionCode, PermissionId, Timestamp};

/// 权限实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: PermissionId,
    pub resource_name: String,
    pub resource_title: String,
    pub action: String,
    pub action_title: String,
    pub code: PermissionCode,
    pub description: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing, default)]
    pub is_deleted: bool,
}

/// 新权限的字段集合
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDraft {
    pub resource_name: String,
    pub resource_title: String,
    pub action: String,
    pub action_title: String,
    pub description: Option<String>,
}

impl Permission {
    pub fn new(draft: PermissionDraft, now: Timestamp) -> DomainResult<Self> {
        let code = PermissionCode::new(&draft.resource_name, &draft.action)?;
        Ok(Self {
            id: PermissionId::generate(),
            resource_name: code.resource().to_owned(),
            resource_title: draft.resource_title,
            action: code.action().to_owned(),
            action_title: draft.action_title,
            code,
            description: draft.description,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        })
    }

    /// 覆盖可编辑字段并重新计算权限代码。
    pub fn apply(&mut self, draft: PermissionDraft, now: Timestamp) -> DomainResult<()> {
        let code = PermissionCode::new(&draft.resource_name, &draft.action)?;
        self.resource_name = code.resource().to_owned();
        self.action = code.action().to_owned();
        self.code = code;
        self.resource_title = draft.resource_title;
        self.action_title = draft.action_title;
        self.description = draft.description;
        self.updated_at = now;
        Ok(())
    }
}

/// 按资源分组的权限
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGroup {
    pub resource_name: String,
    pub resource_title: String,
    pub permissions: Vec<Permission>,
}

/// 按资源名分组，组内按动作名排序。
pub fn group_permissions(permissions: Vec<Permission>) -> Vec<PermissionGroup> {
    let mut groups: BTreeMap<String, PermissionGroup> = BTreeMap::new();
    for permission in permissions {
        groups
            .entry(permission.resource_name.clone())
            .or_insert_with(|| PermissionGroup {
                resource_name: permission.resource_name.clone(),
                resource_title: permission.resource_title.clone(),
                permissions: Vec::new(),
            })
            .permissions
            .push(permission);
    }
    groups
        .into_values()
        .map(|mut group| {
            group.permissions.sort_by(|a, b| a.action.cmp(&b.action));
            group
        })
        .collect()
}

const DEFAULT_RESOURCES: [(&str, &str); 8] = [
    ("user", "用户"),
    ("role", "角色"),
    ("menu", "菜单"),
    ("notice", "公告"),
    ("tag", "标签"),
    ("permission", "权限"),
    ("activity-log", "活动日志"),
    ("company", "企业"),
];

const DEFAULT_ACTIONS: [(&str, &str); 4] = [
    ("create", "创建"),
    ("read", "查看"),
    ("update", "修改"),
    ("delete", "删除"),
];

/// 系统内置的权限目录：每个资源的增删改查。
pub fn default_permission_catalogue() -> Vec<PermissionDraft> {
    DEFAULT_RESOURCES
        .iter()
        .flat_map(|(resource, resource_title)| {
            DEFAULT_ACTIONS
                .iter()
                .map(move |(action, action_title)| PermissionDraft {
                    resource_name: (*resource).to_owned(),
                    resource_title: (*resource_title).to_owned(),
                    action: (*action).to_owned(),
                    action_title: (*action_title).to_owned(),
                    description: Some(format!("{resource_title}{action_title}权限")),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn draft(resource: &str, action: &str) -> PermissionDraft {
        PermissionDraft {
            resource_name: resource.into(),
            resource_title: resource.to_uppercase(),
            action: action.into(),
            action_title: action.into(),
            description: None,
        }
    }

    #[test]
    fn apply_recomputes_code() {
        let now = Utc::now();
        let mut permission = Permission::new(draft("user", "read"), now).unwrap();
        permission.apply(draft("Role", "Update"), now).unwrap();
        assert_eq!(permission.code.as_str(), "role:update");
        assert_eq!(permission.resource_name, "role");
    }

    #[test]
    fn groups_are_sorted_by_resource_then_action() {
        let now = Utc::now();
        let permissions = vec![
            Permission::new(draft("user", "update"), now).unwrap(),
            Permission::new(draft("menu", "read"), now).unwrap(),
            Permission::new(draft("user", "create"), now).unwrap(),
        ];
        let groups = group_permissions(permissions);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].resource_name, "menu");
        let actions: Vec<_> = groups[1].permissions.iter().map(|p| p.action.as_str()).collect();
        assert_eq!(actions, ["create", "update"]);
    }

    #[test]
    fn catalogue_covers_crud_for_every_resource() {
        let catalogue = default_permission_catalogue();
        assert_eq!(catalogue.len(), 32);
        assert!(catalogue
            .iter()
            .any(|d| d.resource_name == "activity-log" && d.action == "delete"));
        assert_eq!(catalogue[0].description.as_deref(), Some("用户创建权限"));
    }
}
