//! 菜单实体与菜单树

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{MenuId, Timestamp};

/// 角色菜单为空时兜底分配的菜单名
pub const WELCOME_MENU: &str = "welcome";

/// 菜单实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Menu {
    pub id: MenuId,
    /// 菜单名（唯一，供 RequireMenu 检查使用）
    pub name: String,
    pub title: String,
    pub path: String,
    pub component: Option<String>,
    pub icon: Option<String>,
    pub sort_order: i32,
    pub is_enabled: bool,
    pub is_external: bool,
    pub open_in_new_tab: bool,
    pub hide_in_menu: bool,
    pub parent_id: Option<MenuId>,
    pub permissions: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing, default)]
    pub is_deleted: bool,
}

/// 创建或更新菜单时的可编辑字段
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuDraft {
    pub name: String,
    pub title: String,
    pub path: String,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "enabled_by_default")]
    pub is_enabled: bool,
    #[serde(default)]
    pub is_external: bool,
    #[serde(default)]
    pub open_in_new_tab: bool,
    #[serde(default)]
    pub hide_in_menu: bool,
    #[serde(default)]
    pub parent_id: Option<MenuId>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

fn enabled_by_default() -> bool {
    true
}

impl Menu {
    pub fn new(draft: MenuDraft, now: Timestamp) -> DomainResult<Self> {
        Self::validate(&draft)?;
        Ok(Self {
            id: MenuId::generate(),
            name: draft.name.trim().to_owned(),
            title: draft.title,
            path: draft.path,
            component: draft.component,
            icon: draft.icon,
            sort_order: draft.sort_order,
            is_enabled: draft.is_enabled,
            is_external: draft.is_external,
            open_in_new_tab: draft.open_in_new_tab,
            hide_in_menu: draft.hide_in_menu,
            parent_id: draft.parent_id,
            permissions: draft.permissions,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        })
    }

    pub fn apply(&mut self, draft: MenuDraft, now: Timestamp) -> DomainResult<()> {
        Self::validate(&draft)?;
        if draft.parent_id == Some(self.id) {
            return Err(DomainError::validation_error(
                "parentId",
                "菜单不能以自身为父菜单",
            ));
        }
        self.name = draft.name.trim().to_owned();
        self.title = draft.title;
        self.path = draft.path;
        self.component = draft.component;
        self.icon = draft.icon;
        self.sort_order = draft.sort_order;
        self.is_enabled = draft.is_enabled;
        self.is_external = draft.is_external;
        self.open_in_new_tab = draft.open_in_new_tab;
        self.hide_in_menu = draft.hide_in_menu;
        self.parent_id = draft.parent_id;
        self.permissions = draft.permissions;
        self.updated_at = now;
        Ok(())
    }

    fn validate(draft: &MenuDraft) -> DomainResult<()> {
        if draft.name.trim().is_empty() {
            return Err(DomainError::validation_error("name", "菜单名称不能为空"));
        }
        if draft.title.trim().is_empty() {
            return Err(DomainError::validation_error("title", "菜单标题不能为空"));
        }
        Ok(())
    }
}

/// 菜单树节点
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuTreeNode {
    #[serde(flatten)]
    pub menu: Menu,
    pub children: Vec<MenuTreeNode>,
}

/// 从扁平菜单列表构建以 `parent` 为根的有序森林。
///
/// 每一层按 `sort_order` 升序排列；父菜单不在列表中的节点不会出现在结果里。
pub fn build_menu_tree(menus: &[Menu], parent: Option<MenuId>) -> Vec<MenuTreeNode> {
    let mut by_parent: HashMap<Option<MenuId>, Vec<&Menu>> = HashMap::new();
    for menu in menus {
        by_parent.entry(menu.parent_id).or_default().push(menu);
    }
    build_level(&by_parent, parent)
}

fn build_level(
    by_parent: &HashMap<Option<MenuId>, Vec<&Menu>>,
    parent: Option<MenuId>,
) -> Vec<MenuTreeNode> {
    let Some(children) = by_parent.get(&parent) else {
        return Vec::new();
    };
    let mut children = children.clone();
    children.sort_by_key(|menu| (menu.sort_order, menu.name.clone()));
    children
        .into_iter()
        .map(|menu| MenuTreeNode {
            menu: menu.clone(),
            children: build_level(by_parent, Some(menu.id)),
        })
        .collect()
}

/// 内置菜单种子：(名称, 标题, 路径, 图标, 排序, 父菜单名)
pub const DEFAULT_MENUS: [(&str, &str, &str, &str, i32, Option<&str>); 8] = [
    (WELCOME_MENU, "欢迎", "/welcome", "smile", 0, None),
    ("system", "系统管理", "/system", "setting", 1, None),
    ("user-management", "用户管理", "/system/user-management", "user", 0, Some("system")),
    ("role-management", "角色管理", "/system/role-management", "team", 1, Some("system")),
    ("menu-management", "菜单管理", "/system/menu-management", "menu", 2, Some("system")),
    ("permission-management", "权限管理", "/system/permission-management", "safety", 3, Some("system")),
    ("user-log", "用户日志", "/system/user-log", "file-text", 4, Some("system")),
    ("company-settings", "企业设置", "/system/company-settings", "bank", 5, Some("system")),
];

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn menu(name: &str, sort_order: i32, parent_id: Option<MenuId>) -> Menu {
        Menu::new(
            MenuDraft {
                name: name.into(),
                title: name.into(),
                path: format!("/{name}"),
                component: None,
                icon: None,
                sort_order,
                is_enabled: true,
                is_external: false,
                open_in_new_tab: false,
                hide_in_menu: false,
                parent_id,
                permissions: Vec::new(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn tree_is_ordered_at_every_level() {
        let system = menu("system", 1, None);
        let welcome = menu("welcome", 0, None);
        let roles = menu("roles", 2, Some(system.id));
        let users = menu("users", 1, Some(system.id));
        let tree = build_menu_tree(&[system.clone(), roles, welcome, users], None);

        let top: Vec<_> = tree.iter().map(|n| n.menu.name.as_str()).collect();
        assert_eq!(top, ["welcome", "system"]);
        let children: Vec<_> = tree[1].children.iter().map(|n| n.menu.name.as_str()).collect();
        assert_eq!(children, ["users", "roles"]);
    }

    #[test]
    fn menu_cannot_be_its_own_parent() {
        let mut m = menu("system", 0, None);
        let mut draft_parent = menu("system", 0, None);
        draft_parent.parent_id = Some(m.id);
        let draft = MenuDraft {
            name: draft_parent.name,
            title: draft_parent.title,
            path: draft_parent.path,
            component: None,
            icon: None,
            sort_order: 0,
            is_enabled: true,
            is_external: false,
            open_in_new_tab: false,
            hide_in_menu: false,
            parent_id: draft_parent.parent_id,
            permissions: Vec::new(),
        };
        assert!(m.apply(draft, Utc::now()).is_err());
    }
}
