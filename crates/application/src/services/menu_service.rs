use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use domain::{build_menu_tree, DomainError, Menu, MenuDraft, MenuId, MenuTreeNode};

use crate::{
    access::{RoleResolver, Subject},
    clock::Clock,
    error::ApplicationError,
    repository::{MenuRepository, RoleRepository, UserCompanyRepository, UserRepository},
};

pub struct MenuServiceDependencies {
    pub menu_repository: Arc<dyn MenuRepository>,
    pub role_repository: Arc<dyn RoleRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub membership_repository: Arc<dyn UserCompanyRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct MenuService {
    deps: MenuServiceDependencies,
    resolver: RoleResolver,
}

impl MenuService {
    pub fn new(deps: MenuServiceDependencies) -> Self {
        let resolver = RoleResolver {
            user_repository: Arc::clone(&deps.user_repository),
            membership_repository: Arc::clone(&deps.membership_repository),
            role_repository: Arc::clone(&deps.role_repository),
        };
        Self { deps, resolver }
    }

    pub async fn list(&self) -> Result<Vec<Menu>, ApplicationError> {
        let mut menus = self.deps.menu_repository.list_all().await?;
        menus.sort_by_key(|menu| (menu.parent_id, menu.sort_order));
        Ok(menus)
    }

    pub async fn tree(&self) -> Result<Vec<MenuTreeNode>, ApplicationError> {
        let menus = self.deps.menu_repository.list_all().await?;
        Ok(build_menu_tree(&menus, None))
    }

    /// 当前用户可见的菜单树：角色授予的启用菜单及其所有祖先菜单
    pub async fn user_menus(&self, subject: &Subject) -> Result<Vec<MenuTreeNode>, ApplicationError> {
        let grants = self.resolver.grants(subject).await?;
        let all_menus = self.deps.menu_repository.list_all().await?;
        let enabled: Vec<Menu> = all_menus.into_iter().filter(|m| m.is_enabled).collect();

        if grants.is_super_admin() {
            return Ok(build_menu_tree(&enabled, None));
        }

        let by_id: HashMap<MenuId, &Menu> = enabled.iter().map(|m| (m.id, m)).collect();
        let mut visible: HashSet<MenuId> = HashSet::new();
        for menu_id in grants.menu_ids() {
            let mut cursor = by_id.get(&menu_id).copied();
            while let Some(menu) = cursor {
                if !visible.insert(menu.id) {
                    break;
                }
                cursor = menu.parent_id.and_then(|parent| by_id.get(&parent).copied());
            }
        }

        let menus: Vec<Menu> = enabled
            .into_iter()
            .filter(|menu| visible.contains(&menu.id))
            .collect();
        Ok(build_menu_tree(&menus, None))
    }

    pub async fn get(&self, id: MenuId) -> Result<Menu, ApplicationError> {
        self.deps
            .menu_repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("menu", id))
    }

    pub async fn create(&self, draft: MenuDraft) -> Result<Menu, ApplicationError> {
        let menu = Menu::new(draft, self.deps.clock.now())?;
        self.ensure_name_available(&menu.name, None).await?;
        if let Some(parent_id) = menu.parent_id {
            self.get(parent_id).await?;
        }

        let stored = self.deps.menu_repository.create(menu).await?;
        tracing::info!(menu = %stored.name, "menu created");
        Ok(stored)
    }

    pub async fn update(&self, id: MenuId, draft: MenuDraft) -> Result<Menu, ApplicationError> {
        let mut menu = self.get(id).await?;
        menu.apply(draft, self.deps.clock.now())?;
        self.ensure_name_available(&menu.name, Some(id)).await?;
        if let Some(parent_id) = menu.parent_id {
            self.ensure_not_descendant(id, parent_id).await?;
        }

        Ok(self.deps.menu_repository.update(menu).await?)
    }

    /// 删除菜单；存在未删除的子菜单时拒绝
    pub async fn delete(&self, id: MenuId) -> Result<(), ApplicationError> {
        let mut menu = self.get(id).await?;
        let has_children = self
            .deps
            .menu_repository
            .list_all()
            .await?
            .iter()
            .any(|m| m.parent_id == Some(id));
        if has_children {
            return Err(ApplicationError::invalid_operation(
                "不能删除有子菜单的菜单，请先删除子菜单",
            ));
        }

        let roles = self.deps.role_repository.remove_menu(id).await?;
        menu.is_deleted = true;
        menu.updated_at = self.deps.clock.now();
        self.deps.menu_repository.update(menu).await?;

        tracing::info!(menu_id = %id, roles, "menu deleted");
        Ok(())
    }

    /// 按给定顺序重排菜单，`sort_order` 取列表下标。
    ///
    /// 任一菜单不存在或重复出现时不做任何修改。
    pub async fn reorder(&self, menu_ids: &[MenuId]) -> Result<(), ApplicationError> {
        let mut seen = HashSet::new();
        if let Some(duplicate) = menu_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(ApplicationError::invalid_argument(format!(
                "菜单 {duplicate} 重复出现"
            )));
        }
        let mut menus = self.deps.menu_repository.list_by_ids(menu_ids).await?;
        if let Some(missing) = menu_ids
            .iter()
            .find(|id| !menus.iter().any(|menu| menu.id == **id))
        {
            return Err(ApplicationError::not_found("menu", missing));
        }

        let now = self.deps.clock.now();
        for menu in &mut menus {
            if let Some(index) = menu_ids.iter().position(|id| *id == menu.id) {
                menu.sort_order = index as i32;
                menu.updated_at = now;
            }
        }
        for menu in menus {
            self.deps.menu_repository.update(menu).await?;
        }
        Ok(())
    }

    async fn ensure_name_available(
        &self,
        name: &str,
        current: Option<MenuId>,
    ) -> Result<(), ApplicationError> {
        match self.deps.menu_repository.find_by_name(name).await? {
            Some(existing) if Some(existing.id) != current => {
                Err(DomainError::resource_already_exists("menu", name).into())
            }
            _ => Ok(()),
        }
    }

    /// 新父菜单不能是当前菜单的后代，避免形成环
    async fn ensure_not_descendant(
        &self,
        id: MenuId,
        parent_id: MenuId,
    ) -> Result<(), ApplicationError> {
        let menus = self.deps.menu_repository.list_all().await?;
        let parents: HashMap<MenuId, Option<MenuId>> =
            menus.iter().map(|m| (m.id, m.parent_id)).collect();
        if !parents.contains_key(&parent_id) {
            return Err(ApplicationError::not_found("menu", parent_id));
        }

        let mut cursor = Some(parent_id);
        let mut steps = 0;
        while let Some(current) = cursor {
            if current == id {
                return Err(DomainError::validation_error(
                    "parentId",
                    "父菜单不能是当前菜单的子菜单",
                )
                .into());
            }
            steps += 1;
            if steps > parents.len() {
                break;
            }
            cursor = parents.get(&current).copied().flatten();
        }
        Ok(())
    }
}
