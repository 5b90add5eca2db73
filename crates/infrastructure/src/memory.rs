//! 进程内存储
//!
//! 用于本地开发和测试，语义与 Postgres 仓储保持一致：查询排除软删除记录，
//! 唯一约束只作用于未删除的记录。

use std::collections::HashMap;

use application::repository::{
    ActivityLogFilter, ActivityLogRepository, CompanyRepository, MenuRepository,
    PermissionRepository, RoleRepository, UserCompanyRepository, UserRepository,
};
use async_trait::async_trait;
use domain::{
    ActivityLogId, AppUser, Company, CompanyId, Menu, MenuId, Page, PageRequest, Permission,
    PermissionId, RepositoryError, Role, RoleId, Timestamp, UserActivityLog, UserCompany, UserId,
};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    companies: RwLock<HashMap<CompanyId, Company>>,
    users: RwLock<HashMap<UserId, AppUser>>,
    memberships: RwLock<HashMap<(UserId, CompanyId), UserCompany>>,
    roles: RwLock<HashMap<RoleId, Role>>,
    permissions: RwLock<HashMap<PermissionId, Permission>>,
    menus: RwLock<HashMap<MenuId, Menu>>,
    activity_logs: RwLock<HashMap<ActivityLogId, UserActivityLog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_ids<K, V, F>(table: &HashMap<K, V>, ids: &[K], live: F) -> Vec<V>
where
    K: std::hash::Hash + Eq,
    V: Clone,
    F: Fn(&V) -> bool,
{
    ids.iter()
        .filter_map(|id| table.get(id))
        .filter(|value| live(value))
        .cloned()
        .collect()
}

#[async_trait]
impl CompanyRepository for MemoryStore {
    async fn create(&self, company: Company) -> Result<Company, RepositoryError> {
        let mut companies = self.companies.write().await;
        if companies
            .values()
            .any(|c| !c.is_deleted && c.code == company.code)
        {
            return Err(RepositoryError::conflict(format!(
                "company code {} already exists",
                company.code
            )));
        }
        companies.insert(company.id, company.clone());
        Ok(company)
    }

    async fn update(&self, company: Company) -> Result<Company, RepositoryError> {
        let mut companies = self.companies.write().await;
        let slot = companies
            .get_mut(&company.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = company.clone();
        Ok(company)
    }

    async fn find_by_id(&self, id: CompanyId) -> Result<Option<Company>, RepositoryError> {
        Ok(self
            .companies
            .read()
            .await
            .get(&id)
            .filter(|c| !c.is_deleted)
            .cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Company>, RepositoryError> {
        Ok(self
            .companies
            .read()
            .await
            .values()
            .find(|c| !c.is_deleted && c.code == code)
            .cloned())
    }

    async fn list_by_ids(&self, ids: &[CompanyId]) -> Result<Vec<Company>, RepositoryError> {
        Ok(by_ids(&*self.companies.read().await, ids, |c| !c.is_deleted))
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: AppUser) -> Result<AppUser, RepositoryError> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| !u.is_deleted && u.username == user.username)
        {
            return Err(RepositoryError::conflict(format!(
                "username {} already exists",
                user.username
            )));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, user: AppUser) -> Result<AppUser, RepositoryError> {
        let mut users = self.users.write().await;
        let slot = users.get_mut(&user.id).ok_or(RepositoryError::NotFound)?;
        *slot = user.clone();
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<AppUser>, RepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .get(&id)
            .filter(|u| !u.is_deleted)
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<AppUser>, RepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| !u.is_deleted && u.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AppUser>, RepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| {
                !u.is_deleted
                    && u
                        .email
                        .as_deref()
                        .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .cloned())
    }

    async fn list_by_ids(&self, ids: &[UserId]) -> Result<Vec<AppUser>, RepositoryError> {
        Ok(by_ids(&*self.users.read().await, ids, |u| !u.is_deleted))
    }

    async fn remove_custom_permission(
        &self,
        permission_id: PermissionId,
    ) -> Result<u64, RepositoryError> {
        let mut affected = 0;
        for user in self.users.write().await.values_mut() {
            let before = user.custom_permission_ids.len();
            user.custom_permission_ids.retain(|id| *id != permission_id);
            if user.custom_permission_ids.len() != before {
                affected += 1;
            }
        }
        Ok(affected)
    }
}

#[async_trait]
impl UserCompanyRepository for MemoryStore {
    async fn upsert(&self, membership: UserCompany) -> Result<UserCompany, RepositoryError> {
        self.memberships
            .write()
            .await
            .insert((membership.user_id, membership.company_id), membership.clone());
        Ok(membership)
    }

    async fn find(
        &self,
        user_id: UserId,
        company_id: CompanyId,
    ) -> Result<Option<UserCompany>, RepositoryError> {
        Ok(self
            .memberships
            .read()
            .await
            .get(&(user_id, company_id))
            .cloned())
    }

    async fn list_by_company(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<UserCompany>, RepositoryError> {
        Ok(self
            .memberships
            .read()
            .await
            .values()
            .filter(|m| m.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<UserCompany>, RepositoryError> {
        let mut memberships: Vec<UserCompany> = self
            .memberships
            .read()
            .await
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        memberships.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(memberships)
    }

    async fn list_by_role(&self, role_id: RoleId) -> Result<Vec<UserCompany>, RepositoryError> {
        Ok(self
            .memberships
            .read()
            .await
            .values()
            .filter(|m| m.role_ids.contains(&role_id))
            .cloned()
            .collect())
    }

    async fn remove(&self, user_id: UserId, company_id: CompanyId) -> Result<(), RepositoryError> {
        self.memberships
            .write()
            .await
            .remove(&(user_id, company_id));
        Ok(())
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn create(&self, role: Role) -> Result<Role, RepositoryError> {
        let mut roles = self.roles.write().await;
        if roles
            .values()
            .any(|r| !r.is_deleted && r.company_id == role.company_id && r.name == role.name)
        {
            return Err(RepositoryError::conflict(format!(
                "role {} already exists",
                role.name
            )));
        }
        roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn update(&self, role: Role) -> Result<Role, RepositoryError> {
        let mut roles = self.roles.write().await;
        let slot = roles.get_mut(&role.id).ok_or(RepositoryError::NotFound)?;
        *slot = role.clone();
        Ok(role)
    }

    async fn find_by_id(&self, id: RoleId) -> Result<Option<Role>, RepositoryError> {
        Ok(self
            .roles
            .read()
            .await
            .get(&id)
            .filter(|r| !r.is_deleted)
            .cloned())
    }

    async fn find_by_name(
        &self,
        company_id: CompanyId,
        name: &str,
    ) -> Result<Option<Role>, RepositoryError> {
        Ok(self
            .roles
            .read()
            .await
            .values()
            .find(|r| !r.is_deleted && r.company_id == company_id && r.name == name)
            .cloned())
    }

    async fn list_by_company(&self, company_id: CompanyId) -> Result<Vec<Role>, RepositoryError> {
        Ok(self
            .roles
            .read()
            .await
            .values()
            .filter(|r| !r.is_deleted && r.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn list_by_ids(&self, ids: &[RoleId]) -> Result<Vec<Role>, RepositoryError> {
        Ok(by_ids(&*self.roles.read().await, ids, |r| !r.is_deleted))
    }

    async fn remove_menu(&self, menu_id: MenuId) -> Result<u64, RepositoryError> {
        let mut affected = 0;
        for role in self.roles.write().await.values_mut() {
            let before = role.menu_ids.len();
            role.menu_ids.retain(|id| *id != menu_id);
            if role.menu_ids.len() != before {
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn remove_permission(
        &self,
        permission_id: PermissionId,
    ) -> Result<u64, RepositoryError> {
        let mut affected = 0;
        for role in self.roles.write().await.values_mut() {
            let before = role.permission_ids.len();
            role.permission_ids.retain(|id| *id != permission_id);
            if role.permission_ids.len() != before {
                affected += 1;
            }
        }
        Ok(affected)
    }
}

#[async_trait]
impl PermissionRepository for MemoryStore {
    async fn create(&self, permission: Permission) -> Result<Permission, RepositoryError> {
        let mut permissions = self.permissions.write().await;
        if permissions
            .values()
            .any(|p| !p.is_deleted && p.code == permission.code)
        {
            return Err(RepositoryError::conflict(format!(
                "permission {} already exists",
                permission.code
            )));
        }
        permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn update(&self, permission: Permission) -> Result<Permission, RepositoryError> {
        let mut permissions = self.permissions.write().await;
        let slot = permissions
            .get_mut(&permission.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = permission.clone();
        Ok(permission)
    }

    async fn find_by_id(&self, id: PermissionId) -> Result<Option<Permission>, RepositoryError> {
        Ok(self
            .permissions
            .read()
            .await
            .get(&id)
            .filter(|p| !p.is_deleted)
            .cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Permission>, RepositoryError> {
        Ok(self
            .permissions
            .read()
            .await
            .values()
            .find(|p| !p.is_deleted && p.code.as_str() == code)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<Permission>, RepositoryError> {
        let mut permissions: Vec<Permission> = self
            .permissions
            .read()
            .await
            .values()
            .filter(|p| !p.is_deleted)
            .cloned()
            .collect();
        permissions.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(permissions)
    }

    async fn list_by_ids(&self, ids: &[PermissionId]) -> Result<Vec<Permission>, RepositoryError> {
        Ok(by_ids(&*self.permissions.read().await, ids, |p| {
            !p.is_deleted
        }))
    }

    async fn list_by_resource(&self, resource: &str) -> Result<Vec<Permission>, RepositoryError> {
        let resource = resource.to_lowercase();
        let mut permissions: Vec<Permission> = self
            .permissions
            .read()
            .await
            .values()
            .filter(|p| !p.is_deleted && p.resource_name == resource)
            .cloned()
            .collect();
        permissions.sort_by(|a, b| a.action.cmp(&b.action));
        Ok(permissions)
    }
}

#[async_trait]
impl MenuRepository for MemoryStore {
    async fn create(&self, menu: Menu) -> Result<Menu, RepositoryError> {
        let mut menus = self.menus.write().await;
        if menus.values().any(|m| !m.is_deleted && m.name == menu.name) {
            return Err(RepositoryError::conflict(format!(
                "menu {} already exists",
                menu.name
            )));
        }
        menus.insert(menu.id, menu.clone());
        Ok(menu)
    }

    async fn update(&self, menu: Menu) -> Result<Menu, RepositoryError> {
        let mut menus = self.menus.write().await;
        let slot = menus.get_mut(&menu.id).ok_or(RepositoryError::NotFound)?;
        *slot = menu.clone();
        Ok(menu)
    }

    async fn find_by_id(&self, id: MenuId) -> Result<Option<Menu>, RepositoryError> {
        Ok(self
            .menus
            .read()
            .await
            .get(&id)
            .filter(|m| !m.is_deleted)
            .cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Menu>, RepositoryError> {
        Ok(self
            .menus
            .read()
            .await
            .values()
            .find(|m| !m.is_deleted && m.name == name)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<Menu>, RepositoryError> {
        let mut menus: Vec<Menu> = self
            .menus
            .read()
            .await
            .values()
            .filter(|m| !m.is_deleted)
            .cloned()
            .collect();
        menus.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
        Ok(menus)
    }

    async fn list_by_ids(&self, ids: &[MenuId]) -> Result<Vec<Menu>, RepositoryError> {
        Ok(by_ids(&*self.menus.read().await, ids, |m| !m.is_deleted))
    }
}

#[async_trait]
impl ActivityLogRepository for MemoryStore {
    async fn insert(&self, log: UserActivityLog) -> Result<(), RepositoryError> {
        self.activity_logs.write().await.insert(log.id, log);
        Ok(())
    }

    async fn query(
        &self,
        filter: &ActivityLogFilter,
        page: PageRequest,
    ) -> Result<Page<UserActivityLog>, RepositoryError> {
        let mut logs: Vec<UserActivityLog> = self
            .activity_logs
            .read()
            .await
            .values()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::slice(logs, page))
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<UserActivityLog>, RepositoryError> {
        let mut logs: Vec<UserActivityLog> = self
            .activity_logs
            .read()
            .await
            .values()
            .filter(|log| !log.is_deleted && log.user_id == Some(user_id))
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        logs.truncate(limit as usize);
        Ok(logs)
    }

    async fn soft_delete_older_than(&self, before: Timestamp) -> Result<u64, RepositoryError> {
        let mut affected = 0;
        for log in self.activity_logs.write().await.values_mut() {
            if !log.is_deleted && log.created_at < before {
                log.is_deleted = true;
                affected += 1;
            }
        }
        Ok(affected)
    }
}
