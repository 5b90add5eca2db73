//! 仓储抽象
//!
//! 所有查询默认排除已软删除的记录；软删除通过 `update` 写回 `is_deleted = true` 完成。

use async_trait::async_trait;
use domain::{
    AppUser, Company, CompanyId, Menu, MenuId, Page, PageRequest, Permission, PermissionId,
    RepositoryError, Role, RoleId, Timestamp, UserActivityLog, UserCompany, UserId,
};

#[async_trait]
pub trait CompanyRepository: Send + Sync {
    async fn create(&self, company: Company) -> Result<Company, RepositoryError>;
    async fn update(&self, company: Company) -> Result<Company, RepositoryError>;
    async fn find_by_id(&self, id: CompanyId) -> Result<Option<Company>, RepositoryError>;
    async fn find_by_code(&self, code: &str) -> Result<Option<Company>, RepositoryError>;
    async fn list_by_ids(&self, ids: &[CompanyId]) -> Result<Vec<Company>, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: AppUser) -> Result<AppUser, RepositoryError>;
    async fn update(&self, user: AppUser) -> Result<AppUser, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<AppUser>, RepositoryError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<AppUser>, RepositoryError>;
    /// 邮箱比较忽略大小写
    async fn find_by_email(&self, email: &str) -> Result<Option<AppUser>, RepositoryError>;
    async fn list_by_ids(&self, ids: &[UserId]) -> Result<Vec<AppUser>, RepositoryError>;
    /// 从所有用户的自定义权限中移除指定权限，返回受影响的用户数
    async fn remove_custom_permission(
        &self,
        permission_id: PermissionId,
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait UserCompanyRepository: Send + Sync {
    async fn upsert(&self, membership: UserCompany) -> Result<UserCompany, RepositoryError>;
    async fn find(
        &self,
        user_id: UserId,
        company_id: CompanyId,
    ) -> Result<Option<UserCompany>, RepositoryError>;
    async fn list_by_company(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<UserCompany>, RepositoryError>;
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<UserCompany>, RepositoryError>;
    async fn list_by_role(&self, role_id: RoleId) -> Result<Vec<UserCompany>, RepositoryError>;
    async fn remove(&self, user_id: UserId, company_id: CompanyId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn create(&self, role: Role) -> Result<Role, RepositoryError>;
    async fn update(&self, role: Role) -> Result<Role, RepositoryError>;
    async fn find_by_id(&self, id: RoleId) -> Result<Option<Role>, RepositoryError>;
    async fn find_by_name(
        &self,
        company_id: CompanyId,
        name: &str,
    ) -> Result<Option<Role>, RepositoryError>;
    async fn list_by_company(&self, company_id: CompanyId) -> Result<Vec<Role>, RepositoryError>;
    async fn list_by_ids(&self, ids: &[RoleId]) -> Result<Vec<Role>, RepositoryError>;
    /// 从所有角色中移除菜单引用，返回受影响的角色数
    async fn remove_menu(&self, menu_id: MenuId) -> Result<u64, RepositoryError>;
    /// 从所有角色中移除权限引用，返回受影响的角色数
    async fn remove_permission(&self, permission_id: PermissionId)
        -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait PermissionRepository: Send + Sync {
    async fn create(&self, permission: Permission) -> Result<Permission, RepositoryError>;
    async fn update(&self, permission: Permission) -> Result<Permission, RepositoryError>;
    async fn find_by_id(&self, id: PermissionId) -> Result<Option<Permission>, RepositoryError>;
    async fn find_by_code(&self, code: &str) -> Result<Option<Permission>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<Permission>, RepositoryError>;
    async fn list_by_ids(&self, ids: &[PermissionId]) -> Result<Vec<Permission>, RepositoryError>;
    async fn list_by_resource(&self, resource: &str) -> Result<Vec<Permission>, RepositoryError>;
}

#[async_trait]
pub trait MenuRepository: Send + Sync {
    async fn create(&self, menu: Menu) -> Result<Menu, RepositoryError>;
    async fn update(&self, menu: Menu) -> Result<Menu, RepositoryError>;
    async fn find_by_id(&self, id: MenuId) -> Result<Option<Menu>, RepositoryError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Menu>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<Menu>, RepositoryError>;
    async fn list_by_ids(&self, ids: &[MenuId]) -> Result<Vec<Menu>, RepositoryError>;
}

/// 活动日志查询条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityLogFilter {
    pub user_id: Option<UserId>,
    pub action: Option<String>,
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
}

impl ActivityLogFilter {
    pub fn matches(&self, log: &UserActivityLog) -> bool {
        !log.is_deleted
            && self.user_id.map_or(true, |id| log.user_id == Some(id))
            && self.action.as_deref().map_or(true, |action| log.action == action)
            && self.start.map_or(true, |start| log.created_at >= start)
            && self.end.map_or(true, |end| log.created_at <= end)
    }
}

#[async_trait]
pub trait ActivityLogRepository: Send + Sync {
    async fn insert(&self, log: UserActivityLog) -> Result<(), RepositoryError>;
    /// 按创建时间倒序分页
    async fn query(
        &self,
        filter: &ActivityLogFilter,
        page: PageRequest,
    ) -> Result<Page<UserActivityLog>, RepositoryError>;
    async fn list_by_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<UserActivityLog>, RepositoryError>;
    /// 软删除早于指定时间的日志，返回删除条数
    async fn soft_delete_older_than(&self, before: Timestamp) -> Result<u64, RepositoryError>;
}
