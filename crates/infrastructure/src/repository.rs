use std::sync::Arc;
use std::time::Duration;

use application::repository::{
    ActivityLogFilter, ActivityLogRepository, CompanyRepository, MenuRepository,
    PermissionRepository, RoleRepository, UserCompanyRepository, UserRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ActivityLogId, AppUser, Company, CompanyId, MembershipStatus, Menu, MenuId, Page, PageRequest,
    Permission, PermissionCode, PermissionId, RepositoryError, Role, RoleId, Timestamp,
    UserActivityLog, UserCompany, UserId,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return RepositoryError::conflict(db_err.message().to_owned());
        }
    }
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    ids.iter().map(|id| (*id).into()).collect()
}

fn ids<T: From<Uuid>>(values: Vec<Uuid>) -> Vec<T> {
    values.into_iter().map(T::from).collect()
}

#[derive(Debug, FromRow)]
struct CompanyRecord {
    id: Uuid,
    name: String,
    code: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    is_deleted: bool,
}

impl From<CompanyRecord> for Company {
    fn from(value: CompanyRecord) -> Self {
        Company {
            id: CompanyId::from(value.id),
            name: value.name,
            code: value.code,
            description: value.description,
            is_active: value.is_active,
            created_at: value.created_at,
            updated_at: value.updated_at,
            is_deleted: value.is_deleted,
        }
    }
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: Option<String>,
    password_hash: String,
    display_name: Option<String>,
    is_active: bool,
    current_company_id: Option<Uuid>,
    custom_permission_ids: Vec<Uuid>,
    last_login_at: Option<DateTime<Utc>>,
    is_system_admin: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    is_deleted: bool,
}

impl From<UserRecord> for AppUser {
    fn from(value: UserRecord) -> Self {
        AppUser {
            id: UserId::from(value.id),
            username: value.username,
            email: value.email,
            password_hash: value.password_hash,
            display_name: value.display_name,
            is_active: value.is_active,
            current_company_id: value.current_company_id.map(CompanyId::from),
            custom_permission_ids: ids(value.custom_permission_ids),
            last_login_at: value.last_login_at,
            is_system_admin: value.is_system_admin,
            created_at: value.created_at,
            updated_at: value.updated_at,
            is_deleted: value.is_deleted,
        }
    }
}

#[derive(Debug, FromRow)]
struct MembershipRecord {
    user_id: Uuid,
    company_id: Uuid,
    role_ids: Vec<Uuid>,
    is_admin: bool,
    status: String,
    joined_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MembershipRecord> for UserCompany {
    type Error = RepositoryError;

    fn try_from(value: MembershipRecord) -> Result<Self, Self::Error> {
        let status = MembershipStatus::parse(&value.status)
            .ok_or_else(|| invalid_data(format!("unknown membership status {}", value.status)))?;
        Ok(UserCompany {
            user_id: UserId::from(value.user_id),
            company_id: CompanyId::from(value.company_id),
            role_ids: ids(value.role_ids),
            is_admin: value.is_admin,
            status,
            joined_at: value.joined_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RoleRecord {
    id: Uuid,
    company_id: Uuid,
    name: String,
    description: Option<String>,
    menu_ids: Vec<Uuid>,
    permission_ids: Vec<Uuid>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    is_deleted: bool,
}

impl From<RoleRecord> for Role {
    fn from(value: RoleRecord) -> Self {
        Role {
            id: RoleId::from(value.id),
            company_id: CompanyId::from(value.company_id),
            name: value.name,
            description: value.description,
            menu_ids: ids(value.menu_ids),
            permission_ids: ids(value.permission_ids),
            is_active: value.is_active,
            created_at: value.created_at,
            updated_at: value.updated_at,
            is_deleted: value.is_deleted,
        }
    }
}

#[derive(Debug, FromRow)]
struct PermissionRecord {
    id: Uuid,
    resource_name: String,
    resource_title: String,
    action: String,
    action_title: String,
    code: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    is_deleted: bool,
}

impl TryFrom<PermissionRecord> for Permission {
    type Error = RepositoryError;

    fn try_from(value: PermissionRecord) -> Result<Self, Self::Error> {
        let code = PermissionCode::parse(&value.code).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Permission {
            id: PermissionId::from(value.id),
            resource_name: value.resource_name,
            resource_title: value.resource_title,
            action: value.action,
            action_title: value.action_title,
            code,
            description: value.description,
            created_at: value.created_at,
            updated_at: value.updated_at,
            is_deleted: value.is_deleted,
        })
    }
}

#[derive(Debug, FromRow)]
struct MenuRecord {
    id: Uuid,
    name: String,
    title: String,
    path: String,
    component: Option<String>,
    icon: Option<String>,
    sort_order: i32,
    is_enabled: bool,
    is_external: bool,
    open_in_new_tab: bool,
    hide_in_menu: bool,
    parent_id: Option<Uuid>,
    permissions: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    is_deleted: bool,
}

impl From<MenuRecord> for Menu {
    fn from(value: MenuRecord) -> Self {
        Menu {
            id: MenuId::from(value.id),
            name: value.name,
            title: value.title,
            path: value.path,
            component: value.component,
            icon: value.icon,
            sort_order: value.sort_order,
            is_enabled: value.is_enabled,
            is_external: value.is_external,
            open_in_new_tab: value.open_in_new_tab,
            hide_in_menu: value.hide_in_menu,
            parent_id: value.parent_id.map(MenuId::from),
            permissions: value.permissions,
            created_at: value.created_at,
            updated_at: value.updated_at,
            is_deleted: value.is_deleted,
        }
    }
}

#[derive(Debug, FromRow)]
struct ActivityLogRecord {
    id: Uuid,
    user_id: Option<Uuid>,
    username: String,
    action: String,
    description: String,
    http_method: String,
    path: String,
    query_string: Option<String>,
    status_code: i32,
    duration_ms: i64,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    is_deleted: bool,
}

impl TryFrom<ActivityLogRecord> for UserActivityLog {
    type Error = RepositoryError;

    fn try_from(value: ActivityLogRecord) -> Result<Self, Self::Error> {
        let status_code = u16::try_from(value.status_code)
            .map_err(|_| invalid_data(format!("invalid status code {}", value.status_code)))?;
        Ok(UserActivityLog {
            id: ActivityLogId::from(value.id),
            user_id: value.user_id.map(UserId::from),
            username: value.username,
            action: value.action,
            description: value.description,
            http_method: value.http_method,
            path: value.path,
            query_string: value.query_string,
            status_code,
            duration_ms: u64::try_from(value.duration_ms).unwrap_or_default(),
            ip_address: value.ip_address,
            user_agent: value.user_agent,
            created_at: value.created_at,
            is_deleted: value.is_deleted,
        })
    }
}

const COMPANY_COLUMNS: &str =
    "id, name, code, description, is_active, created_at, updated_at, is_deleted";
const USER_COLUMNS: &str = "id, username, email, password_hash, display_name, is_active, current_company_id, custom_permission_ids, last_login_at, is_system_admin, created_at, updated_at, is_deleted";
const MEMBERSHIP_COLUMNS: &str =
    "user_id, company_id, role_ids, is_admin, status, joined_at, updated_at";
const ROLE_COLUMNS: &str = "id, company_id, name, description, menu_ids, permission_ids, is_active, created_at, updated_at, is_deleted";
const PERMISSION_COLUMNS: &str = "id, resource_name, resource_title, action, action_title, code, description, created_at, updated_at, is_deleted";
const MENU_COLUMNS: &str = "id, name, title, path, component, icon, sort_order, is_enabled, is_external, open_in_new_tab, hide_in_menu, parent_id, permissions, created_at, updated_at, is_deleted";
const ACTIVITY_LOG_COLUMNS: &str = "id, user_id, username, action, description, http_method, path, query_string, status_code, duration_ms, ip_address, user_agent, created_at, is_deleted";

#[derive(Clone)]
pub struct PgCompanyRepository {
    pool: PgPool,
}

impl PgCompanyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CompanyRepository for PgCompanyRepository {
    async fn create(&self, company: Company) -> Result<Company, RepositoryError> {
        let record = sqlx::query_as::<_, CompanyRecord>(&format!(
            r#"
            INSERT INTO companies ({COMPANY_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {COMPANY_COLUMNS}
            "#
        ))
        .bind(Uuid::from(company.id))
        .bind(&company.name)
        .bind(&company.code)
        .bind(&company.description)
        .bind(company.is_active)
        .bind(company.created_at)
        .bind(company.updated_at)
        .bind(company.is_deleted)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.into())
    }

    async fn update(&self, company: Company) -> Result<Company, RepositoryError> {
        let record = sqlx::query_as::<_, CompanyRecord>(&format!(
            r#"
            UPDATE companies
            SET name = $2, code = $3, description = $4, is_active = $5, updated_at = $6, is_deleted = $7
            WHERE id = $1
            RETURNING {COMPANY_COLUMNS}
            "#
        ))
        .bind(Uuid::from(company.id))
        .bind(&company.name)
        .bind(&company.code)
        .bind(&company.description)
        .bind(company.is_active)
        .bind(company.updated_at)
        .bind(company.is_deleted)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        Ok(record.into())
    }

    async fn find_by_id(&self, id: CompanyId) -> Result<Option<Company>, RepositoryError> {
        let record = sqlx::query_as::<_, CompanyRecord>(&format!(
            "SELECT {COMPANY_COLUMNS} FROM companies WHERE id = $1 AND NOT is_deleted"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Company::from))
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Company>, RepositoryError> {
        let record = sqlx::query_as::<_, CompanyRecord>(&format!(
            "SELECT {COMPANY_COLUMNS} FROM companies WHERE code = $1 AND NOT is_deleted"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Company::from))
    }

    async fn list_by_ids(&self, ids: &[CompanyId]) -> Result<Vec<Company>, RepositoryError> {
        let records = sqlx::query_as::<_, CompanyRecord>(&format!(
            "SELECT {COMPANY_COLUMNS} FROM companies WHERE id = ANY($1) AND NOT is_deleted ORDER BY created_at"
        ))
        .bind(uuids(ids))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Company::from).collect())
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: AppUser) -> Result<AppUser, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            INSERT INTO app_users ({USER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::from(user.id))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(user.is_active)
        .bind(user.current_company_id.map(Uuid::from))
        .bind(uuids(&user.custom_permission_ids))
        .bind(user.last_login_at)
        .bind(user.is_system_admin)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.is_deleted)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.into())
    }

    async fn update(&self, user: AppUser) -> Result<AppUser, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            UPDATE app_users
            SET username = $2, email = $3, password_hash = $4, display_name = $5, is_active = $6,
                current_company_id = $7, custom_permission_ids = $8, last_login_at = $9,
                updated_at = $10, is_deleted = $11, is_system_admin = $12
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::from(user.id))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(user.is_active)
        .bind(user.current_company_id.map(Uuid::from))
        .bind(uuids(&user.custom_permission_ids))
        .bind(user.last_login_at)
        .bind(user.updated_at)
        .bind(user.is_deleted)
        .bind(user.is_system_admin)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        Ok(record.into())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<AppUser>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM app_users WHERE id = $1 AND NOT is_deleted"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(AppUser::from))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<AppUser>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM app_users WHERE username = $1 AND NOT is_deleted"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(AppUser::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AppUser>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM app_users WHERE lower(email) = lower($1) AND NOT is_deleted LIMIT 1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(AppUser::from))
    }

    async fn list_by_ids(&self, ids: &[UserId]) -> Result<Vec<AppUser>, RepositoryError> {
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM app_users WHERE id = ANY($1) AND NOT is_deleted"
        ))
        .bind(uuids(ids))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(AppUser::from).collect())
    }

    async fn remove_custom_permission(
        &self,
        permission_id: PermissionId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE app_users
            SET custom_permission_ids = array_remove(custom_permission_ids, $1)
            WHERE $1 = ANY(custom_permission_ids)
            "#,
        )
        .bind(Uuid::from(permission_id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgUserCompanyRepository {
    pool: PgPool,
}

impl PgUserCompanyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserCompanyRepository for PgUserCompanyRepository {
    async fn upsert(&self, membership: UserCompany) -> Result<UserCompany, RepositoryError> {
        let record = sqlx::query_as::<_, MembershipRecord>(&format!(
            r#"
            INSERT INTO user_companies ({MEMBERSHIP_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, company_id)
            DO UPDATE SET role_ids = EXCLUDED.role_ids, is_admin = EXCLUDED.is_admin,
                status = EXCLUDED.status, updated_at = EXCLUDED.updated_at
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        ))
        .bind(Uuid::from(membership.user_id))
        .bind(Uuid::from(membership.company_id))
        .bind(uuids(&membership.role_ids))
        .bind(membership.is_admin)
        .bind(membership.status.as_str())
        .bind(membership.joined_at)
        .bind(membership.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        UserCompany::try_from(record)
    }

    async fn find(
        &self,
        user_id: UserId,
        company_id: CompanyId,
    ) -> Result<Option<UserCompany>, RepositoryError> {
        let record = sqlx::query_as::<_, MembershipRecord>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM user_companies WHERE user_id = $1 AND company_id = $2"
        ))
        .bind(Uuid::from(user_id))
        .bind(Uuid::from(company_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(UserCompany::try_from).transpose()
    }

    async fn list_by_company(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<UserCompany>, RepositoryError> {
        let records = sqlx::query_as::<_, MembershipRecord>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM user_companies WHERE company_id = $1 ORDER BY joined_at"
        ))
        .bind(Uuid::from(company_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(UserCompany::try_from).collect()
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<UserCompany>, RepositoryError> {
        let records = sqlx::query_as::<_, MembershipRecord>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM user_companies WHERE user_id = $1 ORDER BY joined_at"
        ))
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(UserCompany::try_from).collect()
    }

    async fn list_by_role(&self, role_id: RoleId) -> Result<Vec<UserCompany>, RepositoryError> {
        let records = sqlx::query_as::<_, MembershipRecord>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM user_companies WHERE $1 = ANY(role_ids)"
        ))
        .bind(Uuid::from(role_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(UserCompany::try_from).collect()
    }

    async fn remove(&self, user_id: UserId, company_id: CompanyId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM user_companies WHERE user_id = $1 AND company_id = $2")
            .bind(Uuid::from(user_id))
            .bind(Uuid::from(company_id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgRoleRepository {
    pool: PgPool,
}

impl PgRoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleRepository for PgRoleRepository {
    async fn create(&self, role: Role) -> Result<Role, RepositoryError> {
        let record = sqlx::query_as::<_, RoleRecord>(&format!(
            r#"
            INSERT INTO roles ({ROLE_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(role.id))
        .bind(Uuid::from(role.company_id))
        .bind(&role.name)
        .bind(&role.description)
        .bind(uuids(&role.menu_ids))
        .bind(uuids(&role.permission_ids))
        .bind(role.is_active)
        .bind(role.created_at)
        .bind(role.updated_at)
        .bind(role.is_deleted)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.into())
    }

    async fn update(&self, role: Role) -> Result<Role, RepositoryError> {
        let record = sqlx::query_as::<_, RoleRecord>(&format!(
            r#"
            UPDATE roles
            SET name = $2, description = $3, menu_ids = $4, permission_ids = $5, is_active = $6,
                updated_at = $7, is_deleted = $8
            WHERE id = $1
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(role.id))
        .bind(&role.name)
        .bind(&role.description)
        .bind(uuids(&role.menu_ids))
        .bind(uuids(&role.permission_ids))
        .bind(role.is_active)
        .bind(role.updated_at)
        .bind(role.is_deleted)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        Ok(record.into())
    }

    async fn find_by_id(&self, id: RoleId) -> Result<Option<Role>, RepositoryError> {
        let record = sqlx::query_as::<_, RoleRecord>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1 AND NOT is_deleted"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Role::from))
    }

    async fn find_by_name(
        &self,
        company_id: CompanyId,
        name: &str,
    ) -> Result<Option<Role>, RepositoryError> {
        let record = sqlx::query_as::<_, RoleRecord>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE company_id = $1 AND name = $2 AND NOT is_deleted"
        ))
        .bind(Uuid::from(company_id))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Role::from))
    }

    async fn list_by_company(&self, company_id: CompanyId) -> Result<Vec<Role>, RepositoryError> {
        let records = sqlx::query_as::<_, RoleRecord>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE company_id = $1 AND NOT is_deleted ORDER BY created_at"
        ))
        .bind(Uuid::from(company_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Role::from).collect())
    }

    async fn list_by_ids(&self, ids: &[RoleId]) -> Result<Vec<Role>, RepositoryError> {
        let records = sqlx::query_as::<_, RoleRecord>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE id = ANY($1) AND NOT is_deleted"
        ))
        .bind(uuids(ids))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Role::from).collect())
    }

    async fn remove_menu(&self, menu_id: MenuId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE roles SET menu_ids = array_remove(menu_ids, $1) WHERE $1 = ANY(menu_ids)",
        )
        .bind(Uuid::from(menu_id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }

    async fn remove_permission(
        &self,
        permission_id: PermissionId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE roles SET permission_ids = array_remove(permission_ids, $1) WHERE $1 = ANY(permission_ids)",
        )
        .bind(Uuid::from(permission_id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgPermissionRepository {
    pool: PgPool,
}

impl PgPermissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionRepository for PgPermissionRepository {
    async fn create(&self, permission: Permission) -> Result<Permission, RepositoryError> {
        let record = sqlx::query_as::<_, PermissionRecord>(&format!(
            r#"
            INSERT INTO permissions ({PERMISSION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {PERMISSION_COLUMNS}
            "#
        ))
        .bind(Uuid::from(permission.id))
        .bind(&permission.resource_name)
        .bind(&permission.resource_title)
        .bind(&permission.action)
        .bind(&permission.action_title)
        .bind(permission.code.as_str())
        .bind(&permission.description)
        .bind(permission.created_at)
        .bind(permission.updated_at)
        .bind(permission.is_deleted)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Permission::try_from(record)
    }

    async fn update(&self, permission: Permission) -> Result<Permission, RepositoryError> {
        let record = sqlx::query_as::<_, PermissionRecord>(&format!(
            r#"
            UPDATE permissions
            SET resource_name = $2, resource_title = $3, action = $4, action_title = $5, code = $6,
                description = $7, updated_at = $8, is_deleted = $9
            WHERE id = $1
            RETURNING {PERMISSION_COLUMNS}
            "#
        ))
        .bind(Uuid::from(permission.id))
        .bind(&permission.resource_name)
        .bind(&permission.resource_title)
        .bind(&permission.action)
        .bind(&permission.action_title)
        .bind(permission.code.as_str())
        .bind(&permission.description)
        .bind(permission.updated_at)
        .bind(permission.is_deleted)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        Permission::try_from(record)
    }

    async fn find_by_id(&self, id: PermissionId) -> Result<Option<Permission>, RepositoryError> {
        let record = sqlx::query_as::<_, PermissionRecord>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = $1 AND NOT is_deleted"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Permission::try_from).transpose()
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Permission>, RepositoryError> {
        let record = sqlx::query_as::<_, PermissionRecord>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE code = $1 AND NOT is_deleted"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Permission::try_from).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Permission>, RepositoryError> {
        let records = sqlx::query_as::<_, PermissionRecord>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE NOT is_deleted ORDER BY code"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Permission::try_from).collect()
    }

    async fn list_by_ids(&self, ids: &[PermissionId]) -> Result<Vec<Permission>, RepositoryError> {
        let records = sqlx::query_as::<_, PermissionRecord>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = ANY($1) AND NOT is_deleted"
        ))
        .bind(uuids(ids))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Permission::try_from).collect()
    }

    async fn list_by_resource(&self, resource: &str) -> Result<Vec<Permission>, RepositoryError> {
        let records = sqlx::query_as::<_, PermissionRecord>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE resource_name = $1 AND NOT is_deleted ORDER BY action"
        ))
        .bind(resource.to_lowercase())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Permission::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgMenuRepository {
    pool: PgPool,
}

impl PgMenuRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MenuRepository for PgMenuRepository {
    async fn create(&self, menu: Menu) -> Result<Menu, RepositoryError> {
        let record = sqlx::query_as::<_, MenuRecord>(&format!(
            r#"
            INSERT INTO menus ({MENU_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {MENU_COLUMNS}
            "#
        ))
        .bind(Uuid::from(menu.id))
        .bind(&menu.name)
        .bind(&menu.title)
        .bind(&menu.path)
        .bind(&menu.component)
        .bind(&menu.icon)
        .bind(menu.sort_order)
        .bind(menu.is_enabled)
        .bind(menu.is_external)
        .bind(menu.open_in_new_tab)
        .bind(menu.hide_in_menu)
        .bind(menu.parent_id.map(Uuid::from))
        .bind(&menu.permissions)
        .bind(menu.created_at)
        .bind(menu.updated_at)
        .bind(menu.is_deleted)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.into())
    }

    async fn update(&self, menu: Menu) -> Result<Menu, RepositoryError> {
        let record = sqlx::query_as::<_, MenuRecord>(&format!(
            r#"
            UPDATE menus
            SET name = $2, title = $3, path = $4, component = $5, icon = $6, sort_order = $7,
                is_enabled = $8, is_external = $9, open_in_new_tab = $10, hide_in_menu = $11,
                parent_id = $12, permissions = $13, updated_at = $14, is_deleted = $15
            WHERE id = $1
            RETURNING {MENU_COLUMNS}
            "#
        ))
        .bind(Uuid::from(menu.id))
        .bind(&menu.name)
        .bind(&menu.title)
        .bind(&menu.path)
        .bind(&menu.component)
        .bind(&menu.icon)
        .bind(menu.sort_order)
        .bind(menu.is_enabled)
        .bind(menu.is_external)
        .bind(menu.open_in_new_tab)
        .bind(menu.hide_in_menu)
        .bind(menu.parent_id.map(Uuid::from))
        .bind(&menu.permissions)
        .bind(menu.updated_at)
        .bind(menu.is_deleted)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        Ok(record.into())
    }

    async fn find_by_id(&self, id: MenuId) -> Result<Option<Menu>, RepositoryError> {
        let record = sqlx::query_as::<_, MenuRecord>(&format!(
            "SELECT {MENU_COLUMNS} FROM menus WHERE id = $1 AND NOT is_deleted"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Menu::from))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Menu>, RepositoryError> {
        let record = sqlx::query_as::<_, MenuRecord>(&format!(
            "SELECT {MENU_COLUMNS} FROM menus WHERE name = $1 AND NOT is_deleted"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Menu::from))
    }

    async fn list_all(&self) -> Result<Vec<Menu>, RepositoryError> {
        let records = sqlx::query_as::<_, MenuRecord>(&format!(
            "SELECT {MENU_COLUMNS} FROM menus WHERE NOT is_deleted ORDER BY sort_order, name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Menu::from).collect())
    }

    async fn list_by_ids(&self, ids: &[MenuId]) -> Result<Vec<Menu>, RepositoryError> {
        let records = sqlx::query_as::<_, MenuRecord>(&format!(
            "SELECT {MENU_COLUMNS} FROM menus WHERE id = ANY($1) AND NOT is_deleted"
        ))
        .bind(uuids(ids))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Menu::from).collect())
    }
}

#[derive(Clone)]
pub struct PgActivityLogRepository {
    pool: PgPool,
}

impl PgActivityLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ACTIVITY_LOG_FILTER: &str = r#"
    NOT is_deleted
    AND ($1::uuid IS NULL OR user_id = $1)
    AND ($2::text IS NULL OR action = $2)
    AND ($3::timestamptz IS NULL OR created_at >= $3)
    AND ($4::timestamptz IS NULL OR created_at <= $4)
"#;

#[async_trait]
impl ActivityLogRepository for PgActivityLogRepository {
    async fn insert(&self, log: UserActivityLog) -> Result<(), RepositoryError> {
        let duration_ms = i64::try_from(log.duration_ms).unwrap_or(i64::MAX);
        sqlx::query(&format!(
            r#"
            INSERT INTO user_activity_logs ({ACTIVITY_LOG_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#
        ))
        .bind(Uuid::from(log.id))
        .bind(log.user_id.map(Uuid::from))
        .bind(&log.username)
        .bind(&log.action)
        .bind(&log.description)
        .bind(&log.http_method)
        .bind(&log.path)
        .bind(&log.query_string)
        .bind(i32::from(log.status_code))
        .bind(duration_ms)
        .bind(&log.ip_address)
        .bind(&log.user_agent)
        .bind(log.created_at)
        .bind(log.is_deleted)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn query(
        &self,
        filter: &ActivityLogFilter,
        page: PageRequest,
    ) -> Result<Page<UserActivityLog>, RepositoryError> {
        let user_id = filter.user_id.map(Uuid::from);
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM user_activity_logs WHERE {ACTIVITY_LOG_FILTER}"
        ))
        .bind(user_id)
        .bind(&filter.action)
        .bind(filter.start)
        .bind(filter.end)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let records = sqlx::query_as::<_, ActivityLogRecord>(&format!(
            r#"
            SELECT {ACTIVITY_LOG_COLUMNS} FROM user_activity_logs
            WHERE {ACTIVITY_LOG_FILTER}
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#
        ))
        .bind(user_id)
        .bind(&filter.action)
        .bind(filter.start)
        .bind(filter.end)
        .bind(i64::from(page.page_size))
        .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let list = records
            .into_iter()
            .map(UserActivityLog::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(list, u64::try_from(total).unwrap_or_default(), page))
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<UserActivityLog>, RepositoryError> {
        let records = sqlx::query_as::<_, ActivityLogRecord>(&format!(
            r#"
            SELECT {ACTIVITY_LOG_COLUMNS} FROM user_activity_logs
            WHERE user_id = $1 AND NOT is_deleted
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(Uuid::from(user_id))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(UserActivityLog::try_from).collect()
    }

    async fn soft_delete_older_than(&self, before: Timestamp) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE user_activity_logs SET is_deleted = TRUE WHERE created_at < $1 AND NOT is_deleted",
        )
        .bind(before)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}

/// 共享同一个连接池的全部仓储
#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub company_repository: Arc<PgCompanyRepository>,
    pub user_repository: Arc<PgUserRepository>,
    pub membership_repository: Arc<PgUserCompanyRepository>,
    pub role_repository: Arc<PgRoleRepository>,
    pub permission_repository: Arc<PgPermissionRepository>,
    pub menu_repository: Arc<PgMenuRepository>,
    pub activity_log_repository: Arc<PgActivityLogRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            company_repository: Arc::new(PgCompanyRepository::new(pool.clone())),
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            membership_repository: Arc::new(PgUserCompanyRepository::new(pool.clone())),
            role_repository: Arc::new(PgRoleRepository::new(pool.clone())),
            permission_repository: Arc::new(PgPermissionRepository::new(pool.clone())),
            menu_repository: Arc::new(PgMenuRepository::new(pool.clone())),
            activity_log_repository: Arc::new(PgActivityLogRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
}
