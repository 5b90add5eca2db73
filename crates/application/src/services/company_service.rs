use std::sync::Arc;

use domain::{
    AppUser, Company, CompanyId, DomainError, Role, UserCompany, UserId, SUPER_ADMIN_ROLE,
    WELCOME_MENU,
};
use serde::{Deserialize, Serialize};

use crate::{
    access::Subject,
    clock::Clock,
    error::ApplicationError,
    password::{validate_password, PasswordHasher},
    repository::{
        CompanyRepository, MenuRepository, PermissionRepository, RoleRepository,
        UserCompanyRepository, UserRepository,
    },
};

/// 普通成员默认角色
pub const MEMBER_ROLE: &str = "user";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCompanyRequest {
    pub company_name: String,
    pub company_code: String,
    #[serde(default)]
    pub description: Option<String>,
    pub admin_username: String,
    pub admin_password: String,
    #[serde(default)]
    pub admin_email: Option<String>,
}

/// 个人注册
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRegistration {
    pub company: Company,
    pub admin: AppUser,
}

/// 用户所属企业的概览
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyMembershipView {
    pub company: Company,
    pub is_admin: bool,
    pub is_current: bool,
    pub role_count: usize,
}

pub struct CompanyServiceDependencies {
    pub company_repository: Arc<dyn CompanyRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub membership_repository: Arc<dyn UserCompanyRepository>,
    pub role_repository: Arc<dyn RoleRepository>,
    pub menu_repository: Arc<dyn MenuRepository>,
    pub permission_repository: Arc<dyn PermissionRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

pub struct CompanyService {
    deps: CompanyServiceDependencies,
}

impl CompanyService {
    pub fn new(deps: CompanyServiceDependencies) -> Self {
        Self { deps }
    }

    /// 注册企业：创建管理员账号、企业、内置角色并把管理员设为企业管理员
    pub async fn register_company(
        &self,
        request: RegisterCompanyRequest,
    ) -> Result<CompanyRegistration, ApplicationError> {
        let now = self.deps.clock.now();
        let company = Company::new(
            request.company_name,
            request.company_code,
            request.description,
            now,
        )?;
        if self
            .deps
            .company_repository
            .find_by_code(&company.code)
            .await?
            .is_some()
        {
            return Err(DomainError::resource_already_exists("company", &company.code).into());
        }

        let admin = self
            .new_owner(
                &request.admin_username,
                &request.admin_password,
                request.admin_email,
            )
            .await?;

        let company = self.deps.company_repository.create(company).await?;
        let admin = match self.deps.user_repository.create(admin).await {
            Ok(admin) => admin,
            Err(err) => {
                self.discard_registration(&company, None).await;
                return Err(err.into());
            }
        };
        let admin = match self.provision_company(&company, admin.clone()).await {
            Ok(admin) => admin,
            Err(err) => {
                self.discard_registration(&company, Some(admin)).await;
                return Err(err);
            }
        };

        tracing::info!(company = %company.code, admin = %admin.username, "company registered");
        Ok(CompanyRegistration { company, admin })
    }

    /// 用户自助注册：创建账号和名为“<用户名> 的企业”的个人企业，本人为企业管理员
    pub async fn register_user(
        &self,
        request: RegisterUserRequest,
    ) -> Result<CompanyRegistration, ApplicationError> {
        let mut owner = self
            .new_owner(&request.username, &request.password, request.email)
            .await?;
        owner.display_name = request.display_name;
        let company = Company::new(
            format!("{} 的企业", owner.username),
            format!("personal-{}", owner.id),
            Some("个人企业".into()),
            self.deps.clock.now(),
        )?;

        let owner = self.deps.user_repository.create(owner).await?;
        let company = match self.deps.company_repository.create(company).await {
            Ok(company) => company,
            Err(err) => {
                self.discard_user(owner).await;
                return Err(err.into());
            }
        };
        let owner = match self.provision_company(&company, owner.clone()).await {
            Ok(owner) => owner,
            Err(err) => {
                self.discard_registration(&company, Some(owner)).await;
                return Err(err);
            }
        };

        tracing::info!(user = %owner.username, company = %company.code, "user registered");
        Ok(CompanyRegistration {
            company,
            admin: owner,
        })
    }

    /// 校验用户名与邮箱未被占用并生成尚未保存的账号
    async fn new_owner(
        &self,
        username: &str,
        password: &str,
        email: Option<String>,
    ) -> Result<AppUser, ApplicationError> {
        let username = username.trim().to_owned();
        if self
            .deps
            .user_repository
            .find_by_username(&username)
            .await?
            .is_some()
        {
            return Err(DomainError::resource_already_exists("user", &username).into());
        }
        let email = email
            .map(|e| e.trim().to_owned())
            .filter(|e| !e.is_empty());
        if let Some(email) = &email {
            if self.deps.user_repository.find_by_email(email).await?.is_some() {
                return Err(DomainError::resource_already_exists("email", email).into());
            }
        }
        validate_password(password)?;
        let password_hash = self.deps.password_hasher.hash(password).await?;
        Ok(AppUser::new(
            username,
            email,
            password_hash,
            self.deps.clock.now(),
        )?)
    }

    async fn discard_user(&self, mut user: AppUser) {
        let username = user.username.clone();
        user.is_deleted = true;
        user.touch(self.deps.clock.now());
        if let Err(err) = self.deps.user_repository.update(user).await {
            tracing::error!(error = %err, user = %username, "failed to discard registered user");
        } else {
            tracing::warn!(user = %username, "user registration rolled back");
        }
    }

    /// 注册中途失败时软删除已写入的企业、管理员和成员关系，释放企业代码与用户名
    async fn discard_registration(&self, company: &Company, admin: Option<AppUser>) {
        let now = self.deps.clock.now();
        if let Some(mut admin) = admin {
            if let Err(err) = self.deps.membership_repository.remove(admin.id, company.id).await {
                tracing::warn!(error = %err, company = %company.code, "failed to remove membership");
            }
            admin.is_deleted = true;
            admin.touch(now);
            if let Err(err) = self.deps.user_repository.update(admin).await {
                tracing::warn!(error = %err, company = %company.code, "failed to discard admin");
            }
        }

        let mut company = company.clone();
        company.is_deleted = true;
        company.updated_at = now;
        let code = company.code.clone();
        if let Err(err) = self.deps.company_repository.update(company).await {
            tracing::error!(error = %err, company = %code, "failed to discard company");
        } else {
            tracing::warn!(company = %code, "company registration rolled back");
        }
    }

    /// 为新企业创建内置角色，并把 `owner` 设为企业管理员、切换到该企业
    pub async fn provision_company(
        &self,
        company: &Company,
        mut owner: AppUser,
    ) -> Result<AppUser, ApplicationError> {
        let now = self.deps.clock.now();
        let menus = self.deps.menu_repository.list_all().await?;
        let permissions = self.deps.permission_repository.list_all().await?;

        let admin_role = match self
            .deps
            .role_repository
            .find_by_name(company.id, SUPER_ADMIN_ROLE)
            .await?
        {
            Some(role) => role,
            None => {
                let mut role = Role::new(
                    company.id,
                    SUPER_ADMIN_ROLE,
                    Some("企业管理员，拥有所有权限".into()),
                    now,
                )?;
                role.menu_ids = menus.iter().map(|m| m.id).collect();
                role.permission_ids = permissions.iter().map(|p| p.id).collect();
                self.deps.role_repository.create(role).await?
            }
        };

        if self
            .deps
            .role_repository
            .find_by_name(company.id, MEMBER_ROLE)
            .await?
            .is_none()
        {
            let mut role = Role::new(
                company.id,
                MEMBER_ROLE,
                Some("普通用户，仅有基本访问权限".into()),
                now,
            )?;
            role.menu_ids = menus
                .iter()
                .filter(|m| m.name == WELCOME_MENU)
                .map(|m| m.id)
                .collect();
            self.deps.role_repository.create(role).await?;
        }

        let mut membership = self
            .deps
            .membership_repository
            .find(owner.id, company.id)
            .await?
            .unwrap_or_else(|| UserCompany::new(owner.id, company.id, now));
        if !membership.role_ids.contains(&admin_role.id) {
            membership.role_ids.push(admin_role.id);
        }
        membership.is_admin = true;
        membership.updated_at = now;
        self.deps.membership_repository.upsert(membership).await?;

        if owner.current_company_id.is_none() {
            owner.current_company_id = Some(company.id);
            owner.touch(now);
            owner = self.deps.user_repository.update(owner).await?;
        }
        Ok(owner)
    }

    pub async fn get_current(&self, subject: &Subject) -> Result<Company, ApplicationError> {
        let company_id = subject.require_company()?;
        self.get(company_id).await
    }

    pub async fn get(&self, id: CompanyId) -> Result<Company, ApplicationError> {
        self.deps
            .company_repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("company", id))
    }

    pub async fn update_current(
        &self,
        subject: &Subject,
        request: UpdateCompanyRequest,
    ) -> Result<Company, ApplicationError> {
        let mut company = self.get_current(subject).await?;
        if let Some(name) = request.name {
            let name = name.trim().to_owned();
            if name.is_empty() {
                return Err(DomainError::validation_error("name", "企业名称不能为空").into());
            }
            company.name = name;
        }
        if let Some(description) = request.description {
            company.description = Some(description);
        }
        company.updated_at = self.deps.clock.now();
        Ok(self.deps.company_repository.update(company).await?)
    }

    /// 切换当前企业，要求用户是目标企业的有效成员
    pub async fn switch_company(
        &self,
        user_id: UserId,
        company_id: CompanyId,
    ) -> Result<AppUser, ApplicationError> {
        let company = self.get(company_id).await?;
        if !company.is_active {
            return Err(ApplicationError::invalid_operation("企业已停用"));
        }
        let is_member = self
            .deps
            .membership_repository
            .find(user_id, company_id)
            .await?
            .is_some_and(|m| m.is_active());
        if !is_member {
            return Err(ApplicationError::authorization("您不是该企业的成员"));
        }

        let mut user = self
            .deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("user", user_id))?;
        user.current_company_id = Some(company_id);
        user.touch(self.deps.clock.now());
        Ok(self.deps.user_repository.update(user).await?)
    }

    pub async fn my_companies(
        &self,
        subject: &Subject,
    ) -> Result<Vec<CompanyMembershipView>, ApplicationError> {
        let memberships = self
            .deps
            .membership_repository
            .list_by_user(subject.user_id)
            .await?;
        let ids: Vec<CompanyId> = memberships.iter().map(|m| m.company_id).collect();
        let companies = self.deps.company_repository.list_by_ids(&ids).await?;

        let mut views: Vec<CompanyMembershipView> = memberships
            .into_iter()
            .filter(|m| m.is_active())
            .filter_map(|m| {
                companies
                    .iter()
                    .find(|c| c.id == m.company_id)
                    .map(|company| CompanyMembershipView {
                        company: company.clone(),
                        is_admin: m.is_admin,
                        is_current: subject.company_id == Some(m.company_id),
                        role_count: m.role_ids.len(),
                    })
            })
            .collect();
        views.sort_by(|a, b| a.company.created_at.cmp(&b.company.created_at));
        Ok(views)
    }
}
