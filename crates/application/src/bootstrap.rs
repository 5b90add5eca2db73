//! 初始数据
//!
//! 启动时幂等地补齐权限目录、内置菜单，以及默认企业和管理员账号。
//! 初始管理员同时是平台管理员。

use std::sync::Arc;

use domain::{AppUser, Company, Menu, MenuDraft, DEFAULT_MENUS};

use crate::{
    clock::Clock,
    error::ApplicationError,
    password::PasswordHasher,
    repository::{CompanyRepository, MenuRepository, UserRepository},
    services::{CompanyService, PermissionService},
};

/// 默认企业和管理员
#[derive(Debug, Clone)]
pub struct BootstrapSettings {
    pub company_name: String,
    pub company_code: String,
    pub admin_username: String,
    pub admin_password: String,
    pub admin_email: Option<String>,
}

/// 初始化结果统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub permissions_created: usize,
    pub menus_created: usize,
    pub company_created: bool,
    pub admin_created: bool,
}

pub struct DataInitializerDependencies {
    pub permission_service: Arc<PermissionService>,
    pub company_service: Arc<CompanyService>,
    pub menu_repository: Arc<dyn MenuRepository>,
    pub company_repository: Arc<dyn CompanyRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

pub struct DataInitializer {
    deps: DataInitializerDependencies,
}

impl DataInitializer {
    pub fn new(deps: DataInitializerDependencies) -> Self {
        Self { deps }
    }

    pub async fn run(
        &self,
        settings: Option<&BootstrapSettings>,
    ) -> Result<BootstrapReport, ApplicationError> {
        let mut report = BootstrapReport {
            permissions_created: self.deps.permission_service.initialize_defaults().await?,
            menus_created: self.seed_menus().await?,
            ..Default::default()
        };

        if let Some(settings) = settings {
            self.seed_company(settings, &mut report).await?;
        }

        tracing::info!(
            permissions_created = report.permissions_created,
            menus_created = report.menus_created,
            company_created = report.company_created,
            admin_created = report.admin_created,
            "初始数据检查完成"
        );
        Ok(report)
    }

    async fn seed_menus(&self) -> Result<usize, ApplicationError> {
        let mut created = 0;
        for (name, title, path, icon, sort_order, parent) in DEFAULT_MENUS {
            if self.deps.menu_repository.find_by_name(name).await?.is_some() {
                continue;
            }
            let parent_id = match parent {
                Some(parent) => self
                    .deps
                    .menu_repository
                    .find_by_name(parent)
                    .await?
                    .map(|menu| menu.id),
                None => None,
            };
            let menu = Menu::new(
                MenuDraft {
                    name: name.to_owned(),
                    title: title.to_owned(),
                    path: path.to_owned(),
                    component: None,
                    icon: Some(icon.to_owned()),
                    sort_order,
                    is_enabled: true,
                    is_external: false,
                    open_in_new_tab: false,
                    hide_in_menu: false,
                    parent_id,
                    permissions: Vec::new(),
                },
                self.deps.clock.now(),
            )?;
            self.deps.menu_repository.create(menu).await?;
            created += 1;
        }
        Ok(created)
    }

    async fn seed_company(
        &self,
        settings: &BootstrapSettings,
        report: &mut BootstrapReport,
    ) -> Result<(), ApplicationError> {
        let now = self.deps.clock.now();
        let company = match self
            .deps
            .company_repository
            .find_by_code(&settings.company_code.to_lowercase())
            .await?
        {
            Some(company) => company,
            None => {
                report.company_created = true;
                let company = Company::new(
                    settings.company_name.clone(),
                    settings.company_code.clone(),
                    None,
                    now,
                )?;
                self.deps.company_repository.create(company).await?
            }
        };

        let admin = match self
            .deps
            .user_repository
            .find_by_username(&settings.admin_username)
            .await?
        {
            Some(user) if user.is_system_admin => user,
            Some(mut user) => {
                user.is_system_admin = true;
                user.touch(now);
                self.deps.user_repository.update(user).await?
            }
            None => {
                report.admin_created = true;
                let hash = self
                    .deps
                    .password_hasher
                    .hash(&settings.admin_password)
                    .await?;
                let mut user = AppUser::new(
                    settings.admin_username.clone(),
                    settings.admin_email.clone(),
                    hash,
                    now,
                )?;
                user.is_system_admin = true;
                self.deps.user_repository.create(user).await?
            }
        };

        self.deps
            .company_service
            .provision_company(&company, admin)
            .await?;
        Ok(())
    }
}
