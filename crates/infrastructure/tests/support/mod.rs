#![allow(dead_code)]

use std::sync::Arc;

use application::{
    AccessControlDependencies, ActivityLogService, ActivityLogServiceDependencies, AuthService,
    AuthServiceDependencies, BootstrapSettings, Clock, CompanyRepository, CompanyService,
    CompanyServiceDependencies,
    DataInitializer, DataInitializerDependencies, MenuService, MenuServiceDependencies,
    PasswordHasher, PermissionService, PermissionServiceDependencies, RbacAccessControl,
    RoleService, RoleServiceDependencies, Subject, SystemClock, UserRepository, UserService,
    UserServiceDependencies,
};
use domain::{AppUser, Company};
use infrastructure::{BcryptPasswordHasher, Repositories};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin123";

pub struct Fixture {
    pub repositories: Repositories,
    pub access: Arc<RbacAccessControl>,
    pub auth: Arc<AuthService>,
    pub companies: Arc<CompanyService>,
    pub users: Arc<UserService>,
    pub roles: Arc<RoleService>,
    pub menus: Arc<MenuService>,
    pub permissions: Arc<PermissionService>,
    pub activity_logs: Arc<ActivityLogService>,
    pub initializer: DataInitializer,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_repositories(Repositories::in_memory())
    }

    pub fn with_repositories(repositories: Repositories) -> Self {
        let repos = repositories.clone();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let hasher: Arc<dyn PasswordHasher> = Arc::new(BcryptPasswordHasher::new(Some(4)));

        let permissions = Arc::new(PermissionService::new(PermissionServiceDependencies {
            permission_repository: repos.permissions.clone(),
            role_repository: repos.roles.clone(),
            user_repository: repos.users.clone(),
            clock: clock.clone(),
        }));
        let companies = Arc::new(CompanyService::new(CompanyServiceDependencies {
            company_repository: repos.companies.clone(),
            user_repository: repos.users.clone(),
            membership_repository: repos.memberships.clone(),
            role_repository: repos.roles.clone(),
            menu_repository: repos.menus.clone(),
            permission_repository: repos.permissions.clone(),
            password_hasher: hasher.clone(),
            clock: clock.clone(),
        }));
        let initializer = DataInitializer::new(DataInitializerDependencies {
            permission_service: permissions.clone(),
            company_service: companies.clone(),
            menu_repository: repos.menus.clone(),
            company_repository: repos.companies.clone(),
            user_repository: repos.users.clone(),
            password_hasher: hasher.clone(),
            clock: clock.clone(),
        });

        Self {
            access: Arc::new(RbacAccessControl::new(AccessControlDependencies {
                user_repository: repos.users.clone(),
                membership_repository: repos.memberships.clone(),
                role_repository: repos.roles.clone(),
                permission_repository: repos.permissions.clone(),
                menu_repository: repos.menus.clone(),
            })),
            auth: Arc::new(AuthService::new(AuthServiceDependencies {
                user_repository: repos.users.clone(),
                company_repository: repos.companies.clone(),
                membership_repository: repos.memberships.clone(),
                role_repository: repos.roles.clone(),
                password_hasher: hasher.clone(),
                clock: clock.clone(),
            })),
            users: Arc::new(UserService::new(UserServiceDependencies {
                user_repository: repos.users.clone(),
                membership_repository: repos.memberships.clone(),
                role_repository: repos.roles.clone(),
                permission_repository: repos.permissions.clone(),
                password_hasher: hasher.clone(),
                clock: clock.clone(),
            })),
            roles: Arc::new(RoleService::new(RoleServiceDependencies {
                role_repository: repos.roles.clone(),
                membership_repository: repos.memberships.clone(),
                menu_repository: repos.menus.clone(),
                permission_repository: repos.permissions.clone(),
                clock: clock.clone(),
            })),
            menus: Arc::new(MenuService::new(MenuServiceDependencies {
                menu_repository: repos.menus.clone(),
                role_repository: repos.roles.clone(),
                user_repository: repos.users.clone(),
                membership_repository: repos.memberships.clone(),
                clock: clock.clone(),
            })),
            activity_logs: Arc::new(ActivityLogService::new(ActivityLogServiceDependencies {
                activity_log_repository: repos.activity_logs.clone(),
                clock,
            })),
            permissions,
            companies,
            initializer,
            repositories,
        }
    }

    pub fn settings() -> BootstrapSettings {
        BootstrapSettings {
            company_name: "默认企业".into(),
            company_code: "default".into(),
            admin_username: ADMIN_USERNAME.into(),
            admin_password: ADMIN_PASSWORD.into(),
            admin_email: None,
        }
    }

    /// 初始化数据并返回管理员、默认企业和管理员的请求主体
    pub async fn seeded() -> (Self, AppUser, Company, Subject) {
        let fixture = Self::new();
        fixture
            .initializer
            .run(Some(&Self::settings()))
            .await
            .expect("bootstrap");
        let admin = fixture
            .repositories
            .users
            .find_by_username(ADMIN_USERNAME)
            .await
            .expect("lookup admin")
            .expect("admin exists");
        let company = fixture
            .repositories
            .companies
            .find_by_code("default")
            .await
            .expect("lookup company")
            .expect("company exists");
        let subject = Subject::new(admin.id, Some(company.id));
        (fixture, admin, company, subject)
    }
}
