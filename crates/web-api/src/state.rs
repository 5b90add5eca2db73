use std::sync::Arc;

use application::{
    AccessControl, AccessControlDependencies, ActivityLogQueue, ActivityLogService,
    ActivityLogServiceDependencies, AuthService, AuthServiceDependencies, Clock, CompanyService,
    CompanyServiceDependencies, DataInitializer, DataInitializerDependencies, MenuService,
    MenuServiceDependencies, PasswordHasher, PermissionService, PermissionServiceDependencies,
    RbacAccessControl, RoleService, RoleServiceDependencies, UserService,
    UserServiceDependencies,
};
use config::AppConfig;
use infrastructure::Repositories;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt_service: Arc<JwtService>,
    pub access_control: Arc<dyn AccessControl>,
    pub auth_service: Arc<AuthService>,
    pub user_service: Arc<UserService>,
    pub company_service: Arc<CompanyService>,
    pub role_service: Arc<RoleService>,
    pub menu_service: Arc<MenuService>,
    pub permission_service: Arc<PermissionService>,
    pub activity_log_service: Arc<ActivityLogService>,
    pub activity_queue: ActivityLogQueue,
    repositories: Repositories,
    password_hasher: Arc<dyn PasswordHasher>,
    clock: Arc<dyn Clock>,
}

impl AppState {
    /// 基于仓储集合装配全部用例服务
    pub fn new(
        config: AppConfig,
        repositories: Repositories,
        password_hasher: Arc<dyn PasswordHasher>,
        clock: Arc<dyn Clock>,
        activity_queue: ActivityLogQueue,
    ) -> Self {
        let repos = &repositories;
        let access_control: Arc<dyn AccessControl> =
            Arc::new(RbacAccessControl::new(AccessControlDependencies {
                user_repository: repos.users.clone(),
                membership_repository: repos.memberships.clone(),
                role_repository: repos.roles.clone(),
                permission_repository: repos.permissions.clone(),
                menu_repository: repos.menus.clone(),
            }));

        let auth_service = Arc::new(AuthService::new(AuthServiceDependencies {
            user_repository: repos.users.clone(),
            company_repository: repos.companies.clone(),
            membership_repository: repos.memberships.clone(),
            role_repository: repos.roles.clone(),
            password_hasher: password_hasher.clone(),
            clock: clock.clone(),
        }));

        let user_service = Arc::new(UserService::new(UserServiceDependencies {
            user_repository: repos.users.clone(),
            membership_repository: repos.memberships.clone(),
            role_repository: repos.roles.clone(),
            permission_repository: repos.permissions.clone(),
            password_hasher: password_hasher.clone(),
            clock: clock.clone(),
        }));

        let company_service = Arc::new(CompanyService::new(CompanyServiceDependencies {
            company_repository: repos.companies.clone(),
            user_repository: repos.users.clone(),
            membership_repository: repos.memberships.clone(),
            role_repository: repos.roles.clone(),
            menu_repository: repos.menus.clone(),
            permission_repository: repos.permissions.clone(),
            password_hasher: password_hasher.clone(),
            clock: clock.clone(),
        }));

        let role_service = Arc::new(RoleService::new(RoleServiceDependencies {
            role_repository: repos.roles.clone(),
            membership_repository: repos.memberships.clone(),
            menu_repository: repos.menus.clone(),
            permission_repository: repos.permissions.clone(),
            clock: clock.clone(),
        }));

        let menu_service = Arc::new(MenuService::new(MenuServiceDependencies {
            menu_repository: repos.menus.clone(),
            role_repository: repos.roles.clone(),
            user_repository: repos.users.clone(),
            membership_repository: repos.memberships.clone(),
            clock: clock.clone(),
        }));

        let permission_service = Arc::new(PermissionService::new(PermissionServiceDependencies {
            permission_repository: repos.permissions.clone(),
            role_repository: repos.roles.clone(),
            user_repository: repos.users.clone(),
            clock: clock.clone(),
        }));

        let activity_log_service =
            Arc::new(ActivityLogService::new(ActivityLogServiceDependencies {
                activity_log_repository: repos.activity_logs.clone(),
                clock: clock.clone(),
            }));

        let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

        Self {
            config: Arc::new(config),
            jwt_service,
            access_control,
            auth_service,
            user_service,
            company_service,
            role_service,
            menu_service,
            permission_service,
            activity_log_service,
            activity_queue,
            repositories,
            password_hasher,
            clock,
        }
    }

    /// 启动时的数据初始化器，与请求处理共享同一组服务
    pub fn data_initializer(&self) -> DataInitializer {
        DataInitializer::new(DataInitializerDependencies {
            permission_service: self.permission_service.clone(),
            company_service: self.company_service.clone(),
            menu_repository: self.repositories.menus.clone(),
            company_repository: self.repositories.companies.clone(),
            user_repository: self.repositories.users.clone(),
            password_hasher: self.password_hasher.clone(),
            clock: self.clock.clone(),
        })
    }
}
