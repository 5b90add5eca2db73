//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，处理输入校验、权限解析、
//! 以及对外部适配器（例如密码哈希、活动日志持久化）的抽象。

pub mod access;
pub mod activity_queue;
pub mod bootstrap;
pub mod clock;
pub mod error;
pub mod password;
pub mod repository;
pub mod services;

pub use access::{
    AccessControl, AccessControlDependencies, RbacAccessControl, Subject, UserPermissions,
};
pub use activity_queue::{
    ActivityLogQueue, ActivityLogSink, ActivityLogWorker, ActivityQueueConfig, QueueStatus,
};
pub use bootstrap::{
    BootstrapReport, BootstrapSettings, DataInitializer, DataInitializerDependencies,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::ApplicationError;
pub use password::{validate_password, PasswordHasher, PasswordHasherError};
pub use repository::{
    ActivityLogFilter, ActivityLogRepository, CompanyRepository, MenuRepository,
    PermissionRepository, RoleRepository, UserCompanyRepository, UserRepository,
};
pub use services::*;
