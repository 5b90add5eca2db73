//! 基础设施层实现。
//!
//! 提供 Postgres 与内存两种仓储实现以及密码哈希适配器，实现应用层定义的接口。

pub mod builder;
pub mod memory;
pub mod migrations;
pub mod password;
pub mod repository;

pub use builder::{Infrastructure, InfrastructureError, Repositories};
pub use memory::MemoryStore;
pub use migrations::MIGRATOR;
pub use password::BcryptPasswordHasher;
pub use repository::{
    create_pg_pool, PgActivityLogRepository, PgCompanyRepository, PgMenuRepository,
    PgPermissionRepository, PgRoleRepository, PgStorage, PgUserCompanyRepository,
    PgUserRepository,
};
