use std::sync::Arc;
use std::time::Duration;

use application::{
    ActivityLogRepository, CompanyRepository, MenuRepository, PasswordHasher,
    PermissionRepository, RoleRepository, UserCompanyRepository, UserRepository,
};
use config::{DatabaseConfig, StorageBackend};
use thiserror::Error;

use crate::{
    memory::MemoryStore,
    migrations::MIGRATOR,
    password::BcryptPasswordHasher,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 以 trait 对象形式暴露的仓储集合，与具体存储后端无关
#[derive(Clone)]
pub struct Repositories {
    pub companies: Arc<dyn CompanyRepository>,
    pub users: Arc<dyn UserRepository>,
    pub memberships: Arc<dyn UserCompanyRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub permissions: Arc<dyn PermissionRepository>,
    pub menus: Arc<dyn MenuRepository>,
    pub activity_logs: Arc<dyn ActivityLogRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            companies: store.clone(),
            users: store.clone(),
            memberships: store.clone(),
            roles: store.clone(),
            permissions: store.clone(),
            menus: store.clone(),
            activity_logs: store,
        }
    }

    pub fn from_postgres(storage: &PgStorage) -> Self {
        Self {
            companies: storage.company_repository.clone(),
            users: storage.user_repository.clone(),
            memberships: storage.membership_repository.clone(),
            roles: storage.role_repository.clone(),
            permissions: storage.permission_repository.clone(),
            menus: storage.menu_repository.clone(),
            activity_logs: storage.activity_log_repository.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Infrastructure {
    pub repositories: Repositories,
    pub password_hasher: Arc<BcryptPasswordHasher>,
}

impl Infrastructure {
    /// 按配置选择存储后端；Postgres 后端按需执行迁移
    pub async fn connect(
        config: &DatabaseConfig,
        bcrypt_cost: Option<u32>,
    ) -> Result<Self, InfrastructureError> {
        let repositories = match config.backend {
            StorageBackend::Memory => {
                tracing::warn!("using in-memory storage, data is lost on restart");
                Repositories::in_memory()
            }
            StorageBackend::Postgres => {
                let pool = create_pg_pool(
                    &config.url,
                    config.max_connections,
                    Duration::from_secs(config.acquire_timeout_seconds),
                )
                .await?;
                if config.run_migrations {
                    MIGRATOR.run(&pool).await?;
                    tracing::info!("database migrations applied");
                }
                Repositories::from_postgres(&PgStorage::new(pool))
            }
        };

        Ok(Self {
            repositories,
            password_hasher: Arc::new(BcryptPasswordHasher::new(bcrypt_cost)),
        })
    }

    pub fn password_hasher_trait(&self) -> Arc<dyn PasswordHasher> {
        self.password_hasher.clone()
    }
}
