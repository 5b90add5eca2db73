pub mod activity_log_service;
pub mod auth_service;
pub mod company_service;
pub mod menu_service;
pub mod permission_service;
pub mod role_service;
pub mod user_service;

pub use activity_log_service::*;
pub use auth_service::*;
pub use company_service::*;
pub use menu_service::*;
pub use permission_service::*;
pub use role_service::*;
pub use user_service::*;
