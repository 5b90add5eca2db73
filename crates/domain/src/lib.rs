//! 多租户管理平台核心领域模型
//!
//! 包含用户、企业、角色、菜单、权限与活动日志等实体，以及与存储无关的业务规则。

pub mod entities;
pub mod errors;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use value_objects::*;
