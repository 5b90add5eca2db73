//! 领域实体

pub mod activity_log;
pub mod company;
pub mod menu;
pub mod permission;
pub mod role;
pub mod user;

pub use activity_log::*;
pub use company::*;
pub use menu::*;
pub use permission::*;
pub use role::*;
pub use user::*;
