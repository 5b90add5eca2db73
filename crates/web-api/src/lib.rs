//! Web API 层。
//!
//! 提供 Axum 路由与全局中间件（追踪标识、活动日志、响应包装、认证），
//! 将 HTTP 请求委托给应用层的用例服务。

mod activity;
mod activity_routes;
mod auth;
mod auth_routes;
mod authorize;
mod company_routes;
mod envelope;
mod error;
mod extract;
mod menu_routes;
mod permission_routes;
mod role_routes;
mod routes;
mod state;
mod trace;
mod user_routes;
mod wrap;

pub use activity::{client_ip, ActivityRecorder};
pub use auth::{is_public_path, Claims, CurrentUser, IssuedToken, JwtService, TokenUse};
pub use auth_routes::LoginResponse;
pub use authorize::{
    require_menu, require_permission, require_system_admin, AccessLayer, AccessRule,
};
pub use config::JwtConfig;
pub use envelope::{is_envelope, ApiResponse, SUCCESS_CODE};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
pub use trace::{TraceId, TRACE_ID_HEADER};
pub use wrap::ResponseWrapping;
