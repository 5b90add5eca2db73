//! 用户活动日志
//!
//! 每条日志对应一次 HTTP 请求，操作类型和描述由请求方法与路径推导。

use serde::{Deserialize, Serialize};

use crate::value_objects::{ActivityLogId, Timestamp, UserId};

/// 匿名请求使用的用户名
pub const ANONYMOUS_USERNAME: &str = "匿名用户";

/// 活动日志实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivityLog {
    pub id: ActivityLogId,
    pub user_id: Option<UserId>,
    pub username: String,
    pub action: String,
    pub description: String,
    pub http_method: String,
    pub path: String,
    pub query_string: Option<String>,
    pub status_code: u16,
    pub duration_ms: u64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: Timestamp,
    #[serde(skip_serializing, default)]
    pub is_deleted: bool,
}

/// 一次已完成请求的采集结果，由 HTTP 中间件产生，交给后台写入。
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequestRecord {
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub http_method: String,
    pub path: String,
    pub query_string: Option<String>,
    pub status_code: u16,
    pub duration_ms: u64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub occurred_at: Timestamp,
}

impl UserActivityLog {
    pub fn from_request(record: HttpRequestRecord) -> Self {
        let kind = classify_request(&record.http_method, &record.path);
        let description = kind.describe(record.status_code);
        Self {
            id: ActivityLogId::generate(),
            user_id: record.user_id,
            username: record
                .username
                .unwrap_or_else(|| ANONYMOUS_USERNAME.to_owned()),
            action: kind.action,
            description,
            http_method: record.http_method,
            path: record.path,
            query_string: record.query_string,
            status_code: record.status_code,
            duration_ms: record.duration_ms,
            ip_address: record.ip_address,
            user_agent: record.user_agent,
            created_at: record.occurred_at,
            is_deleted: false,
        }
    }
}

/// 请求分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKind {
    pub action: String,
    label: String,
}

impl RequestKind {
    fn new(action: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            label: label.into(),
        }
    }

    /// 生成带结果的描述，2xx 视为成功。
    pub fn describe(&self, status_code: u16) -> String {
        let outcome = if (200..300).contains(&status_code) {
            "成功"
        } else {
            "失败"
        };
        format!("{}{}", self.label, outcome)
    }
}

/// 请求的中文描述，例如 `删除角色成功`。
pub fn describe_request(method: &str, path: &str, status_code: u16) -> String {
    classify_request(method, path).describe(status_code)
}

/// 资源名、日志中使用的名词
const CRUD_RESOURCES: [(&str, &str); 7] = [
    ("role", "角色"),
    ("menu", "菜单"),
    ("permission", "权限"),
    ("company", "企业"),
    ("notice", "通知"),
    ("tag", "标签"),
    ("rule", "规则"),
];

/// 根据请求方法和路径推导操作类型。
pub fn classify_request(method: &str, path: &str) -> RequestKind {
    let method = method.to_ascii_uppercase();
    let path = path.to_lowercase();

    if path.contains("/login/account") || path.ends_with("/auth/login") {
        return RequestKind::new("login", "用户登录");
    }
    if path.contains("/login/outlogin") || path.ends_with("/auth/logout") {
        return RequestKind::new("logout", "用户登出");
    }
    if path.contains("/refresh-token") {
        return RequestKind::new("refresh_token", "刷新Token");
    }
    if path.contains("/register") {
        return RequestKind::new("register", "注册");
    }
    if path.contains("/activity-logs") {
        return RequestKind::new("view_activity_logs", "查看活动日志");
    }
    if path.contains("/currentuser") || path.contains("/current-user") {
        return RequestKind::new("view_current_user", "查看当前用户");
    }

    let segment = resource_segment(&path);
    if segment == "user" {
        return classify_user_request(&method, &path);
    }
    if let Some((resource, noun)) = CRUD_RESOURCES.iter().find(|(name, _)| *name == segment) {
        return crud_kind(&method, resource, noun);
    }

    RequestKind::new(
        format!("{}_request", method.to_lowercase()),
        format!("{method} {path} 请求"),
    )
}

/// `/api/roles/1` -> `role`
fn resource_segment(path: &str) -> &str {
    let trimmed = path.trim_start_matches('/');
    let trimmed = trimmed.strip_prefix("api/").unwrap_or(trimmed);
    let segment = trimmed.split('/').next().unwrap_or_default();
    segment.strip_suffix('s').unwrap_or(segment)
}

fn classify_user_request(method: &str, path: &str) -> RequestKind {
    if path.contains("/profile") {
        if path.contains("/password") {
            return RequestKind::new("change_password", "修改密码");
        }
        return if method == "GET" {
            RequestKind::new("view_profile", "查看个人信息")
        } else {
            RequestKind::new("update_profile", "更新个人信息")
        };
    }
    if path.contains("/my-permissions") {
        return RequestKind::new("view_my_permissions", "查看我的权限");
    }
    if path.contains("/custom-permissions") {
        return RequestKind::new("update_user_permissions", "更新用户权限");
    }
    if path.contains("/activate") {
        return RequestKind::new("activate_user", "启用用户");
    }
    if path.contains("/deactivate") {
        return RequestKind::new("deactivate_user", "禁用用户");
    }
    if path.contains("/bulk-action") {
        return RequestKind::new("bulk_action", "批量操作用户");
    }
    if path.contains("/role") {
        return RequestKind::new("update_user_role", "更新用户角色");
    }
    if path.contains("/management") {
        return RequestKind::new("create_user", "创建用户");
    }
    if path.contains("/list") {
        return RequestKind::new("view_users", "查看用户列表");
    }
    if path.contains("/statistics") {
        return RequestKind::new("view_statistics", "查看用户统计");
    }
    match method {
        "GET" => RequestKind::new("view_user", "查看用户"),
        "POST" => RequestKind::new("create_user", "创建用户"),
        "PUT" => RequestKind::new("update_user", "更新用户"),
        "DELETE" => RequestKind::new("delete_user", "删除用户"),
        _ => RequestKind::new("user_operation", "用户操作"),
    }
}

fn crud_kind(method: &str, resource: &str, noun: &str) -> RequestKind {
    match method {
        "GET" => RequestKind::new(format!("view_{resource}s"), format!("查看{noun}")),
        "POST" => RequestKind::new(format!("create_{resource}"), format!("创建{noun}")),
        "PUT" => RequestKind::new(format!("update_{resource}"), format!("更新{noun}")),
        "DELETE" => RequestKind::new(format!("delete_{resource}"), format!("删除{noun}")),
        _ => RequestKind::new(format!("{resource}_operation"), format!("{noun}操作")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn auth_paths_map_to_session_actions() {
        assert_eq!(classify_request("POST", "/api/auth/login").action, "login");
        assert_eq!(classify_request("POST", "/api/login/account").action, "login");
        assert_eq!(classify_request("POST", "/api/auth/logout").action, "logout");
        assert_eq!(
            classify_request("POST", "/api/company/register").action,
            "register"
        );
    }

    #[test]
    fn user_sub_resources_take_precedence_over_method() {
        assert_eq!(
            classify_request("PUT", "/api/user/profile/password").action,
            "change_password"
        );
        assert_eq!(
            classify_request("PUT", "/api/user/1/deactivate").action,
            "deactivate_user"
        );
        assert_eq!(
            classify_request("PUT", "/api/user/1/activate").action,
            "activate_user"
        );
        assert_eq!(
            classify_request("PUT", "/api/user/1/roles").action,
            "update_user_role"
        );
        assert_eq!(classify_request("DELETE", "/api/user/1").action, "delete_user");
    }

    #[test]
    fn crud_resources_and_fallback() {
        assert_eq!(classify_request("get", "/api/role").action, "view_roles");
        assert_eq!(classify_request("DELETE", "/api/menu/1").action, "delete_menu");
        assert_eq!(
            classify_request("GET", "/api/auth/current-user").action,
            "view_current_user"
        );
        assert_eq!(classify_request("PATCH", "/api/other").action, "patch_request");
        assert_eq!(
            classify_request("GET", "/api/menu/user-menus").action,
            "view_menus"
        );
        assert_eq!(
            classify_request("GET", "/api/permission/by-resource/user").action,
            "view_permissions"
        );
    }

    #[test]
    fn description_reflects_status() {
        let kind = classify_request("POST", "/api/auth/login");
        assert_eq!(kind.describe(200), "用户登录成功");
        assert_eq!(kind.describe(401), "用户登录失败");
        assert_eq!(describe_request("DELETE", "/api/role/7", 500), "删除角色失败");
    }

    #[test]
    fn anonymous_request_gets_placeholder_username() {
        let log = UserActivityLog::from_request(HttpRequestRecord {
            user_id: None,
            username: None,
            http_method: "GET".into(),
            path: "/api/menu/tree".into(),
            query_string: None,
            status_code: 200,
            duration_ms: 3,
            ip_address: None,
            user_agent: None,
            occurred_at: Utc::now(),
        });
        assert_eq!(log.username, ANONYMOUS_USERNAME);
        assert_eq!(log.action, "view_menus");
        assert_eq!(log.description, "查看菜单成功");
    }
}
