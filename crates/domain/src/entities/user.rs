//! 用户实体定义
//!
//! 用户是全局身份，通过 [`UserCompany`](super::UserCompany) 关联到多个企业。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{CompanyId, PermissionId, Timestamp, UserId};

/// 用户实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUser {
    pub id: UserId,
    /// 用户名（唯一）
    pub username: String,
    pub email: Option<String>,
    /// 密码哈希（敏感信息，不在序列化中包含）
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    /// 当前所在企业
    pub current_company_id: Option<CompanyId>,
    /// 直接授予用户的权限，叠加在角色权限之上
    pub custom_permission_ids: Vec<PermissionId>,
    pub last_login_at: Option<Timestamp>,
    /// 平台管理员，由初始数据创建
    #[serde(default)]
    pub is_system_admin: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing, default)]
    pub is_deleted: bool,
}

impl AppUser {
    /// 创建新用户
    pub fn new(
        username: impl Into<String>,
        email: Option<String>,
        password_hash: impl Into<String>,
        now: Timestamp,
    ) -> DomainResult<Self> {
        let username = username.into().trim().to_owned();
        Self::validate_username(&username)?;
        if let Some(email) = &email {
            Self::validate_email(email)?;
        }

        Ok(Self {
            id: UserId::generate(),
            username,
            email,
            password_hash: password_hash.into(),
            display_name: None,
            is_active: true,
            current_company_id: None,
            custom_permission_ids: Vec::new(),
            last_login_at: None,
            is_system_admin: false,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        })
    }

    /// 验证用户名
    pub fn validate_username(username: &str) -> DomainResult<()> {
        if username.len() < 3 {
            return Err(DomainError::validation_error(
                "username",
                "用户名长度至少3个字符",
            ));
        }
        if username.len() > 50 {
            return Err(DomainError::validation_error(
                "username",
                "用户名长度不能超过50个字符",
            ));
        }
        if !username
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(DomainError::validation_error(
                "username",
                "用户名只能包含字母、数字、下划线、短横线和点",
            ));
        }
        Ok(())
    }

    /// 验证邮箱
    pub fn validate_email(email: &str) -> DomainResult<()> {
        let valid = email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);
        if valid {
            Ok(())
        } else {
            Err(DomainError::validation_error("email", "邮箱格式不正确"))
        }
    }

    pub fn touch(&mut self, now: Timestamp) {
        self.updated_at = now;
    }

    pub fn record_login(&mut self, now: Timestamp) {
        self.last_login_at = Some(now);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn rejects_short_username() {
        let err = AppUser::new("ab", None, "hash", Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::ValidationError { field, .. } if field == "username"));
    }

    #[test]
    fn rejects_malformed_email() {
        assert!(AppUser::new("alice", Some("nope".into()), "hash", Utc::now()).is_err());
        assert!(AppUser::new("alice", Some("a@b.io".into()), "hash", Utc::now()).is_ok());
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let user = AppUser::new("alice", None, "secret-hash", Utc::now()).unwrap();
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["username"], "alice");
    }
}
