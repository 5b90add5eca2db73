//! 企业（租户）与成员关系

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{CompanyId, RoleId, Timestamp, UserId};

/// 企业实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    /// 企业代码（全局唯一，小写）
    pub code: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing, default)]
    pub is_deleted: bool,
}

impl Company {
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        description: Option<String>,
        now: Timestamp,
    ) -> DomainResult<Self> {
        let name = name.into().trim().to_owned();
        let code = code.into().trim().to_lowercase();
        if name.is_empty() {
            return Err(DomainError::validation_error("name", "企业名称不能为空"));
        }
        if code.len() < 2
            || !code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DomainError::validation_error(
                "code",
                "企业代码至少2个字符，只能包含字母、数字、下划线和短横线",
            ));
        }
        Ok(Self {
            id: CompanyId::generate(),
            name,
            code,
            description,
            is_active: true,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        })
    }
}

/// 成员状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Pending,
    Rejected,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Pending => "pending",
            MembershipStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(MembershipStatus::Active),
            "pending" => Some(MembershipStatus::Pending),
            "rejected" => Some(MembershipStatus::Rejected),
            _ => None,
        }
    }
}

/// 用户在某个企业中的成员关系，承载该企业内的角色。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCompany {
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub role_ids: Vec<RoleId>,
    pub is_admin: bool,
    pub status: MembershipStatus,
    pub joined_at: Timestamp,
    pub updated_at: Timestamp,
}

impl UserCompany {
    pub fn new(user_id: UserId, company_id: CompanyId, now: Timestamp) -> Self {
        Self {
            user_id,
            company_id,
            role_ids: Vec::new(),
            is_admin: false,
            status: MembershipStatus::Active,
            joined_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }
}
