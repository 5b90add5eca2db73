use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

entity_id!(
    /// 用户唯一标识。
    UserId
);
entity_id!(
    /// 企业（租户）唯一标识。
    CompanyId
);
entity_id!(
    /// 角色唯一标识。
    RoleId
);
entity_id!(
    /// 权限唯一标识。
    PermissionId
);
entity_id!(
    /// 菜单唯一标识。
    MenuId
);
entity_id!(ActivityLogId);

/// `resource:action` 形式的权限代码，统一为小写。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionCode(String);

impl PermissionCode {
    pub fn new(resource: &str, action: &str) -> Result<Self, DomainError> {
        let resource = resource.trim().to_lowercase();
        let action = action.trim().to_lowercase();
        if resource.is_empty() || resource.contains(':') {
            return Err(DomainError::validation_error(
                "resource",
                "must be a non-empty name without ':'",
            ));
        }
        if action.is_empty() || action.contains(':') {
            return Err(DomainError::validation_error(
                "action",
                "must be a non-empty name without ':'",
            ));
        }
        Ok(Self(format!("{resource}:{action}")))
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let (resource, action) = value.split_once(':').ok_or_else(|| {
            DomainError::validation_error("code", "expected the form resource:action")
        })?;
        Self::new(resource, action)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resource(&self) -> &str {
        self.0.split_once(':').map(|(r, _)| r).unwrap_or_default()
    }

    pub fn action(&self) -> &str {
        self.0.split_once(':').map(|(_, a)| a).unwrap_or_default()
    }
}

impl fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PermissionCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PermissionCode> for String {
    fn from(value: PermissionCode) -> Self {
        value.0
    }
}

/// 分页参数，页码从 1 开始。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(20).clamp(1, Self::MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// 分页结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub list: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(list: Vec<T>, total: u64, request: PageRequest) -> Self {
        let total_pages = total.div_ceil(u64::from(request.page_size)) as u32;
        Self {
            list,
            total,
            page: request.page,
            page_size: request.page_size,
            total_pages,
        }
    }

    /// 对已在内存中的完整集合做切片分页。
    pub fn slice(items: Vec<T>, request: PageRequest) -> Self {
        let total = items.len() as u64;
        let list = items
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.page_size as usize)
            .collect();
        Self::new(list, total, request)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            list: self.list.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_code_is_lowercased() {
        let code = PermissionCode::new(" User ", "READ").unwrap();
        assert_eq!(code.as_str(), "user:read");
        assert_eq!(code.resource(), "user");
        assert_eq!(code.action(), "read");
    }

    #[test]
    fn permission_code_rejects_missing_half() {
        assert!(PermissionCode::parse("user").is_err());
        assert!(PermissionCode::parse(":read").is_err());
        assert!(PermissionCode::parse("user:").is_err());
    }

    #[test]
    fn page_counts_partial_last_page() {
        let page = Page::slice((0..45).collect::<Vec<_>>(), PageRequest::new(Some(3), Some(20)));
        assert_eq!(page.total, 45);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.list, (40..45).collect::<Vec<_>>());
    }

    #[test]
    fn page_request_clamps_inputs() {
        let request = PageRequest::new(Some(0), Some(1_000));
        assert_eq!(request.page, 1);
        assert_eq!(request.page_size, PageRequest::MAX_PAGE_SIZE);
    }
}
