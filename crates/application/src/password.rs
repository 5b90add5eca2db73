use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordHasherError {
    #[error("hash error: {0}")]
    Hash(String),
    #[error("verify error: {0}")]
    Verify(String),
}

impl PasswordHasherError {
    pub fn hash_error(message: impl Into<String>) -> Self {
        Self::Hash(message.into())
    }

    pub fn verify_error(message: impl Into<String>) -> Self {
        Self::Verify(message.into())
    }
}

/// 密码哈希抽象，哈希结果以字符串形式保存在 [`domain::AppUser::password_hash`]
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, plaintext: &str) -> Result<String, PasswordHasherError>;
    async fn verify(&self, plaintext: &str, hashed: &str) -> Result<bool, PasswordHasherError>;
}

/// 密码强度的最低要求
pub fn validate_password(plaintext: &str) -> Result<(), domain::DomainError> {
    if plaintext.chars().count() < 6 {
        return Err(domain::DomainError::validation_error(
            "password",
            "密码长度至少6个字符",
        ));
    }
    if plaintext.len() > 72 {
        return Err(domain::DomainError::validation_error(
            "password",
            "密码长度不能超过72个字节",
        ));
    }
    Ok(())
}
