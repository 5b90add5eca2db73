use application::{password::PasswordHasherError, PasswordHasher};
use async_trait::async_trait;
use bcrypt::{hash, verify, DEFAULT_COST};

#[derive(Clone)]
pub struct BcryptPasswordHasher {
    cost: u32,
}

impl BcryptPasswordHasher {
    pub fn new(cost: Option<u32>) -> Self {
        Self {
            cost: cost.unwrap_or(DEFAULT_COST),
        }
    }
}

#[async_trait]
impl PasswordHasher for BcryptPasswordHasher {
    async fn hash(&self, plaintext: &str) -> Result<String, PasswordHasherError> {
        let cost = self.cost;
        let plaintext = plaintext.to_owned();
        tokio::task::spawn_blocking(move || hash(plaintext, cost))
            .await
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))
            .and_then(|res| res.map_err(|err| PasswordHasherError::hash_error(err.to_string())))
    }

    /// 非 bcrypt 格式的哈希视为不匹配，而不是报错
    async fn verify(&self, plaintext: &str, hashed: &str) -> Result<bool, PasswordHasherError> {
        let plaintext = plaintext.to_owned();
        let hashed = hashed.to_owned();
        let outcome = tokio::task::spawn_blocking(move || verify(plaintext, &hashed))
            .await
            .map_err(|err| PasswordHasherError::verify_error(err.to_string()))?;
        match outcome {
            Ok(matches) => Ok(matches),
            Err(err) => {
                tracing::warn!(error = %err, "stored password hash is not a valid bcrypt hash");
                Ok(false)
            }
        }
    }
}

impl Default for BcryptPasswordHasher {
    fn default() -> Self {
        Self::new(Some(DEFAULT_COST))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let hasher = BcryptPasswordHasher::new(Some(4));
        let hashed = hasher.hash("secret-password").await.unwrap();
        assert_ne!(hashed, "secret-password");
        assert!(hasher.verify("secret-password", &hashed).await.unwrap());
        assert!(!hasher.verify("other-password", &hashed).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_hash_does_not_match() {
        let hasher = BcryptPasswordHasher::new(Some(4));
        assert!(!hasher.verify("secret", "not-a-hash").await.unwrap());
    }
}
