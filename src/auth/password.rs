use async_trait::async_trait;

use crate::error::AppError;

/// One-way password hashing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, plaintext: &str) -> Result<String, AppError>;

    /// `Ok(false)` on mismatch; `Err` only when the hash itself is unusable.
    async fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, AppError>;
}

pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;

/// Bcrypt hashing on the blocking thread pool.
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_COST, MAX_COST),
        }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

#[async_trait]
impl PasswordHasher for BcryptHasher {
    async fn hash(&self, plaintext: &str) -> Result<String, AppError> {
        let plaintext = plaintext.to_owned();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {e}")))?
            .map_err(|e| AppError::Auth(format!("Failed to hash password: {e}")))
    }

    async fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, AppError> {
        let plaintext = plaintext.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {e}")))?
            .map_err(|e| AppError::Auth(format!("Failed to verify password: {e}")))
    }
}
