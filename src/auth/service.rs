//! Credential checks and session tokens.
//!
//! Sign-in and token verification report failure as `Ok(None)`: a wrong
//! password, an unknown email, or a bad, expired or missing token all mean
//! "no authenticated user". Callers treat that as an anonymous context.
//! `Err` is reserved for store and hashing failures.

use std::sync::Arc;

use crate::auth::password::PasswordHasher;
use crate::auth::token::TokenService;
use crate::db::models::{AuthPayload, User, UserInput};
use crate::db::user_repository::UserRepository;
use crate::error::AppError;

#[derive(Clone)]
pub struct AuthService {
    hasher: Arc<dyn PasswordHasher>,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(hasher: Arc<dyn PasswordHasher>, tokens: TokenService) -> Self {
        Self { hasher, tokens }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn authenticate_user(
        &self,
        password: &str,
        email: &str,
        users: &UserRepository,
    ) -> Result<Option<AuthPayload>, AppError> {
        let Some(user) = users.find_by_email(email).await? else {
            tracing::info!("Sign-in for unknown email");
            return Ok(None);
        };

        if !self.hasher.verify(password, &user.password_hash).await? {
            tracing::info!(user = %user.id, "Sign-in with wrong password");
            return Ok(None);
        }

        let token = self.tokens.sign(user.id)?;
        tracing::info!(user = %user.id, "User signed in");
        Ok(Some(AuthPayload { token, user }))
    }

    /// Resolve the user behind a token. Accepts an optional `Bearer ` prefix.
    pub async fn verify_token(
        &self,
        token: Option<&str>,
        users: &UserRepository,
    ) -> Result<Option<User>, AppError> {
        let Some(token) = token
            .map(|t| t.trim())
            .map(|t| t.strip_prefix("Bearer ").unwrap_or(t).trim())
            .filter(|t| !t.is_empty())
        else {
            return Ok(None);
        };

        let claims = match self.tokens.verify(token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::debug!(error = %err, "Rejected token");
                return Ok(None);
            }
        };

        users.get_user_by_id(Some(claims.sub.as_str())).await
    }

    /// Create the account and sign it in.
    pub async fn sign_up(
        &self,
        input: UserInput,
        users: &UserRepository,
    ) -> Result<AuthPayload, AppError> {
        let user = users.create_user(input).await?;
        let token = self.tokens.sign(user.id)?;
        Ok(AuthPayload { token, user })
    }
}
