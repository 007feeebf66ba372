use async_trait::async_trait;

use super::user_models::{Credentials, UserContext};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

/// Identity backend consulted by the `authenticate` method.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Maps credentials to the identity of the caller.
    /// Returns Err(AuthError::InvalidCredentials) when they do not match any user.
    async fn authenticate(&self, credentials: &Credentials) -> Result<UserContext, AuthError>;

    /// Returns the user with the given id, if it exists.
    async fn get_user(&self, user_id: &str) -> Option<UserContext>;

    /// Number of users known to the store.
    async fn user_count(&self) -> usize;
}
