// Credential hashing and the credential store contract


use async_trait::async_trait;
use bcrypt::BcryptResult;

use crate::Result;

/// Unit tests hash with the minimum cost to keep the suite fast
const HASH_COST: u32 = if cfg!(test) {
    bcrypt::MIN_COST
} else {
    bcrypt::DEFAULT_COST
};

/// Identity established by a successful login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub role_id: i64,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `None` for an unknown username or a wrong password
    async fn authenticate(&self, username: &str, password: &str)
    -> Result<Option<AuthenticatedUser>>;
}

/// Salted bcrypt hash in modular crypt form (`$2b$<cost>$<salt+digest>`)
#[inline]
pub fn hash_password(password: &str) -> BcryptResult<String> {
    bcrypt::hash(password, HASH_COST)
}

/// Check `password` against a stored bcrypt hash.
///
/// Malformed stored values never verify.
#[inline]
pub fn verify_password(password: &str, encoded: &str) -> bool {
    bcrypt::verify(password, encoded).unwrap_or(false)
}
