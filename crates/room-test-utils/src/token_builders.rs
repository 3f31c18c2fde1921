//! Session token builder for tests.

use chrono::{Duration, Utc};
use common::jwt::SessionClaims;
use common::types::UserId;
use jsonwebtoken::{encode, EncodingKey, Header};

/// Builder for signed HS256 session tokens.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user(user_id)
///     .expires_in(60)
///     .sign(TEST_JWT_SECRET);
/// ```
pub struct TestTokenBuilder {
    sub: String,
    exp: i64,
    iat: i64,
}

impl TestTokenBuilder {
    /// A token for a fresh user, valid for one hour.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: UserId::new().to_string(),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.sub = user_id.to_string();
        self
    }

    /// Raw subject, for tokens whose `sub` is not a user id.
    pub fn with_subject(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set expiration in seconds from now (negative for expired tokens).
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    pub fn claims(self) -> SessionClaims {
        SessionClaims {
            sub: self.sub,
            exp: self.exp,
            iat: self.iat,
        }
    }

    /// Sign the claims with `secret`.
    pub fn sign(self, secret: &[u8]) -> String {
        encode(
            &Header::default(),
            &self.claims(),
            &EncodingKey::from_secret(secret),
        )
        .expect("HS256 encoding of test claims cannot fail")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_subject_and_expiry() {
        let user = UserId::new();
        let claims = TestTokenBuilder::new()
            .for_user(user)
            .expires_in(-10)
            .claims();

        assert_eq!(claims.sub, user.to_string());
        assert!(claims.exp < Utc::now().timestamp());
    }

    #[test]
    fn test_signed_token_is_three_part_jwt() {
        let token = TestTokenBuilder::default().sign(b"secret");
        assert_eq!(token.split('.').count(), 3);
    }
}
