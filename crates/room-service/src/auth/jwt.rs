//! HS256 session token validation.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only HS256 is accepted; the header algorithm is checked before the
//!   signature so `none` and asymmetric algorithms never reach verification
//! - Expiration and issued-at claims are validated with clock skew tolerance
//! - Every failure returns the same generic message

use crate::auth::{invalid_token, SessionAuthenticator};
use crate::errors::RoomError;
use common::jwt::{require_session_alg, validate_iat, SessionClaims};
use common::types::UserId;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::time::Duration;
use tracing::instrument;

/// Session token validator keyed by a shared HMAC secret.
pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    validation: Validation,
    clock_skew: Duration,
}

impl JwtAuthenticator {
    /// Create a validator for tokens signed with `secret`.
    ///
    /// `clock_skew` bounds how far in the future `iat` may be and how far in
    /// the past `exp` may be.
    pub fn new(secret: &[u8], clock_skew: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = clock_skew.as_secs();
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            clock_skew,
        }
    }

    /// Validate a token and return its claims.
    ///
    /// # Security Checks
    ///
    /// 1. Size check and algorithm check on the raw header
    /// 2. HMAC signature
    /// 3. `exp` claim
    /// 4. `iat` claim with clock skew tolerance
    #[instrument(skip_all, name = "room.auth.validate")]
    pub fn validate(&self, token: &str) -> Result<SessionClaims, RoomError> {
        require_session_alg(token).map_err(|e| {
            tracing::debug!(target: "room.auth.jwt", error = ?e, "Token header rejected");
            invalid_token()
        })?;

        let token_data =
            decode::<SessionClaims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                tracing::debug!(target: "room.auth.jwt", error = %e, "Token verification failed");
                invalid_token()
            })?;

        if let Err(e) = validate_iat(token_data.claims.iat, self.clock_skew) {
            tracing::debug!(target: "room.auth.jwt", error = ?e, "Token iat validation failed");
            return Err(invalid_token());
        }

        Ok(token_data.claims)
    }
}

impl SessionAuthenticator for JwtAuthenticator {
    fn authenticate(&self, token: &str) -> Result<UserId, RoomError> {
        let claims = self.validate(token)?;
        let user_id = claims.sub.parse::<UserId>().map_err(|e| {
            tracing::debug!(target: "room.auth.jwt", error = %e, "Token subject is not a user id");
            invalid_token()
        })?;

        tracing::debug!(target: "room.auth.jwt", user_id = %user_id, "Token validated successfully");
        Ok(user_id)
    }
}
