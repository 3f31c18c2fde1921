//! Session token utilities shared by Roomkey components.
//!
//! Session tokens are HS256-signed JWTs whose `sub` claim carries the user id.
//! This module owns the parts of validation that happen outside the signature
//! check:
//! - Size limits, checked before any decoding
//! - Algorithm extraction from the header
//! - Clock skew constants and `iat` validation
//! - The claims structure, with `sub` redacted in Debug output
//!
//! Every error renders the same client-facing message so a caller cannot tell
//! which check rejected the token. Details go to debug logs.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed token size in bytes (8KB).
///
/// Tokens larger than this are rejected before base64 decoding or HMAC
/// verification. A typical session token is well under 300 bytes.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default clock skew tolerance for the `iat` claim (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum configurable clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// The only signing algorithm accepted for session tokens.
pub const SESSION_TOKEN_ALG: &str = "HS256";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during token validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is not a three-part JWT or its header cannot be decoded.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Header `alg` is missing or not [`SESSION_TOKEN_ALG`].
    #[error("The access token is invalid or expired")]
    UnsupportedAlgorithm,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Claims Types
// =============================================================================

/// Claims carried by a user session token.
///
/// `sub` is the user id as a UUID string. It is redacted in Debug output.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user id).
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,
}

impl fmt::Debug for SessionClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClaims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .finish()
    }
}

impl SessionClaims {
    /// Creates claims for `sub` issued at `iat` and valid for `ttl`.
    #[must_use]
    pub fn new(sub: impl Into<String>, iat: i64, ttl: Duration) -> Self {
        #[allow(clippy::cast_possible_wrap)]
        let ttl_secs = ttl.as_secs() as i64;
        Self {
            sub: sub.into(),
            exp: iat.saturating_add(ttl_secs),
            iat,
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Reject tokens larger than [`MAX_JWT_SIZE_BYTES`].
///
/// # Errors
///
/// Returns `JwtValidationError::TokenTooLarge` if the token is oversized.
pub fn check_token_size(token: &str) -> Result<(), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }
    Ok(())
}

/// Extract the `alg` header value without verifying the signature.
///
/// The size limit is enforced first.
///
/// # Errors
///
/// - `TokenTooLarge` if the token exceeds the size limit
/// - `MalformedToken` if the token is not three dot-separated parts or the
///   header is not base64url-encoded JSON
/// - `UnsupportedAlgorithm` if the header has no string `alg`
pub fn extract_alg(token: &str) -> Result<String, JwtValidationError> {
    check_token_size(token)?;

    let mut parts = token.split('.');
    let header_part = parts.next().ok_or(JwtValidationError::MalformedToken)?;
    if parts.count() != 2 {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    }

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    header
        .get("alg")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::UnsupportedAlgorithm)
}

/// Require the header algorithm to be [`SESSION_TOKEN_ALG`].
///
/// # Errors
///
/// Same as [`extract_alg`], plus `UnsupportedAlgorithm` for any other value.
pub fn require_session_alg(token: &str) -> Result<(), JwtValidationError> {
    let alg = extract_alg(token)?;
    if alg != SESSION_TOKEN_ALG {
        tracing::debug!(target: "common.jwt", alg = %alg, "Token rejected: unsupported algorithm");
        return Err(JwtValidationError::UnsupportedAlgorithm);
    }
    Ok(())
}

/// Validate the `iat` claim against the current time with `clock_skew` tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if `iat` is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // clock_skew is bounded by MAX_CLOCK_SKEW
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token_with_header(header: &str) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let payload_b64 = URL_SAFE_NO_PAD.encode(r#"{"sub":"x"}"#);
        format!("{header_b64}.{payload_b64}.c2lnbmF0dXJl")
    }

    // -------------------------------------------------------------------------
    // Constants
    // -------------------------------------------------------------------------

    #[test]
    fn test_max_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    #[test]
    fn test_clock_skew_bounds() {
        assert_eq!(DEFAULT_CLOCK_SKEW, Duration::from_secs(300));
        assert_eq!(MAX_CLOCK_SKEW, Duration::from_secs(600));
        assert!(DEFAULT_CLOCK_SKEW <= MAX_CLOCK_SKEW);
    }

    // -------------------------------------------------------------------------
    // Size and header checks
    // -------------------------------------------------------------------------

    #[test]
    fn test_check_token_size_at_limit_passes() {
        let token = "a".repeat(MAX_JWT_SIZE_BYTES);
        assert!(check_token_size(&token).is_ok());
    }

    #[test]
    fn test_check_token_size_over_limit_rejected() {
        let token = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(
            check_token_size(&token),
            Err(JwtValidationError::TokenTooLarge)
        );
    }

    #[test]
    fn test_extract_alg_hs256() {
        let token = token_with_header(r#"{"alg":"HS256","typ":"JWT"}"#);
        assert_eq!(extract_alg(&token).unwrap(), "HS256");
        assert!(require_session_alg(&token).is_ok());
    }

    #[test]
    fn test_require_session_alg_rejects_other_algorithms() {
        for alg in ["none", "RS256", "EdDSA", "HS512"] {
            let token = token_with_header(&format!(r#"{{"alg":"{alg}"}}"#));
            assert_eq!(
                require_session_alg(&token),
                Err(JwtValidationError::UnsupportedAlgorithm),
                "alg {alg} should be rejected"
            );
        }
    }

    #[test]
    fn test_extract_alg_missing_alg() {
        let token = token_with_header(r#"{"typ":"JWT"}"#);
        assert_eq!(
            extract_alg(&token),
            Err(JwtValidationError::UnsupportedAlgorithm)
        );
    }

    #[test]
    fn test_extract_alg_non_string_alg() {
        let token = token_with_header(r#"{"alg":256}"#);
        assert_eq!(
            extract_alg(&token),
            Err(JwtValidationError::UnsupportedAlgorithm)
        );
    }

    #[test]
    fn test_extract_alg_malformed_tokens() {
        for token in ["", "not-a-jwt", "a.b", "a.b.c.d", "!!!.e30.sig"] {
            assert_eq!(
                extract_alg(token),
                Err(JwtValidationError::MalformedToken),
                "token {token:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_extract_alg_header_not_json() {
        let header_b64 = URL_SAFE_NO_PAD.encode("not json");
        let token = format!("{header_b64}.e30.sig");
        assert_eq!(extract_alg(&token), Err(JwtValidationError::MalformedToken));
    }

    #[test]
    fn test_extract_alg_oversized_token() {
        let token = format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256"}"#),
            "a".repeat(MAX_JWT_SIZE_BYTES)
        );
        assert_eq!(extract_alg(&token), Err(JwtValidationError::TokenTooLarge));
    }

    // -------------------------------------------------------------------------
    // iat
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_iat_current_time() {
        let now = chrono::Utc::now().timestamp();
        assert!(validate_iat(now, DEFAULT_CLOCK_SKEW).is_ok());
    }

    #[test]
    fn test_validate_iat_past_time() {
        let now = 1_700_000_000;
        assert!(validate_iat_at(now - 86_400, DEFAULT_CLOCK_SKEW, now).is_ok());
    }

    #[test]
    fn test_validate_iat_at_clock_skew_boundary() {
        let now = 1_700_000_000;
        assert!(validate_iat_at(now + 300, DEFAULT_CLOCK_SKEW, now).is_ok());
        assert_eq!(
            validate_iat_at(now + 301, DEFAULT_CLOCK_SKEW, now),
            Err(JwtValidationError::IatTooFarInFuture)
        );
    }

    #[test]
    fn test_validate_iat_custom_skew() {
        let now = 1_700_000_000;
        let skew = Duration::from_secs(1);
        assert!(validate_iat_at(now + 1, skew, now).is_ok());
        assert!(validate_iat_at(now + 2, skew, now).is_err());
    }

    // -------------------------------------------------------------------------
    // Claims
    // -------------------------------------------------------------------------

    #[test]
    fn test_session_claims_debug_redacts_sub() {
        let claims = SessionClaims::new(
            "0b5f1a52-4a0e-4bd1-9f8e-5c5e3f0c7d11",
            1_700_000_000,
            Duration::from_secs(3600),
        );
        let debug = format!("{claims:?}");
        assert!(!debug.contains("0b5f1a52"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("1700000000"));
    }

    #[test]
    fn test_session_claims_new_sets_expiry() {
        let claims = SessionClaims::new("u", 100, Duration::from_secs(60));
        assert_eq!(claims.iat, 100);
        assert_eq!(claims.exp, 160);
    }

    #[test]
    fn test_session_claims_deserialize() {
        let json = r#"{"sub":"abc","exp":20,"iat":10}"#;
        let claims: SessionClaims = serde_json::from_str(json).unwrap();
        assert_eq!(claims.sub, "abc");
        assert_eq!(claims.exp, 20);
        assert_eq!(claims.iat, 10);
    }

    #[test]
    fn test_all_errors_share_client_message() {
        let errors = [
            JwtValidationError::TokenTooLarge,
            JwtValidationError::MalformedToken,
            JwtValidationError::UnsupportedAlgorithm,
            JwtValidationError::IatTooFarInFuture,
        ];
        for err in errors {
            assert_eq!(err.to_string(), "The access token is invalid or expired");
        }
    }
}
