//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types. Use these for the session signing key,
//! bearer tokens and database credentials.
//!
//! `SecretBox<T>` and `SecretString` implement `Debug` with redaction, so a
//! struct deriving `Debug` that holds one of them logs safely. Secrets are
//! zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct SigningConfig {
//!     issuer: String,
//!     key: SecretString,
//! }
//!
//! let config = SigningConfig {
//!     issuer: "roomkey".to_string(),
//!     key: SecretString::from("0123456789abcdef0123456789abcdef"),
//! };
//!
//! // Debug output never contains the key
//! assert!(!format!("{:?}", config).contains("0123456789abcdef"));
//!
//! // Reading the value is always explicit
//! let key: &str = config.key.expose_secret();
//! assert_eq!(key.len(), 32);
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
