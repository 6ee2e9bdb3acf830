//! Error types for token minting.
//!
//! Parsing never returns these: malformed, tampered and expired tokens are
//! all reported through the returned [`crate::Token`] itself.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    /// A field cannot be carried in a token.
    #[error("Invalid token field: {0}")]
    InvalidField(String),

    /// The cipher could not be initialized or failed to encrypt.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, TokenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TokenError::InvalidField("oid cannot be empty".into());
        assert_eq!(err.to_string(), "Invalid token field: oid cannot be empty");

        let err = TokenError::Configuration("TOKEN_SECRET_KEY not set".into());
        assert_eq!(err.to_string(), "Configuration error: TOKEN_SECRET_KEY not set");
    }
}
