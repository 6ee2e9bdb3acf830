use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use std::env;
use std::fmt;
use tracing::debug;

use crate::error::{Result, TokenError};
use crate::life::Life;

/// Token codec settings.
#[derive(Clone)]
pub struct TokenConfig {
    /// Secret the encryption key is derived from
    pub secret_key: Vec<u8>,
    /// Lifetime used when minting without an explicit one
    pub default_life: Life,
}

impl TokenConfig {
    /// Load token configuration, prioritizing environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let key_str = env::var("TOKEN_SECRET_KEY")
            .map_err(|_| TokenError::Configuration("TOKEN_SECRET_KEY not set".to_string()))?;
        let secret_key = BASE64
            .decode(key_str.trim().as_bytes())
            .map_err(|e| TokenError::Configuration(format!("Invalid BASE64 secret key: {}", e)))?;
        if secret_key.is_empty() {
            return Err(TokenError::Configuration(
                "TOKEN_SECRET_KEY is empty".to_string(),
            ));
        }

        let default_life = match env::var("TOKEN_DEFAULT_LIFE") {
            Ok(name) if !name.trim().is_empty() => name.parse()?,
            _ => Life::SHORT,
        };

        debug!("Loaded token config with default life {}", default_life);
        Ok(Self {
            secret_key,
            default_life,
        })
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret_key", &"<redacted>")
            .field("default_life", &self.default_life)
            .finish()
    }
}
