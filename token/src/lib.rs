//! Signed, expiring, opaque credentials.
//!
//! A token carries a subject id (`oid`), an expiry instant (`due`, epoch
//! milliseconds) and an ordered list of payload strings. The fields are
//! joined with `|`, sealed with AES-256-GCM under a key derived from a
//! shared secret, and encoded as URL-safe base64. Nothing is stored on the
//! server; revocation is left to the host.
//!
//! Parsing never fails. A token that cannot be opened, whether malformed,
//! truncated, tampered with or sealed under another secret, parses to an
//! empty token marked expired.
//!
//! ```rust
//! use token::{Life, TokenCodec};
//!
//! let codec = TokenCodec::new(b"a shared secret");
//! let minted = codec.mint(Life::OneHour, "user-1", &["a", "b"]).unwrap();
//!
//! let parsed = codec.parse(&minted);
//! assert_eq!(parsed.oid, "user-1");
//! assert!(!parsed.expired);
//! assert_eq!(parsed.payload, vec!["a", "b"]);
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod life;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TokenConfig;
pub use error::{Result, TokenError};
pub use life::Life;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const SEPARATOR: char = '|';
const NONCE_LEN: usize = 12;

/// A parsed token.
///
/// `oid` and `due` stay populated on an expired token so callers can tell
/// who it belonged to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub oid: String,
    /// Expiry in epoch milliseconds, 0 when unknown
    pub due: i64,
    pub expired: bool,
    pub payload: Vec<String>,
}

impl Token {
    fn rejected() -> Self {
        Self {
            expired: true,
            ..Self::default()
        }
    }

    /// True when the token carries no subject.
    pub fn is_empty(&self) -> bool {
        self.oid.is_empty()
    }

    /// True for a token with a subject that had not expired when parsed.
    pub fn is_valid(&self) -> bool {
        !self.expired && !self.is_empty()
    }

    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        if self.due <= 0 {
            return None;
        }
        Utc.timestamp_millis_opt(self.due).single()
    }
}

/// Mints and parses tokens under one secret.
#[derive(Clone)]
pub struct TokenCodec {
    key: [u8; 32],
    default_life: Life,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Derive the encryption key from `secret`.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let digest = Sha256::digest(secret.as_ref());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self {
            key,
            default_life: Life::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn from_config(config: &TokenConfig) -> Self {
        Self::new(&config.secret_key).with_default_life(config.default_life)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_default_life(mut self, life: Life) -> Self {
        self.default_life = life;
        self
    }

    pub fn default_life(&self) -> Life {
        self.default_life
    }

    /// Mint a token for `oid` that expires `life` from now.
    ///
    /// Fields may not contain `|`, and `oid` may not be blank.
    pub fn mint(&self, life: Life, oid: &str, payload: &[&str]) -> Result<String> {
        if oid.trim().is_empty() {
            return Err(TokenError::InvalidField("oid cannot be empty".to_string()));
        }
        for field in std::iter::once(&oid).chain(payload) {
            if field.contains(SEPARATOR) {
                return Err(TokenError::InvalidField(format!(
                    "fields cannot contain '{}'",
                    SEPARATOR
                )));
            }
        }

        let due = self.clock.now_millis() + life.millis();
        let mut plain = format!("{}{}{}", oid, SEPARATOR, due);
        for field in payload {
            plain.push(SEPARATOR);
            plain.push_str(field);
        }

        let sealed = self.encrypt(plain.as_bytes())?;
        debug!("Minted token for '{}' valid for {}", oid, life);
        Ok(BASE64.encode(sealed))
    }

    /// Mint with the default lifetime.
    pub fn mint_default(&self, oid: &str, payload: &[&str]) -> Result<String> {
        self.mint(self.default_life, oid, payload)
    }

    /// Parse a token. Never fails; problems are reported on the token.
    pub fn parse(&self, token: &str) -> Token {
        let token = token.trim();
        if token.is_empty() {
            return Token::default();
        }

        let plain = match self.open(token) {
            Some(plain) => plain,
            None => return Token::rejected(),
        };

        let mut fields = plain.split(SEPARATOR);
        let (oid, due) = match (fields.next(), fields.next()) {
            (Some(oid), Some(due)) => (oid, due),
            _ => {
                debug!("Token has fewer than two fields");
                return Token::default();
            }
        };

        let mut parsed = Token {
            oid: oid.to_string(),
            ..Token::default()
        };
        parsed.due = match due.parse::<i64>() {
            Ok(due) if due > 0 => due,
            _ => {
                debug!("Token for '{}' has an invalid due", oid);
                parsed.expired = true;
                return parsed;
            }
        };

        if parsed.due <= self.clock.now_millis() {
            debug!("Token for '{}' expired", oid);
            parsed.expired = true;
            return parsed;
        }

        parsed.payload = fields.map(str::to_string).collect();
        parsed
    }

    /// True only for an unexpired token belonging to `oid`.
    pub fn is_valid(&self, oid: &str, token: &str) -> bool {
        let parsed = self.parse(token);
        parsed.is_valid() && parsed.oid == oid
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| TokenError::Encryption(format!("Failed to create cipher: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| TokenError::Encryption(format!("Encryption failed: {}", e)))?;

        // Prepend nonce to ciphertext
        let mut sealed = nonce_bytes.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decode, authenticate and decrypt. `None` for anything not sealed by
    /// this codec's key.
    fn open(&self, token: &str) -> Option<String> {
        let sealed = match BASE64.decode(token.as_bytes()) {
            Ok(sealed) => sealed,
            Err(e) => {
                debug!("Token is not valid base64: {}", e);
                return None;
            }
        };
        if sealed.len() <= NONCE_LEN {
            debug!("Token too short");
            return None;
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key).ok()?;
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let plain = match cipher.decrypt(Nonce::from_slice(nonce_bytes), ciphertext) {
            Ok(plain) => plain,
            Err(_) => {
                debug!("Token failed authentication");
                return None;
            }
        };
        String::from_utf8(plain).ok()
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("key", &"<redacted>")
            .field("default_life", &self.default_life)
            .finish_non_exhaustive()
    }
}

/// Mint a token under `secret`.
pub fn mint(secret: impl AsRef<[u8]>, life: Life, oid: &str, payload: &[&str]) -> Result<String> {
    TokenCodec::new(secret).mint(life, oid, payload)
}

/// Parse a token minted under `secret`.
pub fn parse(secret: impl AsRef<[u8]>, token: &str) -> Token {
    TokenCodec::new(secret).parse(token)
}

/// True only for an unexpired token minted under `secret` for `oid`.
pub fn is_valid(secret: impl AsRef<[u8]>, oid: &str, token: &str) -> bool {
    TokenCodec::new(secret).is_valid(oid, token)
}

/// A fresh random secret, URL-safe base64 encoded as `TOKEN_SECRET_KEY`
/// expects.
pub fn generate_secret() -> String {
    let mut rng = rand::thread_rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    BASE64.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SECRET: &[u8] = b"test secret";

    fn codec_at(clock: &Arc<ManualClock>) -> TokenCodec {
        TokenCodec::new(SECRET).with_clock(clock.clone())
    }

    #[test]
    fn test_round_trip() {
        let minted = mint(SECRET, Life::OneHour, "user-1", &["a", "b"]).unwrap();
        let parsed = parse(SECRET, &minted);
        assert_eq!(parsed.oid, "user-1");
        assert!(!parsed.expired);
        assert_eq!(parsed.payload, vec!["a", "b"]);
        assert!(parsed.due_at().is_some());
        assert!(is_valid(SECRET, "user-1", &minted));
        assert!(!is_valid(SECRET, "user-2", &minted));
    }

    #[test]
    fn test_payload_order_and_empty_fields() {
        let codec = TokenCodec::new(SECRET);
        let minted = codec.mint(Life::OneDay, "u", &["z", "", "a"]).unwrap();
        assert_eq!(codec.parse(&minted).payload, vec!["z", "", "a"]);

        let minted = codec.mint(Life::OneDay, "u", &[]).unwrap();
        assert!(codec.parse(&minted).payload.is_empty());
    }

    #[test]
    fn test_due_is_now_plus_life() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let codec = codec_at(&clock);
        let parsed = codec.parse(&codec.mint(Life::OneWeek, "u", &[]).unwrap());
        assert_eq!(parsed.due, 1_700_000_000_000 + 604_800_000);
    }

    #[test]
    fn test_one_minute_token_expires_after_two_minutes() {
        let clock = Arc::new(ManualClock::starting_now());
        let codec = codec_at(&clock);
        let minted = codec.mint(Life::OneMin, "user-1", &["x"]).unwrap();
        assert!(codec.is_valid("user-1", &minted));

        clock.advance(Duration::from_secs(120));
        let parsed = codec.parse(&minted);
        assert!(parsed.expired);
        assert_eq!(parsed.oid, "user-1");
        assert!(parsed.due > 0);
        assert!(parsed.payload.is_empty());
        assert!(!codec.is_valid("user-1", &minted));
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let clock = Arc::new(ManualClock::new(10_000));
        let codec = codec_at(&clock);
        let minted = codec.mint(Life::OneMin, "u", &[]).unwrap();

        clock.set(10_000 + 59_999);
        assert!(!codec.parse(&minted).expired);
        clock.set(10_000 + 60_000);
        assert!(codec.parse(&minted).expired);
    }

    #[test]
    fn test_empty_input_is_empty_not_expired() {
        let parsed = parse(SECRET, "");
        assert_eq!(parsed, Token::default());
        assert!(!parsed.expired);
        assert!(parsed.is_empty());
        assert!(!parsed.is_valid());
    }

    #[test]
    fn test_flipped_bytes_are_rejected() {
        let minted = mint(SECRET, Life::OneHour, "user-1", &["a"]).unwrap();
        let sealed = BASE64.decode(minted.as_bytes()).unwrap();

        for index in [0, NONCE_LEN, sealed.len() / 2, sealed.len() - 1] {
            let mut tampered = sealed.clone();
            tampered[index] ^= 0x01;
            let parsed = parse(SECRET, &BASE64.encode(&tampered));
            assert!(parsed.expired, "byte {} flip accepted", index);
            assert!(parsed.is_empty());
        }
    }

    #[test]
    fn test_truncated_token_is_rejected() {
        let minted = mint(SECRET, Life::OneHour, "user-1", &["a"]).unwrap();
        for cut in [1, 4, minted.len() / 2, minted.len() - 1] {
            let parsed = parse(SECRET, &minted[..minted.len() - cut]);
            assert!(parsed.expired, "truncation by {} accepted", cut);
        }
    }

    #[test]
    fn test_garbage_and_wrong_secret_are_rejected() {
        assert!(parse(SECRET, "not a token at all").expired);
        assert!(parse(SECRET, "AAAA").expired);

        let minted = mint(SECRET, Life::OneHour, "user-1", &[]).unwrap();
        let parsed = parse(b"other secret", &minted);
        assert!(parsed.expired);
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_invalid_fields_rejected_at_mint() {
        let codec = TokenCodec::new(SECRET);
        assert!(matches!(
            codec.mint(Life::OneHour, " ", &[]),
            Err(TokenError::InvalidField(_))
        ));
        assert!(matches!(
            codec.mint(Life::OneHour, "a|b", &[]),
            Err(TokenError::InvalidField(_))
        ));
        assert!(matches!(
            codec.mint(Life::OneHour, "a", &["x|y"]),
            Err(TokenError::InvalidField(_))
        ));
    }

    #[test]
    fn test_malformed_plaintext_fields() {
        let codec = TokenCodec::new(SECRET);
        let seal = |plain: &str| BASE64.encode(codec.encrypt(plain.as_bytes()).unwrap());

        let parsed = codec.parse(&seal("only-oid"));
        assert_eq!(parsed, Token::default());

        let parsed = codec.parse(&seal("user-1|soon"));
        assert!(parsed.expired);
        assert_eq!(parsed.oid, "user-1");

        let parsed = codec.parse(&seal("user-1|-5|a"));
        assert!(parsed.expired);
        assert!(parsed.payload.is_empty());
    }

    #[test]
    fn test_default_life_and_config() {
        let config = TokenConfig {
            secret_key: b"configured".to_vec(),
            default_life: Life::OneMin,
        };
        let clock = Arc::new(ManualClock::new(0));
        let codec = TokenCodec::from_config(&config).with_clock(clock.clone());
        assert_eq!(codec.default_life(), Life::OneMin);

        clock.set(1_000);
        let parsed = codec.parse(&codec.mint_default("u", &[]).unwrap());
        assert_eq!(parsed.due, 61_000);
        assert!(!format!("{:?}", codec).contains("configured"));
    }

    #[test]
    fn test_generated_secrets_are_distinct() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a, b);
        assert_eq!(BASE64.decode(a.as_bytes()).unwrap().len(), 32);
    }
}
