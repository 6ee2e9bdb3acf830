//! Authentication of principals by name and password.
//!
//! Passwords are never stored. A principal carries an Argon2 PHC hash string
//! in its [`PASSWORD_HASH_PROPERTY`] property and a login attempt is verified
//! against that hash.

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AuthzError, Result};
use crate::service::PersistentService;
use crate::types::Principal;

/// Principal property holding the Argon2 hash of the password.
pub const PASSWORD_HASH_PROPERTY: &str = "password_hash";

/// Turns credentials into a principal.
pub trait AuthenticationService: Send + Sync {
    /// The principal matching `username` and `password`, or `None` when the
    /// credentials do not match any principal.
    fn authenticate(&self, username: &str, password: &str) -> Option<Principal>;
}

/// Authenticates principals held by a [`PersistentService`].
pub struct PasswordAuthenticationService {
    persistence: Arc<dyn PersistentService>,
}

impl PasswordAuthenticationService {
    pub fn new(persistence: Arc<dyn PersistentService>) -> Self {
        Self { persistence }
    }
}

impl AuthenticationService for PasswordAuthenticationService {
    fn authenticate(&self, username: &str, password: &str) -> Option<Principal> {
        if username.trim().is_empty() || password.is_empty() {
            return None;
        }

        let Some(principal) = self.persistence.find_principal(username) else {
            debug!("Authentication failed: no principal '{}'", username);
            return None;
        };
        let Some(hash) = principal.property(PASSWORD_HASH_PROPERTY) else {
            debug!("Authentication failed: '{}' has no password", username);
            return None;
        };

        if verify_password(password, hash) {
            debug!("Authenticated principal '{}'", principal.name());
            Some(principal)
        } else {
            debug!("Authentication failed: wrong password for '{}'", username);
            None
        }
    }
}

/// Hash a password into an Argon2 PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthzError::Credential(format!("Failed to hash password: {}", e)))
}

/// Check a password against an Argon2 PHC string.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is malformed: {}", e);
            false
        }
    }
}
