//! Configuration for authorization contexts and logging.
//!
//! Values load from the environment (and a `.env` file if present), falling
//! back to defaults for anything unset.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::debug;

use crate::error::{AuthzError, Result};

/// Privilege level at or above which a principal bypasses permission checks.
pub const DEFAULT_SUPERUSER_LEVEL: i32 = 9999;

/// Name of the system principal used for background work.
pub const DEFAULT_SYSTEM_PRINCIPAL: &str = "__sys";

/// Name of the fallback principal when nobody is signed in.
pub const DEFAULT_ANONYMOUS_PRINCIPAL: &str = "anonymous";

/// What to do when the audit sink fails to record a decision.
///
/// Neither policy ever turns a denial into a grant: a denied requirement is
/// reported as denied regardless of the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditFailurePolicy {
    /// Log the sink failure and return the authorization outcome.
    #[default]
    Swallow,
    /// Fail a granted requirement with the audit error.
    Propagate,
}

impl FromStr for AuditFailurePolicy {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "swallow" => Ok(Self::Swallow),
            "propagate" => Ok(Self::Propagate),
            other => Err(AuthzError::Configuration(format!(
                "Unknown audit failure policy: {}",
                other
            ))),
        }
    }
}

/// Settings shared by every context derived from the same services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthzConfig {
    /// Privilege level treated as super user
    pub superuser_level: i32,
    /// Whether super users bypass permission checks
    pub allow_superuser: bool,
    /// Whether a system principal is available as a fallback
    pub allow_system: bool,
    /// Name of the system principal
    pub system_principal: String,
    /// Name of the anonymous fallback principal
    pub anonymous_principal: String,
    /// Audit sink failure handling
    pub audit_failure: AuditFailurePolicy,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            superuser_level: DEFAULT_SUPERUSER_LEVEL,
            allow_superuser: true,
            allow_system: true,
            system_principal: DEFAULT_SYSTEM_PRINCIPAL.to_string(),
            anonymous_principal: DEFAULT_ANONYMOUS_PRINCIPAL.to_string(),
            audit_failure: AuditFailurePolicy::Swallow,
        }
    }
}

impl AuthzConfig {
    /// Load configuration, prioritizing environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            superuser_level: env_parse("AUTHZ_SUPERUSER_LEVEL")?
                .unwrap_or(defaults.superuser_level),
            allow_superuser: env_parse("AUTHZ_ALLOW_SUPERUSER")?
                .unwrap_or(defaults.allow_superuser),
            allow_system: env_parse("AUTHZ_ALLOW_SYSTEM")?.unwrap_or(defaults.allow_system),
            system_principal: env_string("AUTHZ_SYSTEM_PRINCIPAL")
                .unwrap_or(defaults.system_principal),
            anonymous_principal: env_string("AUTHZ_ANONYMOUS_PRINCIPAL")
                .unwrap_or(defaults.anonymous_principal),
            audit_failure: env_parse("AUTHZ_AUDIT_FAILURE")?.unwrap_or(defaults.audit_failure),
        };

        debug!("Loaded authorization config: {:?}", config);
        Ok(config)
    }
}

/// Settings for [`crate::logging::init_logging`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Include the event target in each line
    pub with_target: bool,
    /// Colorize output
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            with_target: true,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Load logging configuration, prioritizing environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            filter: env_string("AUTHZ_LOG").unwrap_or_else(|| "info".to_string()),
            ..Self::default()
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AuthzError::Configuration(format!("Invalid {}: {}", key, e))),
    }
}
