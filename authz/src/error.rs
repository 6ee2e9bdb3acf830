//! Error types for the authorization system.
//!
//! # Security Note
//! Two very different failures travel through this type. An access denial is
//! the expected outcome of a failed `require_*` call and is always audited
//! before it is raised. Everything else is a contract violation in the host
//! integration and should fail fast. Denial reasons are kept short so they
//! can be shown to callers without leaking the permission model.

use thiserror::Error;

/// Errors that can occur during authorization operations.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// The principal is not allowed to perform the guarded operation.
    #[error("Access denied{}", .0.as_ref().map(|r| format!(": {}", r)).unwrap_or_default())]
    NoAccess(Option<String>),

    /// No current principal is set and system access was not allowed.
    #[error("No principal available and system access is not allowed")]
    NoPrincipal,

    /// A dynamic permission was checked without a guarded target.
    #[error("Cannot determine guarded resource for dynamic permission: {0}")]
    MissingTarget(String),

    /// A guard was supplied with neither a permission nor a privilege.
    #[error("Guard requires at least a permission or a privilege")]
    EmptyGuard,

    /// An entity was saved with a blank name.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// The audit sink failed to record a decision.
    #[error("Audit failed: {0}")]
    Audit(String),

    /// A password could not be hashed.
    #[error("Credential error: {0}")]
    Credential(String),

    /// Configuration could not be loaded or applied.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AuthzError {
    /// Creates an access denial carrying a reason.
    pub fn no_access(reason: impl Into<String>) -> Self {
        Self::NoAccess(Some(reason.into()))
    }

    /// True for the normal "denied" outcome of a requirement check.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::NoAccess(_))
    }

    /// True for programmer errors in the host integration.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::NoPrincipal | Self::MissingTarget(_) | Self::EmptyGuard | Self::InvalidName(_)
        )
    }
}

/// A specialized Result type for authorization operations.
pub type Result<T> = std::result::Result<T, AuthzError>;
