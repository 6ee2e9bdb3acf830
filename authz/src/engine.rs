//! Grant/deny decisions.
//!
//! The `has_*` methods answer a question and never audit. The `require_*`
//! methods resolve the acting principal from the context, decide, emit
//! exactly one [`AuditRecord`] for the decision, and fail with
//! [`AuthzError::NoAccess`] on denial.
//!
//! Contract violations (no principal, a dynamic permission without a target,
//! an empty guard) are raised before any decision is made and are not
//! audited.

use std::sync::Arc;
use tracing::{debug, error};

use crate::audit::AuditRecord;
use crate::config::{AuditFailurePolicy, AuthzConfig};
use crate::context::{AuthzContext, AuthzServices};
use crate::error::{AuthzError, Result};
use crate::registry::DynamicPermissionCheckHelper;
use crate::types::{Guarded, Permission, Principal, Privilege, Resource};

/// Entry point for a host: owns the shared services and configuration and
/// hands out per-request contexts.
#[derive(Debug, Clone)]
pub struct AuthzEngine {
    services: AuthzServices,
    config: Arc<AuthzConfig>,
}

impl AuthzEngine {
    pub fn new(services: AuthzServices, config: AuthzConfig) -> Self {
        Self {
            services,
            config: Arc::new(config),
        }
    }

    /// Create an engine configured from the environment.
    pub fn from_env(services: AuthzServices) -> Result<Self> {
        Ok(Self::new(services, AuthzConfig::from_env()?))
    }

    /// A context for a new request with no principal set.
    pub fn context(&self) -> AuthzContext {
        AuthzContext::with_shared_config(self.services.clone(), Arc::clone(&self.config))
    }

    /// A context for a new request acting as `principal`.
    pub fn context_for(&self, principal: Principal) -> AuthzContext {
        let mut ctx = self.context();
        ctx.set_current_principal(Some(principal));
        ctx
    }

    /// Register a dynamic checker; see [`crate::registry::DynamicCheckRegistry::register`].
    pub fn register(
        &self,
        helper: Arc<dyn DynamicPermissionCheckHelper>,
        type_name: impl Into<String>,
    ) {
        self.services.registry().register(helper, type_name);
    }

    pub fn services(&self) -> &AuthzServices {
        &self.services
    }

    pub fn config(&self) -> &AuthzConfig {
        &self.config
    }
}

/// Outcome of a single check with the reason for a denial.
#[derive(Debug)]
struct Decision {
    granted: bool,
    reason: Option<String>,
}

impl Decision {
    fn grant() -> Self {
        Self {
            granted: true,
            reason: None,
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            granted: false,
            reason: Some(reason),
        }
    }
}

impl AuthzContext {
    /// Whether the super user override applies to `principal`.
    pub fn is_superuser(&self, principal: &Principal) -> bool {
        let config = self.config();
        config.allow_superuser
            && self
                .authorization()
                .privilege(principal, self)
                .is_some_and(|p| p.level() >= config.superuser_level)
    }

    /// Whether the principal's privilege is at least `required`. A principal
    /// without a privilege has none.
    pub fn has_privilege(&self, principal: &Principal, required: &Privilege) -> bool {
        self.has_privilege_level(principal, required.level())
    }

    pub fn has_privilege_level(&self, principal: &Principal, level: i32) -> bool {
        self.authorization()
            .privilege(principal, self)
            .is_some_and(|p| p.level() >= level)
    }

    /// Privilege check by stored name. Unknown names are never held.
    pub fn has_privilege_named(&self, principal: &Principal, name: &str) -> bool {
        match self.persistence().find_privilege(name) {
            Some(required) => self.has_privilege(principal, &required),
            None => {
                debug!("Unknown privilege '{}'", name);
                false
            }
        }
    }

    /// Whether `principal` holds `required`, on `target` if the permission is
    /// dynamic.
    ///
    /// `target` falls back to the context's guarded target. A dynamic
    /// permission with no target at all is an error.
    pub fn has_permission(
        &self,
        target: Option<&dyn Resource>,
        principal: &Principal,
        required: &Permission,
    ) -> Result<bool> {
        self.decide_permission(target, principal, required)
            .map(|d| d.granted)
    }

    /// Permission check by stored name. Unknown names are never held.
    pub fn has_permission_named(
        &self,
        target: Option<&dyn Resource>,
        principal: &Principal,
        name: &str,
    ) -> Result<bool> {
        match self.persistence().find_permission(name) {
            Some(required) => self.has_permission(target, principal, &required),
            None => {
                debug!("Unknown permission '{}'", name);
                Ok(false)
            }
        }
    }

    /// Either grants. The privilege is checked first and short-circuits, so
    /// no dynamic checker runs when the privilege suffices.
    pub fn has_permission_or_privilege(
        &self,
        target: Option<&dyn Resource>,
        principal: &Principal,
        permission: &Permission,
        privilege: &Privilege,
    ) -> Result<bool> {
        if self.has_privilege(principal, privilege) {
            return Ok(true);
        }
        self.has_permission(target, principal, permission)
    }

    /// Require a permission of the acting principal on the guarded target.
    pub fn require_permission(&self, permission: &Permission, allow_system: bool) -> Result<()> {
        let principal = self.principal(allow_system)?;
        let target = self.guarded_target();
        let decision = self.decide_permission(target, &principal, permission)?;
        self.conclude(
            decision,
            target,
            &principal,
            Some(permission.name()),
            None,
        )
    }

    /// Require a permission by stored name. An unknown name is audited and
    /// denied.
    pub fn require_permission_named(&self, name: &str, allow_system: bool) -> Result<()> {
        if let Some(required) = self.persistence().find_permission(name) {
            return self.require_permission(&required, allow_system);
        }
        let principal = self.principal(allow_system)?;
        self.conclude(
            Decision::deny(format!("unknown permission '{}'", name)),
            self.guarded_target(),
            &principal,
            Some(name),
            None,
        )
    }

    pub fn require_privilege(&self, privilege: &Privilege, allow_system: bool) -> Result<()> {
        let principal = self.principal(allow_system)?;
        let decision = self.decide_privilege(&principal, privilege);
        self.conclude(
            decision,
            self.guarded_target(),
            &principal,
            None,
            Some(privilege.name()),
        )
    }

    /// Require a privilege level. The audit record names the stored
    /// privilege at that level, or the bare level if none is stored.
    pub fn require_privilege_level(&self, level: i32, allow_system: bool) -> Result<()> {
        let required = self
            .persistence()
            .find_privilege_by_level(level)
            .unwrap_or_else(|| Privilege::new(level.to_string(), level));
        self.require_privilege(&required, allow_system)
    }

    pub fn require_permission_or_privilege(
        &self,
        permission: &Permission,
        privilege: &Privilege,
        allow_system: bool,
    ) -> Result<()> {
        let principal = self.principal(allow_system)?;
        let target = self.guarded_target();
        let decision = match self.decide_privilege(&principal, privilege) {
            granted @ Decision { granted: true, .. } => granted,
            _ => self.decide_permission(target, &principal, permission)?,
        };
        self.conclude(
            decision,
            target,
            &principal,
            Some(permission.name()),
            Some(privilege.name()),
        )
    }

    /// Require whatever `guarded` asks for. Its target, if any, is guarded
    /// for the duration of the check and the previous target restored after.
    pub fn require(&mut self, guarded: &Guarded, allow_system: bool) -> Result<()> {
        if guarded.is_empty() {
            return Err(AuthzError::EmptyGuard);
        }
        match guarded.shared_target() {
            Some(target) => self.with_guarded_target(Arc::clone(target), |ctx| {
                ctx.require_guarded(guarded, allow_system)
            }),
            None => self.require_guarded(guarded, allow_system),
        }
    }

    /// Like [`AuthzContext::require`] but answers instead of auditing and
    /// raising. Contract violations are still errors.
    pub fn check(&self, guarded: &Guarded, allow_system: bool) -> Result<bool> {
        let principal = self.principal(allow_system)?;
        let target = guarded.target().or_else(|| self.guarded_target());
        match (guarded.permission(), guarded.privilege()) {
            (Some(permission), Some(privilege)) => {
                self.has_permission_or_privilege(target, &principal, permission, privilege)
            }
            (Some(permission), None) => self.has_permission(target, &principal, permission),
            (None, Some(privilege)) => Ok(self.has_privilege(&principal, privilege)),
            (None, None) => Err(AuthzError::EmptyGuard),
        }
    }

    fn require_guarded(&self, guarded: &Guarded, allow_system: bool) -> Result<()> {
        match (guarded.permission(), guarded.privilege()) {
            (Some(permission), Some(privilege)) => {
                self.require_permission_or_privilege(permission, privilege, allow_system)
            }
            (Some(permission), None) => self.require_permission(permission, allow_system),
            (None, Some(privilege)) => self.require_privilege(privilege, allow_system),
            (None, None) => Err(AuthzError::EmptyGuard),
        }
    }

    fn decide_privilege(&self, principal: &Principal, required: &Privilege) -> Decision {
        if self.has_privilege(principal, required) {
            Decision::grant()
        } else {
            Decision::deny(format!(
                "'{}' lacks privilege {}",
                principal.name(),
                required
            ))
        }
    }

    fn decide_permission(
        &self,
        target: Option<&dyn Resource>,
        principal: &Principal,
        required: &Permission,
    ) -> Result<Decision> {
        if self.is_superuser(principal) {
            debug!(
                "Super user '{}' granted '{}'",
                principal.name(),
                required.name()
            );
            return Ok(Decision::grant());
        }

        let closure = self.authorization().all_permissions(principal, self);
        if !closure.contains(required) {
            return Ok(Decision::deny(format!(
                "'{}' lacks permission '{}'",
                principal.name(),
                required.name()
            )));
        }

        if !required.is_dynamic() || self.is_system(principal) {
            return Ok(Decision::grant());
        }

        let target = target
            .or_else(|| self.guarded_target())
            .ok_or_else(|| AuthzError::MissingTarget(required.name().to_string()))?;
        let helper = self.registry().resolve(required, target.resource_type());
        if helper.is_associated(target, principal) {
            Ok(Decision::grant())
        } else {
            Ok(Decision::deny(format!(
                "'{}' is not associated with {} for '{}'",
                principal.name(),
                target.audit_tag(),
                required.name()
            )))
        }
    }

    /// Audit the decision and turn a denial into an error.
    fn conclude(
        &self,
        decision: Decision,
        target: Option<&dyn Resource>,
        principal: &Principal,
        permission: Option<&str>,
        privilege: Option<&str>,
    ) -> Result<()> {
        let record = AuditRecord {
            target: target.map(|t| t.audit_tag()),
            principal: principal.name().to_string(),
            permission: permission.map(str::to_string),
            privilege: privilege.map(str::to_string),
            success: decision.granted,
            message: decision.reason.clone().unwrap_or_default(),
        };

        let audited = match self.auditor().audit(&record) {
            Ok(()) => Ok(()),
            Err(e) => match self.config().audit_failure {
                AuditFailurePolicy::Swallow => {
                    error!("Failed to audit decision for '{}': {}", record.principal, e);
                    Ok(())
                }
                AuditFailurePolicy::Propagate => Err(e),
            },
        };

        if !decision.granted {
            return Err(AuthzError::NoAccess(decision.reason));
        }
        audited
    }
}
