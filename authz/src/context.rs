//! Request-scoped authorization state.
//!
//! An [`AuthzContext`] holds the acting principal and the currently guarded
//! target for one logical request. It is an ordinary value passed down the
//! call chain, so concurrent requests never observe each other's state.
//! Contexts created from the same [`AuthzServices`] share the collaborators,
//! the dynamic check registry and the configuration.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::debug;

use crate::audit::{Auditor, TracingAuditor};
use crate::authn::{AuthenticationService, PasswordAuthenticationService};
use crate::config::AuthzConfig;
use crate::error::{AuthzError, Result};
use crate::registry::DynamicCheckRegistry;
use crate::service::{AuthorizationService, PersistentService};
use crate::types::{name_key, Principal, Resource};

/// Collaborators shared by every context of a host.
#[derive(Clone)]
pub struct AuthzServices {
    persistence: Arc<dyn PersistentService>,
    authentication: Arc<dyn AuthenticationService>,
    authorization: Arc<dyn AuthorizationService>,
    auditor: Arc<dyn Auditor>,
    registry: Arc<DynamicCheckRegistry>,
}

impl AuthzServices {
    /// Audit records go to [`TracingAuditor`] and logins are checked against
    /// stored password hashes until replaced.
    pub fn new(
        persistence: Arc<dyn PersistentService>,
        authorization: Arc<dyn AuthorizationService>,
    ) -> Self {
        Self {
            authentication: Arc::new(PasswordAuthenticationService::new(Arc::clone(
                &persistence,
            ))),
            persistence,
            authorization,
            auditor: Arc::new(TracingAuditor),
            registry: Arc::new(DynamicCheckRegistry::new()),
        }
    }

    pub fn with_auditor(mut self, auditor: Arc<dyn Auditor>) -> Self {
        self.auditor = auditor;
        self
    }

    pub fn with_authentication(mut self, authentication: Arc<dyn AuthenticationService>) -> Self {
        self.authentication = authentication;
        self
    }

    pub fn with_registry(mut self, registry: Arc<DynamicCheckRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn persistence(&self) -> &dyn PersistentService {
        self.persistence.as_ref()
    }

    pub fn authentication(&self) -> &dyn AuthenticationService {
        self.authentication.as_ref()
    }

    pub fn authorization(&self) -> &dyn AuthorizationService {
        self.authorization.as_ref()
    }

    pub fn auditor(&self) -> &dyn Auditor {
        self.auditor.as_ref()
    }

    pub fn registry(&self) -> &DynamicCheckRegistry {
        &self.registry
    }
}

impl fmt::Debug for AuthzServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthzServices")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Per-request authorization state.
pub struct AuthzContext {
    services: AuthzServices,
    config: Arc<AuthzConfig>,
    current_principal: Option<Principal>,
    target: Option<Arc<dyn Resource>>,
}

impl AuthzContext {
    pub fn new(services: AuthzServices, config: AuthzConfig) -> Self {
        Self::with_shared_config(services, Arc::new(config))
    }

    pub fn with_shared_config(services: AuthzServices, config: Arc<AuthzConfig>) -> Self {
        Self {
            services,
            config,
            current_principal: None,
            target: None,
        }
    }

    /// A fresh context sharing services and configuration, with no
    /// principal and no target.
    pub fn fork(&self) -> Self {
        Self::with_shared_config(self.services.clone(), Arc::clone(&self.config))
    }

    /// Clear request state at the end of a request.
    pub fn clear(&mut self) {
        self.current_principal = None;
        self.target = None;
    }

    pub fn services(&self) -> &AuthzServices {
        &self.services
    }

    pub fn config(&self) -> &AuthzConfig {
        &self.config
    }

    pub fn persistence(&self) -> &dyn PersistentService {
        self.services.persistence()
    }

    pub fn authentication(&self) -> &dyn AuthenticationService {
        self.services.authentication()
    }

    pub fn authorization(&self) -> &dyn AuthorizationService {
        self.services.authorization()
    }

    pub fn auditor(&self) -> &dyn Auditor {
        self.services.auditor()
    }

    pub fn registry(&self) -> &DynamicCheckRegistry {
        self.services.registry()
    }

    /// Authenticate and, on success, make the principal the acting one.
    /// A failed attempt leaves the current principal untouched.
    pub fn authenticate(&mut self, username: &str, password: &str) -> Option<&Principal> {
        let principal = self.authentication().authenticate(username, password)?;
        self.current_principal = Some(principal);
        self.current_principal.as_ref()
    }

    /// Replace the acting principal, returning the previous one.
    pub fn set_current_principal(&mut self, principal: Option<Principal>) -> Option<Principal> {
        std::mem::replace(&mut self.current_principal, principal)
    }

    pub fn current_principal(&self) -> Option<&Principal> {
        self.current_principal.as_ref()
    }

    /// The configured system principal: the stored principal of that name,
    /// otherwise a super user at the configured level.
    pub fn system_principal(&self) -> Principal {
        let name = &self.config.system_principal;
        self.persistence()
            .find_principal(name)
            .unwrap_or_else(|| Principal::super_user(name.as_str(), self.config.superuser_level))
    }

    /// The anonymous fallback principal: the stored principal of that name,
    /// otherwise one with no grants.
    pub fn anonymous_principal(&self) -> Principal {
        let name = &self.config.anonymous_principal;
        self.persistence()
            .find_principal(name)
            .unwrap_or_else(|| Principal::new(name.as_str()))
    }

    pub fn is_system(&self, principal: &Principal) -> bool {
        name_key(principal.name()) == name_key(&self.config.system_principal)
    }

    /// The principal a decision is made for.
    ///
    /// The current principal wins. Without one, `allow_system` falls back to
    /// the system principal when enabled in the configuration and to the
    /// anonymous principal otherwise. Without one and without `allow_system`
    /// there is nobody to authorize, which is a caller error.
    pub fn principal(&self, allow_system: bool) -> Result<Principal> {
        if let Some(current) = &self.current_principal {
            return Ok(current.clone());
        }
        if !allow_system {
            return Err(AuthzError::NoPrincipal);
        }
        if self.config.allow_system {
            debug!("No current principal, acting as system principal");
            Ok(self.system_principal())
        } else {
            debug!("No current principal, acting as anonymous principal");
            Ok(self.anonymous_principal())
        }
    }

    /// Replace the guarded target, returning the previous one.
    ///
    /// Prefer [`AuthzContext::scoped_target`], which restores the previous
    /// target on every exit path.
    pub fn set_guarded_target(
        &mut self,
        target: Option<Arc<dyn Resource>>,
    ) -> Option<Arc<dyn Resource>> {
        std::mem::replace(&mut self.target, target)
    }

    pub fn guarded_target(&self) -> Option<&dyn Resource> {
        self.target.as_deref()
    }

    /// Set the guarded target until the returned guard is dropped.
    ///
    /// Guards nest: dropping each one restores the target seen when it was
    /// created, including during unwinding.
    pub fn scoped_target(&mut self, target: Arc<dyn Resource>) -> TargetScope<'_> {
        let previous = self.set_guarded_target(Some(target));
        TargetScope {
            ctx: self,
            previous,
        }
    }

    /// Run `f` with `target` guarded, restoring the previous target after.
    pub fn with_guarded_target<R>(
        &mut self,
        target: Arc<dyn Resource>,
        f: impl FnOnce(&mut AuthzContext) -> R,
    ) -> R {
        let mut scope = self.scoped_target(target);
        f(&mut *scope)
    }
}

impl fmt::Debug for AuthzContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthzContext")
            .field("principal", &self.current_principal.as_ref().map(Principal::name))
            .field("target", &self.target.as_ref().map(|t| t.audit_tag()))
            .field("config", &self.config)
            .finish()
    }
}

/// Guard returned by [`AuthzContext::scoped_target`].
pub struct TargetScope<'a> {
    ctx: &'a mut AuthzContext,
    previous: Option<Arc<dyn Resource>>,
}

impl Deref for TargetScope<'_> {
    type Target = AuthzContext;

    fn deref(&self) -> &AuthzContext {
        self.ctx
    }
}

impl DerefMut for TargetScope<'_> {
    fn deref_mut(&mut self) -> &mut AuthzContext {
        self.ctx
    }
}

impl Drop for TargetScope<'_> {
    fn drop(&mut self) {
        self.ctx.target = self.previous.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::SimpleAuthorizationService;
    use crate::store::MemoryStore;
    use crate::types::ResourceType;

    static NOTE: ResourceType = ResourceType::new("Note");

    struct Note(&'static str);

    impl Resource for Note {
        fn resource_type(&self) -> &'static ResourceType {
            &NOTE
        }

        fn audit_tag(&self) -> String {
            format!("Note:{}", self.0)
        }
    }

    fn context(config: AuthzConfig) -> AuthzContext {
        let services = AuthzServices::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SimpleAuthorizationService),
        );
        AuthzContext::new(services, config)
    }

    fn tag(ctx: &AuthzContext) -> Option<String> {
        ctx.guarded_target().map(|t| t.audit_tag())
    }

    #[test]
    fn test_authenticate_sets_current_principal() {
        let hash = crate::authn::hash_password("s3cret").unwrap();
        let store = MemoryStore::seeded([Principal::new("alice")
            .with_property(crate::authn::PASSWORD_HASH_PROPERTY, hash)
            .into()])
        .unwrap();
        let services = AuthzServices::new(Arc::new(store), Arc::new(SimpleAuthorizationService));
        let mut ctx = AuthzContext::new(services, AuthzConfig::default());

        assert!(ctx.authenticate("alice", "wrong").is_none());
        assert!(ctx.current_principal().is_none());

        assert_eq!(ctx.authenticate("ALICE", "s3cret").unwrap().name(), "alice");
        assert_eq!(ctx.principal(false).unwrap().name(), "alice");

        assert!(ctx.authenticate("alice", "wrong").is_none());
        assert_eq!(ctx.current_principal().unwrap().name(), "alice");
    }

    #[test]
    fn test_authentication_can_be_replaced() {
        struct Everyone;

        impl AuthenticationService for Everyone {
            fn authenticate(&self, username: &str, _password: &str) -> Option<Principal> {
                Some(Principal::new(username))
            }
        }

        let services = AuthzServices::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SimpleAuthorizationService),
        )
        .with_authentication(Arc::new(Everyone));
        let mut ctx = AuthzContext::new(services, AuthzConfig::default());
        assert_eq!(ctx.authenticate("guest", "x").unwrap().name(), "guest");
    }

    #[test]
    fn test_current_principal_wins() {
        let mut ctx = context(AuthzConfig::default());
        ctx.set_current_principal(Some(Principal::new("alice")));
        assert_eq!(ctx.principal(false).unwrap().name(), "alice");
        assert_eq!(ctx.principal(true).unwrap().name(), "alice");
    }

    #[test]
    fn test_missing_principal_without_system_is_error() {
        let ctx = context(AuthzConfig::default());
        let err = ctx.principal(false).unwrap_err();
        assert!(matches!(err, AuthzError::NoPrincipal));
    }

    #[test]
    fn test_system_then_anonymous_fallback() {
        let ctx = context(AuthzConfig::default());
        let system = ctx.principal(true).unwrap();
        assert_eq!(system.name(), "__sys");
        assert!(ctx.is_system(&system));
        assert_eq!(system.privilege().map(|p| p.level()), Some(9999));

        let ctx = context(AuthzConfig {
            allow_system: false,
            ..AuthzConfig::default()
        });
        let anonymous = ctx.principal(true).unwrap();
        assert_eq!(anonymous.name(), "anonymous");
        assert!(!ctx.is_system(&anonymous));
        assert!(anonymous.privilege().is_none());
    }

    #[test]
    fn test_stored_system_principal_is_used() {
        let store = MemoryStore::new();
        store
            .save(Principal::new("__SYS").with_property("kind", "daemon").into())
            .unwrap();
        let services = AuthzServices::new(Arc::new(store), Arc::new(SimpleAuthorizationService));
        let ctx = AuthzContext::new(services, AuthzConfig::default());
        assert_eq!(ctx.system_principal().property("kind"), Some("daemon"));
    }

    #[test]
    fn test_scoped_targets_nest() {
        let mut ctx = context(AuthzConfig::default());
        assert!(ctx.guarded_target().is_none());
        {
            let mut outer = ctx.scoped_target(Arc::new(Note("outer")));
            assert_eq!(tag(&outer), Some("Note:outer".to_string()));
            {
                let inner = outer.scoped_target(Arc::new(Note("inner")));
                assert_eq!(tag(&inner), Some("Note:inner".to_string()));
            }
            assert_eq!(tag(&outer), Some("Note:outer".to_string()));
        }
        assert!(ctx.guarded_target().is_none());
    }

    #[test]
    fn test_scoped_target_restored_on_early_return() {
        fn check(ctx: &mut AuthzContext, fail: bool) -> Result<()> {
            let scope = ctx.scoped_target(Arc::new(Note("inner")));
            if fail {
                return Err(AuthzError::no_access("nope"));
            }
            drop(scope);
            Ok(())
        }

        let mut ctx = context(AuthzConfig::default());
        ctx.set_guarded_target(Some(Arc::new(Note("outer"))));
        assert!(check(&mut ctx, true).is_err());
        assert_eq!(tag(&ctx), Some("Note:outer".to_string()));
        assert!(check(&mut ctx, false).is_ok());
        assert_eq!(tag(&ctx), Some("Note:outer".to_string()));
    }

    #[test]
    fn test_with_guarded_target_closure() {
        let mut ctx = context(AuthzConfig::default());
        let seen = ctx.with_guarded_target(Arc::new(Note("x")), |ctx| tag(ctx));
        assert_eq!(seen, Some("Note:x".to_string()));
        assert!(ctx.guarded_target().is_none());
    }

    #[test]
    fn test_fork_and_clear_isolate_request_state() {
        let mut ctx = context(AuthzConfig::default());
        ctx.set_current_principal(Some(Principal::new("alice")));
        ctx.set_guarded_target(Some(Arc::new(Note("a"))));

        let forked = ctx.fork();
        assert!(forked.current_principal().is_none());
        assert!(forked.guarded_target().is_none());
        assert!(std::ptr::eq(forked.registry(), ctx.registry()));

        let previous = ctx.set_current_principal(None);
        assert_eq!(previous.map(|p| p.name().to_string()), Some("alice".to_string()));

        ctx.set_current_principal(Some(Principal::new("bob")));
        ctx.clear();
        assert!(ctx.current_principal().is_none());
        assert!(ctx.guarded_target().is_none());
    }
}
