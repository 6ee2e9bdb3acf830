//! Embeddable authorization engine.
//!
//! This crate decides whether an acting principal may perform a guarded
//! operation. Principals hold a privilege level, roles and directly granted
//! permissions; permissions may imply further permissions, and dynamic
//! permissions additionally require that the principal be associated with
//! the concrete resource being accessed.
//!
//! # Architecture Overview
//!
//! A decision flows through these pieces:
//!
//! 1. **[`AuthzEngine`]** owns the shared services and configuration and
//!    creates one [`AuthzContext`] per request
//! 2. **[`AuthzContext`]** carries the acting principal and the guarded
//!    target for that request
//! 3. **[`closure`]** expands the principal's grants through roles and
//!    implied permissions
//! 4. **[`registry`]** finds the instance-level checker for a dynamic
//!    permission by walking the resource's type hierarchy
//! 5. **[`audit`]** receives one record per `require_*` decision
//!
//! Storage is delegated to a [`PersistentService`] and the permissions a
//! principal holds are supplied by an [`AuthorizationService`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use authz::{
//!     AuthzConfig, AuthzEngine, AuthzServices, MemoryStore, Permission,
//!     PersistentService, Principal, Role, SimpleAuthorizationService,
//! };
//!
//! let store = MemoryStore::new();
//! store.save(Permission::new("save").into()).unwrap();
//!
//! let services = AuthzServices::new(Arc::new(store), Arc::new(SimpleAuthorizationService));
//! let engine = AuthzEngine::new(services, AuthzConfig::default());
//!
//! let editor = Role::new("editor").with_permission(Permission::new("publish").implies("save"));
//! let ctx = engine.context_for(Principal::new("alice").with_role(editor));
//!
//! assert!(ctx.require_permission(&Permission::new("save"), false).is_ok());
//! assert!(ctx.require_permission(&Permission::new("delete"), false).is_err());
//! ```

pub mod audit;
pub mod authn;
pub mod closure;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod logging;
pub mod registry;
pub mod service;
pub mod store;
pub mod types;

pub use audit::{AuditRecord, AuditTrail, Auditor, NoopAuditor, TracingAuditor};
pub use authn::{
    hash_password, verify_password, AuthenticationService, PasswordAuthenticationService,
    PASSWORD_HASH_PROPERTY,
};
pub use config::{AuditFailurePolicy, AuthzConfig, LoggingConfig};
pub use context::{AuthzContext, AuthzServices, TargetScope};
pub use engine::AuthzEngine;
pub use error::{AuthzError, Result};
pub use logging::init_logging;
pub use registry::{
    DynamicCheckRegistry, DynamicPermissionCheckHelper, NeverAssociated, ResourceCheck,
    TypedCheck,
};
pub use service::{
    AuthorizationService, Entity, EntityKind, PersistentService, SimpleAuthorizationService,
    StoredAuthorizationService,
};
pub use store::MemoryStore;
pub use types::{Guarded, Permission, Principal, Privilege, Resource, ResourceType, Role};
