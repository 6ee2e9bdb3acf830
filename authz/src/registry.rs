//! Instance-level permission checkers keyed by permission and resource type.
//!
//! # Resolution
//!
//! A checker is registered against a type name, which may be a concrete
//! [`ResourceType`] name or one of the interface names a type declares.
//! Resolving `(permission, type)` walks the type hierarchy from the concrete
//! type upwards. At each level the declared interfaces are tried before the
//! type itself, first for the exact permission and then for the wildcard
//! (any permission) registration.
//!
//! Every resolution result, including a miss, is cached per concrete type so
//! the walk happens once per `(permission, type)` pair. Registering a new
//! checker drops the cache.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info};

use crate::types::{Permission, Principal, Resource, ResourceType};

/// Decides whether a principal is associated with a concrete resource, for
/// example whether an order belongs to the user.
pub trait DynamicPermissionCheckHelper: Send + Sync {
    /// Permissions this checker applies to. Empty means any permission.
    fn permissions(&self) -> Vec<Permission> {
        Vec::new()
    }

    fn is_associated(&self, target: &dyn Resource, principal: &Principal) -> bool;
}

/// Fallback checker returned when nothing is registered. Never associates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverAssociated;

impl DynamicPermissionCheckHelper for NeverAssociated {
    fn is_associated(&self, _target: &dyn Resource, _principal: &Principal) -> bool {
        false
    }
}

/// Checker over a concrete resource type.
///
/// A target of any other type is never associated.
pub struct TypedCheck<T, F> {
    permissions: Vec<Permission>,
    check: F,
    _resource: PhantomData<fn(&T)>,
}

impl<T, F> TypedCheck<T, F>
where
    T: Resource + 'static,
    F: Fn(&T, &Principal) -> bool + Send + Sync,
{
    pub fn new(check: F) -> Self {
        Self {
            permissions: Vec::new(),
            check,
            _resource: PhantomData,
        }
    }

    /// Restricts the checker to the given permission. May be repeated.
    pub fn for_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }
}

impl<T, F> DynamicPermissionCheckHelper for TypedCheck<T, F>
where
    T: Resource + 'static,
    F: Fn(&T, &Principal) -> bool + Send + Sync,
{
    fn permissions(&self) -> Vec<Permission> {
        self.permissions.clone()
    }

    fn is_associated(&self, target: &dyn Resource, principal: &Principal) -> bool {
        match target.as_any().downcast_ref::<T>() {
            Some(resource) => (self.check)(resource, principal),
            None => {
                debug!(
                    "Checker for {} received a {} target",
                    std::any::type_name::<T>(),
                    target.resource_type().name()
                );
                false
            }
        }
    }
}

/// Checker over any resource, for registration against interface names.
pub struct ResourceCheck<F> {
    permissions: Vec<Permission>,
    check: F,
}

impl<F> ResourceCheck<F>
where
    F: Fn(&dyn Resource, &Principal) -> bool + Send + Sync,
{
    pub fn new(check: F) -> Self {
        Self {
            permissions: Vec::new(),
            check,
        }
    }

    pub fn for_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }
}

impl<F> DynamicPermissionCheckHelper for ResourceCheck<F>
where
    F: Fn(&dyn Resource, &Principal) -> bool + Send + Sync,
{
    fn permissions(&self) -> Vec<Permission> {
        self.permissions.clone()
    }

    fn is_associated(&self, target: &dyn Resource, principal: &Principal) -> bool {
        (self.check)(target, principal)
    }
}

/// `None` is the wildcard permission.
type RegistrationKey = (Option<String>, String);

/// Thread-safe table of dynamic checkers with a resolution cache.
pub struct DynamicCheckRegistry {
    registrations: RwLock<HashMap<RegistrationKey, Arc<dyn DynamicPermissionCheckHelper>>>,
    cache: RwLock<HashMap<RegistrationKey, Arc<dyn DynamicPermissionCheckHelper>>>,
    never: Arc<dyn DynamicPermissionCheckHelper>,
}

impl Default for DynamicCheckRegistry {
    fn default() -> Self {
        Self {
            registrations: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            never: Arc::new(NeverAssociated),
        }
    }
}

impl fmt::Debug for DynamicCheckRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicCheckRegistry")
            .field("registrations", &self.len())
            .field("cached", &self.cached_len())
            .finish()
    }
}

impl DynamicCheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a checker against a resource type or interface name.
    ///
    /// A checker declaring no permissions is registered under the wildcard
    /// key, otherwise once per declared permission. A later registration for
    /// the same key replaces the earlier one.
    pub fn register(
        &self,
        helper: Arc<dyn DynamicPermissionCheckHelper>,
        type_name: impl Into<String>,
    ) {
        let type_name = type_name.into();
        let permissions = helper.permissions();

        let mut registrations = self.registrations.write();
        if permissions.is_empty() {
            registrations.insert((None, type_name.clone()), helper);
            info!("Registered dynamic check for any permission on {}", type_name);
        } else {
            for permission in permissions {
                registrations.insert(
                    (Some(permission.key()), type_name.clone()),
                    Arc::clone(&helper),
                );
                info!(
                    "Registered dynamic check for '{}' on {}",
                    permission.name(),
                    type_name
                );
            }
        }

        // Cached misses and shadowed matches are stale now
        self.cache.write().clear();
    }

    /// Find the checker for a permission on a resource type, falling back to
    /// [`NeverAssociated`].
    pub fn resolve(
        &self,
        permission: &Permission,
        resource_type: &'static ResourceType,
    ) -> Arc<dyn DynamicPermissionCheckHelper> {
        let key = (Some(permission.key()), resource_type.name().to_string());
        if let Some(hit) = self.cache.read().get(&key) {
            return Arc::clone(hit);
        }

        let registrations = self.registrations.read();
        let resolved = match Self::search(&registrations, &permission.key(), resource_type) {
            Some(found) => found,
            None => {
                debug!(
                    "No dynamic check for '{}' on {}",
                    permission.name(),
                    resource_type.name()
                );
                Arc::clone(&self.never)
            }
        };
        // Written under the registrations lock so a concurrent register
        // cannot clear the cache in between
        self.cache.write().insert(key, Arc::clone(&resolved));
        resolved
    }

    fn search(
        registrations: &HashMap<RegistrationKey, Arc<dyn DynamicPermissionCheckHelper>>,
        permission_key: &str,
        resource_type: &'static ResourceType,
    ) -> Option<Arc<dyn DynamicPermissionCheckHelper>> {
        let mut current = Some(resource_type);
        while let Some(ty) = current {
            for permission in [Some(permission_key.to_string()), None] {
                let candidates = ty.interfaces().iter().copied().chain([ty.name()]);
                for candidate in candidates {
                    let key = (permission.clone(), candidate.to_string());
                    if let Some(found) = registrations.get(&key) {
                        debug!(
                            "Dynamic check for '{}' on {} resolved via {}",
                            permission_key,
                            resource_type.name(),
                            candidate
                        );
                        return Some(Arc::clone(found));
                    }
                }
            }
            current = ty.parent();
        }
        None
    }

    /// Whether a real checker (not the fallback) resolves for the pair.
    pub fn has_check(&self, permission: &Permission, resource_type: &'static ResourceType) -> bool {
        !Arc::ptr_eq(&self.resolve(permission, resource_type), &self.never)
    }

    /// Number of registrations, counting one per declared permission.
    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    /// Number of cached resolutions.
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }

    /// Unregister a checker.
    pub fn unregister(&self, permission: Option<&Permission>, type_name: &str) -> bool {
        let key = (permission.map(Permission::key), type_name.to_string());
        let mut registrations = self.registrations.write();
        let removed = registrations.remove(&key).is_some();
        if removed {
            self.cache.write().clear();
        }
        removed
    }
}
