//! Collaborator interfaces consumed by the decision engine.
//!
//! The engine never touches storage directly. Named permissions, privileges
//! and roles come from a [`PersistentService`], and the permissions a
//! principal holds come from an [`AuthorizationService`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::closure;
use crate::context::AuthzContext;
use crate::error::Result;
use crate::types::{Permission, Principal, Privilege, Role};

/// The kinds of entity a [`PersistentService`] stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Permission,
    Privilege,
    Role,
    Principal,
}

/// Any storable entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Entity {
    Permission(Permission),
    Privilege(Privilege),
    Role(Role),
    Principal(Principal),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Permission(_) => EntityKind::Permission,
            Entity::Privilege(_) => EntityKind::Privilege,
            Entity::Role(_) => EntityKind::Role,
            Entity::Principal(_) => EntityKind::Principal,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::Permission(p) => p.name(),
            Entity::Privilege(p) => p.name(),
            Entity::Role(r) => r.name(),
            Entity::Principal(p) => p.name(),
        }
    }
}

impl From<Permission> for Entity {
    fn from(p: Permission) -> Self {
        Entity::Permission(p)
    }
}

impl From<Privilege> for Entity {
    fn from(p: Privilege) -> Self {
        Entity::Privilege(p)
    }
}

impl From<Role> for Entity {
    fn from(r: Role) -> Self {
        Entity::Role(r)
    }
}

impl From<Principal> for Entity {
    fn from(p: Principal) -> Self {
        Entity::Principal(p)
    }
}

/// Lookup and storage of named entities.
///
/// Implementations should treat names case-insensitively. Lookups are
/// synchronous and expected not to block for long.
pub trait PersistentService: Send + Sync {
    fn save(&self, entity: Entity) -> Result<()>;

    /// Returns whether an entity was removed.
    fn remove(&self, kind: EntityKind, name: &str) -> Result<bool>;

    fn find_permission(&self, name: &str) -> Option<Permission>;

    fn find_privilege(&self, name: &str) -> Option<Privilege>;

    fn find_privilege_by_level(&self, level: i32) -> Option<Privilege>;

    fn find_role(&self, name: &str) -> Option<Role>;

    fn find_principal(&self, name: &str) -> Option<Principal>;

    fn all_permissions(&self) -> Vec<Permission>;

    fn all_privileges(&self) -> Vec<Privilege>;

    fn all_roles(&self) -> Vec<Role>;

    /// Kind-dispatched lookup by name.
    fn find_by_name(&self, name: &str, kind: EntityKind) -> Option<Entity> {
        match kind {
            EntityKind::Permission => self.find_permission(name).map(Entity::Permission),
            EntityKind::Privilege => self.find_privilege(name).map(Entity::Privilege),
            EntityKind::Role => self.find_role(name).map(Entity::Role),
            EntityKind::Principal => self.find_principal(name).map(Entity::Principal),
        }
    }
}

/// Supplies a principal's privilege, roles and permissions.
///
/// [`AuthorizationService::all_permissions`] defaults to the closure
/// resolver; implementations may override it to supply a precomputed closure.
pub trait AuthorizationService: Send + Sync {
    fn privilege(&self, principal: &Principal, ctx: &AuthzContext) -> Option<Privilege>;

    fn roles(&self, principal: &Principal, ctx: &AuthzContext) -> Vec<Role>;

    /// Directly granted permissions.
    fn permissions(&self, principal: &Principal, ctx: &AuthzContext) -> Vec<Permission>;

    fn role_permissions(&self, role: &Role, ctx: &AuthzContext) -> Vec<Permission>;

    /// Every permission the principal holds, implied ones included.
    fn all_permissions(&self, principal: &Principal, ctx: &AuthzContext) -> HashSet<Permission> {
        closure::resolve(self, principal, ctx)
    }
}

/// Reads everything straight off the principal and role values.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleAuthorizationService;

impl AuthorizationService for SimpleAuthorizationService {
    fn privilege(&self, principal: &Principal, _ctx: &AuthzContext) -> Option<Privilege> {
        principal.privilege().cloned()
    }

    fn roles(&self, principal: &Principal, _ctx: &AuthzContext) -> Vec<Role> {
        principal.roles().to_vec()
    }

    fn permissions(&self, principal: &Principal, _ctx: &AuthzContext) -> Vec<Permission> {
        principal.permissions().to_vec()
    }

    fn role_permissions(&self, role: &Role, _ctx: &AuthzContext) -> Vec<Permission> {
        role.permissions().to_vec()
    }
}

/// Prefers the stored version of a principal and its roles, so a principal
/// known only by name (for example one restored from a token) picks up the
/// grants held in persistence.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredAuthorizationService;

impl StoredAuthorizationService {
    fn stored(principal: &Principal, ctx: &AuthzContext) -> Option<Principal> {
        ctx.persistence().find_principal(principal.name())
    }
}

impl AuthorizationService for StoredAuthorizationService {
    fn privilege(&self, principal: &Principal, ctx: &AuthzContext) -> Option<Privilege> {
        match Self::stored(principal, ctx) {
            Some(stored) => stored.privilege().cloned(),
            None => principal.privilege().cloned(),
        }
    }

    fn roles(&self, principal: &Principal, ctx: &AuthzContext) -> Vec<Role> {
        match Self::stored(principal, ctx) {
            Some(stored) => stored.roles().to_vec(),
            None => principal.roles().to_vec(),
        }
    }

    fn permissions(&self, principal: &Principal, ctx: &AuthzContext) -> Vec<Permission> {
        match Self::stored(principal, ctx) {
            Some(stored) => stored.permissions().to_vec(),
            None => principal.permissions().to_vec(),
        }
    }

    fn role_permissions(&self, role: &Role, ctx: &AuthzContext) -> Vec<Permission> {
        match ctx.persistence().find_role(role.name()) {
            Some(stored) => stored.permissions().to_vec(),
            None => role.permissions().to_vec(),
        }
    }
}
