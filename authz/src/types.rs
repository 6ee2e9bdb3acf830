//! Core authorization types: permissions, privileges, roles, principals and
//! the guarded resources they are checked against.
//!
//! # Identity
//!
//! Permissions, roles and principals are identified by name. Names compare
//! case-insensitively and ignore surrounding whitespace, so `"Publish"` and
//! `" publish"` are the same permission.
//! Privileges are identified by their numeric level alone.
//!
//! # Immutability
//!
//! Every value here is built once and never mutated in place. The `with_*`
//! and `implies` methods consume a value and return an updated copy, so a
//! value handed to the engine cannot change underneath a decision.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Implements name-based identity for an entity type, using the same
/// normalization as [`name_key`].
macro_rules! name_identity {
    ($($ty:ty),+ $(,)?) => {$(
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                name_key(&self.name) == name_key(&other.name)
            }
        }

        impl Eq for $ty {}

        impl Hash for $ty {
            fn hash<H: Hasher>(&self, state: &mut H) {
                name_key(&self.name).hash(state);
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.name)
            }
        }
    )+};
}

/// Normalized lookup key for a name.
pub(crate) fn name_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// A named, fine-grained capability.
///
/// A dynamic permission additionally requires that the principal be
/// associated with the concrete resource being accessed (for example "the
/// order belongs to this user"). Implied permissions are referenced by name
/// and are granted whenever this permission is granted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    name: String,
    #[serde(default)]
    dynamic: bool,
    #[serde(default)]
    implied: BTreeSet<String>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

impl Permission {
    /// Creates a static permission.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dynamic: false,
            implied: BTreeSet::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Creates a dynamic (instance-level) permission.
    pub fn dynamic(name: impl Into<String>) -> Self {
        Self {
            dynamic: true,
            ..Self::new(name)
        }
    }

    /// Returns a copy that also implies the named permission.
    pub fn implies(mut self, name: impl Into<String>) -> Self {
        self.implied.insert(name.into());
        self
    }

    /// Returns a copy with the given property set.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Names of the permissions directly implied by this one.
    pub fn implied(&self) -> impl Iterator<Item = &str> {
        self.implied.iter().map(String::as_str)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub(crate) fn key(&self) -> String {
        name_key(&self.name)
    }
}

/// A coarse-grained, leveled capability.
///
/// Privileges compare purely by level: two privileges with the same level
/// are equal regardless of name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Privilege {
    name: String,
    level: i32,
}

impl Privilege {
    pub fn new(name: impl Into<String>, level: i32) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> i32 {
        self.level
    }
}

impl PartialEq for Privilege {
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level
    }
}

impl Eq for Privilege {}

impl Hash for Privilege {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.level.hash(state);
    }
}

impl PartialOrd for Privilege {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Privilege {
    fn cmp(&self, other: &Self) -> Ordering {
        self.level.cmp(&other.level)
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.level)
    }
}

/// A named bag of permissions assignable to a principal as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    name: String,
    #[serde(default)]
    permissions: Vec<Permission>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permissions: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Returns a copy that also grants the given permission.
    pub fn with_permission(mut self, permission: Permission) -> Self {
        if !self.permissions.contains(&permission) {
            self.permissions.push(permission);
        }
        self
    }

    /// Returns a copy with the given property set.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Checks direct membership only; implied permissions are not expanded.
    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// The acting identity (user, service, or system account) being authorized.
///
/// A principal holds at most one privilege, any number of roles, and a set of
/// directly granted permissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    name: String,
    #[serde(default)]
    privilege: Option<Privilege>,
    #[serde(default)]
    roles: Vec<Role>,
    #[serde(default)]
    permissions: Vec<Permission>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

impl Principal {
    /// Creates a principal with no privilege, roles or permissions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            privilege: None,
            roles: Vec::new(),
            permissions: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Creates a principal holding a `root` privilege at the given level.
    pub fn super_user(name: impl Into<String>, level: i32) -> Self {
        Self::new(name).with_privilege(Privilege::new("root", level))
    }

    /// Returns a copy holding the given privilege, replacing any previous one.
    pub fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = Some(privilege);
        self
    }

    /// Returns a copy that also holds the given role.
    pub fn with_role(mut self, role: Role) -> Self {
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
        self
    }

    /// Returns a copy that is also granted the given permission directly.
    pub fn with_permission(mut self, permission: Permission) -> Self {
        if !self.permissions.contains(&permission) {
            self.permissions.push(permission);
        }
        self
    }

    /// Returns a copy with the given property set.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn privilege(&self) -> Option<&Privilege> {
        self.privilege.as_ref()
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Directly granted permissions.
    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Direct permissions plus the permissions of every held role, before
    /// implied permissions are expanded.
    pub fn all_permissions(&self) -> Vec<Permission> {
        let mut all: Vec<Permission> = Vec::new();
        let granted = self
            .permissions
            .iter()
            .chain(self.roles.iter().flat_map(|r| r.permissions.iter()));
        for permission in granted {
            if !all.contains(permission) {
                all.push(permission.clone());
            }
        }
        all
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

name_identity!(Permission, Role, Principal);

/// Describes the runtime type of a guarded resource.
///
/// Dynamic permission checks are dispatched on this descriptor rather than on
/// the Rust type, so a checker registered for a general type (a parent or an
/// interface name) also applies to more specific resources.
///
/// ```rust
/// use authz::types::ResourceType;
///
/// static DOCUMENT: ResourceType = ResourceType::new("Document").implements(&["Owned"]);
/// static INVOICE: ResourceType = ResourceType::new("Invoice").extends(&DOCUMENT);
///
/// assert_eq!(INVOICE.parent().map(|p| p.name()), Some("Document"));
/// ```
#[derive(Debug)]
pub struct ResourceType {
    name: &'static str,
    interfaces: &'static [&'static str],
    parent: Option<&'static ResourceType>,
}

impl ResourceType {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            interfaces: &[],
            parent: None,
        }
    }

    /// Declares the interface names this type implements directly.
    pub const fn implements(self, interfaces: &'static [&'static str]) -> Self {
        Self {
            name: self.name,
            interfaces,
            parent: self.parent,
        }
    }

    /// Declares the parent type.
    pub const fn extends(self, parent: &'static ResourceType) -> Self {
        Self {
            name: self.name,
            interfaces: self.interfaces,
            parent: Some(parent),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn interfaces(&self) -> &'static [&'static str] {
        self.interfaces
    }

    pub fn parent(&self) -> Option<&'static ResourceType> {
        self.parent
    }
}

/// Upcast helper so resources can be downcast to their concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A concrete resource instance that can be guarded by dynamic permissions.
pub trait Resource: AsAny + Send + Sync {
    /// The runtime type descriptor used for checker dispatch.
    fn resource_type(&self) -> &'static ResourceType;

    /// Short identifier written to the audit log.
    fn audit_tag(&self) -> String {
        self.resource_type().name().to_string()
    }

    /// Named attribute lookup for checkers registered against an interface
    /// name, which cannot downcast to every implementing type.
    fn attribute(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Pairs the permission and/or privilege required by an operation with an
/// optional target instance.
#[derive(Clone, Default)]
pub struct Guarded {
    permission: Option<Permission>,
    privilege: Option<Privilege>,
    target: Option<Arc<dyn Resource>>,
}

impl Guarded {
    pub fn by_permission(permission: Permission) -> Self {
        Self {
            permission: Some(permission),
            ..Self::default()
        }
    }

    pub fn by_privilege(privilege: Privilege) -> Self {
        Self {
            privilege: Some(privilege),
            ..Self::default()
        }
    }

    /// Either the permission or the privilege grants access.
    pub fn by_both(permission: Permission, privilege: Privilege) -> Self {
        Self {
            permission: Some(permission),
            privilege: Some(privilege),
            target: None,
        }
    }

    /// Returns a copy bound to a concrete target.
    pub fn with_target(mut self, target: Arc<dyn Resource>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn permission(&self) -> Option<&Permission> {
        self.permission.as_ref()
    }

    pub fn privilege(&self) -> Option<&Privilege> {
        self.privilege.as_ref()
    }

    pub fn target(&self) -> Option<&dyn Resource> {
        self.target.as_deref()
    }

    pub fn shared_target(&self) -> Option<&Arc<dyn Resource>> {
        self.target.as_ref()
    }

    /// True when neither a permission nor a privilege is required.
    pub fn is_empty(&self) -> bool {
        self.permission.is_none() && self.privilege.is_none()
    }
}

impl fmt::Debug for Guarded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guarded")
            .field("permission", &self.permission.as_ref().map(Permission::name))
            .field("privilege", &self.privilege)
            .field("target", &self.target.as_ref().map(|t| t.audit_tag()))
            .finish()
    }
}
