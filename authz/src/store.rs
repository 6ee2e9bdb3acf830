//! In-memory [`PersistentService`] for tests, bootstrapping and small hosts.

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{AuthzError, Result};
use crate::service::{Entity, EntityKind, PersistentService};
use crate::types::{name_key, Permission, Principal, Privilege, Role};

/// Thread-safe, case-insensitive entity store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    permissions: RwLock<HashMap<String, Permission>>,
    privileges: RwLock<HashMap<String, Privilege>>,
    roles: RwLock<HashMap<String, Role>>,
    principals: RwLock<HashMap<String, Principal>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with the given entities.
    pub fn seeded<I>(entities: I) -> Result<Self>
    where
        I: IntoIterator<Item = Entity>,
    {
        let store = Self::new();
        for entity in entities {
            store.save(entity)?;
        }
        Ok(store)
    }
}

impl PersistentService for MemoryStore {
    fn save(&self, entity: Entity) -> Result<()> {
        let key = name_key(entity.name());
        if key.is_empty() {
            return Err(AuthzError::InvalidName(format!(
                "{:?} name cannot be blank",
                entity.kind()
            )));
        }
        debug!("Saving {:?} '{}'", entity.kind(), entity.name());

        match entity {
            Entity::Permission(p) => {
                self.permissions.write().insert(key, p);
            }
            Entity::Privilege(p) => {
                self.privileges.write().insert(key, p);
            }
            Entity::Role(r) => {
                self.roles.write().insert(key, r);
            }
            Entity::Principal(p) => {
                self.principals.write().insert(key, p);
            }
        }
        Ok(())
    }

    fn remove(&self, kind: EntityKind, name: &str) -> Result<bool> {
        let key = name_key(name);
        let removed = match kind {
            EntityKind::Permission => self.permissions.write().remove(&key).is_some(),
            EntityKind::Privilege => self.privileges.write().remove(&key).is_some(),
            EntityKind::Role => self.roles.write().remove(&key).is_some(),
            EntityKind::Principal => self.principals.write().remove(&key).is_some(),
        };
        Ok(removed)
    }

    fn find_permission(&self, name: &str) -> Option<Permission> {
        self.permissions.read().get(&name_key(name)).cloned()
    }

    fn find_privilege(&self, name: &str) -> Option<Privilege> {
        self.privileges.read().get(&name_key(name)).cloned()
    }

    /// With several privileges at one level, the first by name wins.
    fn find_privilege_by_level(&self, level: i32) -> Option<Privilege> {
        self.privileges
            .read()
            .iter()
            .filter(|(_, p)| p.level() == level)
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, p)| p.clone())
    }

    fn find_role(&self, name: &str) -> Option<Role> {
        self.roles.read().get(&name_key(name)).cloned()
    }

    fn find_principal(&self, name: &str) -> Option<Principal> {
        self.principals.read().get(&name_key(name)).cloned()
    }

    fn all_permissions(&self) -> Vec<Permission> {
        self.permissions.read().values().cloned().collect()
    }

    fn all_privileges(&self) -> Vec<Privilege> {
        let mut all: Vec<Privilege> = self.privileges.read().values().cloned().collect();
        all.sort();
        all
    }

    fn all_roles(&self) -> Vec<Role> {
        self.roles.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let store = MemoryStore::seeded([
            Permission::new("Publish").into(),
            Role::new("Editor").into(),
            Principal::new("Alice").into(),
        ])
        .unwrap();

        assert_eq!(store.find_permission("publish").unwrap().name(), "Publish");
        assert!(store.find_role("EDITOR").is_some());
        assert!(store.find_principal(" alice ").is_some());
        assert!(store.find_permission("save").is_none());
    }

    #[test]
    fn test_blank_name_rejected() {
        let store = MemoryStore::new();
        let err = store.save(Permission::new("   ").into()).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidName(_)));
        assert!(store.all_permissions().is_empty());
    }

    #[test]
    fn test_save_replaces_and_remove_deletes() {
        let store = MemoryStore::new();
        store.save(Permission::new("publish").into()).unwrap();
        store
            .save(Permission::new("PUBLISH").implies("save").into())
            .unwrap();
        assert_eq!(store.all_permissions().len(), 1);
        assert_eq!(store.find_permission("publish").unwrap().implied().count(), 1);

        assert!(store.remove(EntityKind::Permission, "Publish").unwrap());
        assert!(!store.remove(EntityKind::Permission, "publish").unwrap());
        assert!(store.find_permission("publish").is_none());
    }

    #[test]
    fn test_privileges_by_level_and_sorted() {
        let store = MemoryStore::seeded([
            Privilege::new("root", 9999).into(),
            Privilege::new("user", 10).into(),
            Privilege::new("staff", 50).into(),
        ])
        .unwrap();

        assert_eq!(store.find_privilege_by_level(50).unwrap().name(), "staff");
        assert!(store.find_privilege_by_level(51).is_none());

        let levels: Vec<i32> = store.all_privileges().iter().map(|p| p.level()).collect();
        assert_eq!(levels, vec![10, 50, 9999]);
    }

    #[test]
    fn test_shared_level_resolves_to_first_name() {
        let names = ["staff", "Moderator", "editor"];
        for shift in 0..names.len() {
            let store = MemoryStore::new();
            for i in 0..names.len() {
                let name = names[(i + shift) % names.len()];
                store.save(Privilege::new(name, 50).into()).unwrap();
            }
            assert_eq!(store.find_privilege_by_level(50).unwrap().name(), "editor");
        }
    }
}
