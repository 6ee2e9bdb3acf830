//! Transitive expansion of a principal's permissions.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::context::AuthzContext;
use crate::service::{AuthorizationService, PersistentService};
use crate::types::{name_key, Permission, Principal};

/// Direct grants plus every role's grants, expanded through implied
/// permissions.
///
/// Role permissions are fetched through `auth` so storage-backed services
/// can substitute the stored role definition.
pub fn resolve<A>(auth: &A, principal: &Principal, ctx: &AuthzContext) -> HashSet<Permission>
where
    A: AuthorizationService + ?Sized,
{
    let mut granted = auth.permissions(principal, ctx);
    for role in auth.roles(principal, ctx) {
        granted.extend(auth.role_permissions(&role, ctx));
    }

    let closure = expand(granted, ctx.persistence());
    debug!(
        "Resolved {} permissions for principal '{}'",
        closure.len(),
        principal.name()
    );
    closure
}

/// Expand `start` through implied permissions.
///
/// Implied names are looked up in `persistence` so stored definitions carry
/// their own implications. A name with no stored definition is still granted
/// as a plain permission of that name. Blank names are skipped with a
/// warning. Each permission is visited at most once, so implication cycles
/// terminate.
pub fn expand<I>(start: I, persistence: &dyn PersistentService) -> HashSet<Permission>
where
    I: IntoIterator<Item = Permission>,
{
    let mut visited: HashSet<String> = HashSet::new();
    let mut closure: HashSet<Permission> = HashSet::new();
    let mut pending: Vec<Permission> = start.into_iter().collect();

    while let Some(permission) = pending.pop() {
        if !visited.insert(permission.key()) {
            continue;
        }

        for implied in permission.implied() {
            let key = name_key(implied);
            if key.is_empty() {
                warn!(
                    "Permission '{}' implies a blank permission name, skipping",
                    permission.name()
                );
                continue;
            }
            if visited.contains(&key) {
                continue;
            }
            let next = persistence.find_permission(implied).unwrap_or_else(|| {
                debug!(
                    "Permission '{}' implies unstored permission '{}'",
                    permission.name(),
                    implied
                );
                Permission::new(implied.trim())
            });
            pending.push(next);
        }

        closure.insert(permission);
    }

    closure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn store(permissions: Vec<Permission>) -> MemoryStore {
        MemoryStore::seeded(permissions.into_iter().map(Into::into)).unwrap()
    }

    fn names(closure: &HashSet<Permission>) -> Vec<String> {
        let mut names: Vec<String> = closure.iter().map(|p| p.name().to_string()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_without_implications_closure_is_start_set() {
        let persistence = store(vec![]);
        let closure = expand(
            vec![Permission::new("read"), Permission::new("write")],
            &persistence,
        );
        assert_eq!(names(&closure), vec!["read", "write"]);
    }

    #[test]
    fn test_two_levels_of_implication() {
        let persistence = store(vec![
            Permission::new("q").implies("r"),
            Permission::new("r"),
        ]);
        let closure = expand(vec![Permission::new("p").implies("q")], &persistence);
        assert_eq!(names(&closure), vec!["p", "q", "r"]);
    }

    #[test]
    fn test_cycle_terminates() {
        let persistence = store(vec![
            Permission::new("p").implies("q"),
            Permission::new("q").implies("r"),
            Permission::new("r").implies("p"),
        ]);
        let closure = expand(vec![Permission::new("p").implies("q")], &persistence);
        assert_eq!(names(&closure), vec!["p", "q", "r"]);
    }

    #[test]
    fn test_self_implication_terminates() {
        let persistence = store(vec![]);
        let closure = expand(vec![Permission::new("p").implies("P")], &persistence);
        assert_eq!(names(&closure), vec!["p"]);
    }

    #[test]
    fn test_unstored_implications_are_granted_by_name() {
        let persistence = store(vec![]);
        let closure = expand(
            vec![Permission::new("publish").implies("save")],
            &persistence,
        );
        assert_eq!(names(&closure), vec!["publish", "save"]);
        assert!(closure.contains(&Permission::new("SAVE")));
    }

    #[test]
    fn test_stored_definition_carries_its_implications() {
        let persistence = store(vec![Permission::new("save").implies("draft")]);
        let closure = expand(
            vec![Permission::new("publish").implies("save")],
            &persistence,
        );
        assert_eq!(names(&closure), vec!["draft", "publish", "save"]);
    }

    #[test]
    fn test_blank_implications_are_skipped() {
        let persistence = store(vec![]);
        let start = Permission::new("publish").implies("save").implies("  ");
        let closure = expand(vec![start], &persistence);
        assert_eq!(names(&closure), vec!["publish", "save"]);
    }

    #[test]
    fn test_duplicate_start_entries_collapse() {
        let persistence = store(vec![]);
        let closure = expand(
            vec![Permission::new("read"), Permission::new("READ")],
            &persistence,
        );
        assert_eq!(closure.len(), 1);
    }
}
