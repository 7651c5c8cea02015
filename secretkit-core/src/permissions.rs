//! Caller-identity resolution.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Resolves a caller pid to an application identity.
///
/// Platform applications bypass owner-only access checks by resolving to a
/// shared platform identity.
pub trait PermissionOracle: Send + Sync {
    /// Application id of the process with `pid`.
    fn application_id(&self, pid: u32) -> String;

    /// The shared identity platform applications resolve to.
    fn platform_application_id(&self) -> String;

    /// Whether `pid` belongs to a platform application.
    fn is_platform_application(&self, pid: u32) -> bool;
}

/// Static pid → application-id table, for tests and single-user
/// deployments.
///
/// Unknown pids resolve to a synthetic `pid:<n>` identity so that distinct
/// unregistered callers still have distinct owners.
#[derive(Default)]
pub struct StaticPermissions {
    applications: RwLock<HashMap<u32, String>>,
    platform_pids: RwLock<HashSet<u32>>,
}

impl StaticPermissions {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pid` as belonging to `application_id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn insert_application(&self, pid: u32, application_id: impl Into<String>) {
        self.applications
            .write()
            .unwrap()
            .insert(pid, application_id.into());
    }

    /// Marks `pid` as a platform application.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn insert_platform(&self, pid: u32) {
        self.platform_pids.write().unwrap().insert(pid);
    }
}

impl PermissionOracle for StaticPermissions {
    fn application_id(&self, pid: u32) -> String {
        self.applications
            .read()
            .unwrap()
            .get(&pid)
            .cloned()
            .unwrap_or_else(|| format!("pid:{pid}"))
    }

    fn platform_application_id(&self) -> String {
        "secretkit.platform".to_owned()
    }

    fn is_platform_application(&self, pid: u32) -> bool {
        self.platform_pids.read().unwrap().contains(&pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_pids_get_distinct_identities() {
        let permissions = StaticPermissions::new();
        assert_ne!(permissions.application_id(1), permissions.application_id(2));
    }

    #[test]
    fn test_registered_application_and_platform() {
        let permissions = StaticPermissions::new();
        permissions.insert_application(41, "org.example.notes");
        permissions.insert_platform(42);

        assert_eq!(permissions.application_id(41), "org.example.notes");
        assert!(!permissions.is_platform_application(41));
        assert!(permissions.is_platform_application(42));
        assert_eq!(permissions.platform_application_id(), "secretkit.platform");
    }
}
