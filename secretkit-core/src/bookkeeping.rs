//! Typed façade over the metadata store ("bookkeeping").
//!
//! Bookkeeping is the single source of truth about which collections and
//! secrets exist and how they are protected; ciphertext itself lives with
//! the plugins. Every call is its own atomic unit; the processor orders
//! calls around plugin operations so that after any crash or partial
//! failure only a bookkeeping row can be stale, never plugin-held data.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use tracing::warn;

use crate::types::ProtectionMetadata;
use crate::{SecretsError, SecretsResult};

/// Operations the processor issues against the metadata store.
///
/// The `cleanup_delete_*` operations are best-effort removals of rows whose
/// plugin-side counterpart failed to materialise. Implementations must
/// preserve the reported plugin error: when cleanup itself fails, they log
/// the secondary cause and return `reported` unchanged, so the caller always
/// surfaces the original failure.
pub trait BookkeepingStore: Send + Sync {
    /// Whether a collection row exists.
    fn collection_exists(&self, collection_name: &str) -> SecretsResult<bool>;

    /// Inserts a collection row.
    fn insert_collection(
        &self,
        collection_name: &str,
        metadata: &ProtectionMetadata,
    ) -> SecretsResult<()>;

    /// Deletes a collection row and any secret rows referencing it.
    fn delete_collection(&self, collection_name: &str) -> SecretsResult<()>;

    /// Best-effort removal of a collection row whose plugin create failed.
    fn cleanup_delete_collection(
        &self,
        collection_name: &str,
        reported: SecretsError,
    ) -> SecretsResult<()>;

    /// Metadata of a collection row, if present.
    fn collection_metadata(
        &self,
        collection_name: &str,
    ) -> SecretsResult<Option<ProtectionMetadata>>;

    /// Names of all collection rows.
    fn collection_names(&self) -> SecretsResult<Vec<String>>;

    /// Whether a secret row exists.
    fn secret_exists(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
    ) -> SecretsResult<bool>;

    /// Inserts a secret row. The referenced collection row must exist.
    fn insert_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        metadata: &ProtectionMetadata,
    ) -> SecretsResult<()>;

    /// Replaces an existing secret row.
    fn update_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        metadata: &ProtectionMetadata,
    ) -> SecretsResult<()>;

    /// Deletes a secret row.
    fn delete_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
    ) -> SecretsResult<()>;

    /// Best-effort removal of a secret row whose plugin write failed.
    fn cleanup_delete_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        reported: SecretsError,
    ) -> SecretsResult<()>;

    /// Metadata of a secret row, if present.
    fn secret_metadata(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
    ) -> SecretsResult<Option<ProtectionMetadata>>;
}

// =============================================================================
// Memory bookkeeping
// =============================================================================

/// In-memory bookkeeping store backed by `BTreeMap`s.
///
/// **FOR TESTING ONLY** — nothing persists. Enforces the same uniqueness
/// and foreign-key constraints as the on-disk schema so that the
/// processor's ordering discipline is exercised realistically. Cleanup
/// failures can be injected to test error-preservation paths.
#[derive(Default)]
pub struct MemoryBookkeeping {
    collections: RwLock<BTreeMap<String, ProtectionMetadata>>,
    secrets: RwLock<BTreeMap<(String, String), ProtectionMetadata>>,
    fail_cleanup: AtomicBool,
}

#[allow(clippy::missing_panics_doc)]
impl MemoryBookkeeping {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `cleanup_delete_*` call fail (returning the
    /// reported plugin error per the trait contract).
    pub fn set_fail_cleanup(&self, fail: bool) {
        self.fail_cleanup.store(fail, Ordering::SeqCst);
    }

    /// Number of secret rows in `collection_name`, for test assertions.
    #[must_use]
    pub fn secret_row_count(&self, collection_name: &str) -> usize {
        self.secrets
            .read()
            .unwrap()
            .keys()
            .filter(|(collection, _)| collection == collection_name)
            .count()
    }
}

#[allow(clippy::significant_drop_tightening)]
impl BookkeepingStore for MemoryBookkeeping {
    fn collection_exists(&self, collection_name: &str) -> SecretsResult<bool> {
        Ok(self.collections.read().unwrap().contains_key(collection_name))
    }

    fn insert_collection(
        &self,
        collection_name: &str,
        metadata: &ProtectionMetadata,
    ) -> SecretsResult<()> {
        let mut collections = self.collections.write().unwrap();
        if collections.contains_key(collection_name) {
            return Err(SecretsError::bookkeeping(format!(
                "collection row already exists: {collection_name}"
            )));
        }
        collections.insert(collection_name.to_owned(), metadata.clone());
        Ok(())
    }

    fn delete_collection(&self, collection_name: &str) -> SecretsResult<()> {
        self.collections.write().unwrap().remove(collection_name);
        self.secrets
            .write()
            .unwrap()
            .retain(|(collection, _), _| collection != collection_name);
        Ok(())
    }

    fn cleanup_delete_collection(
        &self,
        collection_name: &str,
        reported: SecretsError,
    ) -> SecretsResult<()> {
        if self.fail_cleanup.load(Ordering::SeqCst) {
            warn!(
                collection = collection_name,
                "cleanup of collection row failed (injected); surfacing the plugin error"
            );
            return Err(reported);
        }
        self.delete_collection(collection_name)
    }

    fn collection_metadata(
        &self,
        collection_name: &str,
    ) -> SecretsResult<Option<ProtectionMetadata>> {
        Ok(self.collections.read().unwrap().get(collection_name).cloned())
    }

    fn collection_names(&self) -> SecretsResult<Vec<String>> {
        Ok(self.collections.read().unwrap().keys().cloned().collect())
    }

    fn secret_exists(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
    ) -> SecretsResult<bool> {
        Ok(self
            .secrets
            .read()
            .unwrap()
            .contains_key(&(collection_name.to_owned(), hashed_secret_name.to_owned())))
    }

    fn insert_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        metadata: &ProtectionMetadata,
    ) -> SecretsResult<()> {
        if !self.collections.read().unwrap().contains_key(collection_name) {
            return Err(SecretsError::bookkeeping(format!(
                "no collection row for secret insert: {collection_name}"
            )));
        }
        let key = (collection_name.to_owned(), hashed_secret_name.to_owned());
        let mut secrets = self.secrets.write().unwrap();
        if secrets.contains_key(&key) {
            return Err(SecretsError::bookkeeping(format!(
                "secret row already exists in {collection_name}"
            )));
        }
        secrets.insert(key, metadata.clone());
        Ok(())
    }

    fn update_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        metadata: &ProtectionMetadata,
    ) -> SecretsResult<()> {
        let key = (collection_name.to_owned(), hashed_secret_name.to_owned());
        let mut secrets = self.secrets.write().unwrap();
        if !secrets.contains_key(&key) {
            return Err(SecretsError::bookkeeping(format!(
                "no secret row to update in {collection_name}"
            )));
        }
        secrets.insert(key, metadata.clone());
        Ok(())
    }

    fn delete_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
    ) -> SecretsResult<()> {
        self.secrets
            .write()
            .unwrap()
            .remove(&(collection_name.to_owned(), hashed_secret_name.to_owned()));
        Ok(())
    }

    fn cleanup_delete_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        reported: SecretsError,
    ) -> SecretsResult<()> {
        if self.fail_cleanup.load(Ordering::SeqCst) {
            warn!(
                collection = collection_name,
                "cleanup of secret row failed (injected); surfacing the plugin error"
            );
            return Err(reported);
        }
        self.delete_secret(collection_name, hashed_secret_name)
    }

    fn secret_metadata(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
    ) -> SecretsResult<Option<ProtectionMetadata>> {
        Ok(self
            .secrets
            .read()
            .unwrap()
            .get(&(collection_name.to_owned(), hashed_secret_name.to_owned()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccessControlMode, DeviceLockSemantic, UnlockSemantic};

    fn metadata() -> ProtectionMetadata {
        ProtectionMetadata {
            application_id: "org.example.app".to_owned(),
            uses_device_lock: true,
            storage_plugin: "storage".to_owned(),
            encryption_plugin: "encryption".to_owned(),
            authentication_plugin: "auth".to_owned(),
            unlock_semantic: UnlockSemantic::DeviceLock(DeviceLockSemantic::KeepUnlocked),
            custom_lock_timeout_ms: 0,
            access_control: AccessControlMode::OwnerOnly,
        }
    }

    #[test]
    fn test_collection_round_trip() {
        let store = MemoryBookkeeping::new();
        assert!(!store.collection_exists("vault").unwrap());

        store.insert_collection("vault", &metadata()).unwrap();
        assert!(store.collection_exists("vault").unwrap());
        assert_eq!(store.collection_names().unwrap(), vec!["vault".to_owned()]);
        assert_eq!(
            store.collection_metadata("vault").unwrap(),
            Some(metadata())
        );

        store
            .insert_collection("vault", &metadata())
            .expect_err("duplicate insert rejected");

        store.delete_collection("vault").unwrap();
        assert!(!store.collection_exists("vault").unwrap());
    }

    #[test]
    fn test_secret_requires_collection_row() {
        let store = MemoryBookkeeping::new();
        store
            .insert_secret("vault", "abc", &metadata())
            .expect_err("foreign key enforced");

        store.insert_collection("vault", &metadata()).unwrap();
        store.insert_secret("vault", "abc", &metadata()).unwrap();
        assert!(store.secret_exists("vault", "abc").unwrap());

        // deleting the collection cascades to its secret rows
        store.delete_collection("vault").unwrap();
        assert!(!store.secret_exists("vault", "abc").unwrap());
    }

    #[test]
    fn test_cleanup_preserves_reported_error() {
        let store = MemoryBookkeeping::new();
        store.insert_collection("vault", &metadata()).unwrap();

        let reported = SecretsError::plugin("create exploded");
        store
            .cleanup_delete_collection("vault", reported.clone())
            .unwrap();
        assert!(!store.collection_exists("vault").unwrap());

        store.insert_collection("vault", &metadata()).unwrap();
        store.set_fail_cleanup(true);
        let err = store
            .cleanup_delete_collection("vault", reported.clone())
            .unwrap_err();
        assert_eq!(err, reported);
    }
}
