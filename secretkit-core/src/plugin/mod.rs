//! Plugin capability traits and classification.
//!
//! The processor delegates ciphertext storage, cryptography, and
//! user-authentication flows to plugins. Each plugin implements the base
//! [`SecretsPlugin`] trait plus one or more capability traits; the registry
//! classifies a plugin by the maximal capability it advertises, in priority
//! order storage → encryption → encrypted storage → authentication.
//!
//! All capability methods are synchronous from the processor's perspective;
//! a plugin's internal concurrency is its own business. The one exception
//! is user interaction: an authentication plugin *begins* a flow
//! synchronously and later posts the completion as a mailbox event through
//! the [`EventSender`] it was connected with at registration.

mod registry;

pub mod memory;

pub use registry::{PluginRegistry, PluginRegistryInfo};

use std::path::Path;
use std::sync::Arc;

use crate::interaction::InteractionParameters;
use crate::queue::EventSender;
use crate::types::{FilterData, FilterOperator, LockKey, SecretBytes};
use crate::SecretsResult;

/// Set of authentication mechanisms a plugin can drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthenticationTypes(u32);

impl AuthenticationTypes {
    /// No mechanism advertised.
    pub const NONE: Self = Self(0);
    /// System-wide authentication dialogs.
    pub const SYSTEM: Self = Self(1);
    /// Device-lock credential entry.
    pub const DEVICE_LOCK: Self = Self(1 << 1);
    /// In-process, application-specific authentication; flows of this kind
    /// require the caller to provide an interaction service address.
    pub const APPLICATION_SPECIFIC: Self = Self(1 << 2);

    /// Whether every mechanism in `other` is present in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for AuthenticationTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Base trait implemented by every loadable plugin.
///
/// The capability accessors return `Some` for each interface the plugin
/// implements. They take `Arc<Self>` so the registry can hold a single
/// handle per plugin and hand out owned capability views.
pub trait SecretsPlugin: Send + Sync + 'static {
    /// Unique plugin name; bookkeeping rows reference plugins by this name.
    fn name(&self) -> &str;

    /// Storage capability, if implemented.
    fn as_storage(self: Arc<Self>) -> Option<Arc<dyn StoragePlugin>> {
        None
    }

    /// Encryption capability, if implemented.
    fn as_encryption(self: Arc<Self>) -> Option<Arc<dyn EncryptionPlugin>> {
        None
    }

    /// Encrypted-storage capability, if implemented.
    fn as_encrypted_storage(self: Arc<Self>) -> Option<Arc<dyn EncryptedStoragePlugin>> {
        None
    }

    /// Authentication capability, if implemented.
    fn as_authentication(self: Arc<Self>) -> Option<Arc<dyn AuthenticationPlugin>> {
        None
    }
}

/// Ciphertext storage backend for split-plugin collections.
///
/// Name and value bytes arrive already encrypted; filter data is stored
/// plaintext so find operations work without the unlock key.
pub trait StoragePlugin: Send + Sync {
    /// Creates a collection.
    fn create_collection(&self, collection_name: &str) -> SecretsResult<()>;

    /// Removes a collection and everything in it.
    fn remove_collection(&self, collection_name: &str) -> SecretsResult<()>;

    /// Stores an encrypted name/value pair keyed by hashed secret name.
    fn set_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        encrypted_name: &[u8],
        encrypted_value: &[u8],
        filter_data: &FilterData,
    ) -> SecretsResult<()>;

    /// Returns `(encrypted name, encrypted value, filter data)`.
    fn get_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
    ) -> SecretsResult<(Vec<u8>, Vec<u8>, FilterData)>;

    /// Removes a secret.
    fn remove_secret(&self, collection_name: &str, hashed_secret_name: &str)
        -> SecretsResult<()>;

    /// Returns the encrypted names of secrets whose filter data matches.
    fn find_secrets(
        &self,
        collection_name: &str,
        filter: &FilterData,
        operator: FilterOperator,
    ) -> SecretsResult<Vec<Vec<u8>>>;
}

/// Symmetric encryption provider for split-plugin collections.
pub trait EncryptionPlugin: Send + Sync {
    /// Encrypts `plaintext` under `key`.
    fn encrypt(&self, plaintext: &[u8], key: &LockKey) -> SecretsResult<Vec<u8>>;

    /// Decrypts `ciphertext` under `key`.
    fn decrypt(&self, ciphertext: &[u8], key: &LockKey) -> SecretsResult<SecretBytes>;
}

/// Combined storage-and-encryption backend that owns its collections' lock
/// state.
pub trait EncryptedStoragePlugin: Send + Sync {
    /// Creates a collection protected by `key`; the collection starts
    /// unlocked.
    fn create_collection(&self, collection_name: &str, key: &LockKey) -> SecretsResult<()>;

    /// Removes a collection and everything in it.
    fn remove_collection(&self, collection_name: &str) -> SecretsResult<()>;

    /// Whether the collection is currently locked.
    fn is_locked(&self, collection_name: &str) -> SecretsResult<bool>;

    /// Applies `key` as the collection's encryption key. An empty key
    /// relocks the collection. Success does not imply the key was correct;
    /// callers re-query [`Self::is_locked`].
    fn set_encryption_key(&self, collection_name: &str, key: &LockKey) -> SecretsResult<()>;

    /// Writes a secret into an unlocked collection.
    fn set_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        secret_name: &str,
        value: &SecretBytes,
        filter_data: &FilterData,
    ) -> SecretsResult<()>;

    /// Single-shot keyed write that leaves the collection's lock state
    /// untouched; used for standalone secrets.
    fn set_secret_with_key(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        secret_name: &str,
        value: &SecretBytes,
        filter_data: &FilterData,
        key: &LockKey,
    ) -> SecretsResult<()>;

    /// Reads `(name, value, filter data)` from an unlocked collection.
    fn get_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
    ) -> SecretsResult<(String, SecretBytes, FilterData)>;

    /// Single-shot keyed read that leaves the collection's lock state
    /// untouched; used for standalone secrets.
    fn access_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        key: &LockKey,
    ) -> SecretsResult<(String, SecretBytes, FilterData)>;

    /// Removes a secret from an unlocked collection.
    fn remove_secret(&self, collection_name: &str, hashed_secret_name: &str)
        -> SecretsResult<()>;

    /// Returns the names of secrets in an unlocked collection whose filter
    /// data matches.
    fn find_secrets(
        &self,
        collection_name: &str,
        filter: &FilterData,
        operator: FilterOperator,
    ) -> SecretsResult<Vec<String>>;
}

/// Driver for user-authentication and user-input flows.
pub trait AuthenticationPlugin: Send + Sync {
    /// Mechanisms this plugin can drive.
    fn authentication_types(&self) -> AuthenticationTypes;

    /// Connects the plugin to the processor mailbox. Completion signals are
    /// posted there; plugins never call back into the dispatcher directly.
    fn connect(&self, events: EventSender);

    /// Begins a user-input flow for `request_id`. The collected input
    /// arrives later as a `UserInputCompleted` mailbox event.
    fn begin_user_input_interaction(
        &self,
        caller_pid: u32,
        request_id: u64,
        parameters: &InteractionParameters,
        interaction_service_address: &str,
    ) -> SecretsResult<()>;
}

/// Discovers and instantiates plugins found under a directory.
///
/// Dynamic-library loading lives in the daemon binary; the core only
/// consumes the instances a loader hands back.
pub trait PluginLoader {
    /// Returns one instance per plugin found under `dir`.
    fn load(&self, dir: &Path) -> SecretsResult<Vec<Arc<dyn SecretsPlugin>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_types_bitset() {
        let types = AuthenticationTypes::SYSTEM | AuthenticationTypes::APPLICATION_SPECIFIC;
        assert!(types.contains(AuthenticationTypes::SYSTEM));
        assert!(types.contains(AuthenticationTypes::APPLICATION_SPECIFIC));
        assert!(!types.contains(AuthenticationTypes::DEVICE_LOCK));
        assert!(types.contains(AuthenticationTypes::NONE));
        assert!(!AuthenticationTypes::NONE.contains(AuthenticationTypes::SYSTEM));
    }
}
