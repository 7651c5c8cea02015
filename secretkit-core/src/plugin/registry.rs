//! Plugin registration and lookup.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::queue::EventSender;
use crate::SecretsResult;

use super::{
    AuthenticationPlugin, EncryptedStoragePlugin, EncryptionPlugin, PluginLoader, SecretsPlugin,
    StoragePlugin,
};

/// Per-category plugin name listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginRegistryInfo {
    /// Registered storage plugins.
    pub storage: Vec<String>,
    /// Registered encryption plugins.
    pub encryption: Vec<String>,
    /// Registered encrypted-storage plugins.
    pub encrypted_storage: Vec<String>,
    /// Registered authentication plugins.
    pub authentication: Vec<String>,
}

/// Holds the loaded plugins, classified by capability.
///
/// A plugin is filed under exactly one category: the first capability it
/// advertises in the order storage, encryption, encrypted storage,
/// authentication. Encrypted-storage plugins are additionally indexed as
/// potential crypto-storage providers for the sibling crypto subsystem.
#[derive(Default)]
pub struct PluginRegistry {
    storage: BTreeMap<String, Arc<dyn StoragePlugin>>,
    encryption: BTreeMap<String, Arc<dyn EncryptionPlugin>>,
    encrypted_storage: BTreeMap<String, Arc<dyn EncryptedStoragePlugin>>,
    authentication: BTreeMap<String, Arc<dyn AuthenticationPlugin>>,
    potential_crypto_storage: BTreeMap<String, Arc<dyn EncryptedStoragePlugin>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies and registers a plugin. Authentication plugins are
    /// connected to the processor mailbox. Returns `false` (and logs) for a
    /// plugin that advertises no recognised capability.
    pub fn register(&mut self, plugin: Arc<dyn SecretsPlugin>, events: &EventSender) -> bool {
        let name = plugin.name().to_owned();
        if let Some(storage) = Arc::clone(&plugin).as_storage() {
            debug!(plugin = %name, "registered storage plugin");
            self.storage.insert(name, storage);
            true
        } else if let Some(encryption) = Arc::clone(&plugin).as_encryption() {
            debug!(plugin = %name, "registered encryption plugin");
            self.encryption.insert(name, encryption);
            true
        } else if let Some(encrypted) = Arc::clone(&plugin).as_encrypted_storage() {
            debug!(plugin = %name, "registered encrypted storage plugin");
            self.potential_crypto_storage
                .insert(name.clone(), Arc::clone(&encrypted));
            self.encrypted_storage.insert(name, encrypted);
            true
        } else if let Some(authentication) = Arc::clone(&plugin).as_authentication() {
            debug!(plugin = %name, "registered authentication plugin");
            authentication.connect(events.clone());
            self.authentication.insert(name, authentication);
            true
        } else {
            warn!(plugin = %name, "plugin advertises no recognised capability; skipping");
            false
        }
    }

    /// Registers every plugin a loader discovers under `dir`. Individual
    /// misclassified plugins are skipped, not fatal.
    pub fn load_plugins(
        &mut self,
        loader: &dyn PluginLoader,
        dir: &Path,
        events: &EventSender,
    ) -> SecretsResult<()> {
        debug!(directory = %dir.display(), "loading plugins");
        for plugin in loader.load(dir)? {
            self.register(plugin, events);
        }
        Ok(())
    }

    /// Per-category plugin name listings.
    #[must_use]
    pub fn info(&self) -> PluginRegistryInfo {
        PluginRegistryInfo {
            storage: self.storage.keys().cloned().collect(),
            encryption: self.encryption.keys().cloned().collect(),
            encrypted_storage: self.encrypted_storage.keys().cloned().collect(),
            authentication: self.authentication.keys().cloned().collect(),
        }
    }

    /// Looks up a storage plugin.
    #[must_use]
    pub fn storage(&self, name: &str) -> Option<Arc<dyn StoragePlugin>> {
        self.storage.get(name).cloned()
    }

    /// Looks up an encryption plugin.
    #[must_use]
    pub fn encryption(&self, name: &str) -> Option<Arc<dyn EncryptionPlugin>> {
        self.encryption.get(name).cloned()
    }

    /// Looks up an encrypted-storage plugin.
    #[must_use]
    pub fn encrypted_storage(&self, name: &str) -> Option<Arc<dyn EncryptedStoragePlugin>> {
        self.encrypted_storage.get(name).cloned()
    }

    /// Looks up an authentication plugin.
    #[must_use]
    pub fn authentication(&self, name: &str) -> Option<Arc<dyn AuthenticationPlugin>> {
        self.authentication.get(name).cloned()
    }

    /// Names of plugins that can host crypto-subsystem key storage.
    #[must_use]
    pub fn potential_crypto_storage_names(&self) -> Vec<String> {
        self.potential_crypto_storage.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::memory::{
        MemoryAuthenticationPlugin, MemoryEncryptedStoragePlugin, MemoryEncryptionPlugin,
        MemoryStoragePlugin,
    };
    use crate::plugin::AuthenticationTypes;
    use crate::queue::mailbox;

    struct CapabilityFreePlugin;

    impl SecretsPlugin for CapabilityFreePlugin {
        fn name(&self) -> &str {
            "useless"
        }
    }

    #[test]
    fn test_classification_per_category() {
        let (events, _rx) = mailbox();
        let mut registry = PluginRegistry::new();

        assert!(registry.register(Arc::new(MemoryStoragePlugin::new("files")), &events));
        assert!(registry.register(Arc::new(MemoryEncryptionPlugin::new("aes")), &events));
        assert!(registry.register(
            Arc::new(MemoryEncryptedStoragePlugin::new("sqlcipher")),
            &events
        ));
        assert!(registry.register(
            Arc::new(MemoryAuthenticationPlugin::new(
                "prompt",
                AuthenticationTypes::SYSTEM
            )),
            &events
        ));
        assert!(!registry.register(Arc::new(CapabilityFreePlugin), &events));

        let info = registry.info();
        assert_eq!(info.storage, vec!["files".to_owned()]);
        assert_eq!(info.encryption, vec!["aes".to_owned()]);
        assert_eq!(info.encrypted_storage, vec!["sqlcipher".to_owned()]);
        assert_eq!(info.authentication, vec!["prompt".to_owned()]);

        assert!(registry.storage("files").is_some());
        assert!(registry.storage("sqlcipher").is_none());
        assert!(registry.encrypted_storage("sqlcipher").is_some());
    }

    #[test]
    fn test_encrypted_storage_feeds_crypto_index() {
        let (events, _rx) = mailbox();
        let mut registry = PluginRegistry::new();
        registry.register(
            Arc::new(MemoryEncryptedStoragePlugin::new("sqlcipher")),
            &events,
        );
        assert_eq!(
            registry.potential_crypto_storage_names(),
            vec!["sqlcipher".to_owned()]
        );
    }
}
