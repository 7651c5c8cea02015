//! The request processor: the daemon's in-memory state machine.
//!
//! The processor validates and authorises each request, sequences
//! bookkeeping writes around plugin calls so that only bookkeeping can be
//! left stale by a crash or plugin failure, suspends requests that need
//! user input, and maintains cached unlock keys with timed relocking.
//!
//! # Threading model
//!
//! Single-threaded cooperative: every dispatcher method and the completion
//! handler run on one logical actor. Plugin calls are synchronous from the
//! actor's perspective. The only asynchrony is the mailbox: user-input
//! completions, authentication completions, and relock-timer fires arrive
//! as [`ProcessorEvent`]s that the daemon's event loop feeds to
//! [`RequestProcessor::handle_event`] in FIFO order.

mod collections;
mod completion;
mod keycache;
mod pending;
mod relock;
mod secrets;
mod standalone;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::bookkeeping::BookkeepingStore;
use crate::config::ProcessorConfig;
use crate::defaults;
use crate::interaction::{InteractionOperation, InteractionParameters};
use crate::permissions::PermissionOracle;
use crate::plugin::{
    AuthenticationPlugin, EncryptedStoragePlugin, EncryptionPlugin, PluginLoader, PluginRegistry,
    PluginRegistryInfo, SecretsPlugin, StoragePlugin,
};
use crate::queue::{EventSender, ProcessorEvent, RequestQueue};
use crate::types::{
    AccessControlMode, DeviceLockSemantic, LockKey, Outcome, ProtectionMetadata, UnlockSemantic,
};
use crate::{SecretsError, SecretsResult};

use keycache::LockKeyCache;
use pending::{Continuation, PendingRequest, PendingTable};
use relock::RelockScheduler;

/// The request-processing core of the secrets daemon.
pub struct RequestProcessor {
    bookkeeping: Arc<dyn BookkeepingStore>,
    permissions: Arc<dyn PermissionOracle>,
    request_queue: Arc<dyn RequestQueue>,
    registry: PluginRegistry,
    config: ProcessorConfig,
    events: EventSender,
    collection_keys: LockKeyCache,
    standalone_keys: LockKeyCache,
    pending: PendingTable,
    relock: RelockScheduler,
}

impl RequestProcessor {
    /// Creates the processor and inserts the notional `standalone`
    /// bookkeeping row that standalone secrets hang off.
    ///
    /// # Errors
    ///
    /// Returns an error when the bookkeeping store rejects the
    /// initialisation insert.
    pub fn new(
        bookkeeping: Arc<dyn BookkeepingStore>,
        permissions: Arc<dyn PermissionOracle>,
        request_queue: Arc<dyn RequestQueue>,
        config: ProcessorConfig,
        events: EventSender,
    ) -> SecretsResult<Self> {
        let processor = Self {
            bookkeeping,
            permissions,
            request_queue,
            registry: PluginRegistry::new(),
            config,
            relock: RelockScheduler::new(events.clone()),
            events,
            collection_keys: LockKeyCache::new(),
            standalone_keys: LockKeyCache::new(),
            pending: PendingTable::new(),
        };
        processor.ensure_standalone_row()?;
        Ok(processor)
    }

    // The standalone row is notional: it exists only to satisfy the
    // foreign-key constraint on standalone secret rows.
    fn ensure_standalone_row(&self) -> SecretsResult<()> {
        if self
            .bookkeeping
            .collection_exists(defaults::STANDALONE_COLLECTION_NAME)?
        {
            return Ok(());
        }
        info!("initialising notional standalone collection row");
        let placeholder = defaults::STANDALONE_COLLECTION_NAME.to_owned();
        self.bookkeeping.insert_collection(
            defaults::STANDALONE_COLLECTION_NAME,
            &ProtectionMetadata {
                application_id: placeholder.clone(),
                uses_device_lock: false,
                storage_plugin: placeholder.clone(),
                encryption_plugin: placeholder.clone(),
                authentication_plugin: placeholder,
                unlock_semantic: UnlockSemantic::DeviceLock(DeviceLockSemantic::KeepUnlocked),
                custom_lock_timeout_ms: 0,
                access_control: AccessControlMode::OwnerOnly,
            },
        )
    }

    /// Classifies and registers a plugin instance. Authentication plugins
    /// are connected to the processor mailbox.
    pub fn register_plugin(&mut self, plugin: Arc<dyn SecretsPlugin>) -> bool {
        self.registry.register(plugin, &self.events)
    }

    /// Loads and registers every plugin found under the configured plugin
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns an error when discovery itself fails; individual
    /// misclassified plugins are logged and skipped.
    pub fn load_plugins(&mut self, loader: &dyn PluginLoader) -> SecretsResult<()> {
        let dir = self.config.plugin_dir().to_owned();
        self.registry.load_plugins(loader, &dir, &self.events)
    }

    /// Per-category listings of the registered plugins.
    #[must_use]
    pub fn plugin_info(&self) -> PluginRegistryInfo {
        self.registry.info()
    }

    /// Dispatches a mailbox event.
    pub fn handle_event(&mut self, event: ProcessorEvent) {
        match event {
            ProcessorEvent::UserInputCompleted {
                caller_pid,
                request_id,
                parameters,
                interaction_service_address,
                result,
                input,
            } => self.user_input_completed(
                caller_pid,
                request_id,
                &parameters,
                &interaction_service_address,
                result,
                input,
            ),
            ProcessorEvent::AuthenticationCompleted {
                caller_pid,
                request_id,
                result,
            } => self.authentication_completed(caller_pid, request_id, &result),
            ProcessorEvent::RelockCollection {
                collection_name,
                token,
            } => {
                if self.relock.collection_fired(&collection_name, token) {
                    self.collection_keys.remove(&collection_name);
                    debug!(
                        collection = %collection_name,
                        "relocked collection after unlock timeout"
                    );
                }
            }
            ProcessorEvent::RelockStandaloneSecret {
                hashed_secret_name,
                token,
            } => {
                if self.relock.standalone_fired(&hashed_secret_name, token) {
                    self.standalone_keys.remove(&hashed_secret_name);
                    debug!("relocked standalone secret after unlock timeout");
                }
            }
        }
    }

    /// Fetches data from the user and returns it to the caller, for use as
    /// key-derivation input.
    ///
    /// Prompts that name neither a collection nor a secret are wrapped in a
    /// warning that the data is leaving secure storage.
    ///
    /// # Errors
    ///
    /// Returns an error when the named authentication plugin is missing or
    /// refuses to begin the flow.
    pub fn user_input(
        &mut self,
        caller_pid: u32,
        request_id: u64,
        ui_params: &InteractionParameters,
    ) -> SecretsResult<Outcome<()>> {
        let caller_application_id = self.caller_application_id(caller_pid);
        let user_input_plugin = self.resolve_user_input_plugin(ui_params)?;

        let mut parameters = ui_params.clone();
        parameters.application_id = caller_application_id;
        parameters.authentication_plugin = user_input_plugin.clone();
        if parameters.collection_name.is_empty() && parameters.secret_name.is_empty() {
            parameters.prompt_text = format!(
                "An application is requesting input which will be returned to the application: {}",
                parameters.prompt_text
            );
        }
        self.park_with_interaction(
            caller_pid,
            request_id,
            &user_input_plugin,
            parameters,
            "",
            Continuation::UserInput,
        )
    }

    // =========================================================================
    // Shared helpers
    // =========================================================================

    pub(crate) fn caller_application_id(&self, caller_pid: u32) -> String {
        if self.permissions.is_platform_application(caller_pid) {
            self.permissions.platform_application_id()
        } else {
            self.permissions.application_id(caller_pid)
        }
    }

    pub(crate) fn default_authentication_plugin(&self) -> String {
        if self.config.autotest_mode() {
            format!(
                "{}{}",
                defaults::DEFAULT_AUTHENTICATION_PLUGIN_NAME,
                defaults::AUTOTEST_PLUGIN_SUFFIX
            )
        } else {
            defaults::DEFAULT_AUTHENTICATION_PLUGIN_NAME.to_owned()
        }
    }

    // Caller-supplied input-request parameters may name the plugin to use;
    // otherwise the default applies. Either way the plugin must exist.
    pub(crate) fn resolve_user_input_plugin(
        &self,
        ui_params: &InteractionParameters,
    ) -> SecretsResult<String> {
        let name = if ui_params.authentication_plugin.is_empty() {
            self.default_authentication_plugin()
        } else {
            ui_params.authentication_plugin.clone()
        };
        if self.registry.authentication(&name).is_none() {
            return Err(SecretsError::InvalidExtensionPlugin(format!(
                "cannot get user input from invalid authentication plugin: {name}"
            )));
        }
        Ok(name)
    }

    /// A storage/encryption plugin pair is valid when equal names resolve
    /// to a registered encrypted-storage plugin, or distinct names resolve
    /// to a registered storage plugin plus a registered encryption plugin.
    pub(crate) fn validate_plugin_combination(
        &self,
        storage_plugin: &str,
        encryption_plugin: &str,
    ) -> SecretsResult<()> {
        if storage_plugin == encryption_plugin {
            if self.registry.encrypted_storage(storage_plugin).is_none() {
                return Err(SecretsError::InvalidExtensionPlugin(format!(
                    "no such encrypted storage plugin: {storage_plugin}"
                )));
            }
        } else if storage_plugin.is_empty() || self.registry.storage(storage_plugin).is_none() {
            return Err(SecretsError::InvalidExtensionPlugin(format!(
                "no such storage plugin: {storage_plugin}"
            )));
        } else if encryption_plugin.is_empty()
            || self.registry.encryption(encryption_plugin).is_none()
        {
            return Err(SecretsError::InvalidExtensionPlugin(format!(
                "no such encryption plugin: {encryption_plugin}"
            )));
        }
        Ok(())
    }

    pub(crate) fn storage_plugin(&self, name: &str) -> SecretsResult<Arc<dyn StoragePlugin>> {
        self.registry.storage(name).ok_or_else(|| {
            SecretsError::InvalidExtensionPlugin(format!("no such storage plugin: {name}"))
        })
    }

    pub(crate) fn encryption_plugin(&self, name: &str) -> SecretsResult<Arc<dyn EncryptionPlugin>> {
        self.registry.encryption(name).ok_or_else(|| {
            SecretsError::InvalidExtensionPlugin(format!("no such encryption plugin: {name}"))
        })
    }

    pub(crate) fn encrypted_storage_plugin(
        &self,
        name: &str,
    ) -> SecretsResult<Arc<dyn EncryptedStoragePlugin>> {
        self.registry.encrypted_storage(name).ok_or_else(|| {
            SecretsError::InvalidExtensionPlugin(format!(
                "no such encrypted storage plugin: {name}"
            ))
        })
    }

    pub(crate) fn authentication_plugin(
        &self,
        name: &str,
    ) -> SecretsResult<Arc<dyn AuthenticationPlugin>> {
        self.registry.authentication(name).ok_or_else(|| {
            SecretsError::InvalidExtensionPlugin(format!(
                "no such authentication plugin: {name}"
            ))
        })
    }

    /// Owner-only and system access-control checks shared by every
    /// metadata-guarded operation. System access control is a placeholder
    /// for a future policy daemon.
    pub(crate) fn check_access(
        metadata: &ProtectionMetadata,
        caller_application_id: &str,
        subject: &str,
    ) -> SecretsResult<()> {
        match metadata.access_control {
            AccessControlMode::System => Err(SecretsError::OperationNotSupported(
                "system access control requests are not yet supported".to_owned(),
            )),
            AccessControlMode::OwnerOnly if metadata.application_id != caller_application_id => {
                Err(SecretsError::Permissions(format!(
                    "{subject} is owned by a different application"
                )))
            }
            AccessControlMode::OwnerOnly => Ok(()),
        }
    }

    /// Begins a user-input interaction and parks the continuation. The
    /// begin call failing means nothing was parked and the error surfaces
    /// directly.
    pub(crate) fn park_with_interaction<T>(
        &mut self,
        caller_pid: u32,
        request_id: u64,
        authentication_plugin: &str,
        parameters: InteractionParameters,
        interaction_service_address: &str,
        continuation: Continuation,
    ) -> SecretsResult<Outcome<T>> {
        let auth = self.authentication_plugin(authentication_plugin)?;
        auth.begin_user_input_interaction(
            caller_pid,
            request_id,
            &parameters,
            interaction_service_address,
        )?;
        self.pending.park(PendingRequest {
            caller_pid,
            request_id,
            continuation,
        });
        Ok(Outcome::Pending)
    }

    /// Builds the parameters for an unlock-key interaction flow.
    pub(crate) fn unlock_interaction_parameters(
        &self,
        caller_pid: u32,
        collection_name: &str,
        secret_name: &str,
        authentication_plugin: &str,
        operation: InteractionOperation,
        prompt_id: &str,
    ) -> InteractionParameters {
        InteractionParameters {
            application_id: self.caller_application_id(caller_pid),
            collection_name: collection_name.to_owned(),
            secret_name: secret_name.to_owned(),
            authentication_plugin: authentication_plugin.to_owned(),
            operation,
            prompt_id: prompt_id.to_owned(),
            ..InteractionParameters::default()
        }
    }

    /// Arms the relock timer for a timeout-relock collection whose unlock
    /// key is cached. Encrypted-storage collections never cache a key and
    /// therefore never arm timers; their plugin owns the lock state.
    pub(crate) fn arm_collection_relock(
        &mut self,
        collection_name: &str,
        unlock_semantic: UnlockSemantic,
        custom_lock_timeout_ms: u64,
    ) {
        if unlock_semantic.is_timeout_relock() && self.collection_keys.contains(collection_name) {
            self.relock.schedule_collection(
                collection_name,
                Duration::from_millis(custom_lock_timeout_ms),
            );
        }
    }

    /// Standalone-secret counterpart of [`Self::arm_collection_relock`].
    pub(crate) fn arm_standalone_relock(
        &mut self,
        hashed_secret_name: &str,
        unlock_semantic: UnlockSemantic,
        custom_lock_timeout_ms: u64,
    ) {
        if unlock_semantic.is_timeout_relock() && self.standalone_keys.contains(hashed_secret_name)
        {
            self.relock.schedule_standalone(
                hashed_secret_name,
                Duration::from_millis(custom_lock_timeout_ms),
            );
        }
    }

    /// Returns the cached key for a collection, inserting `key` on first
    /// use. Split-plugin flows call this so that later requests against the
    /// same collection skip the interaction flow.
    pub(crate) fn cache_collection_key(&mut self, collection_name: &str, key: &LockKey) -> LockKey {
        match self.collection_keys.get(collection_name) {
            Some(cached) => cached.clone(),
            None => {
                self.collection_keys
                    .insert(collection_name.to_owned(), key.clone());
                key.clone()
            }
        }
    }
}

/// Drives the same-plugin unlock dance: apply the key, re-query the lock
/// state, and relock with the empty key on any failure so a wrong key is
/// never left applied.
pub(crate) fn unlock_encrypted_collection(
    plugin: &dyn EncryptedStoragePlugin,
    collection_name: &str,
    key: &LockKey,
) -> SecretsResult<()> {
    if !plugin.is_locked(collection_name)? {
        return Ok(());
    }
    if let Err(err) = plugin.set_encryption_key(collection_name, key) {
        debug!(collection = collection_name, %err, "applying authentication key failed");
        let _ = plugin.set_encryption_key(collection_name, &LockKey::empty());
        return Err(SecretsError::PluginDecryption(format!(
            "unable to decrypt collection {collection_name} with the supplied authentication key"
        )));
    }
    let still_locked = match plugin.is_locked(collection_name) {
        Ok(locked) => locked,
        Err(err) => {
            debug!(collection = collection_name, %err, "lock-state query failed after unlock");
            let _ = plugin.set_encryption_key(collection_name, &LockKey::empty());
            return Err(SecretsError::PluginDecryption(format!(
                "unable to check lock state of collection {collection_name} after applying the authentication key"
            )));
        }
    };
    if still_locked {
        let _ = plugin.set_encryption_key(collection_name, &LockKey::empty());
        return Err(SecretsError::IncorrectAuthenticationKey(
            collection_name.to_owned(),
        ));
    }
    Ok(())
}
