//! Collection-secret operations: set, get, find, delete, and the
//! crypto-API metadata helpers.
//!
//! Every operation follows the same skeleton: validate, look up collection
//! metadata, check access, then either complete with a key already in hand
//! (plugin-side unlocked, or cached) or begin an unlock-key interaction and
//! park a continuation. The `*_with_authentication_key` stages are entered
//! either directly or from the completion handler.

use tracing::debug;

use crate::defaults;
use crate::interaction::{InteractionOperation, InteractionParameters};
use crate::plugin::AuthenticationTypes;
use crate::types::{
    FilterData, FilterOperator, LockKey, Outcome, ProtectionMetadata, Secret, SecretIdentifier,
    UnlockSemantic, UserInteractionMode,
};
use crate::utils::hashed_secret_name;
use crate::{SecretsError, SecretsResult};

use super::pending::Continuation;
use super::{unlock_encrypted_collection, RequestProcessor};

impl RequestProcessor {
    /// Stores a secret in a collection.
    ///
    /// With `ui_params` supplied, the secret's value is first fetched from
    /// the user through an input flow; the write then proceeds as if the
    /// value had been passed directly (and may suspend a second time to
    /// collect the unlock key).
    ///
    /// # Errors
    ///
    /// Fails validation for empty or reserved names, unknown collections,
    /// access-control rejections, and stale plugin references; surfaces
    /// plugin failures from the write stage.
    pub fn set_collection_secret(
        &mut self,
        caller_pid: u32,
        request_id: u64,
        secret: &Secret,
        ui_params: Option<&InteractionParameters>,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> SecretsResult<Outcome<()>> {
        Self::validate_collection_secret_identifier(&secret.identifier)?;

        let caller_application_id = self.caller_application_id(caller_pid);
        let collection_name = secret.identifier.collection_name.clone();
        let metadata = self.collection_metadata_or_invalid(&collection_name)?;
        Self::check_access(
            &metadata,
            &caller_application_id,
            &format!("collection {collection_name}"),
        )?;
        self.validate_plugin_combination(&metadata.storage_plugin, &metadata.encryption_plugin)?;

        let Some(ui) = ui_params else {
            return self.set_collection_secret_get_authentication_key(
                caller_pid,
                request_id,
                secret.clone(),
                user_interaction_mode,
                interaction_service_address,
                metadata,
            );
        };

        // Fetch the secret's value from the user before anything else.
        let user_input_plugin = self.resolve_user_input_plugin(ui)?;
        let parameters = InteractionParameters {
            application_id: caller_application_id,
            collection_name: collection_name.clone(),
            secret_name: secret.identifier.name.clone(),
            authentication_plugin: user_input_plugin.clone(),
            operation: InteractionOperation::RequestUserData,
            // cleared so a malicious caller cannot disguise the prompt
            prompt_id: String::new(),
            ..ui.clone()
        };
        self.park_with_interaction(
            caller_pid,
            request_id,
            &user_input_plugin,
            parameters,
            interaction_service_address,
            Continuation::SetCollectionUserInputSecret {
                secret: secret.clone(),
                user_interaction_mode,
                interaction_service_address: interaction_service_address.to_owned(),
                collection: metadata,
            },
        )
    }

    /// Key-acquisition stage of a collection-secret write: proceed with a
    /// key already in hand, fail for locked device-lock collections, or
    /// begin the unlock-key interaction.
    pub(crate) fn set_collection_secret_get_authentication_key(
        &mut self,
        caller_pid: u32,
        request_id: u64,
        secret: Secret,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
        collection: ProtectionMetadata,
    ) -> SecretsResult<Outcome<()>> {
        let collection_name = secret.identifier.collection_name.clone();

        if collection.uses_encrypted_storage() {
            let plugin = self.encrypted_storage_plugin(&collection.storage_plugin)?;
            if !plugin.is_locked(&collection_name)? {
                return self
                    .set_collection_secret_with_authentication_key(
                        &secret,
                        &collection,
                        &LockKey::empty(),
                    )
                    .map(Outcome::Complete);
            }
        } else if let Some(key) = self.collection_keys.get(&collection_name).cloned() {
            return self
                .set_collection_secret_with_authentication_key(&secret, &collection, &key)
                .map(Outcome::Complete);
        }

        if collection.uses_device_lock {
            return Err(SecretsError::CollectionIsLocked(format!(
                "collection {collection_name} requires device lock authentication"
            )));
        }
        if user_interaction_mode == UserInteractionMode::Prevent {
            return Err(SecretsError::OperationRequiresUserInteraction(
                collection.authentication_plugin.clone(),
            ));
        }

        let parameters = self.unlock_interaction_parameters(
            caller_pid,
            &collection_name,
            &secret.identifier.name,
            &collection.authentication_plugin,
            InteractionOperation::StoreSecret,
            "secretkit_store_collection_secret_input_key",
        );
        let authentication_plugin = collection.authentication_plugin.clone();
        self.park_with_interaction(
            caller_pid,
            request_id,
            &authentication_plugin,
            parameters,
            interaction_service_address,
            Continuation::SetCollectionSecret {
                secret,
                collection,
            },
        )
    }

    /// Write stage of a collection-secret store, entered with the unlock
    /// key in hand (empty for an already-unlocked encrypted-storage
    /// collection).
    pub(crate) fn set_collection_secret_with_authentication_key(
        &mut self,
        secret: &Secret,
        collection: &ProtectionMetadata,
        authentication_key: &LockKey,
    ) -> SecretsResult<()> {
        let collection_name = &secret.identifier.collection_name;
        let hashed = hashed_secret_name(collection_name, &secret.identifier.name);

        // New secrets get their bookkeeping row before the plugin write so
        // a crash in between leaves only a recoverable stale row.
        let already_exists = self.bookkeeping.secret_exists(collection_name, &hashed)?;
        if !already_exists {
            self.bookkeeping
                .insert_secret(collection_name, &hashed, collection)?;
        }

        let plugin_result = if collection.uses_encrypted_storage() {
            let plugin = self.encrypted_storage_plugin(&collection.storage_plugin)?;
            unlock_encrypted_collection(plugin.as_ref(), collection_name, authentication_key)
                .and_then(|()| {
                    plugin.set_secret(
                        collection_name,
                        &hashed,
                        &secret.identifier.name,
                        &secret.data,
                        &secret.filter_data,
                    )
                })
        } else {
            let key = self.cache_collection_key(collection_name, authentication_key);
            let encryption = self.encryption_plugin(&collection.encryption_plugin)?;
            let storage = self.storage_plugin(&collection.storage_plugin)?;
            encryption
                .encrypt(secret.data.as_bytes(), &key)
                .and_then(|encrypted_value| {
                    let encrypted_name =
                        encryption.encrypt(secret.identifier.name.as_bytes(), &key)?;
                    storage.set_secret(
                        collection_name,
                        &hashed,
                        &encrypted_name,
                        &encrypted_value,
                        &secret.filter_data,
                    )
                })
        };

        if let Err(plugin_err) = plugin_result {
            if !already_exists {
                self.bookkeeping
                    .cleanup_delete_secret(collection_name, &hashed, plugin_err.clone())?;
            }
            return Err(plugin_err);
        }

        self.arm_collection_relock(
            collection_name,
            collection.unlock_semantic,
            collection.custom_lock_timeout_ms,
        );
        debug!(collection = %collection_name, "stored collection secret");
        Ok(())
    }

    /// Reads a secret from a collection.
    ///
    /// # Errors
    ///
    /// Fails as [`Self::set_collection_secret`] does, plus
    /// `CollectionIsLocked` for locked device-lock collections and the
    /// interaction-mode errors when unlocking would need user input.
    pub fn get_collection_secret(
        &mut self,
        caller_pid: u32,
        request_id: u64,
        identifier: &SecretIdentifier,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> SecretsResult<Outcome<Secret>> {
        Self::validate_collection_secret_identifier(identifier)?;

        let caller_application_id = self.caller_application_id(caller_pid);
        let collection_name = identifier.collection_name.clone();
        let metadata = self.collection_metadata_or_invalid(&collection_name)?;
        Self::check_access(
            &metadata,
            &caller_application_id,
            &format!("collection {collection_name}"),
        )?;
        self.validate_plugin_combination(&metadata.storage_plugin, &metadata.encryption_plugin)?;
        let auth = self.authentication_plugin(&metadata.authentication_plugin)?;

        let key_in_hand = if metadata.uses_encrypted_storage() {
            let plugin = self.encrypted_storage_plugin(&metadata.storage_plugin)?;
            if plugin.is_locked(&collection_name)? {
                None
            } else {
                Some(LockKey::empty())
            }
        } else {
            self.collection_keys.get(&collection_name).cloned()
        };

        if let Some(key) = key_in_hand {
            return self
                .get_collection_secret_with_authentication_key(
                    identifier,
                    &metadata.storage_plugin,
                    &metadata.encryption_plugin,
                    metadata.unlock_semantic,
                    metadata.custom_lock_timeout_ms,
                    &key,
                )
                .map(Outcome::Complete);
        }

        if metadata.uses_device_lock {
            return Err(SecretsError::CollectionIsLocked(format!(
                "collection {collection_name} requires device lock authentication"
            )));
        }
        if user_interaction_mode == UserInteractionMode::Prevent {
            return Err(SecretsError::OperationRequiresUserInteraction(
                metadata.authentication_plugin.clone(),
            ));
        }
        if auth
            .authentication_types()
            .contains(AuthenticationTypes::APPLICATION_SPECIFIC)
            && (user_interaction_mode != UserInteractionMode::Application
                || interaction_service_address.is_empty())
        {
            return Err(SecretsError::OperationRequiresApplicationUserInteraction(
                metadata.authentication_plugin.clone(),
            ));
        }

        let parameters = self.unlock_interaction_parameters(
            caller_pid,
            &collection_name,
            &identifier.name,
            &metadata.authentication_plugin,
            InteractionOperation::ReadSecret,
            "secretkit_get_collection_secret_input_key",
        );
        self.park_with_interaction(
            caller_pid,
            request_id,
            &metadata.authentication_plugin.clone(),
            parameters,
            interaction_service_address,
            Continuation::GetCollectionSecret {
                identifier: identifier.clone(),
                storage_plugin: metadata.storage_plugin,
                encryption_plugin: metadata.encryption_plugin,
                unlock_semantic: metadata.unlock_semantic,
                custom_lock_timeout_ms: metadata.custom_lock_timeout_ms,
            },
        )
    }

    /// Read stage of a collection-secret get, entered with the unlock key
    /// in hand.
    pub(crate) fn get_collection_secret_with_authentication_key(
        &mut self,
        identifier: &SecretIdentifier,
        storage_plugin: &str,
        encryption_plugin: &str,
        unlock_semantic: UnlockSemantic,
        custom_lock_timeout_ms: u64,
        authentication_key: &LockKey,
    ) -> SecretsResult<Secret> {
        let collection_name = &identifier.collection_name;
        let hashed = hashed_secret_name(collection_name, &identifier.name);

        let secret = if storage_plugin == encryption_plugin {
            let plugin = self.encrypted_storage_plugin(storage_plugin)?;
            unlock_encrypted_collection(plugin.as_ref(), collection_name, authentication_key)?;
            let (_stored_name, data, filter_data) = plugin.get_secret(collection_name, &hashed)?;
            Secret {
                identifier: identifier.clone(),
                data,
                filter_data,
            }
        } else {
            let key = self.cache_collection_key(collection_name, authentication_key);
            let storage = self.storage_plugin(storage_plugin)?;
            let encryption = self.encryption_plugin(encryption_plugin)?;
            let (_encrypted_name, encrypted_value, filter_data) =
                storage.get_secret(collection_name, &hashed)?;
            let data = encryption.decrypt(&encrypted_value, &key)?;
            Secret {
                identifier: identifier.clone(),
                data,
                filter_data,
            }
        };

        self.arm_collection_relock(collection_name, unlock_semantic, custom_lock_timeout_ms);
        Ok(secret)
    }

    /// Finds secrets in a collection by filter data.
    ///
    /// # Errors
    ///
    /// Fails for an empty filter with `InvalidFilter`; otherwise as
    /// [`Self::get_collection_secret`] does.
    pub fn find_collection_secrets(
        &mut self,
        caller_pid: u32,
        request_id: u64,
        collection_name: &str,
        filter: &FilterData,
        operator: FilterOperator,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> SecretsResult<Outcome<Vec<SecretIdentifier>>> {
        if collection_name.is_empty() {
            return Err(SecretsError::InvalidCollection(
                "empty collection name given".to_owned(),
            ));
        }
        if defaults::is_reserved_collection_name(collection_name) {
            return Err(SecretsError::InvalidCollection(
                "reserved collection name given".to_owned(),
            ));
        }
        if filter.is_empty() {
            return Err(SecretsError::InvalidFilter("empty filter given".to_owned()));
        }

        let caller_application_id = self.caller_application_id(caller_pid);
        let metadata = self.collection_metadata_or_invalid(collection_name)?;
        Self::check_access(
            &metadata,
            &caller_application_id,
            &format!("collection {collection_name}"),
        )?;
        self.validate_plugin_combination(&metadata.storage_plugin, &metadata.encryption_plugin)?;
        let auth = self.authentication_plugin(&metadata.authentication_plugin)?;

        let key_in_hand = if metadata.uses_encrypted_storage() {
            let plugin = self.encrypted_storage_plugin(&metadata.storage_plugin)?;
            if plugin.is_locked(collection_name)? {
                None
            } else {
                Some(LockKey::empty())
            }
        } else {
            self.collection_keys.get(collection_name).cloned()
        };

        if let Some(key) = key_in_hand {
            return self
                .find_collection_secrets_with_authentication_key(
                    collection_name,
                    filter,
                    operator,
                    &metadata.storage_plugin,
                    &metadata.encryption_plugin,
                    metadata.unlock_semantic,
                    metadata.custom_lock_timeout_ms,
                    &key,
                )
                .map(Outcome::Complete);
        }

        if metadata.uses_device_lock {
            return Err(SecretsError::CollectionIsLocked(format!(
                "collection {collection_name} requires device lock authentication"
            )));
        }
        if user_interaction_mode == UserInteractionMode::Prevent {
            return Err(SecretsError::OperationRequiresUserInteraction(
                metadata.authentication_plugin.clone(),
            ));
        }
        if auth
            .authentication_types()
            .contains(AuthenticationTypes::APPLICATION_SPECIFIC)
            && (user_interaction_mode != UserInteractionMode::Application
                || interaction_service_address.is_empty())
        {
            return Err(SecretsError::OperationRequiresApplicationUserInteraction(
                metadata.authentication_plugin.clone(),
            ));
        }

        let parameters = self.unlock_interaction_parameters(
            caller_pid,
            collection_name,
            "",
            &metadata.authentication_plugin,
            InteractionOperation::UnlockCollection,
            "secretkit_unlock_collection_find_secrets_input_key",
        );
        self.park_with_interaction(
            caller_pid,
            request_id,
            &metadata.authentication_plugin.clone(),
            parameters,
            interaction_service_address,
            Continuation::FindCollectionSecrets {
                collection_name: collection_name.to_owned(),
                filter: filter.clone(),
                operator,
                storage_plugin: metadata.storage_plugin,
                encryption_plugin: metadata.encryption_plugin,
                unlock_semantic: metadata.unlock_semantic,
                custom_lock_timeout_ms: metadata.custom_lock_timeout_ms,
            },
        )
    }

    /// Search stage of a find, entered with the unlock key in hand. On the
    /// split-plugin path every returned name must decrypt; one failure
    /// aborts the whole batch.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn find_collection_secrets_with_authentication_key(
        &mut self,
        collection_name: &str,
        filter: &FilterData,
        operator: FilterOperator,
        storage_plugin: &str,
        encryption_plugin: &str,
        unlock_semantic: UnlockSemantic,
        custom_lock_timeout_ms: u64,
        authentication_key: &LockKey,
    ) -> SecretsResult<Vec<SecretIdentifier>> {
        let identifiers = if storage_plugin == encryption_plugin {
            let plugin = self.encrypted_storage_plugin(storage_plugin)?;
            unlock_encrypted_collection(plugin.as_ref(), collection_name, authentication_key)?;
            plugin
                .find_secrets(collection_name, filter, operator)?
                .into_iter()
                .map(|name| SecretIdentifier::new(name, collection_name))
                .collect()
        } else {
            let key = self.cache_collection_key(collection_name, authentication_key);
            let storage = self.storage_plugin(storage_plugin)?;
            let encryption = self.encryption_plugin(encryption_plugin)?;
            let encrypted_names = storage.find_secrets(collection_name, filter, operator)?;
            let mut identifiers = Vec::with_capacity(encrypted_names.len());
            for encrypted_name in encrypted_names {
                let decrypted = encryption.decrypt(&encrypted_name, &key)?;
                let name = String::from_utf8(decrypted.as_bytes().to_vec()).map_err(|_| {
                    SecretsError::PluginDecryption(
                        "decrypted secret name is not valid UTF-8".to_owned(),
                    )
                })?;
                identifiers.push(SecretIdentifier::new(name, collection_name));
            }
            identifiers
        };

        self.arm_collection_relock(collection_name, unlock_semantic, custom_lock_timeout_ms);
        Ok(identifiers)
    }

    /// Deletes a secret from a collection.
    ///
    /// # Errors
    ///
    /// Fails as [`Self::get_collection_secret`] does; surfaces plugin
    /// removal failures (in which case the bookkeeping row is retained).
    pub fn delete_collection_secret(
        &mut self,
        caller_pid: u32,
        request_id: u64,
        identifier: &SecretIdentifier,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> SecretsResult<Outcome<()>> {
        Self::validate_collection_secret_identifier(identifier)?;

        let caller_application_id = self.caller_application_id(caller_pid);
        let collection_name = identifier.collection_name.clone();
        let metadata = self.collection_metadata_or_invalid(&collection_name)?;
        Self::check_access(
            &metadata,
            &caller_application_id,
            &format!("collection {collection_name}"),
        )?;
        self.validate_plugin_combination(&metadata.storage_plugin, &metadata.encryption_plugin)?;

        let key_in_hand = if metadata.uses_encrypted_storage() {
            let plugin = self.encrypted_storage_plugin(&metadata.storage_plugin)?;
            if plugin.is_locked(&collection_name)? {
                None
            } else {
                // already unlocked: the delete re-verifies the device-lock
                // key for device-lock collections
                Some(self.config.device_lock_key())
            }
        } else {
            self.collection_keys.get(&collection_name).cloned()
        };

        if let Some(key) = key_in_hand {
            return self
                .delete_collection_secret_with_authentication_key(caller_pid, identifier, &key)
                .map(Outcome::Complete);
        }

        if metadata.uses_device_lock {
            return Err(SecretsError::CollectionIsLocked(format!(
                "collection {collection_name} requires device lock authentication"
            )));
        }
        if user_interaction_mode == UserInteractionMode::Prevent {
            return Err(SecretsError::OperationRequiresUserInteraction(
                metadata.authentication_plugin.clone(),
            ));
        }

        let parameters = self.unlock_interaction_parameters(
            caller_pid,
            &collection_name,
            &identifier.name,
            &metadata.authentication_plugin,
            InteractionOperation::DeleteSecret,
            "secretkit_delete_collection_secret_input_key",
        );
        self.park_with_interaction(
            caller_pid,
            request_id,
            &metadata.authentication_plugin.clone(),
            parameters,
            interaction_service_address,
            Continuation::DeleteCollectionSecret {
                identifier: identifier.clone(),
            },
        )
    }

    /// Delete stage of a collection-secret removal, entered with the
    /// unlock key in hand. Metadata is re-read: the collection may have
    /// been mutated while an interaction flow was open.
    pub(crate) fn delete_collection_secret_with_authentication_key(
        &mut self,
        caller_pid: u32,
        identifier: &SecretIdentifier,
        authentication_key: &LockKey,
    ) -> SecretsResult<()> {
        let caller_application_id = self.caller_application_id(caller_pid);
        let collection_name = &identifier.collection_name;
        let metadata = self.collection_metadata_or_invalid(collection_name)?;

        if metadata.uses_device_lock && *authentication_key != self.config.device_lock_key() {
            return Err(SecretsError::IncorrectAuthenticationKey(format!(
                "collection {collection_name} (device lock key mismatch)"
            )));
        }
        Self::check_access(
            &metadata,
            &caller_application_id,
            &format!("collection {collection_name}"),
        )?;

        let hashed = hashed_secret_name(collection_name, &identifier.name);
        if metadata.uses_encrypted_storage() {
            let plugin = self.encrypted_storage_plugin(&metadata.storage_plugin)?;
            unlock_encrypted_collection(plugin.as_ref(), collection_name, authentication_key)?;
            plugin.remove_secret(collection_name, &hashed)?;
        } else {
            self.cache_collection_key(collection_name, authentication_key);
            self.storage_plugin(&metadata.storage_plugin)?
                .remove_secret(collection_name, &hashed)?;
        }

        self.bookkeeping.delete_secret(collection_name, &hashed)?;
        debug!(collection = %collection_name, "deleted collection secret");
        Ok(())
    }

    // =========================================================================
    // Crypto-API metadata helpers
    // =========================================================================

    /// Inserts only the bookkeeping row for a secret whose payload a crypto
    /// plugin stores directly. The collection must be held by an
    /// encrypted-storage plugin and currently unlocked.
    ///
    /// # Errors
    ///
    /// `SecretAlreadyExists` signals the crypto API that no metadata
    /// cleanup is needed if its own store fails.
    pub fn set_collection_secret_metadata(
        &mut self,
        caller_pid: u32,
        _request_id: u64,
        identifier: &SecretIdentifier,
    ) -> SecretsResult<()> {
        Self::validate_collection_secret_identifier(identifier)?;

        let caller_application_id = self.caller_application_id(caller_pid);
        let collection_name = &identifier.collection_name;
        let metadata = self.collection_metadata_or_invalid(collection_name)?;
        Self::check_access(
            &metadata,
            &caller_application_id,
            &format!("collection {collection_name}"),
        )?;
        self.validate_plugin_combination(&metadata.storage_plugin, &metadata.encryption_plugin)?;
        if !metadata.uses_encrypted_storage() {
            return Err(SecretsError::InvalidExtensionPlugin(
                "the identified collection is not held by an encrypted storage plugin".to_owned(),
            ));
        }

        let plugin = self.encrypted_storage_plugin(&metadata.storage_plugin)?;
        if plugin.is_locked(collection_name)? {
            if metadata.uses_device_lock {
                return Err(SecretsError::CollectionIsLocked(format!(
                    "collection {collection_name} requires device lock authentication"
                )));
            }
            return Err(SecretsError::OperationRequiresUserInteraction(
                metadata.authentication_plugin.clone(),
            ));
        }

        let hashed = hashed_secret_name(collection_name, &identifier.name);
        if self.bookkeeping.secret_exists(collection_name, &hashed)? {
            return Err(SecretsError::SecretAlreadyExists {
                collection_name: collection_name.clone(),
                secret_name: identifier.name.clone(),
            });
        }
        self.bookkeeping
            .insert_secret(collection_name, &hashed, &metadata)
    }

    /// Removes the bookkeeping row inserted by
    /// [`Self::set_collection_secret_metadata`] after a failed crypto-plugin
    /// store.
    ///
    /// # Errors
    ///
    /// Fails validation for empty or reserved names, or when the row
    /// removal fails.
    pub fn delete_collection_secret_metadata(
        &mut self,
        _caller_pid: u32,
        _request_id: u64,
        identifier: &SecretIdentifier,
    ) -> SecretsResult<()> {
        Self::validate_collection_secret_identifier(identifier)?;
        let hashed = hashed_secret_name(&identifier.collection_name, &identifier.name);
        self.bookkeeping
            .delete_secret(&identifier.collection_name, &hashed)
    }

    // =========================================================================
    // Shared validation
    // =========================================================================

    pub(crate) fn validate_collection_secret_identifier(
        identifier: &SecretIdentifier,
    ) -> SecretsResult<()> {
        if identifier.name.is_empty() {
            return Err(SecretsError::InvalidSecret(
                "empty secret name given".to_owned(),
            ));
        }
        if identifier.collection_name.is_empty() {
            return Err(SecretsError::InvalidCollection(
                "empty collection name given".to_owned(),
            ));
        }
        if defaults::is_reserved_collection_name(&identifier.collection_name) {
            return Err(SecretsError::InvalidCollection(
                "reserved collection name given".to_owned(),
            ));
        }
        Ok(())
    }

    pub(crate) fn collection_metadata_or_invalid(
        &self,
        collection_name: &str,
    ) -> SecretsResult<ProtectionMetadata> {
        self.bookkeeping
            .collection_metadata(collection_name)?
            .ok_or_else(|| {
                SecretsError::InvalidCollection("nonexistent collection name given".to_owned())
            })
    }
}
