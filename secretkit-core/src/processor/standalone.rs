//! Standalone-secret operations.
//!
//! Standalone secrets do not belong to a user-visible collection; their
//! bookkeeping rows hang off the reserved `standalone` row and their
//! plugin-side data lives in a notional `standalone` collection. Device-
//! lock standalones use the process-wide device-lock key unconditionally;
//! custom-lock standalones collect their key through a user-input flow.

use tracing::debug;

use crate::defaults::STANDALONE_COLLECTION_NAME;
use crate::interaction::{InteractionOperation, InteractionParameters};
use crate::plugin::AuthenticationTypes;
use crate::types::{
    AccessControlMode, CustomLockSemantic, DeviceLockSemantic, FilterData, FilterOperator,
    LockKey, Outcome, ProtectionMetadata, Secret, SecretIdentifier, UnlockSemantic,
    UserInteractionMode,
};
use crate::utils::hashed_secret_name;
use crate::{SecretsError, SecretsResult};

use super::pending::Continuation;
use super::RequestProcessor;

impl RequestProcessor {
    /// Stores a standalone secret protected by the device-lock key.
    ///
    /// The device-lock key is applied unconditionally; no unlock
    /// interaction ever runs. With `ui_params` supplied the secret's value
    /// is first fetched from the user.
    ///
    /// # Errors
    ///
    /// Fails validation for an empty secret name or invalid plugin
    /// combination, and with `OperationNotSupported` for the forbidden
    /// transitions (custom-lock → device-lock, storage-plugin change).
    #[allow(clippy::too_many_arguments)]
    pub fn set_standalone_device_lock_secret(
        &mut self,
        caller_pid: u32,
        request_id: u64,
        storage_plugin: &str,
        encryption_plugin: &str,
        secret: &Secret,
        ui_params: Option<&InteractionParameters>,
        unlock_semantic: DeviceLockSemantic,
        access_control: AccessControlMode,
        _user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> SecretsResult<Outcome<()>> {
        if secret.identifier.name.is_empty() {
            return Err(SecretsError::InvalidSecret(
                "empty secret name given".to_owned(),
            ));
        }
        self.validate_plugin_combination(storage_plugin, encryption_plugin)?;

        let caller_application_id = self.caller_application_id(caller_pid);
        let hashed = hashed_secret_name(STANDALONE_COLLECTION_NAME, &secret.identifier.name);
        let existing = self
            .bookkeeping
            .secret_metadata(STANDALONE_COLLECTION_NAME, &hashed)?;
        if let Some(metadata) = &existing {
            Self::check_standalone_overwrite(
                metadata,
                &caller_application_id,
                &secret.identifier.name,
                storage_plugin,
                true,
            )?;
        }

        let Some(ui) = ui_params else {
            return self
                .write_standalone_device_lock_secret(
                    caller_pid,
                    secret.clone(),
                    storage_plugin,
                    encryption_plugin,
                    unlock_semantic,
                    access_control,
                )
                .map(Outcome::Complete);
        };

        let user_input_plugin = self.resolve_user_input_plugin(ui)?;
        let parameters = InteractionParameters {
            application_id: caller_application_id,
            collection_name: String::new(),
            secret_name: secret.identifier.name.clone(),
            authentication_plugin: user_input_plugin.clone(),
            operation: InteractionOperation::RequestUserData,
            prompt_id: String::new(),
            ..ui.clone()
        };
        self.park_with_interaction(
            caller_pid,
            request_id,
            &user_input_plugin,
            parameters,
            interaction_service_address,
            Continuation::SetStandaloneDeviceLockUserInputSecret {
                secret: secret.clone(),
                storage_plugin: storage_plugin.to_owned(),
                encryption_plugin: encryption_plugin.to_owned(),
                unlock_semantic,
                access_control,
            },
        )
    }

    /// Write stage of a device-lock standalone store.
    pub(crate) fn write_standalone_device_lock_secret(
        &mut self,
        caller_pid: u32,
        secret: Secret,
        storage_plugin: &str,
        encryption_plugin: &str,
        unlock_semantic: DeviceLockSemantic,
        access_control: AccessControlMode,
    ) -> SecretsResult<()> {
        let caller_application_id = self.caller_application_id(caller_pid);
        let hashed = hashed_secret_name(STANDALONE_COLLECTION_NAME, &secret.identifier.name);
        let metadata = ProtectionMetadata {
            application_id: caller_application_id,
            uses_device_lock: true,
            storage_plugin: storage_plugin.to_owned(),
            encryption_plugin: encryption_plugin.to_owned(),
            authentication_plugin: self.default_authentication_plugin(),
            unlock_semantic: UnlockSemantic::DeviceLock(unlock_semantic),
            custom_lock_timeout_ms: 0,
            access_control,
        };
        let device_lock_key = self.config.device_lock_key();
        self.write_standalone_secret(&secret, &hashed, &metadata, &device_lock_key)
    }

    /// Stores a standalone secret protected by a user-chosen key.
    ///
    /// Suspends to collect the lock key (and first the secret's value, when
    /// `ui_params` is supplied).
    ///
    /// # Errors
    ///
    /// Fails as the device-lock variant does, plus authentication-plugin
    /// checks, interaction-mode compatibility, and the device-lock →
    /// custom-lock transition.
    #[allow(clippy::too_many_arguments)]
    pub fn set_standalone_custom_lock_secret(
        &mut self,
        caller_pid: u32,
        request_id: u64,
        storage_plugin: &str,
        encryption_plugin: &str,
        authentication_plugin: &str,
        secret: &Secret,
        ui_params: Option<&InteractionParameters>,
        unlock_semantic: CustomLockSemantic,
        custom_lock_timeout_ms: u64,
        access_control: AccessControlMode,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> SecretsResult<Outcome<()>> {
        if secret.identifier.name.is_empty() {
            return Err(SecretsError::InvalidSecret(
                "empty secret name given".to_owned(),
            ));
        }
        self.validate_plugin_combination(storage_plugin, encryption_plugin)?;
        let auth = self.authentication_plugin(authentication_plugin)?;

        let caller_application_id = self.caller_application_id(caller_pid);
        let hashed = hashed_secret_name(STANDALONE_COLLECTION_NAME, &secret.identifier.name);
        let existing = self
            .bookkeeping
            .secret_metadata(STANDALONE_COLLECTION_NAME, &hashed)?;
        if let Some(metadata) = &existing {
            Self::check_standalone_overwrite(
                metadata,
                &caller_application_id,
                &secret.identifier.name,
                storage_plugin,
                false,
            )?;
        }

        if auth
            .authentication_types()
            .contains(AuthenticationTypes::APPLICATION_SPECIFIC)
            && (user_interaction_mode != UserInteractionMode::Application
                || interaction_service_address.is_empty())
        {
            return Err(SecretsError::OperationRequiresApplicationUserInteraction(
                authentication_plugin.to_owned(),
            ));
        }
        if user_interaction_mode == UserInteractionMode::Prevent {
            return Err(SecretsError::OperationRequiresUserInteraction(
                authentication_plugin.to_owned(),
            ));
        }

        let Some(ui) = ui_params else {
            return self.set_standalone_custom_lock_secret_get_authentication_key(
                caller_pid,
                request_id,
                secret.clone(),
                storage_plugin.to_owned(),
                encryption_plugin.to_owned(),
                authentication_plugin.to_owned(),
                unlock_semantic,
                custom_lock_timeout_ms,
                access_control,
                interaction_service_address,
            );
        };

        let user_input_plugin = self.resolve_user_input_plugin(ui)?;
        let parameters = InteractionParameters {
            application_id: caller_application_id,
            collection_name: String::new(),
            secret_name: secret.identifier.name.clone(),
            authentication_plugin: user_input_plugin.clone(),
            operation: InteractionOperation::RequestUserData,
            prompt_id: String::new(),
            ..ui.clone()
        };
        self.park_with_interaction(
            caller_pid,
            request_id,
            &user_input_plugin,
            parameters,
            interaction_service_address,
            Continuation::SetStandaloneCustomLockUserInputSecret {
                secret: secret.clone(),
                storage_plugin: storage_plugin.to_owned(),
                encryption_plugin: encryption_plugin.to_owned(),
                authentication_plugin: authentication_plugin.to_owned(),
                unlock_semantic,
                custom_lock_timeout_ms,
                access_control,
                interaction_service_address: interaction_service_address.to_owned(),
            },
        )
    }

    /// Key-acquisition stage of a custom-lock standalone store: begins the
    /// lock-key interaction and parks the write.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn set_standalone_custom_lock_secret_get_authentication_key(
        &mut self,
        caller_pid: u32,
        request_id: u64,
        secret: Secret,
        storage_plugin: String,
        encryption_plugin: String,
        authentication_plugin: String,
        unlock_semantic: CustomLockSemantic,
        custom_lock_timeout_ms: u64,
        access_control: AccessControlMode,
        interaction_service_address: &str,
    ) -> SecretsResult<Outcome<()>> {
        let parameters = self.unlock_interaction_parameters(
            caller_pid,
            "",
            &secret.identifier.name,
            &authentication_plugin,
            InteractionOperation::StoreSecret,
            "secretkit_store_standalone_secret_input_key",
        );
        let plugin_name = authentication_plugin.clone();
        self.park_with_interaction(
            caller_pid,
            request_id,
            &plugin_name,
            parameters,
            interaction_service_address,
            Continuation::SetStandaloneCustomLockSecret {
                secret,
                storage_plugin,
                encryption_plugin,
                authentication_plugin,
                unlock_semantic,
                custom_lock_timeout_ms,
                access_control,
            },
        )
    }

    /// Write stage of a custom-lock standalone store, entered with the
    /// user-supplied lock key. Metadata is re-read: another application may
    /// have claimed the name while the interaction flow was open.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn set_standalone_custom_lock_secret_with_authentication_key(
        &mut self,
        caller_pid: u32,
        secret: &Secret,
        storage_plugin: &str,
        encryption_plugin: &str,
        authentication_plugin: &str,
        unlock_semantic: CustomLockSemantic,
        custom_lock_timeout_ms: u64,
        access_control: AccessControlMode,
        authentication_key: &LockKey,
    ) -> SecretsResult<()> {
        let caller_application_id = self.caller_application_id(caller_pid);
        let hashed = hashed_secret_name(STANDALONE_COLLECTION_NAME, &secret.identifier.name);
        let existing = self
            .bookkeeping
            .secret_metadata(STANDALONE_COLLECTION_NAME, &hashed)?;
        if let Some(metadata) = &existing {
            Self::check_standalone_overwrite(
                metadata,
                &caller_application_id,
                &secret.identifier.name,
                storage_plugin,
                false,
            )?;
        }

        let metadata = ProtectionMetadata {
            application_id: caller_application_id,
            uses_device_lock: false,
            storage_plugin: storage_plugin.to_owned(),
            encryption_plugin: encryption_plugin.to_owned(),
            authentication_plugin: authentication_plugin.to_owned(),
            unlock_semantic: UnlockSemantic::CustomLock(unlock_semantic),
            custom_lock_timeout_ms,
            access_control,
        };
        self.write_standalone_secret(secret, &hashed, &metadata, authentication_key)
    }

    /// Reads a standalone secret.
    ///
    /// # Errors
    ///
    /// Fails for an empty name, a non-empty collection in the identifier,
    /// an unknown secret, stale plugin references, access-control
    /// rejections, and lock-state errors.
    pub fn get_standalone_secret(
        &mut self,
        caller_pid: u32,
        request_id: u64,
        identifier: &SecretIdentifier,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> SecretsResult<Outcome<Secret>> {
        if identifier.name.is_empty() {
            return Err(SecretsError::InvalidSecret(
                "empty secret name given".to_owned(),
            ));
        }
        if !identifier.collection_name.is_empty() {
            return Err(SecretsError::InvalidCollection(
                "non-empty collection name given for standalone secret request".to_owned(),
            ));
        }

        let caller_application_id = self.caller_application_id(caller_pid);
        let hashed = hashed_secret_name(STANDALONE_COLLECTION_NAME, &identifier.name);
        let Some(metadata) = self
            .bookkeeping
            .secret_metadata(STANDALONE_COLLECTION_NAME, &hashed)?
        else {
            return Err(SecretsError::InvalidSecret(
                "nonexistent secret name given".to_owned(),
            ));
        };
        self.validate_plugin_combination(&metadata.storage_plugin, &metadata.encryption_plugin)?;
        Self::check_access(
            &metadata,
            &caller_application_id,
            &format!("secret {}", identifier.name),
        )?;
        let auth = self.authentication_plugin(&metadata.authentication_plugin)?;
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

        if let Some(key) = self.standalone_keys.get(&hashed).cloned() {
            return self
                .get_standalone_secret_with_authentication_key(
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
                "secret {} requires device lock authentication",
                identifier.name
            )));
        }
        if user_interaction_mode == UserInteractionMode::Prevent {
            return Err(SecretsError::OperationRequiresUserInteraction(
                metadata.authentication_plugin.clone(),
            ));
        }

        let parameters = self.unlock_interaction_parameters(
            caller_pid,
            "",
            &identifier.name,
            &metadata.authentication_plugin,
            InteractionOperation::ReadSecret,
            "secretkit_get_standalone_secret_input_key",
        );
        self.park_with_interaction(
            caller_pid,
            request_id,
            &metadata.authentication_plugin.clone(),
            parameters,
            interaction_service_address,
            Continuation::GetStandaloneSecret {
                identifier: identifier.clone(),
                storage_plugin: metadata.storage_plugin,
                encryption_plugin: metadata.encryption_plugin,
                unlock_semantic: metadata.unlock_semantic,
                custom_lock_timeout_ms: metadata.custom_lock_timeout_ms,
            },
        )
    }

    /// Read stage of a standalone get, entered with the unlock key in
    /// hand. Encrypted storage uses the single-shot keyed read so the
    /// notional standalone collection's lock state is untouched.
    pub(crate) fn get_standalone_secret_with_authentication_key(
        &mut self,
        identifier: &SecretIdentifier,
        storage_plugin: &str,
        encryption_plugin: &str,
        unlock_semantic: UnlockSemantic,
        custom_lock_timeout_ms: u64,
        authentication_key: &LockKey,
    ) -> SecretsResult<Secret> {
        let hashed = hashed_secret_name(STANDALONE_COLLECTION_NAME, &identifier.name);

        let secret = if storage_plugin == encryption_plugin {
            let plugin = self.encrypted_storage_plugin(storage_plugin)?;
            let (_stored_name, data, filter_data) =
                plugin.access_secret(STANDALONE_COLLECTION_NAME, &hashed, authentication_key)?;
            Secret {
                identifier: identifier.clone(),
                data,
                filter_data,
            }
        } else {
            let storage = self.storage_plugin(storage_plugin)?;
            let encryption = self.encryption_plugin(encryption_plugin)?;
            let (_encrypted_name, encrypted_value, filter_data) =
                storage.get_secret(STANDALONE_COLLECTION_NAME, &hashed)?;
            let data = encryption.decrypt(&encrypted_value, authentication_key)?;
            Secret {
                identifier: identifier.clone(),
                data,
                filter_data,
            }
        };

        self.arm_standalone_relock(&hashed, unlock_semantic, custom_lock_timeout_ms);
        Ok(secret)
    }

    /// Finding standalone secrets by filter is not supported.
    ///
    /// # Errors
    ///
    /// Always `OperationNotSupported`.
    pub fn find_standalone_secrets(
        &self,
        _caller_pid: u32,
        _request_id: u64,
        _filter: &FilterData,
        _operator: FilterOperator,
    ) -> SecretsResult<Vec<SecretIdentifier>> {
        Err(SecretsError::OperationNotSupported(
            "filtering standalone secrets is not supported".to_owned(),
        ))
    }

    /// Deletes a standalone secret. Deleting a secret that does not exist
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Fails on access-control rejection, stale plugin references, or a
    /// plugin removal failure (in which case the bookkeeping row is
    /// retained).
    pub fn delete_standalone_secret(
        &mut self,
        caller_pid: u32,
        _request_id: u64,
        identifier: &SecretIdentifier,
        _user_interaction_mode: UserInteractionMode,
    ) -> SecretsResult<()> {
        let caller_application_id = self.caller_application_id(caller_pid);
        let hashed = hashed_secret_name(STANDALONE_COLLECTION_NAME, &identifier.name);
        let Some(metadata) = self
            .bookkeeping
            .secret_metadata(STANDALONE_COLLECTION_NAME, &hashed)?
        else {
            // no such secret, so "deleting" it succeeded
            return Ok(());
        };
        Self::check_access(
            &metadata,
            &caller_application_id,
            &format!("secret {}", identifier.name),
        )?;
        self.validate_plugin_combination(&metadata.storage_plugin, &metadata.encryption_plugin)?;

        if metadata.uses_encrypted_storage() {
            let plugin = self.encrypted_storage_plugin(&metadata.storage_plugin)?;
            let was_locked = plugin.is_locked(STANDALONE_COLLECTION_NAME)?;
            if was_locked && metadata.uses_device_lock {
                plugin.set_encryption_key(
                    STANDALONE_COLLECTION_NAME,
                    &self.config.device_lock_key(),
                )?;
            }
            let plugin_result = plugin.remove_secret(STANDALONE_COLLECTION_NAME, &hashed);
            if was_locked {
                // relock after the delete-access
                let _ = plugin.set_encryption_key(STANDALONE_COLLECTION_NAME, &LockKey::empty());
            }
            plugin_result?;
        } else {
            self.storage_plugin(&metadata.storage_plugin)?
                .remove_secret(STANDALONE_COLLECTION_NAME, &hashed)?;
            self.standalone_keys.remove(&hashed);
            self.relock.cancel_standalone(&hashed);
        }

        self.bookkeeping
            .delete_secret(STANDALONE_COLLECTION_NAME, &hashed)?;
        debug!(secret = %identifier.name, "deleted standalone secret");
        Ok(())
    }

    // =========================================================================
    // Shared pieces
    // =========================================================================

    // Overwriting an existing standalone secret must not change its unlock
    // kind or move it between storage plugins.
    fn check_standalone_overwrite(
        metadata: &ProtectionMetadata,
        caller_application_id: &str,
        secret_name: &str,
        storage_plugin: &str,
        writing_device_lock: bool,
    ) -> SecretsResult<()> {
        Self::check_access(
            metadata,
            caller_application_id,
            &format!("secret {secret_name}"),
        )?;
        if metadata.uses_device_lock != writing_device_lock {
            return Err(SecretsError::OperationNotSupported(format!(
                "secret {secret_name} already exists with a different lock kind"
            )));
        }
        if !metadata
            .storage_plugin
            .eq_ignore_ascii_case(storage_plugin)
        {
            return Err(SecretsError::OperationNotSupported(format!(
                "secret {secret_name} already exists and is not stored via plugin {storage_plugin}"
            )));
        }
        Ok(())
    }

    // Shared write tail of both standalone store flows: bookkeeping row
    // first, plugin write second, cleanup of a fresh row on plugin failure.
    fn write_standalone_secret(
        &mut self,
        secret: &Secret,
        hashed: &str,
        metadata: &ProtectionMetadata,
        key: &LockKey,
    ) -> SecretsResult<()> {
        let existing = self
            .bookkeeping
            .secret_exists(STANDALONE_COLLECTION_NAME, hashed)?;
        if existing {
            self.bookkeeping
                .update_secret(STANDALONE_COLLECTION_NAME, hashed, metadata)?;
        } else {
            self.bookkeeping
                .insert_secret(STANDALONE_COLLECTION_NAME, hashed, metadata)?;
        }

        let plugin_result = if metadata.uses_encrypted_storage() {
            self.encrypted_storage_plugin(&metadata.storage_plugin)?
                .set_secret_with_key(
                    STANDALONE_COLLECTION_NAME,
                    hashed,
                    &secret.identifier.name,
                    &secret.data,
                    &secret.filter_data,
                    key,
                )
        } else {
            let encryption = self.encryption_plugin(&metadata.encryption_plugin)?;
            let storage = self.storage_plugin(&metadata.storage_plugin)?;
            let result = encryption
                .encrypt(secret.data.as_bytes(), key)
                .and_then(|encrypted_value| {
                    let encrypted_name =
                        encryption.encrypt(secret.identifier.name.as_bytes(), key)?;
                    storage.set_secret(
                        STANDALONE_COLLECTION_NAME,
                        hashed,
                        &encrypted_name,
                        &encrypted_value,
                        &secret.filter_data,
                    )
                });
            if result.is_ok() {
                self.standalone_keys.insert(hashed.to_owned(), key.clone());
            }
            result
        };

        if let Err(plugin_err) = plugin_result {
            if !existing {
                self.bookkeeping.cleanup_delete_secret(
                    STANDALONE_COLLECTION_NAME,
                    hashed,
                    plugin_err.clone(),
                )?;
            }
            return Err(plugin_err);
        }

        self.arm_standalone_relock(
            hashed,
            metadata.unlock_semantic,
            metadata.custom_lock_timeout_ms,
        );
        debug!(secret = %secret.identifier.name, "stored standalone secret");
        Ok(())
    }
}
