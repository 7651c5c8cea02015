//! Collection-level operations: create, delete, enumerate.

use tracing::debug;

use crate::defaults;
use crate::interaction::InteractionOperation;
use crate::plugin::AuthenticationTypes;
use crate::types::{
    AccessControlMode, CustomLockSemantic, DeviceLockSemantic, LockKey, Outcome,
    ProtectionMetadata, UnlockSemantic, UserInteractionMode,
};
use crate::{SecretsError, SecretsResult};

use super::pending::Continuation;
use super::RequestProcessor;

impl RequestProcessor {
    /// Lists the collections known to bookkeeping. The reserved standalone
    /// row is never visible here.
    ///
    /// # Errors
    ///
    /// Returns an error when the bookkeeping enumeration fails.
    pub fn collection_names(&self, caller_pid: u32) -> SecretsResult<Vec<String>> {
        let _caller_application_id = self.caller_application_id(caller_pid);
        let names = self.bookkeeping.collection_names()?;
        Ok(names
            .into_iter()
            .filter(|name| !defaults::is_reserved_collection_name(name))
            .collect())
    }

    /// Creates a collection protected by the process-wide device-lock key.
    /// Completes synchronously: no user input is needed for device-lock
    /// protection.
    ///
    /// # Errors
    ///
    /// Fails validation for the reserved or empty collection name and for
    /// an invalid plugin combination; fails with `CollectionAlreadyExists`
    /// when bookkeeping already has the row; surfaces plugin failures after
    /// cleaning up the freshly inserted row.
    pub fn create_device_lock_collection(
        &mut self,
        caller_pid: u32,
        _request_id: u64,
        collection_name: &str,
        storage_plugin: &str,
        encryption_plugin: &str,
        unlock_semantic: DeviceLockSemantic,
        access_control: AccessControlMode,
    ) -> SecretsResult<()> {
        Self::validate_collection_name(collection_name)?;
        self.validate_plugin_combination(storage_plugin, encryption_plugin)?;

        let caller_application_id = self.caller_application_id(caller_pid);
        if self.bookkeeping.collection_exists(collection_name)? {
            return Err(SecretsError::CollectionAlreadyExists(
                collection_name.to_owned(),
            ));
        }

        // Bookkeeping row first, plugin collection second: a crash between
        // the two leaves only a row we control and can clean up.
        self.bookkeeping.insert_collection(
            collection_name,
            &ProtectionMetadata {
                application_id: caller_application_id,
                uses_device_lock: true,
                storage_plugin: storage_plugin.to_owned(),
                encryption_plugin: encryption_plugin.to_owned(),
                authentication_plugin: self.default_authentication_plugin(),
                unlock_semantic: UnlockSemantic::DeviceLock(unlock_semantic),
                custom_lock_timeout_ms: 0,
                access_control,
            },
        )?;

        let device_lock_key = self.config.device_lock_key();
        self.create_plugin_collection(
            collection_name,
            storage_plugin,
            encryption_plugin,
            &device_lock_key,
        )
    }

    /// Creates a collection protected by a user-chosen key. Always
    /// suspends: the key is collected through the collection's
    /// authentication plugin first.
    ///
    /// # Errors
    ///
    /// Fails validation as for device-lock creation, plus authentication
    /// plugin checks and interaction-mode compatibility.
    #[allow(clippy::too_many_arguments)]
    pub fn create_custom_lock_collection(
        &mut self,
        caller_pid: u32,
        request_id: u64,
        collection_name: &str,
        storage_plugin: &str,
        encryption_plugin: &str,
        authentication_plugin: &str,
        unlock_semantic: CustomLockSemantic,
        custom_lock_timeout_ms: u64,
        access_control: AccessControlMode,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: &str,
    ) -> SecretsResult<Outcome<()>> {
        Self::validate_collection_name(collection_name)?;
        self.validate_plugin_combination(storage_plugin, encryption_plugin)?;
        let auth = self.authentication_plugin(authentication_plugin)?;
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

        if self.bookkeeping.collection_exists(collection_name)? {
            return Err(SecretsError::CollectionAlreadyExists(
                collection_name.to_owned(),
            ));
        }

        let parameters = self.unlock_interaction_parameters(
            caller_pid,
            collection_name,
            "",
            authentication_plugin,
            InteractionOperation::CreateCollection,
            "secretkit_create_custom_lock_collection_input_key",
        );
        self.park_with_interaction(
            caller_pid,
            request_id,
            authentication_plugin,
            parameters,
            interaction_service_address,
            Continuation::CreateCustomLockCollection {
                collection_name: collection_name.to_owned(),
                storage_plugin: storage_plugin.to_owned(),
                encryption_plugin: encryption_plugin.to_owned(),
                authentication_plugin: authentication_plugin.to_owned(),
                unlock_semantic,
                custom_lock_timeout_ms,
                access_control,
            },
        )
    }

    /// Resume stage of custom-lock collection creation, entered when the
    /// user-supplied lock key arrives.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn create_custom_lock_collection_with_authentication_key(
        &mut self,
        caller_pid: u32,
        collection_name: &str,
        storage_plugin: &str,
        encryption_plugin: &str,
        authentication_plugin: &str,
        unlock_semantic: CustomLockSemantic,
        custom_lock_timeout_ms: u64,
        access_control: AccessControlMode,
        authentication_key: &LockKey,
    ) -> SecretsResult<()> {
        let caller_application_id = self.caller_application_id(caller_pid);

        // Re-check existence: another request may have created the
        // collection while the interaction flow was open.
        if self.bookkeeping.collection_exists(collection_name)? {
            return Err(SecretsError::CollectionAlreadyExists(
                collection_name.to_owned(),
            ));
        }

        self.bookkeeping.insert_collection(
            collection_name,
            &ProtectionMetadata {
                application_id: caller_application_id,
                uses_device_lock: false,
                storage_plugin: storage_plugin.to_owned(),
                encryption_plugin: encryption_plugin.to_owned(),
                authentication_plugin: authentication_plugin.to_owned(),
                unlock_semantic: UnlockSemantic::CustomLock(unlock_semantic),
                custom_lock_timeout_ms,
                access_control,
            },
        )?;

        self.create_plugin_collection(
            collection_name,
            storage_plugin,
            encryption_plugin,
            authentication_key,
        )
    }

    /// Deletes a collection. Deleting a collection that does not exist
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Fails on the reserved or empty name, access-control rejection, a
    /// stale plugin reference, or a plugin removal failure (in which case
    /// the bookkeeping row is retained).
    pub fn delete_collection(
        &mut self,
        caller_pid: u32,
        _request_id: u64,
        collection_name: &str,
        _user_interaction_mode: UserInteractionMode,
    ) -> SecretsResult<()> {
        Self::validate_collection_name(collection_name)?;

        let caller_application_id = self.caller_application_id(caller_pid);
        let Some(metadata) = self.bookkeeping.collection_metadata(collection_name)? else {
            // no such collection, so "deleting" it succeeded
            return Ok(());
        };
        Self::check_access(
            &metadata,
            &caller_application_id,
            &format!("collection {collection_name}"),
        )?;

        // Plugin first, bookkeeping second: if the plugin removal fails the
        // data still exists and the row must keep describing it.
        if metadata.uses_encrypted_storage() {
            self.encrypted_storage_plugin(&metadata.storage_plugin)?
                .remove_collection(collection_name)?;
        } else {
            self.storage_plugin(&metadata.storage_plugin)?
                .remove_collection(collection_name)?;
        }

        self.collection_keys.remove(collection_name);
        self.relock.cancel_collection(collection_name);
        self.bookkeeping.delete_collection(collection_name)?;
        debug!(collection = collection_name, "deleted collection");
        Ok(())
    }

    fn validate_collection_name(collection_name: &str) -> SecretsResult<()> {
        if defaults::is_reserved_collection_name(collection_name) {
            return Err(SecretsError::InvalidCollection(
                "reserved collection name given".to_owned(),
            ));
        }
        if collection_name.is_empty() {
            return Err(SecretsError::InvalidCollection(
                "empty collection name given".to_owned(),
            ));
        }
        Ok(())
    }

    // Shared tail of both creation flows: create the plugin-side
    // collection, populate the key cache for split configurations, and
    // clean up the bookkeeping row when the plugin refuses.
    fn create_plugin_collection(
        &mut self,
        collection_name: &str,
        storage_plugin: &str,
        encryption_plugin: &str,
        key: &LockKey,
    ) -> SecretsResult<()> {
        let plugin_result = if storage_plugin == encryption_plugin {
            self.encrypted_storage_plugin(storage_plugin)?
                .create_collection(collection_name, key)
        } else {
            let result = self
                .storage_plugin(storage_plugin)?
                .create_collection(collection_name);
            if result.is_ok() {
                self.collection_keys
                    .insert(collection_name.to_owned(), key.clone());
            }
            result
        };

        if let Err(plugin_err) = plugin_result {
            // The cleanup contract preserves `plugin_err` even when the row
            // removal itself fails, so the original cause always surfaces.
            self.bookkeeping
                .cleanup_delete_collection(collection_name, plugin_err.clone())?;
            return Err(plugin_err);
        }
        debug!(collection = collection_name, "created collection");
        Ok(())
    }
}
