//! Interaction-completion handling.
//!
//! Authentication plugins post `UserInputCompleted` events when a
//! user-input flow finishes. The handler resumes the parked continuation
//! and emits exactly one final reply through the request queue, unless the
//! resumed stage parked another continuation, in which case the reply
//! belongs to that later completion.

use tracing::{debug, warn};

use crate::interaction::InteractionParameters;
use crate::queue::ReplyPayload;
use crate::types::{LockKey, Outcome, SecretBytes};
use crate::{SecretsError, SecretsResult};

use super::pending::Continuation;
use super::RequestProcessor;

impl RequestProcessor {
    /// Completes a user-input interaction begun by an authentication
    /// plugin.
    ///
    /// A failed flow drops the continuation and reports the failure. A
    /// completion for an unknown request id is an internal error; the
    /// collected input is never routed anywhere in that case.
    #[allow(clippy::too_many_lines)]
    pub fn user_input_completed(
        &mut self,
        _caller_pid: u32,
        request_id: u64,
        _parameters: &InteractionParameters,
        _interaction_service_address: &str,
        result: SecretsResult<()>,
        input: SecretBytes,
    ) {
        if let Err(err) = result {
            debug!(request_id, %err, "user input interaction failed");
            self.pending.take(request_id);
            self.request_queue.request_finished(request_id, Err(err));
            return;
        }

        let Some(pending) = self.pending.take(request_id) else {
            warn!(request_id, "user input completed for unknown request");
            self.request_queue.request_finished(
                request_id,
                Err(SecretsError::unknown(
                    "no pending request for completed interaction",
                )),
            );
            return;
        };

        let caller_pid = pending.caller_pid;
        let authentication_key = LockKey::new(input.as_bytes().to_vec());

        // `None` means the resumed stage parked a further continuation; the
        // reply will be emitted when that one completes.
        let reply: Option<SecretsResult<ReplyPayload>> = match pending.continuation {
            Continuation::CreateCustomLockCollection {
                collection_name,
                storage_plugin,
                encryption_plugin,
                authentication_plugin,
                unlock_semantic,
                custom_lock_timeout_ms,
                access_control,
            } => Some(
                self.create_custom_lock_collection_with_authentication_key(
                    caller_pid,
                    &collection_name,
                    &storage_plugin,
                    &encryption_plugin,
                    &authentication_plugin,
                    unlock_semantic,
                    custom_lock_timeout_ms,
                    access_control,
                    &authentication_key,
                )
                .map(|()| ReplyPayload::None),
            ),
            Continuation::SetCollectionUserInputSecret {
                mut secret,
                user_interaction_mode,
                interaction_service_address,
                collection,
            } => {
                // the collected input is the secret's value
                secret.data = input.clone();
                match self.set_collection_secret_get_authentication_key(
                    caller_pid,
                    request_id,
                    secret,
                    user_interaction_mode,
                    &interaction_service_address,
                    collection,
                ) {
                    Ok(Outcome::Pending) => None,
                    Ok(Outcome::Complete(())) => Some(Ok(ReplyPayload::None)),
                    Err(err) => Some(Err(err)),
                }
            }
            Continuation::SetCollectionSecret { secret, collection } => Some(
                self.set_collection_secret_with_authentication_key(
                    &secret,
                    &collection,
                    &authentication_key,
                )
                .map(|()| ReplyPayload::None),
            ),
            Continuation::SetStandaloneDeviceLockUserInputSecret {
                mut secret,
                storage_plugin,
                encryption_plugin,
                unlock_semantic,
                access_control,
            } => {
                secret.data = input.clone();
                Some(
                    self.write_standalone_device_lock_secret(
                        caller_pid,
                        secret,
                        &storage_plugin,
                        &encryption_plugin,
                        unlock_semantic,
                        access_control,
                    )
                    .map(|()| ReplyPayload::None),
                )
            }
            Continuation::SetStandaloneCustomLockUserInputSecret {
                mut secret,
                storage_plugin,
                encryption_plugin,
                authentication_plugin,
                unlock_semantic,
                custom_lock_timeout_ms,
                access_control,
                interaction_service_address,
            } => {
                secret.data = input.clone();
                match self.set_standalone_custom_lock_secret_get_authentication_key(
                    caller_pid,
                    request_id,
                    secret,
                    storage_plugin,
                    encryption_plugin,
                    authentication_plugin,
                    unlock_semantic,
                    custom_lock_timeout_ms,
                    access_control,
                    &interaction_service_address,
                ) {
                    Ok(Outcome::Pending) => None,
                    Ok(Outcome::Complete(())) => Some(Ok(ReplyPayload::None)),
                    Err(err) => Some(Err(err)),
                }
            }
            Continuation::SetStandaloneCustomLockSecret {
                secret,
                storage_plugin,
                encryption_plugin,
                authentication_plugin,
                unlock_semantic,
                custom_lock_timeout_ms,
                access_control,
            } => Some(
                self.set_standalone_custom_lock_secret_with_authentication_key(
                    caller_pid,
                    &secret,
                    &storage_plugin,
                    &encryption_plugin,
                    &authentication_plugin,
                    unlock_semantic,
                    custom_lock_timeout_ms,
                    access_control,
                    &authentication_key,
                )
                .map(|()| ReplyPayload::None),
            ),
            Continuation::GetCollectionSecret {
                identifier,
                storage_plugin,
                encryption_plugin,
                unlock_semantic,
                custom_lock_timeout_ms,
            } => Some(
                self.get_collection_secret_with_authentication_key(
                    &identifier,
                    &storage_plugin,
                    &encryption_plugin,
                    unlock_semantic,
                    custom_lock_timeout_ms,
                    &authentication_key,
                )
                .map(ReplyPayload::Secret),
            ),
            Continuation::GetStandaloneSecret {
                identifier,
                storage_plugin,
                encryption_plugin,
                unlock_semantic,
                custom_lock_timeout_ms,
            } => Some(
                self.get_standalone_secret_with_authentication_key(
                    &identifier,
                    &storage_plugin,
                    &encryption_plugin,
                    unlock_semantic,
                    custom_lock_timeout_ms,
                    &authentication_key,
                )
                .map(ReplyPayload::Secret),
            ),
            Continuation::FindCollectionSecrets {
                collection_name,
                filter,
                operator,
                storage_plugin,
                encryption_plugin,
                unlock_semantic,
                custom_lock_timeout_ms,
            } => Some(
                self.find_collection_secrets_with_authentication_key(
                    &collection_name,
                    &filter,
                    operator,
                    &storage_plugin,
                    &encryption_plugin,
                    unlock_semantic,
                    custom_lock_timeout_ms,
                    &authentication_key,
                )
                .map(ReplyPayload::Identifiers),
            ),
            Continuation::DeleteCollectionSecret { identifier } => Some(
                self.delete_collection_secret_with_authentication_key(
                    caller_pid,
                    &identifier,
                    &authentication_key,
                )
                .map(|()| ReplyPayload::None),
            ),
            Continuation::UserInput => Some(Ok(ReplyPayload::UserInput(input.clone()))),
        };

        if let Some(reply) = reply {
            self.request_queue.request_finished(request_id, reply);
        }
    }

    /// Completion hook for authentication (as opposed to user-input)
    /// flows. Reserved for unlocking master-locked collections.
    pub fn authentication_completed(
        &self,
        _caller_pid: u32,
        request_id: u64,
        result: &SecretsResult<()>,
    ) {
        debug!(request_id, success = result.is_ok(), "authentication flow completed");
    }
}
