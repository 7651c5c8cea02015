//! Suspended requests awaiting user input.

use std::collections::BTreeMap;

use tracing::warn;

use crate::types::{
    AccessControlMode, CustomLockSemantic, DeviceLockSemantic, FilterData, FilterOperator,
    ProtectionMetadata, Secret, SecretIdentifier, UnlockSemantic, UserInteractionMode,
};

/// Everything needed to resume a request once its user-interaction flow
/// completes.
///
/// One variant per suspended request kind, each carrying the typed record
/// its resume stage consumes. A malformed continuation cannot be
/// constructed, so resuming can only fail by the continuation being absent.
pub(crate) enum Continuation {
    /// Resume collection creation with the collected lock key.
    CreateCustomLockCollection {
        collection_name: String,
        storage_plugin: String,
        encryption_plugin: String,
        authentication_plugin: String,
        unlock_semantic: CustomLockSemantic,
        custom_lock_timeout_ms: u64,
        access_control: AccessControlMode,
    },
    /// The collected input becomes the secret's value; key acquisition
    /// follows (and may park again).
    SetCollectionUserInputSecret {
        secret: Secret,
        user_interaction_mode: UserInteractionMode,
        interaction_service_address: String,
        collection: ProtectionMetadata,
    },
    /// Resume a collection-secret write with the collected lock key.
    SetCollectionSecret {
        secret: Secret,
        collection: ProtectionMetadata,
    },
    /// The collected input becomes the standalone secret's value; the write
    /// proceeds under the device-lock key.
    SetStandaloneDeviceLockUserInputSecret {
        secret: Secret,
        storage_plugin: String,
        encryption_plugin: String,
        unlock_semantic: DeviceLockSemantic,
        access_control: AccessControlMode,
    },
    /// The collected input becomes the standalone secret's value; lock-key
    /// acquisition follows (and parks again).
    SetStandaloneCustomLockUserInputSecret {
        secret: Secret,
        storage_plugin: String,
        encryption_plugin: String,
        authentication_plugin: String,
        unlock_semantic: CustomLockSemantic,
        custom_lock_timeout_ms: u64,
        access_control: AccessControlMode,
        interaction_service_address: String,
    },
    /// Resume a standalone custom-lock write with the collected lock key.
    SetStandaloneCustomLockSecret {
        secret: Secret,
        storage_plugin: String,
        encryption_plugin: String,
        authentication_plugin: String,
        unlock_semantic: CustomLockSemantic,
        custom_lock_timeout_ms: u64,
        access_control: AccessControlMode,
    },
    /// Resume a collection-secret read with the collected lock key.
    GetCollectionSecret {
        identifier: SecretIdentifier,
        storage_plugin: String,
        encryption_plugin: String,
        unlock_semantic: UnlockSemantic,
        custom_lock_timeout_ms: u64,
    },
    /// Resume a standalone-secret read with the collected lock key.
    GetStandaloneSecret {
        identifier: SecretIdentifier,
        storage_plugin: String,
        encryption_plugin: String,
        unlock_semantic: UnlockSemantic,
        custom_lock_timeout_ms: u64,
    },
    /// Resume a filtered search with the collected lock key.
    FindCollectionSecrets {
        collection_name: String,
        filter: FilterData,
        operator: FilterOperator,
        storage_plugin: String,
        encryption_plugin: String,
        unlock_semantic: UnlockSemantic,
        custom_lock_timeout_ms: u64,
    },
    /// Resume a collection-secret deletion with the collected lock key.
    DeleteCollectionSecret { identifier: SecretIdentifier },
    /// Return the collected input to the caller verbatim.
    UserInput,
}

pub(crate) struct PendingRequest {
    pub(crate) caller_pid: u32,
    pub(crate) request_id: u64,
    pub(crate) continuation: Continuation,
}

/// Table of suspended requests, keyed by request id.
#[derive(Default)]
pub(crate) struct PendingTable {
    entries: BTreeMap<u64, PendingRequest>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Parks a suspended request. Request ids are unique per request, so a
    /// collision means the remoting layer reused an id; the newer request
    /// wins and the stale entry is dropped.
    pub(crate) fn park(&mut self, request: PendingRequest) {
        if self
            .entries
            .insert(request.request_id, request)
            .is_some()
        {
            warn!("replaced pending request with duplicate request id");
        }
    }

    pub(crate) fn take(&mut self, request_id: u64) -> Option<PendingRequest> {
        self.entries.remove(&request_id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
