//! In-memory plugin implementations for testing.
//!
//! These implementations are NOT secure and must never ship in a
//! production deployment. They exist so the request processor's
//! sequencing, locking, and cleanup behaviour can be exercised without
//! real storage or cryptography, and they expose failure-injection
//! toggles for the consistency-protocol tests.

// Allow certain clippy lints for test-only code
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::significant_drop_tightening)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::interaction::InteractionParameters;
use crate::queue::{EventSender, ProcessorEvent};
use crate::types::{FilterData, FilterOperator, LockKey, SecretBytes};
use crate::{SecretsError, SecretsResult};

use super::{
    AuthenticationPlugin, AuthenticationTypes, EncryptedStoragePlugin, EncryptionPlugin,
    SecretsPlugin, StoragePlugin,
};

fn filter_matches(entry: &FilterData, filter: &FilterData, operator: FilterOperator) -> bool {
    let mut matched = |(field, value): (&String, &String)| entry.get(field) == Some(value);
    match operator {
        FilterOperator::And => filter.iter().all(&mut matched),
        FilterOperator::Or => filter.iter().any(&mut matched),
    }
}

// =============================================================================
// Memory storage plugin
// =============================================================================

struct StoredEntry {
    encrypted_name: Vec<u8>,
    encrypted_value: Vec<u8>,
    filter_data: FilterData,
}

/// In-memory ciphertext store.
///
/// **FOR TESTING ONLY.**
pub struct MemoryStoragePlugin {
    name: String,
    collections: RwLock<BTreeMap<String, BTreeMap<String, StoredEntry>>>,
    fail_next_create: AtomicBool,
    fail_next_set: AtomicBool,
}

impl MemoryStoragePlugin {
    /// Creates an empty storage plugin named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::new(BTreeMap::new()),
            fail_next_create: AtomicBool::new(false),
            fail_next_set: AtomicBool::new(false),
        }
    }

    /// Makes the next `create_collection` call fail.
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    /// Makes the next `set_secret` call fail.
    pub fn fail_next_set(&self) {
        self.fail_next_set.store(true, Ordering::SeqCst);
    }

    /// Whether a collection exists in the plugin, for test assertions.
    #[must_use]
    pub fn contains_collection(&self, collection_name: &str) -> bool {
        self.collections.read().unwrap().contains_key(collection_name)
    }

    /// Stored encrypted value of a secret, for test assertions.
    #[must_use]
    pub fn stored_value(&self, collection_name: &str, hashed_secret_name: &str) -> Option<Vec<u8>> {
        self.collections
            .read()
            .unwrap()
            .get(collection_name)
            .and_then(|secrets| secrets.get(hashed_secret_name))
            .map(|entry| entry.encrypted_value.clone())
    }

    /// Number of secrets stored in a collection, for test assertions.
    #[must_use]
    pub fn secret_count(&self, collection_name: &str) -> usize {
        self.collections
            .read()
            .unwrap()
            .get(collection_name)
            .map_or(0, BTreeMap::len)
    }
}

impl SecretsPlugin for MemoryStoragePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_storage(self: std::sync::Arc<Self>) -> Option<std::sync::Arc<dyn StoragePlugin>> {
        Some(self)
    }
}

impl StoragePlugin for MemoryStoragePlugin {
    fn create_collection(&self, collection_name: &str) -> SecretsResult<()> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(SecretsError::plugin(format!(
                "injected create failure in storage plugin {}",
                self.name
            )));
        }
        let mut collections = self.collections.write().unwrap();
        if collections.contains_key(collection_name) {
            return Err(SecretsError::plugin(format!(
                "collection already exists in storage: {collection_name}"
            )));
        }
        collections.insert(collection_name.to_owned(), BTreeMap::new());
        Ok(())
    }

    fn remove_collection(&self, collection_name: &str) -> SecretsResult<()> {
        self.collections.write().unwrap().remove(collection_name);
        Ok(())
    }

    fn set_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        encrypted_name: &[u8],
        encrypted_value: &[u8],
        filter_data: &FilterData,
    ) -> SecretsResult<()> {
        if self.fail_next_set.swap(false, Ordering::SeqCst) {
            return Err(SecretsError::plugin(format!(
                "injected set failure in storage plugin {}",
                self.name
            )));
        }
        let mut collections = self.collections.write().unwrap();
        // First write establishes the collection if needed; this is how the
        // notional standalone collection comes to exist plugin-side.
        let secrets = collections.entry(collection_name.to_owned()).or_default();
        secrets.insert(
            hashed_secret_name.to_owned(),
            StoredEntry {
                encrypted_name: encrypted_name.to_vec(),
                encrypted_value: encrypted_value.to_vec(),
                filter_data: filter_data.clone(),
            },
        );
        Ok(())
    }

    fn get_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
    ) -> SecretsResult<(Vec<u8>, Vec<u8>, FilterData)> {
        let collections = self.collections.read().unwrap();
        let entry = collections
            .get(collection_name)
            .and_then(|secrets| secrets.get(hashed_secret_name))
            .ok_or_else(|| {
                SecretsError::InvalidSecret(format!(
                    "no such secret in storage collection {collection_name}"
                ))
            })?;
        Ok((
            entry.encrypted_name.clone(),
            entry.encrypted_value.clone(),
            entry.filter_data.clone(),
        ))
    }

    fn remove_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
    ) -> SecretsResult<()> {
        if let Some(secrets) = self.collections.write().unwrap().get_mut(collection_name) {
            secrets.remove(hashed_secret_name);
        }
        Ok(())
    }

    fn find_secrets(
        &self,
        collection_name: &str,
        filter: &FilterData,
        operator: FilterOperator,
    ) -> SecretsResult<Vec<Vec<u8>>> {
        let collections = self.collections.read().unwrap();
        let secrets = collections.get(collection_name).ok_or_else(|| {
            SecretsError::plugin(format!("no such collection in storage: {collection_name}"))
        })?;
        Ok(secrets
            .values()
            .filter(|entry| filter_matches(&entry.filter_data, filter, operator))
            .map(|entry| entry.encrypted_name.clone())
            .collect())
    }
}

// =============================================================================
// Memory encryption plugin
// =============================================================================

/// In-memory "encryption" built from a SHA-256 keystream and an integrity
/// tag.
///
/// **FOR TESTING ONLY** — this is not a real cipher. The tag makes
/// wrong-key decryption detectable, which the processor's key-caching and
/// find paths rely on.
pub struct MemoryEncryptionPlugin {
    name: String,
    fail_next_encrypt: AtomicBool,
    fail_next_decrypt: AtomicBool,
}

const TAG_LEN: usize = 32;
const KEYSTREAM_DOMAIN: &[u8] = b"secretkit-memory-keystream";
const TAG_DOMAIN: &[u8] = b"secretkit-memory-tag";

impl MemoryEncryptionPlugin {
    /// Creates an encryption plugin named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail_next_encrypt: AtomicBool::new(false),
            fail_next_decrypt: AtomicBool::new(false),
        }
    }

    /// Makes the next `encrypt` call fail.
    pub fn fail_next_encrypt(&self) {
        self.fail_next_encrypt.store(true, Ordering::SeqCst);
    }

    /// Makes the next `decrypt` call fail.
    pub fn fail_next_decrypt(&self) {
        self.fail_next_decrypt.store(true, Ordering::SeqCst);
    }

    fn keystream(key: &LockKey, len: usize) -> Vec<u8> {
        let mut keystream = Vec::with_capacity(len + TAG_LEN);
        let mut counter = 0u64;
        while keystream.len() < len {
            let mut hasher = Sha256::new();
            hasher.update(KEYSTREAM_DOMAIN);
            hasher.update(key.as_bytes());
            hasher.update(counter.to_le_bytes());
            keystream.extend_from_slice(&hasher.finalize());
            counter += 1;
        }
        keystream.truncate(len);
        keystream
    }

    fn tag(key: &LockKey, plaintext: &[u8]) -> [u8; TAG_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(TAG_DOMAIN);
        hasher.update(key.as_bytes());
        hasher.update(plaintext);
        hasher.finalize().into()
    }
}

impl SecretsPlugin for MemoryEncryptionPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_encryption(self: std::sync::Arc<Self>) -> Option<std::sync::Arc<dyn EncryptionPlugin>> {
        Some(self)
    }
}

impl EncryptionPlugin for MemoryEncryptionPlugin {
    fn encrypt(&self, plaintext: &[u8], key: &LockKey) -> SecretsResult<Vec<u8>> {
        if self.fail_next_encrypt.swap(false, Ordering::SeqCst) {
            return Err(SecretsError::plugin(format!(
                "injected encrypt failure in encryption plugin {}",
                self.name
            )));
        }
        let keystream = Self::keystream(key, plaintext.len());
        let mut ciphertext = Vec::with_capacity(TAG_LEN + plaintext.len());
        ciphertext.extend_from_slice(&Self::tag(key, plaintext));
        ciphertext.extend(
            plaintext
                .iter()
                .zip(keystream.iter())
                .map(|(byte, mask)| byte ^ mask),
        );
        Ok(ciphertext)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &LockKey) -> SecretsResult<SecretBytes> {
        if self.fail_next_decrypt.swap(false, Ordering::SeqCst) {
            return Err(SecretsError::PluginDecryption(format!(
                "injected decrypt failure in encryption plugin {}",
                self.name
            )));
        }
        if ciphertext.len() < TAG_LEN {
            return Err(SecretsError::PluginDecryption(
                "ciphertext too short".to_owned(),
            ));
        }
        let (tag, body) = ciphertext.split_at(TAG_LEN);
        let keystream = Self::keystream(key, body.len());
        let plaintext: Vec<u8> = body
            .iter()
            .zip(keystream.iter())
            .map(|(byte, mask)| byte ^ mask)
            .collect();
        if Self::tag(key, &plaintext) != tag {
            return Err(SecretsError::PluginDecryption(
                "integrity tag mismatch".to_owned(),
            ));
        }
        Ok(SecretBytes::new(plaintext))
    }
}

// =============================================================================
// Memory encrypted-storage plugin
// =============================================================================

struct EncryptedSecret {
    name: String,
    value: SecretBytes,
    filter_data: FilterData,
}

struct EncryptedCollection {
    collection_key: LockKey,
    candidate_key: Option<LockKey>,
    secrets: BTreeMap<String, EncryptedSecret>,
}

impl EncryptedCollection {
    fn unlocked(&self) -> bool {
        self.candidate_key.as_ref() == Some(&self.collection_key)
    }
}

/// In-memory combined storage-and-encryption backend with per-collection
/// lock state.
///
/// **FOR TESTING ONLY.** Applying a key always succeeds; only a matching
/// key actually unlocks, which models backends where a wrong key is only
/// detectable through the subsequent lock-state query.
pub struct MemoryEncryptedStoragePlugin {
    name: String,
    collections: RwLock<BTreeMap<String, EncryptedCollection>>,
}

impl MemoryEncryptedStoragePlugin {
    /// Creates an empty encrypted-storage plugin named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::new(BTreeMap::new()),
        }
    }

    /// Whether a collection exists in the plugin, for test assertions.
    #[must_use]
    pub fn contains_collection(&self, collection_name: &str) -> bool {
        self.collections.read().unwrap().contains_key(collection_name)
    }

    /// Whether any key is currently applied to the collection, for test
    /// assertions (a relocked collection holds none).
    #[must_use]
    pub fn holds_candidate_key(&self, collection_name: &str) -> bool {
        self.collections
            .read()
            .unwrap()
            .get(collection_name)
            .is_some_and(|state| state.candidate_key.is_some())
    }

    /// Number of secrets stored in a collection, for test assertions.
    #[must_use]
    pub fn secret_count(&self, collection_name: &str) -> usize {
        self.collections
            .read()
            .unwrap()
            .get(collection_name)
            .map_or(0, |state| state.secrets.len())
    }
}

impl SecretsPlugin for MemoryEncryptedStoragePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_encrypted_storage(
        self: std::sync::Arc<Self>,
    ) -> Option<std::sync::Arc<dyn EncryptedStoragePlugin>> {
        Some(self)
    }
}

impl EncryptedStoragePlugin for MemoryEncryptedStoragePlugin {
    fn create_collection(&self, collection_name: &str, key: &LockKey) -> SecretsResult<()> {
        let mut collections = self.collections.write().unwrap();
        if collections.contains_key(collection_name) {
            return Err(SecretsError::plugin(format!(
                "collection already exists in encrypted storage: {collection_name}"
            )));
        }
        collections.insert(
            collection_name.to_owned(),
            EncryptedCollection {
                collection_key: key.clone(),
                candidate_key: Some(key.clone()),
                secrets: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn remove_collection(&self, collection_name: &str) -> SecretsResult<()> {
        self.collections.write().unwrap().remove(collection_name);
        Ok(())
    }

    fn is_locked(&self, collection_name: &str) -> SecretsResult<bool> {
        let collections = self.collections.read().unwrap();
        let state = collections.get(collection_name).ok_or_else(|| {
            SecretsError::plugin(format!(
                "no such collection in encrypted storage: {collection_name}"
            ))
        })?;
        Ok(!state.unlocked())
    }

    fn set_encryption_key(&self, collection_name: &str, key: &LockKey) -> SecretsResult<()> {
        let mut collections = self.collections.write().unwrap();
        let state = collections.get_mut(collection_name).ok_or_else(|| {
            SecretsError::plugin(format!(
                "no such collection in encrypted storage: {collection_name}"
            ))
        })?;
        state.candidate_key = if key.is_empty() {
            None
        } else {
            Some(key.clone())
        };
        Ok(())
    }

    fn set_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        secret_name: &str,
        value: &SecretBytes,
        filter_data: &FilterData,
    ) -> SecretsResult<()> {
        let mut collections = self.collections.write().unwrap();
        let state = collections.get_mut(collection_name).ok_or_else(|| {
            SecretsError::plugin(format!(
                "no such collection in encrypted storage: {collection_name}"
            ))
        })?;
        if !state.unlocked() {
            return Err(SecretsError::plugin(format!(
                "collection is locked: {collection_name}"
            )));
        }
        state.secrets.insert(
            hashed_secret_name.to_owned(),
            EncryptedSecret {
                name: secret_name.to_owned(),
                value: value.clone(),
                filter_data: filter_data.clone(),
            },
        );
        Ok(())
    }

    fn set_secret_with_key(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        secret_name: &str,
        value: &SecretBytes,
        filter_data: &FilterData,
        key: &LockKey,
    ) -> SecretsResult<()> {
        let mut collections = self.collections.write().unwrap();
        // First keyed write establishes the collection; this is how the
        // notional standalone collection comes to exist plugin-side.
        let state = collections
            .entry(collection_name.to_owned())
            .or_insert_with(|| EncryptedCollection {
                collection_key: key.clone(),
                candidate_key: None,
                secrets: BTreeMap::new(),
            });
        if key != &state.collection_key {
            return Err(SecretsError::IncorrectAuthenticationKey(
                collection_name.to_owned(),
            ));
        }
        state.secrets.insert(
            hashed_secret_name.to_owned(),
            EncryptedSecret {
                name: secret_name.to_owned(),
                value: value.clone(),
                filter_data: filter_data.clone(),
            },
        );
        Ok(())
    }

    fn get_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
    ) -> SecretsResult<(String, SecretBytes, FilterData)> {
        let collections = self.collections.read().unwrap();
        let state = collections.get(collection_name).ok_or_else(|| {
            SecretsError::plugin(format!(
                "no such collection in encrypted storage: {collection_name}"
            ))
        })?;
        if !state.unlocked() {
            return Err(SecretsError::plugin(format!(
                "collection is locked: {collection_name}"
            )));
        }
        let secret = state.secrets.get(hashed_secret_name).ok_or_else(|| {
            SecretsError::InvalidSecret(format!(
                "no such secret in encrypted storage collection {collection_name}"
            ))
        })?;
        Ok((
            secret.name.clone(),
            secret.value.clone(),
            secret.filter_data.clone(),
        ))
    }

    fn access_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
        key: &LockKey,
    ) -> SecretsResult<(String, SecretBytes, FilterData)> {
        let collections = self.collections.read().unwrap();
        let state = collections.get(collection_name).ok_or_else(|| {
            SecretsError::InvalidSecret(format!(
                "no such secret in encrypted storage collection {collection_name}"
            ))
        })?;
        if key != &state.collection_key {
            return Err(SecretsError::IncorrectAuthenticationKey(
                collection_name.to_owned(),
            ));
        }
        let secret = state.secrets.get(hashed_secret_name).ok_or_else(|| {
            SecretsError::InvalidSecret(format!(
                "no such secret in encrypted storage collection {collection_name}"
            ))
        })?;
        Ok((
            secret.name.clone(),
            secret.value.clone(),
            secret.filter_data.clone(),
        ))
    }

    fn remove_secret(
        &self,
        collection_name: &str,
        hashed_secret_name: &str,
    ) -> SecretsResult<()> {
        let mut collections = self.collections.write().unwrap();
        let state = collections.get_mut(collection_name).ok_or_else(|| {
            SecretsError::plugin(format!(
                "no such collection in encrypted storage: {collection_name}"
            ))
        })?;
        if !state.unlocked() {
            return Err(SecretsError::plugin(format!(
                "collection is locked: {collection_name}"
            )));
        }
        state.secrets.remove(hashed_secret_name);
        Ok(())
    }

    fn find_secrets(
        &self,
        collection_name: &str,
        filter: &FilterData,
        operator: FilterOperator,
    ) -> SecretsResult<Vec<String>> {
        let collections = self.collections.read().unwrap();
        let state = collections.get(collection_name).ok_or_else(|| {
            SecretsError::plugin(format!(
                "no such collection in encrypted storage: {collection_name}"
            ))
        })?;
        if !state.unlocked() {
            return Err(SecretsError::plugin(format!(
                "collection is locked: {collection_name}"
            )));
        }
        Ok(state
            .secrets
            .values()
            .filter(|secret| filter_matches(&secret.filter_data, filter, operator))
            .map(|secret| secret.name.clone())
            .collect())
    }
}

// =============================================================================
// Memory authentication plugin
// =============================================================================

/// Response a [`MemoryAuthenticationPlugin`] delivers for the next begun
/// interaction.
pub enum QueuedResponse {
    /// The user entered these bytes.
    Input(Vec<u8>),
    /// The flow failed or was cancelled.
    Failure(String),
}

/// A begun user-input interaction, recorded for test assertions.
#[derive(Debug, Clone)]
pub struct BegunInteraction {
    /// Pid the flow was begun for.
    pub caller_pid: u32,
    /// Request the flow belongs to.
    pub request_id: u64,
    /// Parameters the flow was begun with.
    pub parameters: InteractionParameters,
    /// Interaction service address passed through.
    pub interaction_service_address: String,
}

/// In-memory authentication plugin.
///
/// **FOR TESTING ONLY.** Queued responses are delivered immediately as
/// mailbox events when an interaction is begun; with nothing queued the
/// interaction stays open until the test completes it by hand.
pub struct MemoryAuthenticationPlugin {
    name: String,
    types: AuthenticationTypes,
    events: Mutex<Option<EventSender>>,
    responses: Mutex<VecDeque<QueuedResponse>>,
    begun: Mutex<Vec<BegunInteraction>>,
    fail_next_begin: AtomicBool,
}

impl MemoryAuthenticationPlugin {
    /// Creates an authentication plugin named `name` advertising `types`.
    #[must_use]
    pub fn new(name: impl Into<String>, types: AuthenticationTypes) -> Self {
        Self {
            name: name.into(),
            types,
            events: Mutex::new(None),
            responses: Mutex::new(VecDeque::new()),
            begun: Mutex::new(Vec::new()),
            fail_next_begin: AtomicBool::new(false),
        }
    }

    /// Queues user input for the next begun interaction.
    pub fn queue_input(&self, input: &[u8]) {
        self.responses
            .lock()
            .unwrap()
            .push_back(QueuedResponse::Input(input.to_vec()));
    }

    /// Queues a flow failure for the next begun interaction.
    pub fn queue_failure(&self, message: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(QueuedResponse::Failure(message.into()));
    }

    /// Makes the next `begin_user_input_interaction` call fail outright.
    pub fn fail_next_begin(&self) {
        self.fail_next_begin.store(true, Ordering::SeqCst);
    }

    /// Interactions begun so far, for test assertions.
    #[must_use]
    pub fn begun(&self) -> Vec<BegunInteraction> {
        self.begun.lock().unwrap().clone()
    }
}

impl SecretsPlugin for MemoryAuthenticationPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_authentication(
        self: std::sync::Arc<Self>,
    ) -> Option<std::sync::Arc<dyn AuthenticationPlugin>> {
        Some(self)
    }
}

impl AuthenticationPlugin for MemoryAuthenticationPlugin {
    fn authentication_types(&self) -> AuthenticationTypes {
        self.types
    }

    fn connect(&self, events: EventSender) {
        *self.events.lock().unwrap() = Some(events);
    }

    fn begin_user_input_interaction(
        &self,
        caller_pid: u32,
        request_id: u64,
        parameters: &InteractionParameters,
        interaction_service_address: &str,
    ) -> SecretsResult<()> {
        if self.fail_next_begin.swap(false, Ordering::SeqCst) {
            return Err(SecretsError::interaction(format!(
                "injected begin failure in authentication plugin {}",
                self.name
            )));
        }
        debug!(
            plugin = %self.name,
            request_id,
            operation = %parameters.operation,
            "beginning user input interaction"
        );
        self.begun.lock().unwrap().push(BegunInteraction {
            caller_pid,
            request_id,
            parameters: parameters.clone(),
            interaction_service_address: interaction_service_address.to_owned(),
        });

        let response = self.responses.lock().unwrap().pop_front();
        if let Some(response) = response {
            let events = self.events.lock().unwrap();
            if let Some(events) = events.as_ref() {
                let (result, input) = match response {
                    QueuedResponse::Input(bytes) => (Ok(()), SecretBytes::new(bytes)),
                    QueuedResponse::Failure(message) => (
                        Err(SecretsError::interaction(message)),
                        SecretBytes::default(),
                    ),
                };
                let _ = events.send(ProcessorEvent::UserInputCompleted {
                    caller_pid,
                    request_id,
                    parameters: parameters.clone(),
                    interaction_service_address: interaction_service_address.to_owned(),
                    result,
                    input,
                });
            }
        }
        Ok(())
    }
}
