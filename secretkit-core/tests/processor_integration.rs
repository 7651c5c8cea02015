//! End-to-end scenarios for the request processor, driven against the
//! in-memory collaborators.

use std::sync::Arc;

use test_case::test_case;

use secretkit_core::bookkeeping::{BookkeepingStore, MemoryBookkeeping};
use secretkit_core::config::ProcessorConfig;
use secretkit_core::defaults::DEFAULT_AUTHENTICATION_PLUGIN_NAME;
use secretkit_core::interaction::{InteractionOperation, InteractionParameters};
use secretkit_core::permissions::StaticPermissions;
use secretkit_core::plugin::memory::{
    MemoryAuthenticationPlugin, MemoryEncryptedStoragePlugin, MemoryEncryptionPlugin,
    MemoryStoragePlugin,
};
use secretkit_core::plugin::{AuthenticationTypes, EncryptedStoragePlugin, EncryptionPlugin};
use secretkit_core::queue::{mailbox, EventReceiver, MemoryRequestQueue, ReplyPayload};
use secretkit_core::{
    hashed_secret_name, AccessControlMode, CustomLockSemantic, DeviceLockSemantic, FilterData,
    FilterOperator, LockKey, RequestProcessor, Secret, SecretBytes, SecretIdentifier,
    SecretsError, UserInteractionMode,
};

const OWNER_PID: u32 = 100;
const OTHER_PID: u32 = 200;
const DEVICE_LOCK_KEY: &[u8] = b"device-lock-key";

struct Harness {
    processor: RequestProcessor,
    events: EventReceiver,
    queue: Arc<MemoryRequestQueue>,
    bookkeeping: Arc<MemoryBookkeeping>,
    storage: Arc<MemoryStoragePlugin>,
    encryption: Arc<MemoryEncryptionPlugin>,
    encrypted: Arc<MemoryEncryptedStoragePlugin>,
    auth: Arc<MemoryAuthenticationPlugin>,
}

impl Harness {
    /// Feeds every queued mailbox event back into the processor, the way
    /// the daemon's event loop would.
    fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.processor.handle_event(event);
        }
    }
}

fn harness() -> Harness {
    harness_with(false)
}

fn harness_with(autotest_mode: bool) -> Harness {
    let (events_tx, events_rx) = mailbox();
    let bookkeeping = Arc::new(MemoryBookkeeping::new());
    let queue = Arc::new(MemoryRequestQueue::new());
    let permissions = Arc::new(StaticPermissions::new());
    let config = ProcessorConfig::new(
        autotest_mode,
        "/var/lib/secretkit/plugins",
        DEVICE_LOCK_KEY.to_vec(),
        b"system-encryption-key".to_vec(),
    );
    let mut processor = RequestProcessor::new(
        bookkeeping.clone(),
        permissions,
        queue.clone(),
        config,
        events_tx,
    )
    .expect("processor init");

    let storage = Arc::new(MemoryStoragePlugin::new("mem-storage"));
    let encryption = Arc::new(MemoryEncryptionPlugin::new("mem-enc"));
    let encrypted = Arc::new(MemoryEncryptedStoragePlugin::new("mem-crypt"));
    let auth_name = if autotest_mode {
        format!("{DEFAULT_AUTHENTICATION_PLUGIN_NAME}.test")
    } else {
        DEFAULT_AUTHENTICATION_PLUGIN_NAME.to_owned()
    };
    let auth = Arc::new(MemoryAuthenticationPlugin::new(
        auth_name,
        AuthenticationTypes::SYSTEM,
    ));

    assert!(processor.register_plugin(storage.clone()));
    assert!(processor.register_plugin(encryption.clone()));
    assert!(processor.register_plugin(encrypted.clone()));
    assert!(processor.register_plugin(auth.clone()));

    Harness {
        processor,
        events: events_rx,
        queue,
        bookkeeping,
        storage,
        encryption,
        encrypted,
        auth,
    }
}

fn secret(name: &str, collection: &str, value: &[u8]) -> Secret {
    Secret::new(SecretIdentifier::new(name, collection), value.to_vec())
}

// =============================================================================
// Device-lock collections on encrypted storage
// =============================================================================

#[test]
fn test_device_lock_collection_round_trip() {
    let mut h = harness();
    h.processor
        .create_device_lock_collection(
            OWNER_PID,
            1,
            "vault",
            "mem-crypt",
            "mem-crypt",
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .expect("create collection");
    assert!(h.bookkeeping.collection_exists("vault").unwrap());
    assert!(h.encrypted.contains_collection("vault"));

    let pw = secret("pw", "vault", b"hunter2");
    let outcome = h
        .processor
        .set_collection_secret(OWNER_PID, 2, &pw, None, UserInteractionMode::System, "")
        .expect("set secret");
    assert!(!outcome.is_pending());

    let got = h
        .processor
        .get_collection_secret(
            OWNER_PID,
            3,
            &pw.identifier,
            UserInteractionMode::System,
            "",
        )
        .expect("get secret")
        .into_complete()
        .expect("synchronous completion");
    assert_eq!(got.data.as_bytes(), b"hunter2");
}

#[test]
fn test_deleted_collection_leaves_no_trace() {
    let mut h = harness();
    h.processor
        .create_device_lock_collection(
            OWNER_PID,
            1,
            "vault",
            "mem-crypt",
            "mem-crypt",
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .unwrap();
    let pw = secret("pw", "vault", b"hunter2");
    h.processor
        .set_collection_secret(OWNER_PID, 2, &pw, None, UserInteractionMode::System, "")
        .unwrap();

    h.processor
        .delete_collection(OWNER_PID, 3, "vault", UserInteractionMode::System)
        .expect("delete collection");
    assert!(!h.bookkeeping.collection_exists("vault").unwrap());
    assert_eq!(h.bookkeeping.secret_row_count("vault"), 0);
    assert!(!h.encrypted.contains_collection("vault"));

    // deleting a collection that no longer exists still succeeds
    h.processor
        .delete_collection(OWNER_PID, 4, "vault", UserInteractionMode::System)
        .expect("idempotent delete");
}

// =============================================================================
// Custom-lock collections and interaction flows
// =============================================================================

#[test]
fn test_prevent_interaction_rejects_custom_lock_creation() {
    let mut h = harness();
    let err = h
        .processor
        .create_custom_lock_collection(
            OWNER_PID,
            1,
            "vault",
            "mem-storage",
            "mem-enc",
            DEFAULT_AUTHENTICATION_PLUGIN_NAME,
            CustomLockSemantic::KeepUnlocked,
            0,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::Prevent,
            "",
        )
        .unwrap_err();
    assert!(matches!(
        err,
        SecretsError::OperationRequiresUserInteraction(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_custom_lock_timeout_relock_reprompts() {
    let mut h = harness();

    // creation collects the lock key through the interaction flow
    h.auth.queue_input(b"K1");
    let outcome = h
        .processor
        .create_custom_lock_collection(
            OWNER_PID,
            1,
            "vault",
            "mem-storage",
            "mem-enc",
            DEFAULT_AUTHENTICATION_PLUGIN_NAME,
            CustomLockSemantic::TimeoutRelock,
            500,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .expect("create dispatch");
    assert!(outcome.is_pending());
    h.pump();
    let replies = h.queue.take();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].1, Ok(ReplyPayload::None));

    // two stores ride the cached key without prompting again
    let prompts_after_create = h.auth.begun().len();
    for (id, name) in [(2, "s1"), (3, "s2")] {
        let outcome = h
            .processor
            .set_collection_secret(
                OWNER_PID,
                id,
                &secret(name, "vault", b"payload"),
                None,
                UserInteractionMode::System,
                "",
            )
            .expect("set secret");
        assert!(!outcome.is_pending());
    }
    assert_eq!(h.auth.begun().len(), prompts_after_create);

    // the relock timer fires after the timeout and evicts the cached key
    let event = h.events.recv().await.expect("relock event");
    h.processor.handle_event(event);

    // the next read must prompt for the key again
    let outcome = h
        .processor
        .get_collection_secret(
            OWNER_PID,
            4,
            &SecretIdentifier::new("s1", "vault"),
            UserInteractionMode::System,
            "",
        )
        .expect("get dispatch");
    assert!(outcome.is_pending());
    assert_eq!(h.auth.begun().len(), prompts_after_create + 1);
}

#[test]
fn test_user_input_secret_value_then_unlock_key_single_reply() {
    let mut h = harness();

    // custom-lock collection on the encrypted-storage plugin
    h.auth.queue_input(b"K1");
    h.processor
        .create_custom_lock_collection(
            OWNER_PID,
            1,
            "notes",
            "mem-crypt",
            "mem-crypt",
            DEFAULT_AUTHENTICATION_PLUGIN_NAME,
            CustomLockSemantic::KeepUnlocked,
            0,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .unwrap();
    h.pump();
    let _ = h.queue.take();

    // relock so the write needs the key again
    h.encrypted
        .set_encryption_key("notes", &LockKey::empty())
        .unwrap();

    // the flow suspends twice: once for the value, once for the key
    h.auth.queue_input(b"the-value");
    h.auth.queue_input(b"K1");
    let ui = InteractionParameters {
        prompt_text: "Enter the note".to_owned(),
        ..InteractionParameters::default()
    };
    let outcome = h
        .processor
        .set_collection_secret(
            OWNER_PID,
            2,
            &secret("memo", "notes", b""),
            Some(&ui),
            UserInteractionMode::System,
            "",
        )
        .expect("set dispatch");
    assert!(outcome.is_pending());
    h.pump();

    // exactly one final reply despite the two suspensions
    let replies = h.queue.take();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0], (2, Ok(ReplyPayload::None)));

    let begun = h.auth.begun();
    let operations: Vec<_> = begun
        .iter()
        .rev()
        .take(2)
        .map(|i| i.parameters.operation)
        .collect();
    assert!(operations.contains(&InteractionOperation::RequestUserData));
    assert!(operations.contains(&InteractionOperation::StoreSecret));

    let got = h
        .processor
        .get_collection_secret(
            OWNER_PID,
            3,
            &SecretIdentifier::new("memo", "notes"),
            UserInteractionMode::System,
            "",
        )
        .unwrap()
        .into_complete()
        .unwrap();
    assert_eq!(got.data.as_bytes(), b"the-value");
}

#[test]
fn test_wrong_key_relocks_plugin_collection() {
    let mut h = harness();
    h.auth.queue_input(b"K1");
    h.processor
        .create_custom_lock_collection(
            OWNER_PID,
            1,
            "vault2",
            "mem-crypt",
            "mem-crypt",
            DEFAULT_AUTHENTICATION_PLUGIN_NAME,
            CustomLockSemantic::KeepUnlocked,
            0,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .unwrap();
    h.pump();
    let _ = h.queue.take();

    h.encrypted
        .set_encryption_key("vault2", &LockKey::empty())
        .unwrap();

    h.auth.queue_input(b"not-the-key");
    let outcome = h
        .processor
        .get_collection_secret(
            OWNER_PID,
            2,
            &SecretIdentifier::new("anything", "vault2"),
            UserInteractionMode::System,
            "",
        )
        .expect("get dispatch");
    assert!(outcome.is_pending());
    h.pump();

    let replies = h.queue.take();
    assert_eq!(replies.len(), 1);
    assert!(matches!(
        replies[0].1,
        Err(SecretsError::IncorrectAuthenticationKey(_))
    ));
    // the wrong key must not be left applied
    assert!(!h.encrypted.holds_candidate_key("vault2"));
}

#[test]
fn test_failed_interaction_drops_continuation() {
    let mut h = harness();
    h.auth.queue_input(b"K1");
    h.processor
        .create_custom_lock_collection(
            OWNER_PID,
            1,
            "notes2",
            "mem-crypt",
            "mem-crypt",
            DEFAULT_AUTHENTICATION_PLUGIN_NAME,
            CustomLockSemantic::KeepUnlocked,
            0,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .unwrap();
    h.pump();
    let _ = h.queue.take();

    h.encrypted
        .set_encryption_key("notes2", &LockKey::empty())
        .unwrap();

    h.auth.queue_failure("user cancelled");
    let outcome = h
        .processor
        .get_collection_secret(
            OWNER_PID,
            2,
            &SecretIdentifier::new("memo", "notes2"),
            UserInteractionMode::System,
            "",
        )
        .unwrap();
    assert!(outcome.is_pending());
    h.pump();

    let replies = h.queue.take();
    assert_eq!(replies.len(), 1);
    assert!(matches!(replies[0].1, Err(SecretsError::Interaction(_))));
}

// =============================================================================
// Split-plugin collections
// =============================================================================

#[test]
fn test_split_plugin_value_is_encrypted_at_rest() {
    let mut h = harness();
    h.processor
        .create_device_lock_collection(
            OWNER_PID,
            1,
            "files",
            "mem-storage",
            "mem-enc",
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .unwrap();

    let pw = secret("pw", "files", b"hunter2");
    h.processor
        .set_collection_secret(OWNER_PID, 2, &pw, None, UserInteractionMode::System, "")
        .unwrap();

    let hashed = hashed_secret_name("files", "pw");
    let stored = h.storage.stored_value("files", &hashed).expect("stored");
    assert_ne!(stored.as_slice(), b"hunter2");

    let device_key = LockKey::new(DEVICE_LOCK_KEY.to_vec());
    let decrypted = h.encryption.decrypt(&stored, &device_key).unwrap();
    assert_eq!(decrypted.as_bytes(), b"hunter2");
}

#[test]
fn test_find_decrypts_matching_names() {
    let mut h = harness();
    h.processor
        .create_device_lock_collection(
            OWNER_PID,
            1,
            "files",
            "mem-storage",
            "mem-enc",
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .unwrap();

    let mut password_filter = FilterData::new();
    password_filter.insert("kind".to_owned(), "password".to_owned());
    let mut token_filter = FilterData::new();
    token_filter.insert("kind".to_owned(), "token".to_owned());

    h.processor
        .set_collection_secret(
            OWNER_PID,
            2,
            &secret("pw1", "files", b"a").with_filter_data(password_filter.clone()),
            None,
            UserInteractionMode::System,
            "",
        )
        .unwrap();
    h.processor
        .set_collection_secret(
            OWNER_PID,
            3,
            &secret("tok1", "files", b"b").with_filter_data(token_filter),
            None,
            UserInteractionMode::System,
            "",
        )
        .unwrap();

    let found = h
        .processor
        .find_collection_secrets(
            OWNER_PID,
            4,
            "files",
            &password_filter,
            FilterOperator::And,
            UserInteractionMode::System,
            "",
        )
        .unwrap()
        .into_complete()
        .unwrap();
    assert_eq!(found, vec![SecretIdentifier::new("pw1", "files")]);

    let err = h
        .processor
        .find_collection_secrets(
            OWNER_PID,
            5,
            "files",
            &FilterData::new(),
            FilterOperator::And,
            UserInteractionMode::System,
            "",
        )
        .unwrap_err();
    assert!(matches!(err, SecretsError::InvalidFilter(_)));
}

#[test]
fn test_failed_encrypt_cleans_up_fresh_secret_row() {
    let mut h = harness();
    h.processor
        .create_device_lock_collection(
            OWNER_PID,
            1,
            "files",
            "mem-storage",
            "mem-enc",
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .unwrap();

    h.encryption.fail_next_encrypt();
    let err = h
        .processor
        .set_collection_secret(
            OWNER_PID,
            2,
            &secret("pw", "files", b"hunter2"),
            None,
            UserInteractionMode::System,
            "",
        )
        .unwrap_err();
    // the encryption error surfaces, not the cleanup outcome
    assert!(matches!(&err, SecretsError::Plugin(msg) if msg.contains("injected encrypt failure")));

    let hashed = hashed_secret_name("files", "pw");
    assert!(!h.bookkeeping.secret_exists("files", &hashed).unwrap());
}

#[test]
fn test_cleanup_failure_preserves_plugin_error() {
    let mut h = harness();
    h.storage.fail_next_create();
    h.bookkeeping.set_fail_cleanup(true);

    let err = h
        .processor
        .create_device_lock_collection(
            OWNER_PID,
            1,
            "badvault",
            "mem-storage",
            "mem-enc",
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .unwrap_err();
    assert!(matches!(&err, SecretsError::Plugin(msg) if msg.contains("injected create failure")));

    // cleanup failed, so the stale row survives for a later repair pass
    assert!(h.bookkeeping.collection_exists("badvault").unwrap());
}

// =============================================================================
// Validation and access control
// =============================================================================

#[test_case("standalone"; "lowercase")]
#[test_case("Standalone"; "titlecase")]
#[test_case("STANDALONE"; "uppercase")]
fn test_reserved_collection_name_rejected_everywhere(name: &str) {
    let mut h = harness();
    let identifier = SecretIdentifier::new("pw", name);
    let mut filter = FilterData::new();
    filter.insert("kind".to_owned(), "password".to_owned());

    let err = h
        .processor
        .create_device_lock_collection(
            OWNER_PID,
            1,
            name,
            "mem-crypt",
            "mem-crypt",
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .unwrap_err();
    assert!(matches!(err, SecretsError::InvalidCollection(_)));

    let err = h
        .processor
        .delete_collection(OWNER_PID, 2, name, UserInteractionMode::System)
        .unwrap_err();
    assert!(matches!(err, SecretsError::InvalidCollection(_)));

    let err = h
        .processor
        .set_collection_secret(
            OWNER_PID,
            3,
            &secret("pw", name, b"x"),
            None,
            UserInteractionMode::System,
            "",
        )
        .unwrap_err();
    assert!(matches!(err, SecretsError::InvalidCollection(_)));

    let err = h
        .processor
        .get_collection_secret(OWNER_PID, 4, &identifier, UserInteractionMode::System, "")
        .unwrap_err();
    assert!(matches!(err, SecretsError::InvalidCollection(_)));

    let err = h
        .processor
        .find_collection_secrets(
            OWNER_PID,
            5,
            name,
            &filter,
            FilterOperator::And,
            UserInteractionMode::System,
            "",
        )
        .unwrap_err();
    assert!(matches!(err, SecretsError::InvalidCollection(_)));

    let err = h
        .processor
        .delete_collection_secret(OWNER_PID, 6, &identifier, UserInteractionMode::System, "")
        .unwrap_err();
    assert!(matches!(err, SecretsError::InvalidCollection(_)));
}

#[test]
fn test_reserved_row_is_not_listed() {
    let h = harness();
    assert!(h
        .processor
        .collection_names(OWNER_PID)
        .unwrap()
        .is_empty());
}

#[test]
fn test_owner_only_collections_reject_other_callers() {
    let mut h = harness();
    h.processor
        .create_device_lock_collection(
            OWNER_PID,
            1,
            "files",
            "mem-storage",
            "mem-enc",
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .unwrap();

    let err = h
        .processor
        .get_collection_secret(
            OTHER_PID,
            2,
            &SecretIdentifier::new("pw", "files"),
            UserInteractionMode::System,
            "",
        )
        .unwrap_err();
    assert!(matches!(err, SecretsError::Permissions(_)));

    let err = h
        .processor
        .delete_collection(OTHER_PID, 3, "files", UserInteractionMode::System)
        .unwrap_err();
    assert!(matches!(err, SecretsError::Permissions(_)));
}

#[test]
fn test_unknown_plugin_combination_rejected() {
    let mut h = harness();
    let err = h
        .processor
        .create_device_lock_collection(
            OWNER_PID,
            1,
            "vault",
            "no-such-plugin",
            "mem-enc",
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .unwrap_err();
    assert!(matches!(err, SecretsError::InvalidExtensionPlugin(_)));

    // equal names must resolve to an encrypted-storage plugin
    let err = h
        .processor
        .create_device_lock_collection(
            OWNER_PID,
            2,
            "vault",
            "mem-storage",
            "mem-storage",
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .unwrap_err();
    assert!(matches!(err, SecretsError::InvalidExtensionPlugin(_)));
}

#[test]
fn test_autotest_mode_substitutes_default_authentication_plugin() {
    let mut h = harness_with(true);
    h.processor
        .create_device_lock_collection(
            OWNER_PID,
            1,
            "vault",
            "mem-crypt",
            "mem-crypt",
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .unwrap();
    let metadata = h
        .bookkeeping
        .collection_metadata("vault")
        .unwrap()
        .unwrap();
    assert!(metadata.authentication_plugin.ends_with(".test"));
}

// =============================================================================
// Standalone secrets
// =============================================================================

#[test]
fn test_standalone_device_lock_round_trip_and_delete() {
    let mut h = harness();
    let token = Secret::new(SecretIdentifier::standalone("token"), b"t0ps3cret".to_vec());

    let outcome = h
        .processor
        .set_standalone_device_lock_secret(
            OWNER_PID,
            1,
            "mem-storage",
            "mem-enc",
            &token,
            None,
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .expect("set standalone");
    assert!(!outcome.is_pending());

    let got = h
        .processor
        .get_standalone_secret(
            OWNER_PID,
            2,
            &token.identifier,
            UserInteractionMode::System,
            "",
        )
        .unwrap()
        .into_complete()
        .unwrap();
    assert_eq!(got.data.as_bytes(), b"t0ps3cret");

    h.processor
        .delete_standalone_secret(OWNER_PID, 3, &token.identifier, UserInteractionMode::System)
        .expect("delete standalone");
    let err = h
        .processor
        .get_standalone_secret(
            OWNER_PID,
            4,
            &token.identifier,
            UserInteractionMode::System,
            "",
        )
        .unwrap_err();
    assert!(matches!(err, SecretsError::InvalidSecret(_)));

    // deleting a standalone secret that does not exist succeeds
    h.processor
        .delete_standalone_secret(OWNER_PID, 5, &token.identifier, UserInteractionMode::System)
        .expect("idempotent delete");
}

#[test]
fn test_standalone_lock_kind_transitions_forbidden() {
    let mut h = harness();
    let token = Secret::new(SecretIdentifier::standalone("token"), b"v1".to_vec());

    // custom-lock standalone on the encrypted-storage plugin
    h.auth.queue_input(b"K1");
    let outcome = h
        .processor
        .set_standalone_custom_lock_secret(
            OWNER_PID,
            1,
            "mem-crypt",
            "mem-crypt",
            DEFAULT_AUTHENTICATION_PLUGIN_NAME,
            &token,
            None,
            CustomLockSemantic::KeepUnlocked,
            0,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .expect("set dispatch");
    assert!(outcome.is_pending());
    h.pump();
    assert_eq!(h.queue.take().len(), 1);

    // overwriting it as device-lock is a forbidden transition
    let err = h
        .processor
        .set_standalone_device_lock_secret(
            OWNER_PID,
            2,
            "mem-crypt",
            "mem-crypt",
            &token,
            None,
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .unwrap_err();
    assert!(matches!(err, SecretsError::OperationNotSupported(_)));

    // and the reverse direction on a device-lock secret
    let badge = Secret::new(SecretIdentifier::standalone("badge"), b"v2".to_vec());
    h.processor
        .set_standalone_device_lock_secret(
            OWNER_PID,
            3,
            "mem-storage",
            "mem-enc",
            &badge,
            None,
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .unwrap();
    let err = h
        .processor
        .set_standalone_custom_lock_secret(
            OWNER_PID,
            4,
            "mem-storage",
            "mem-enc",
            DEFAULT_AUTHENTICATION_PLUGIN_NAME,
            &badge,
            None,
            CustomLockSemantic::KeepUnlocked,
            0,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .unwrap_err();
    assert!(matches!(err, SecretsError::OperationNotSupported(_)));

    // moving an existing standalone secret between storage plugins is
    // equally unsupported
    let err = h
        .processor
        .set_standalone_device_lock_secret(
            OWNER_PID,
            5,
            "mem-crypt",
            "mem-crypt",
            &badge,
            None,
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
            UserInteractionMode::System,
            "",
        )
        .unwrap_err();
    assert!(matches!(err, SecretsError::OperationNotSupported(_)));
}

#[test]
fn test_find_standalone_secrets_unsupported() {
    let h = harness();
    let mut filter = FilterData::new();
    filter.insert("kind".to_owned(), "token".to_owned());
    let err = h
        .processor
        .find_standalone_secrets(OWNER_PID, 1, &filter, FilterOperator::And)
        .unwrap_err();
    assert!(matches!(err, SecretsError::OperationNotSupported(_)));
}

// =============================================================================
// User-input requests and completion handling
// =============================================================================

#[test]
fn test_user_input_returns_bytes_with_warning_prompt() {
    let mut h = harness();
    h.auth.queue_input(b"kdf-seed-material");

    let params = InteractionParameters {
        prompt_text: "Enter seed".to_owned(),
        ..InteractionParameters::default()
    };
    let outcome = h
        .processor
        .user_input(OWNER_PID, 9, &params)
        .expect("user input dispatch");
    assert!(outcome.is_pending());
    h.pump();

    let replies = h.queue.take();
    assert_eq!(replies.len(), 1);
    match &replies[0] {
        (9, Ok(ReplyPayload::UserInput(bytes))) => {
            assert_eq!(bytes.as_bytes(), b"kdf-seed-material");
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    // no collection or secret named: the prompt warns the user that the
    // data goes back to the application
    let begun = h.auth.begun();
    let prompt = &begun.last().unwrap().parameters.prompt_text;
    assert!(prompt.contains("will be returned to the application"));
    assert!(prompt.contains("Enter seed"));
}

#[test]
fn test_completion_for_unknown_request_is_internal_error() {
    let mut h = harness();
    h.processor.user_input_completed(
        OWNER_PID,
        999,
        &InteractionParameters::default(),
        "",
        Ok(()),
        SecretBytes::from(b"input".as_slice()),
    );
    let replies = h.queue.take();
    assert_eq!(replies.len(), 1);
    assert!(matches!(replies[0].1, Err(SecretsError::Unknown(_))));
}

// =============================================================================
// Crypto-API metadata helpers
// =============================================================================

#[test]
fn test_secret_metadata_helpers() {
    let mut h = harness();
    h.processor
        .create_device_lock_collection(
            OWNER_PID,
            1,
            "vault",
            "mem-crypt",
            "mem-crypt",
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .unwrap();

    let identifier = SecretIdentifier::new("stored-key", "vault");
    h.processor
        .set_collection_secret_metadata(OWNER_PID, 2, &identifier)
        .expect("insert metadata");

    // a second insert reports the conflict so the crypto API knows no
    // cleanup is needed
    let err = h
        .processor
        .set_collection_secret_metadata(OWNER_PID, 3, &identifier)
        .unwrap_err();
    assert!(matches!(err, SecretsError::SecretAlreadyExists { .. }));

    h.processor
        .delete_collection_secret_metadata(OWNER_PID, 4, &identifier)
        .expect("delete metadata");
    let hashed = hashed_secret_name("vault", "stored-key");
    assert!(!h.bookkeeping.secret_exists("vault", &hashed).unwrap());

    // split-plugin collections cannot host crypto-plugin stored keys
    h.processor
        .create_device_lock_collection(
            OWNER_PID,
            5,
            "files",
            "mem-storage",
            "mem-enc",
            DeviceLockSemantic::KeepUnlocked,
            AccessControlMode::OwnerOnly,
        )
        .unwrap();
    let err = h
        .processor
        .set_collection_secret_metadata(OWNER_PID, 6, &SecretIdentifier::new("k", "files"))
        .unwrap_err();
    assert!(matches!(err, SecretsError::InvalidExtensionPlugin(_)));
}
