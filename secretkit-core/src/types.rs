//! Core type definitions for the secrets request processor.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Filter-data mapping attached to a secret (field name → field value).
///
/// Filter data is stored plaintext alongside the ciphertext so that secrets
/// can be located without decrypting them.
pub type FilterData = BTreeMap<String, String>;

// =============================================================================
// Sensitive byte buffers
// =============================================================================

/// An unlock key for a collection or standalone secret.
///
/// Key bytes are zeroised on drop. Copies are explicit (`Clone`), equality
/// is constant-time, and the `Debug` representation never contains key
/// material.
#[derive(Clone, Default)]
pub struct LockKey(Zeroizing<Vec<u8>>);

impl LockKey {
    /// Wraps raw key bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// The empty key; applying it to an encrypted-storage collection relocks
    /// the collection.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns `true` when the key holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for LockKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice().ct_eq(other.0.as_slice()).into()
    }
}

impl Eq for LockKey {}

impl fmt::Debug for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockKey(<{} bytes>)", self.0.len())
    }
}

impl From<&[u8]> for LockKey {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

/// A secret payload.
///
/// Behaves like [`LockKey`]: zeroised on drop, constant-time equality,
/// redacted `Debug`.
#[derive(Clone, Default)]
pub struct SecretBytes(Zeroizing<Vec<u8>>);

impl SecretBytes {
    /// Wraps raw payload bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Returns the raw payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns `true` when the payload holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for SecretBytes {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice().ct_eq(other.0.as_slice()).into()
    }
}

impl Eq for SecretBytes {}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes(<{} bytes>)", self.0.len())
    }
}

impl From<Vec<u8>> for SecretBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for SecretBytes {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

// =============================================================================
// Identifiers and secrets
// =============================================================================

/// Identifies a secret, optionally within a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretIdentifier {
    /// Secret name chosen by the owning application.
    pub name: String,
    /// Collection the secret belongs to; empty for standalone secrets.
    pub collection_name: String,
}

impl SecretIdentifier {
    /// Identifies a secret inside a collection.
    #[must_use]
    pub fn new(name: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection_name: collection_name.into(),
        }
    }

    /// Identifies a standalone secret (no collection).
    #[must_use]
    pub fn standalone(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection_name: String::new(),
        }
    }
}

impl fmt::Display for SecretIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.collection_name.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.collection_name, self.name)
        }
    }
}

/// A secret: identifier, payload, and plaintext filter data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Secret {
    /// Identifies the secret.
    pub identifier: SecretIdentifier,
    /// The payload bytes.
    pub data: SecretBytes,
    /// Plaintext filter data used by find operations.
    pub filter_data: FilterData,
}

impl Secret {
    /// Creates a secret with empty filter data.
    #[must_use]
    pub fn new(identifier: SecretIdentifier, data: impl Into<SecretBytes>) -> Self {
        Self {
            identifier,
            data: data.into(),
            filter_data: FilterData::new(),
        }
    }

    /// Sets the filter data.
    #[must_use]
    pub fn with_filter_data(mut self, filter_data: FilterData) -> Self {
        self.filter_data = filter_data;
        self
    }
}

// =============================================================================
// Protection policy enums
// =============================================================================

/// Unlock policy for device-lock protected data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceLockSemantic {
    /// Stays unlocked for the daemon's lifetime once the device unlocks.
    KeepUnlocked,
    /// Relocks whenever the device relocks.
    Relock,
}

/// Unlock policy for custom-lock protected data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomLockSemantic {
    /// Stays unlocked until the daemon shuts down or the user logs out.
    KeepUnlocked,
    /// Relocks whenever the device relocks.
    DeviceLockRelock,
    /// Relocks after a per-collection timeout of inactivity.
    TimeoutRelock,
}

/// Unlock policy recorded in a bookkeeping row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnlockSemantic {
    /// Protected by the process-wide device-lock key.
    DeviceLock(DeviceLockSemantic),
    /// Protected by a user-supplied key.
    CustomLock(CustomLockSemantic),
}

impl UnlockSemantic {
    /// Returns `true` for the custom-lock timeout-relock policy that drives
    /// the relock scheduler.
    #[must_use]
    pub const fn is_timeout_relock(self) -> bool {
        matches!(self, Self::CustomLock(CustomLockSemantic::TimeoutRelock))
    }
}

/// Who may operate on a collection or secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessControlMode {
    /// Only the owning application.
    OwnerOnly,
    /// Mediated by the system access-control service.
    System,
}

/// Whether and how a user-interaction flow may be driven for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserInteractionMode {
    /// Fail rather than interact with the user.
    Prevent,
    /// Use the system interaction service.
    System,
    /// Use the calling application's in-process interaction service.
    Application,
}

/// How multiple filter fields combine in a find operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    /// A secret matches when any filter field matches.
    Or,
    /// A secret matches only when every filter field matches.
    And,
}

// =============================================================================
// Bookkeeping metadata
// =============================================================================

/// Bookkeeping metadata shared by collection rows and secret rows:
/// ownership, plugin bindings, and the unlock policy protecting the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionMetadata {
    /// Application id of the owner.
    pub application_id: String,
    /// Whether the device-lock key protects the data.
    pub uses_device_lock: bool,
    /// Storage plugin holding the payload.
    pub storage_plugin: String,
    /// Encryption plugin protecting the payload. Equal to
    /// [`Self::storage_plugin`] for encrypted-storage configurations.
    pub encryption_plugin: String,
    /// Authentication plugin driving unlock-key interactions.
    pub authentication_plugin: String,
    /// Unlock policy.
    pub unlock_semantic: UnlockSemantic,
    /// Relock timeout, meaningful only for the timeout-relock policy.
    pub custom_lock_timeout_ms: u64,
    /// Access-control mode.
    pub access_control: AccessControlMode,
}

impl ProtectionMetadata {
    /// Returns `true` when storage and encryption are provided by the same
    /// (encrypted-storage) plugin.
    #[must_use]
    pub fn uses_encrypted_storage(&self) -> bool {
        self.storage_plugin == self.encryption_plugin
    }
}

// =============================================================================
// Dispatch outcome
// =============================================================================

/// Result of dispatching a request.
///
/// `Pending` marks a request suspended on a user-interaction flow; the final
/// reply is delivered later through the request queue when
/// `user_input_completed` fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The operation ran to completion.
    Complete(T),
    /// The request was parked awaiting user input.
    Pending,
}

impl<T> Outcome<T> {
    /// Returns `true` when the request was parked.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Unwraps a completed value, if any.
    #[must_use]
    pub fn into_complete(self) -> Option<T> {
        match self {
            Self::Complete(value) => Some(value),
            Self::Pending => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key_equality_and_redaction() {
        let a = LockKey::new(b"key-material".to_vec());
        let b = LockKey::new(b"key-material".to_vec());
        let c = LockKey::new(b"other".to_vec());
        assert_eq!(a, b);
        assert_ne!(a, c);

        let debug = format!("{a:?}");
        assert!(!debug.contains("key-material"));
        assert!(debug.contains("12 bytes"));
    }

    #[test]
    fn test_secret_bytes_redaction() {
        let secret = SecretBytes::from(b"hunter2".as_slice());
        assert!(!format!("{secret:?}").contains("hunter2"));
        assert_eq!(secret.as_bytes(), b"hunter2");
    }

    #[test]
    fn test_identifier_display() {
        assert_eq!(SecretIdentifier::new("pw", "vault").to_string(), "vault/pw");
        assert_eq!(SecretIdentifier::standalone("token").to_string(), "token");
    }

    #[test]
    fn test_timeout_relock_detection() {
        assert!(UnlockSemantic::CustomLock(CustomLockSemantic::TimeoutRelock).is_timeout_relock());
        assert!(!UnlockSemantic::CustomLock(CustomLockSemantic::KeepUnlocked).is_timeout_relock());
        assert!(!UnlockSemantic::DeviceLock(DeviceLockSemantic::Relock).is_timeout_relock());
    }

    #[test]
    fn test_outcome_accessors() {
        assert!(Outcome::<()>::Pending.is_pending());
        assert_eq!(Outcome::Complete(7).into_complete(), Some(7));
        assert_eq!(Outcome::<i32>::Pending.into_complete(), None);
    }
}
