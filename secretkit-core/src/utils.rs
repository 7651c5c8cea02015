//! Small helpers shared across the processor.

use sha2::{Digest, Sha256};

const HASHED_NAME_DOMAIN: &[u8] = b"secretkit:hashed-secret-name";

/// Deterministic plugin-side identifier for a secret.
///
/// Derived from the collection and secret names so that plaintext secret
/// names never appear in bookkeeping rows or plugin storage keys. The
/// inputs are length-prefixed so distinct name pairs cannot collide.
#[must_use]
pub fn hashed_secret_name(collection_name: &str, secret_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(HASHED_NAME_DOMAIN);
    hasher.update((collection_name.len() as u64).to_le_bytes());
    hasher.update(collection_name.as_bytes());
    hasher.update((secret_name.len() as u64).to_le_bytes());
    hasher.update(secret_name.as_bytes());
    hex::encode(hasher.finalize())
}
