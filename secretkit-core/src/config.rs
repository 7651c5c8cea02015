//! Processor configuration.

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretBox};

use crate::types::LockKey;

/// Configuration recognised by the request processor.
///
/// The two process-wide keys are provisioned at daemon startup: the
/// device-lock key by the device-unlock flow, the system encryption key by
/// first-boot key generation. Both are held behind zeroising wrappers and
/// never appear in `Debug` output.
#[derive(Debug)]
pub struct ProcessorConfig {
    autotest_mode: bool,
    plugin_dir: PathBuf,
    device_lock_key: SecretBox<Vec<u8>>,
    system_encryption_key: SecretBox<Vec<u8>>,
}

impl ProcessorConfig {
    /// Creates a configuration.
    #[must_use]
    pub fn new(
        autotest_mode: bool,
        plugin_dir: impl Into<PathBuf>,
        device_lock_key: Vec<u8>,
        system_encryption_key: Vec<u8>,
    ) -> Self {
        Self {
            autotest_mode,
            plugin_dir: plugin_dir.into(),
            device_lock_key: SecretBox::new(Box::new(device_lock_key)),
            system_encryption_key: SecretBox::new(Box::new(system_encryption_key)),
        }
    }

    /// Whether the daemon runs against `.test` plugin variants.
    #[must_use]
    pub const fn autotest_mode(&self) -> bool {
        self.autotest_mode
    }

    /// Directory plugins are loaded from at startup.
    #[must_use]
    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Process-wide key representing successful device-unlock
    /// authentication; used verbatim as the unlock key for device-lock
    /// collections and standalone device-lock secrets.
    #[must_use]
    pub fn device_lock_key(&self) -> LockKey {
        LockKey::new(self.device_lock_key.expose_secret().clone())
    }

    /// Process-wide key reserved for bookkeeping-database encryption.
    ///
    /// Consumed by the database collaborator, not the processor itself.
    #[must_use]
    pub fn system_encryption_key(&self) -> LockKey {
        LockKey::new(self.system_encryption_key.expose_secret().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_redacted_in_debug() {
        let config = ProcessorConfig::new(
            false,
            "/var/lib/secretkit/plugins",
            b"device-key".to_vec(),
            b"system-key".to_vec(),
        );
        let debug = format!("{config:?}");
        assert!(!debug.contains("device-key"));
        assert!(!debug.contains("system-key"));
        assert_eq!(config.device_lock_key().as_bytes(), b"device-key");
        assert_eq!(config.system_encryption_key().as_bytes(), b"system-key");
    }
}
