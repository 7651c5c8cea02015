//! Error types for the secrets request processor.

use thiserror::Error;

/// Errors surfaced by the request processor and its collaborators.
///
/// Plugin implementations and the bookkeeping store share this enum so that
/// failure causes can cross the collaborator seams without translation; the
/// processor relies on that when a cleanup step must preserve the original
/// plugin error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretsError {
    /// The secret name or payload is malformed.
    #[error("invalid secret: {0}")]
    InvalidSecret(String),

    /// The collection name is malformed, reserved, or names no collection.
    #[error("invalid collection: {0}")]
    InvalidCollection(String),

    /// A named extension plugin is not registered (or is of the wrong kind).
    #[error("invalid extension plugin: {0}")]
    InvalidExtensionPlugin(String),

    /// The filter passed to a find operation is unusable.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A collection with the given name already exists.
    #[error("collection already exists: {0}")]
    CollectionAlreadyExists(String),

    /// A secret with the given name already exists in the collection.
    #[error("secret {secret_name} already exists in collection {collection_name}")]
    SecretAlreadyExists {
        /// Collection holding the conflicting secret.
        collection_name: String,
        /// Name of the conflicting secret.
        secret_name: String,
    },

    /// The caller is not permitted to perform the operation.
    #[error("permission denied: {0}")]
    Permissions(String),

    /// The target is locked and cannot be used without authentication.
    #[error("locked: {0}")]
    CollectionIsLocked(String),

    /// The supplied authentication key failed to unlock the target.
    #[error("incorrect authentication key for {0}")]
    IncorrectAuthenticationKey(String),

    /// The operation needs a user-interaction flow the caller prevented.
    #[error("operation requires user interaction via authentication plugin {0}")]
    OperationRequiresUserInteraction(String),

    /// The operation needs an in-process (application) interaction flow.
    #[error("operation requires in-process user interaction via authentication plugin {0}")]
    OperationRequiresApplicationUserInteraction(String),

    /// A plugin failed to decrypt data with the supplied key.
    #[error("plugin decryption error: {0}")]
    PluginDecryption(String),

    /// A plugin operation failed.
    #[error("plugin error: {0}")]
    Plugin(String),

    /// A user-interaction flow failed or was cancelled.
    #[error("interaction error: {0}")]
    Interaction(String),

    /// The bookkeeping database rejected or failed an operation.
    #[error("bookkeeping error: {0}")]
    Bookkeeping(String),

    /// The operation is recognised but not supported.
    #[error("operation not supported: {0}")]
    OperationNotSupported(String),

    /// An internal error that should not occur in normal operation.
    #[error("internal error: {0}")]
    Unknown(String),
}

impl SecretsError {
    /// Creates a plugin error with context.
    pub fn plugin<S: Into<String>>(message: S) -> Self {
        Self::Plugin(message.into())
    }

    /// Creates a bookkeeping error with context.
    pub fn bookkeeping<S: Into<String>>(message: S) -> Self {
        Self::Bookkeeping(message.into())
    }

    /// Creates an interaction error with context.
    pub fn interaction<S: Into<String>>(message: S) -> Self {
        Self::Interaction(message.into())
    }

    /// Creates an internal error with context.
    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::Unknown(message.into())
    }
}
