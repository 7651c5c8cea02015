//! Request-processing core of the SecretKit secrets daemon.
//!
//! SecretKit mediates between client applications and a set of pluggable
//! storage, encryption, encrypted-storage, and authentication backends. A
//! bookkeeping database is the single source of truth about which
//! collections and secrets exist and how they are protected; plugins hold
//! the ciphertext. This crate implements the daemon's in-memory state
//! machine:
//!
//! 1. **Validation & authorisation** — every request is checked against
//!    reserved names, plugin registration, and owner-only access control
//!    before anything is touched.
//! 2. **Consistency sequencing** — bookkeeping writes are ordered around
//!    plugin calls so that after any crash or partial failure only a
//!    bookkeeping row (which the daemon controls and can repair) may be
//!    stale, never plugin-held data.
//! 3. **Suspension** — requests that need user input (secret values or
//!    unlock keys) park a typed continuation and resume when the
//!    authentication plugin posts the completion to the mailbox.
//! 4. **Lock-key caching** — unlock keys for split-plugin collections are
//!    cached in memory, zeroised on eviction, and relocked by one-shot
//!    timers for timeout-relock collections.
//!
//! # Architecture
//!
//! - [`processor::RequestProcessor`] — the dispatcher and completion
//!   handler; owns all mutable state.
//! - [`plugin`] — capability traits, the classifying registry, and
//!   in-memory implementations for testing.
//! - [`bookkeeping`] — the typed façade over the metadata store.
//! - [`permissions`] — caller-identity resolution.
//! - [`queue`] — the mailbox events and the reply seam to the remoting
//!   shim.
//!
//! Transport/IPC, the on-disk bookkeeping schema, real plugin
//! implementations, and the interaction UI are collaborators behind the
//! narrow traits defined here.

pub mod bookkeeping;
pub mod config;
pub mod defaults;
mod error;
pub mod interaction;
pub mod permissions;
pub mod plugin;
pub mod processor;
pub mod queue;
mod types;
mod utils;

pub use error::SecretsError;
pub use processor::RequestProcessor;
pub use types::{
    AccessControlMode, CustomLockSemantic, DeviceLockSemantic, FilterData, FilterOperator,
    LockKey, Outcome, ProtectionMetadata, Secret, SecretBytes, SecretIdentifier, UnlockSemantic,
    UserInteractionMode,
};
pub use utils::hashed_secret_name;

/// Result type alias for secrets operations.
pub type SecretsResult<T> = Result<T, SecretsError>;
