//! The processor mailbox and the reply seam to the remoting layer.
//!
//! All asynchrony visible to the processor arrives as [`ProcessorEvent`]s on
//! a single mailbox: user-input completions, authentication completions, and
//! relock-timer fires. Plugins and timers post events; they never call back
//! into the dispatcher from another thread.

use std::sync::Mutex;

use crate::interaction::InteractionParameters;
use crate::types::{Secret, SecretBytes, SecretIdentifier};
use crate::SecretsResult;

/// Payload of a final reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPayload {
    /// No payload beyond success itself.
    None,
    /// A secret read back from storage.
    Secret(Secret),
    /// Identifiers matched by a find operation.
    Identifiers(Vec<SecretIdentifier>),
    /// Raw user input returned to the caller.
    UserInput(SecretBytes),
}

/// Seam to the remoting shim: receives the final reply for every request
/// that was suspended on a user-interaction flow.
///
/// Requests the dispatcher completes synchronously return their result
/// directly and never pass through here.
pub trait RequestQueue: Send + Sync {
    /// Delivers the final reply for `request_id`.
    fn request_finished(&self, request_id: u64, reply: SecretsResult<ReplyPayload>);
}

/// Events posted to the processor's mailbox.
#[derive(Debug)]
pub enum ProcessorEvent {
    /// A user-input interaction flow finished.
    UserInputCompleted {
        /// Pid the flow was performed for.
        caller_pid: u32,
        /// Request the flow belongs to.
        request_id: u64,
        /// Parameters the flow was begun with.
        parameters: InteractionParameters,
        /// Interaction service address the flow used.
        interaction_service_address: String,
        /// Whether the flow succeeded.
        result: SecretsResult<()>,
        /// Bytes collected from the user; empty on failure.
        input: SecretBytes,
    },
    /// An authentication flow finished.
    AuthenticationCompleted {
        /// Pid the flow was performed for.
        caller_pid: u32,
        /// Request the flow belongs to.
        request_id: u64,
        /// Whether the flow succeeded.
        result: SecretsResult<()>,
    },
    /// A collection relock timer fired.
    RelockCollection {
        /// Collection whose timer fired.
        collection_name: String,
        /// Identity token of the timer that fired.
        token: u64,
    },
    /// A standalone-secret relock timer fired.
    RelockStandaloneSecret {
        /// Hashed name of the secret whose timer fired.
        hashed_secret_name: String,
        /// Identity token of the timer that fired.
        token: u64,
    },
}

/// Sending half of the processor mailbox; cloned into authentication
/// plugins and relock timers.
pub type EventSender = tokio::sync::mpsc::UnboundedSender<ProcessorEvent>;

/// Receiving half of the processor mailbox; drained by the daemon's event
/// loop.
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<ProcessorEvent>;

/// Creates the processor mailbox.
#[must_use]
pub fn mailbox() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

// =============================================================================
// Memory request queue
// =============================================================================

/// In-memory request queue collecting replies, for tests.
#[derive(Default)]
pub struct MemoryRequestQueue {
    replies: Mutex<Vec<(u64, SecretsResult<ReplyPayload>)>>,
}

impl MemoryRequestQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns all collected replies.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn take(&self) -> Vec<(u64, SecretsResult<ReplyPayload>)> {
        std::mem::take(&mut *self.replies.lock().unwrap())
    }

    /// Number of replies collected so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    /// Returns `true` when no replies have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RequestQueue for MemoryRequestQueue {
    fn request_finished(&self, request_id: u64, reply: SecretsResult<ReplyPayload>) {
        self.replies.lock().unwrap().push((request_id, reply));
    }
}
