//! One-shot relock timers for timeout-relock collections and standalone
//! secrets.
//!
//! A scheduled timer sleeps on a spawned task and posts a relock event to
//! the processor mailbox. Each timer carries an identity token; a fire is
//! acted on only when its token matches the live entry, so a timer that was
//! cancelled and replaced between fire and delivery is a no-op.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::queue::{EventSender, ProcessorEvent};

struct RelockTimer {
    token: u64,
    task: JoinHandle<()>,
}

pub(crate) struct RelockScheduler {
    events: EventSender,
    next_token: u64,
    collections: BTreeMap<String, RelockTimer>,
    standalone: BTreeMap<String, RelockTimer>,
}

impl RelockScheduler {
    pub(crate) fn new(events: EventSender) -> Self {
        Self {
            events,
            next_token: 0,
            collections: BTreeMap::new(),
            standalone: BTreeMap::new(),
        }
    }

    /// Arms a one-shot timer for `collection_name` unless one is already
    /// running.
    pub(crate) fn schedule_collection(&mut self, collection_name: &str, timeout: Duration) {
        if self.collections.contains_key(collection_name) {
            return;
        }
        let token = self.allocate_token();
        let events = self.events.clone();
        let name = collection_name.to_owned();
        let Some(task) = spawn_timer(timeout, move || ProcessorEvent::RelockCollection {
            collection_name: name,
            token,
        }, events) else {
            return;
        };
        self.collections
            .insert(collection_name.to_owned(), RelockTimer { token, task });
        debug!(collection = collection_name, ?timeout, "armed relock timer");
    }

    /// Arms a one-shot timer for a standalone secret unless one is already
    /// running.
    pub(crate) fn schedule_standalone(&mut self, hashed_secret_name: &str, timeout: Duration) {
        if self.standalone.contains_key(hashed_secret_name) {
            return;
        }
        let token = self.allocate_token();
        let events = self.events.clone();
        let name = hashed_secret_name.to_owned();
        let Some(task) = spawn_timer(timeout, move || ProcessorEvent::RelockStandaloneSecret {
            hashed_secret_name: name,
            token,
        }, events) else {
            return;
        };
        self.standalone
            .insert(hashed_secret_name.to_owned(), RelockTimer { token, task });
        debug!(secret = hashed_secret_name, ?timeout, "armed relock timer");
    }

    /// Handles a collection timer fire. Returns `true` when the fire
    /// matches the live timer (which is removed); a stale fire is a no-op.
    pub(crate) fn collection_fired(&mut self, collection_name: &str, token: u64) -> bool {
        Self::fired(&mut self.collections, collection_name, token)
    }

    /// Handles a standalone-secret timer fire; same contract as
    /// [`Self::collection_fired`].
    pub(crate) fn standalone_fired(&mut self, hashed_secret_name: &str, token: u64) -> bool {
        Self::fired(&mut self.standalone, hashed_secret_name, token)
    }

    pub(crate) fn cancel_collection(&mut self, collection_name: &str) {
        if let Some(timer) = self.collections.remove(collection_name) {
            timer.task.abort();
        }
    }

    pub(crate) fn cancel_standalone(&mut self, hashed_secret_name: &str) {
        if let Some(timer) = self.standalone.remove(hashed_secret_name) {
            timer.task.abort();
        }
    }

    fn fired(timers: &mut BTreeMap<String, RelockTimer>, name: &str, token: u64) -> bool {
        match timers.get(name) {
            Some(timer) if timer.token == token => {
                timers.remove(name);
                true
            }
            _ => {
                debug!(name, token, "ignoring stale relock timer fire");
                false
            }
        }
    }

    fn allocate_token(&mut self) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }
}

impl Drop for RelockScheduler {
    fn drop(&mut self) {
        for timer in self.collections.values().chain(self.standalone.values()) {
            timer.task.abort();
        }
    }
}

fn spawn_timer(
    timeout: Duration,
    event: impl FnOnce() -> ProcessorEvent + Send + 'static,
    events: EventSender,
) -> Option<JoinHandle<()>> {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        // Timers need a reactor; without one the cached key simply stays
        // held until the collection is deleted or the daemon exits.
        warn!("no async runtime available; relock timer not armed");
        return None;
    };
    Some(handle.spawn(async move {
        tokio::time::sleep(timeout).await;
        let _ = events.send(event());
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::mailbox;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_and_matches_token() {
        let (events, mut rx) = mailbox();
        let mut scheduler = RelockScheduler::new(events);

        scheduler.schedule_collection("vault", Duration::from_millis(250));
        // a second schedule while one is running is a no-op
        scheduler.schedule_collection("vault", Duration::from_millis(1));

        let event = rx.recv().await.expect("timer event");
        let ProcessorEvent::RelockCollection {
            collection_name,
            token,
        } = event
        else {
            panic!("unexpected event");
        };
        assert_eq!(collection_name, "vault");
        assert!(scheduler.collection_fired(&collection_name, token));

        // the entry is gone, so a replayed fire is stale
        assert!(!scheduler.collection_fired(&collection_name, token));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_fire_is_stale() {
        let (events, mut rx) = mailbox();
        let mut scheduler = RelockScheduler::new(events);

        scheduler.schedule_standalone("hashed", Duration::from_millis(100));
        scheduler.cancel_standalone("hashed");
        scheduler.schedule_standalone("hashed", Duration::from_millis(100));

        let event = rx.recv().await.expect("timer event");
        let ProcessorEvent::RelockStandaloneSecret {
            hashed_secret_name,
            token,
        } = event
        else {
            panic!("unexpected event");
        };
        // only the replacement timer's token is live
        assert!(scheduler.standalone_fired(&hashed_secret_name, token));
    }
}
