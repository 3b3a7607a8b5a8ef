//! Fan-out of raw wire events to registered listeners.
//!
//! Registrations are keyed by generated tokens rather than callback
//! identity, and an optional match substring filters what each listener
//! receives.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

/// Callback invoked with the raw wire text of a matching event.
pub type EventCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Opaque registration token returned by `register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

struct Subscriber {
    filter: Option<String>,
    callback: EventCallback,
}

/// Registry of event listeners with optional substring filters.
pub(crate) struct SubscriberRegistry {
    entries: Mutex<HashMap<Uuid, Subscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Add a listener. A listener without a filter receives every event;
    /// with a filter, only events whose raw text contains the substring.
    pub async fn register(
        &self,
        callback: EventCallback,
        filter: Option<String>,
    ) -> SubscriberId {
        let id = Uuid::new_v4();
        log::debug!("Registered subscriber {id} with match {filter:?}");
        self.entries
            .lock()
            .await
            .insert(id, Subscriber { filter, callback });
        SubscriberId(id)
    }

    /// Remove a listener, reporting whether it was registered.
    pub async fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.entries.lock().await.remove(&id.0);
        if let Some(sub) = &removed {
            log::debug!("Unregistered subscriber {} with match {:?}", id.0, sub.filter);
        }
        removed.is_some()
    }

    /// Deliver an event to every matching listener. Callbacks are cloned
    /// out of the lock first so a slow listener cannot block registration.
    pub async fn notify(&self, payload: &str) {
        let matching: Vec<EventCallback> = {
            let entries = self.entries.lock().await;
            entries
                .values()
                .filter(|sub| match &sub.filter {
                    Some(filter) => payload.contains(filter.as_str()),
                    None => true,
                })
                .map(|sub| Arc::clone(&sub.callback))
                .collect()
        };
        for callback in matching {
            callback(payload);
        }
    }
}
