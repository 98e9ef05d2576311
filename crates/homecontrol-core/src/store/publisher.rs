// ── Publisher ──
//
// Event key (device uid or gateway id) -> subscriber -> callback. One
// callback per (event, subscriber); registering again replaces it.
// Callbacks run on the dispatcher task after the store was updated.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::model::Change;

/// What subscribers receive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    /// Uid of the property (or device, or gateway) that changed.
    pub uid: String,
    pub change: Change,
}

pub type Callback = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Default)]
pub struct Publisher {
    events: DashMap<String, HashMap<String, Callback>>,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `event` known so subscribers can register for it.
    pub fn add_event(&self, event: &str) {
        self.events.entry(event.to_owned()).or_default();
    }

    /// Forget `event` and every callback registered for it.
    pub fn delete_event(&self, event: &str) {
        self.events.remove(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.iter().map(|e| e.key().clone()).collect()
    }

    pub fn has_event(&self, event: &str) -> bool {
        self.events.contains_key(event)
    }

    /// Register `callback` for `event`. Unknown events are created.
    pub fn register(
        &self,
        event: &str,
        subscriber: impl Into<String>,
        callback: impl Fn(&Message) + Send + Sync + 'static,
    ) {
        self.events
            .entry(event.to_owned())
            .or_default()
            .insert(subscriber.into(), Arc::new(callback));
    }

    /// Returns `true` when a callback was removed.
    pub fn unregister(&self, event: &str, subscriber: &str) -> bool {
        self.events
            .get_mut(event)
            .is_some_and(|mut subs| subs.remove(subscriber).is_some())
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.events.get(event).map_or(0, |subs| subs.len())
    }

    /// Deliver `message` to every subscriber of `event`.
    pub fn dispatch(&self, event: &str, message: &Message) {
        // Callbacks may register or unregister; never hold the shard lock
        // while calling them.
        let callbacks: Vec<Callback> = match self.events.get(event) {
            Some(subs) => subs.values().cloned().collect(),
            None => return,
        };
        for callback in callbacks {
            callback(message);
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("events", &self.events.len())
            .finish()
    }
}
