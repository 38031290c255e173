//! Listener registry
//!
//! Maps a logical topic name (not the wire subject) to exactly one listener.
//! The first registration wins until the topic is explicitly removed; `add`
//! never replaces an existing entry.
//!
//! The registry holds strong references. Callers release a listener with
//! `RelayClient::off`, or all of them at once on `close`.
//!
//! Concurrency note: writes take the lock exclusively, reads share it.
//! Listeners are cloned out before being invoked so no lock is held while
//! application code runs.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::message::Payload;
use crate::topic::SystemTopic;

pub type Listener = Arc<dyn Fn(Payload) + Send + Sync>;

#[derive(Default)]
pub struct ListenerRegistry {
    entries: RwLock<HashMap<String, Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `topic`. Returns `false`, leaving the existing
    /// entry untouched, if the topic already has a listener.
    pub fn add(&self, topic: &str, listener: Listener) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(topic) {
            return false;
        }
        entries.insert(topic.to_string(), listener);
        true
    }

    pub fn remove(&self, topic: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(topic)
            .is_some()
    }

    pub fn get(&self, topic: &str) -> Option<Listener> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
    }

    pub fn has(&self, topic: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(topic)
    }

    pub fn remove_all(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Registered topics that are not reserved system topics.
    pub fn user_topics(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|topic| !SystemTopic::is_reserved(topic))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("topics", &self.len())
            .finish()
    }
}
