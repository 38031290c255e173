//! Offline queue backed by `sled`
//!
//! Outbound messages produced while the client is not connected are stored
//! here until a resend cycle confirms delivery. Each entry is keyed by
//! `topic` + envelope id, so storing the same envelope twice keeps a single
//! entry.
//!
//! Configuration options supported:
//! - `ttl_seconds`: optional time-to-live for queued messages (older entries
//!   are removed when the queue is listed)
//!
//! Entries are only removed on confirmed delivery, on eviction (TTL or the
//! failed-cycle policy applied by the resend engine) or on `clear`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tracing::{debug, warn};

use crate::message::Envelope;
use crate::utils::RelayResult;

const QUEUE_TREE: &str = "offline_queue";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub topic: String,
    pub envelope: Envelope,
    pub resent: bool,
    /// Number of resend cycles that exhausted their attempts.
    pub failed_cycles: u32,
    pub stored_at: i64,
}

#[derive(Clone)]
pub struct OfflineQueue {
    db: Db,
    tree: Tree,
    ttl_seconds: Option<i64>,
}

impl OfflineQueue {
    /// Open or create a queue at `path`.
    pub fn open(path: &str, ttl_seconds: Option<i64>) -> RelayResult<Self> {
        Self::from_db(sled::open(path)?, ttl_seconds)
    }

    /// A queue that lives only as long as this handle and its clones.
    pub fn temporary(ttl_seconds: Option<i64>) -> RelayResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?, ttl_seconds)
    }

    fn from_db(db: Db, ttl_seconds: Option<i64>) -> RelayResult<Self> {
        let tree = db.open_tree(QUEUE_TREE)?;
        Ok(Self {
            db,
            tree,
            ttl_seconds,
        })
    }

    fn key(topic: &str, id: &str) -> Vec<u8> {
        format!("{topic}\u{0}{id}").into_bytes()
    }

    pub fn store(&self, topic: &str, envelope: Envelope) -> RelayResult<()> {
        let msg = StoredMessage {
            topic: topic.to_string(),
            envelope,
            resent: false,
            failed_cycles: 0,
            stored_at: Utc::now().timestamp_millis(),
        };
        let serialized = serde_json::to_vec(&msg)?;
        self.tree
            .insert(Self::key(topic, &msg.envelope.id), serialized)?;
        self.db.flush()?;
        debug!(topic, id = %msg.envelope.id, "message queued offline");
        Ok(())
    }

    /// Snapshot of every queued message, oldest `sent_at` first.
    pub fn list_all(&self) -> RelayResult<Vec<StoredMessage>> {
        self.cleanup_expired()?;
        let mut messages: Vec<StoredMessage> = self
            .tree
            .iter()
            .values()
            .filter_map(|res| res.ok())
            .filter_map(|val| match serde_json::from_slice(&val) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!("Skipping unreadable offline entry: {e}");
                    None
                }
            })
            .collect();
        messages.sort_by_key(|m| m.envelope.sent_at);
        Ok(messages)
    }

    pub fn get(&self, topic: &str, id: &str) -> RelayResult<Option<StoredMessage>> {
        match self.tree.get(Self::key(topic, id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Set the `resent` flag. Returns `false` if the entry does not exist.
    pub fn mark_resent(&self, topic: &str, id: &str, resent: bool) -> RelayResult<bool> {
        self.modify(topic, id, |msg| msg.resent = resent)
            .map(|updated| updated.is_some())
    }

    /// Record a resend cycle that exhausted its attempts and return the new
    /// failed-cycle count.
    pub fn record_failure(&self, topic: &str, id: &str) -> RelayResult<Option<u32>> {
        self.modify(topic, id, |msg| {
            msg.resent = false;
            msg.failed_cycles += 1;
        })
        .map(|updated| updated.map(|msg| msg.failed_cycles))
    }

    fn modify(
        &self,
        topic: &str,
        id: &str,
        change: impl FnOnce(&mut StoredMessage),
    ) -> RelayResult<Option<StoredMessage>> {
        let Some(mut msg) = self.get(topic, id)? else {
            return Ok(None);
        };
        change(&mut msg);
        self.tree
            .insert(Self::key(topic, id), serde_json::to_vec(&msg)?)?;
        self.db.flush()?;
        Ok(Some(msg))
    }

    pub fn remove(&self, topic: &str, id: &str) -> RelayResult<bool> {
        let removed = self.tree.remove(Self::key(topic, id))?.is_some();
        self.db.flush()?;
        Ok(removed)
    }

    pub fn clear(&self) -> RelayResult<()> {
        self.tree.clear()?;
        self.db.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Remove entries older than the TTL.
    fn cleanup_expired(&self) -> RelayResult<()> {
        let Some(ttl) = self.ttl_seconds else {
            return Ok(());
        };
        let expiry_time = Utc::now().timestamp_millis() - (ttl * 1000);

        let expired: Vec<_> = self
            .tree
            .iter()
            .filter_map(|res| res.ok())
            .filter_map(|(key, val)| {
                let msg: StoredMessage = serde_json::from_slice(&val).ok()?;
                (msg.stored_at < expiry_time).then_some((key, msg))
            })
            .collect();

        for (key, msg) in expired {
            warn!(
                topic = %msg.topic,
                id = %msg.envelope.id,
                "Evicting offline message older than {ttl}s"
            );
            self.tree.remove(key)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineQueue")
            .field("db", &"sled::Db")
            .field("len", &self.len())
            .finish()
    }
}
