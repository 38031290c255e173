//! Consumer lifecycle
//!
//! One durable consumer exists per subscribed topic. The manager keeps the
//! set of topics it created consumers for and treats that set as the source
//! of truth: `delete` only talks to the broker for tracked topics, which
//! makes it safe to call from `off`, teardown and error paths alike.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::transport::{
    AckPolicy, ConsumerConfig, ConsumerInfo, DeliverPolicy, ReplayPolicy, Transport,
    TransportError,
};
use crate::utils::RelayResult;

pub struct ConsumerManager {
    transport: Arc<dyn Transport>,
    max_deliver: i64,
    active: Mutex<HashSet<String>>,
}

/// Consumer names cannot contain subject separators.
fn sanitize(topic: &str) -> String {
    topic.replace('.', "_")
}

pub fn consumer_name(topic: &str) -> String {
    format!("{}_consumer", sanitize(topic))
}

/// Configuration for a one-off consumer replaying `subject` from `start`.
pub fn history_consumer(topic: &str, subject: &str, start: DateTime<Utc>) -> ConsumerConfig {
    ConsumerConfig {
        name: format!("{}_history_{}", sanitize(topic), Uuid::new_v4().simple()),
        deliver_policy: DeliverPolicy::ByStartTime(start),
        ack_policy: AckPolicy::Explicit,
        filter_subject: subject.to_string(),
        max_deliver: 1,
        replay_policy: ReplayPolicy::Instant,
    }
}

impl ConsumerManager {
    pub fn new(transport: Arc<dyn Transport>, max_deliver: i64) -> Self {
        Self {
            transport,
            max_deliver,
            active: Mutex::new(HashSet::new()),
        }
    }

    fn active(&self) -> MutexGuard<'_, HashSet<String>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config_for(&self, topic: &str, subject: &str) -> ConsumerConfig {
        ConsumerConfig {
            name: consumer_name(topic),
            deliver_policy: DeliverPolicy::All,
            ack_policy: AckPolicy::Explicit,
            filter_subject: subject.to_string(),
            max_deliver: self.max_deliver,
            replay_policy: ReplayPolicy::Instant,
        }
    }

    /// Create the topic's consumer, or update it if it already exists.
    pub async fn create_or_update(
        &self,
        stream: &str,
        topic: &str,
        subject: &str,
    ) -> RelayResult<ConsumerInfo> {
        let info = self
            .transport
            .create_or_update_consumer(stream, self.config_for(topic, subject))
            .await?;
        let created = self.active().insert(topic.to_string());
        debug!(topic, consumer = %info.name, created, "consumer ready");
        Ok(info)
    }

    /// Delete the topic's consumer if this manager created it.
    ///
    /// Returns `Ok(false)` without touching the broker for untracked topics.
    /// A consumer already gone on the broker side counts as deleted.
    pub async fn delete(&self, stream: &str, topic: &str) -> RelayResult<bool> {
        if !self.is_active(topic) {
            return Ok(false);
        }

        let name = consumer_name(topic);
        match self.transport.delete_consumer(stream, &name).await {
            Ok(()) => info!(topic, consumer = %name, "consumer deleted"),
            Err(TransportError::NotFound(_)) => {
                debug!(topic, consumer = %name, "consumer already gone")
            }
            Err(e) => return Err(e.into()),
        }
        self.active().remove(topic);
        Ok(true)
    }

    /// Delete every tracked consumer. Failures are logged and the set is
    /// cleared regardless.
    pub async fn cleanup_all(&self, stream: &str) {
        for topic in self.active_topics() {
            if let Err(e) = self.delete(stream, &topic).await {
                warn!(topic = %topic, "Failed to delete consumer during cleanup: {e}");
            }
        }
        self.forget_all();
    }

    pub fn forget_all(&self) {
        self.active().clear();
    }

    pub fn is_active(&self, topic: &str) -> bool {
        self.active().contains(topic)
    }

    pub fn active_topics(&self) -> Vec<String> {
        self.active().iter().cloned().collect()
    }
}

impl std::fmt::Debug for ConsumerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerManager")
            .field("max_deliver", &self.max_deliver)
            .field("active", &self.active_topics())
            .finish()
    }
}
