//! Per-topic subscriptions.
//!
//! Every subscribed user topic owns one tokio task that drains the transport
//! subscription, decodes envelopes and hands payloads to the listener. The
//! task handles are kept in `SubscriptionTasks` so `off()` and `close()` can
//! cancel them. Each handle is tagged with a generation id so a task that
//! ends on its own only removes its own entry, never a newer one for the
//! same topic.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Inner;
use crate::message::codec;
use crate::transport::{MessageStream, RawMessage};
use crate::utils::{RelayError, RelayResult};

#[derive(Default)]
pub(crate) struct SubscriptionTasks {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<String, (u64, JoinHandle<()>)>>,
}

impl SubscriptionTasks {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, (u64, JoinHandle<()>)>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the task built by `make` for `topic`, replacing (and aborting)
    /// any task already registered for it.
    pub(crate) fn spawn<F, Fut>(&self, topic: &str, make: F)
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        // Held across the spawn so the task cannot finish before it is registered.
        let mut tasks = self.lock();
        let handle = tokio::spawn(make(id));
        if let Some((_, previous)) = tasks.insert(topic.to_string(), (id, handle)) {
            previous.abort();
        }
    }

    pub(crate) fn cancel(&self, topic: &str) -> bool {
        match self.lock().remove(topic) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every task and return the topics they served.
    pub(crate) fn cancel_all(&self) -> Vec<String> {
        self.lock()
            .drain()
            .map(|(topic, (_, handle))| {
                handle.abort();
                topic
            })
            .collect()
    }

    /// Called by a task that ends by itself.
    pub(crate) fn finish(&self, topic: &str, id: u64) {
        let mut tasks = self.lock();
        if tasks.get(topic).is_some_and(|(current, _)| *current == id) {
            tasks.remove(topic);
        }
    }

    pub(crate) fn is_running(&self, topic: &str) -> bool {
        self.lock()
            .get(topic)
            .is_some_and(|(_, handle)| !handle.is_finished())
    }
}

impl Inner {
    /// Ensure the consumer for `topic`, open the subscription and start its
    /// dispatch task.
    pub(crate) async fn subscribe_topic(self: &Arc<Self>, topic: &str) -> RelayResult<()> {
        let stream = self
            .open_subscription(topic)
            .await
            .map_err(|e| RelayError::SubscriptionFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        let weak = Arc::downgrade(self);
        let owned = topic.to_string();
        self.subscriptions
            .spawn(topic, move |id| run_dispatch(weak, owned, id, stream));
        info!(topic, "subscribed");
        Ok(())
    }

    async fn open_subscription(&self, topic: &str) -> RelayResult<MessageStream> {
        let namespace = self.namespace()?;
        let subject = namespace.subject(topic);
        self.consumers
            .create_or_update(&namespace.stream_name(), topic, &subject)
            .await?;
        Ok(self.transport.subscribe(&subject).await?)
    }

    /// Subscribe every pending topic plus any listened topic that lost its
    /// task. Failures put the topic back into the pending set.
    pub(crate) async fn subscribe_pending(self: &Arc<Self>) {
        let mut topics: HashSet<String> = std::mem::take(&mut *self.pending());
        topics.extend(
            self.listeners
                .user_topics()
                .into_iter()
                .filter(|topic| !self.subscriptions.is_running(topic)),
        );

        for topic in topics {
            if !self.listeners.has(&topic) {
                continue;
            }
            if let Err(e) = self.subscribe_topic(&topic).await {
                warn!(topic = %topic, "Deferred subscription failed: {e}");
                self.pending().insert(topic);
            }
        }
    }

    async fn deliver(self: &Arc<Self>, topic: &str, message: RawMessage) {
        match codec::decode(&message.payload) {
            Ok(envelope) if envelope.client_id == self.client_id => {
                debug!(topic, id = %envelope.id, "skipping own message");
            }
            Ok(envelope) => match self.listeners.get(topic) {
                Some(listener) => {
                    listener(envelope.payload);
                    if let Some(batch) = self.latency.record(envelope.sent_at) {
                        let inner = self.clone();
                        tokio::spawn(async move { inner.flush_latency(batch).await });
                    }
                }
                None => debug!(topic, "no listener, message dropped"),
            },
            Err(e) => warn!(topic, "Dropping undecodable message: {e}"),
        }

        if message.reply.is_some() {
            if let Err(e) = self.transport.ack(&message).await {
                warn!(topic, "Ack failed: {e}");
            }
        }
    }

    /// Remove everything a broken subscription left behind.
    async fn abandon_topic(&self, topic: &str, id: u64) {
        self.listeners.remove(topic);
        self.pending().remove(topic);
        self.subscriptions.finish(topic, id);
        if let Ok(namespace) = self.namespace() {
            if let Err(e) = self.consumers.delete(&namespace.stream_name(), topic).await {
                warn!(topic, "Failed to delete consumer: {e}");
            }
        }
    }
}

async fn run_dispatch(inner: Weak<Inner>, topic: String, id: u64, mut stream: MessageStream) {
    while let Some(next) = stream.next().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match next {
            Ok(message) => inner.deliver(&topic, message).await,
            Err(e) => {
                error!(topic = %topic, "Subscription failed: {e}");
                inner.abandon_topic(&topic, id).await;
                return;
            }
        }
    }

    if let Some(inner) = inner.upgrade() {
        inner.subscriptions.finish(&topic, id);
        if inner.listeners.has(&topic) {
            debug!(topic = %topic, "subscription ended, topic pending");
            inner.pending().insert(topic);
        }
    }
}
