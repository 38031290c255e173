//! Reliable client
//!
//! `RelayClient` presents a continuously connected topic bus on top of a
//! `Transport` that disconnects, reconnects and reorders:
//! - `connect`/`close` drive the connection state machine (`connection`)
//! - `on`/`off` manage listeners, consumers and one dispatch task per topic
//!   (`dispatch`)
//! - `publish` sends directly while connected and queues offline otherwise;
//!   the queue is replayed after reconnecting (`resend`)
//! - `history` replays a time window through an ephemeral consumer
//!   (`history`)
//!
//! Concurrency and usage notes:
//! - All shared state lives in one `Inner` behind an `Arc`. Each mutable
//!   resource (listener map, pending topic set, task map, consumer set,
//!   connection flags) has its own guard; none of the std locks is held
//!   across an `.await`.
//! - `connect` and `close` are serialized with an async lifecycle lock.
//! - Background tasks (event loop, dispatch loops, resend, latency flush)
//!   hold `Weak` references and stop once the client is dropped.

mod connection;
mod dispatch;
mod history;
pub mod namespace;
mod resend;
pub mod state;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::consumer::ConsumerManager;
use crate::listener::ListenerRegistry;
use crate::message::{Envelope, Payload, codec};
use crate::persistence::OfflineQueue;
use crate::telemetry::LatencyAggregator;
use crate::topic::{SystemTopic, validate};
use crate::transport::Transport;
use crate::utils::{RelayError, RelayResult};

use dispatch::SubscriptionTasks;
use namespace::Namespace;
pub use state::ConnectionState;
use state::ConnectionFlags;

#[derive(Default)]
struct BackgroundTasks {
    events: Option<JoinHandle<()>>,
    resend: Option<JoinHandle<()>>,
    latency: Option<JoinHandle<()>>,
}

impl BackgroundTasks {
    fn abort_all(&mut self) {
        for handle in [self.events.take(), self.resend.take(), self.latency.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

pub(crate) struct Inner {
    settings: Settings,
    client_id: String,
    transport: Arc<dyn Transport>,
    state: watch::Sender<ConnectionState>,
    flags: ConnectionFlags,
    namespace: RwLock<Option<Namespace>>,
    listeners: ListenerRegistry,
    pending_topics: Mutex<HashSet<String>>,
    subscriptions: SubscriptionTasks,
    consumers: ConsumerManager,
    queue: OfflineQueue,
    latency: LatencyAggregator,
    lifecycle: tokio::sync::Mutex<()>,
    background: Mutex<BackgroundTasks>,
}

impl Inner {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "connection state changed");
        }
    }

    /// The resolved namespace. Absent until `connect` succeeds.
    fn namespace(&self) -> RelayResult<Namespace> {
        self.namespace
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(RelayError::NotConnected)
    }

    fn set_namespace(&self, namespace: Option<Namespace>) {
        *self.namespace.write().unwrap_or_else(PoisonError::into_inner) = namespace;
    }

    fn pending(&self) -> MutexGuard<'_, HashSet<String>> {
        self.pending_topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn background(&self) -> MutexGuard<'_, BackgroundTasks> {
        self.background.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Invoke the listener registered on a system topic, if any.
    fn emit(&self, topic: SystemTopic, payload: Payload) {
        if let Some(listener) = self.listeners.get(topic.as_str()) {
            listener(payload);
        }
    }
}

/// Handle to a reliable topic bus session. Cloning is cheap and all clones
/// share the same connection.
#[derive(Clone)]
pub struct RelayClient {
    inner: Arc<Inner>,
}

impl RelayClient {
    /// Build a client whose offline queue is opened from `settings.storage`.
    pub fn new(settings: Settings, transport: Arc<dyn Transport>) -> RelayResult<Self> {
        let ttl = settings.storage.ttl_secs;
        let queue = match settings.storage.path.as_deref() {
            Some(path) => OfflineQueue::open(path, ttl)?,
            None => OfflineQueue::temporary(ttl)?,
        };
        Ok(Self::with_queue(settings, transport, queue))
    }

    pub fn with_queue(
        settings: Settings,
        transport: Arc<dyn Transport>,
        queue: OfflineQueue,
    ) -> Self {
        let client_id = settings
            .client
            .client_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        let inner = Inner {
            client_id,
            consumers: ConsumerManager::new(transport.clone(), settings.consumer.max_deliver),
            latency: LatencyAggregator::new(settings.telemetry.batch_size),
            transport,
            state,
            flags: ConnectionFlags::default(),
            namespace: RwLock::new(None),
            listeners: ListenerRegistry::new(),
            pending_topics: Mutex::new(HashSet::new()),
            subscriptions: SubscriptionTasks::default(),
            queue,
            lifecycle: tokio::sync::Mutex::new(()),
            background: Mutex::new(BackgroundTasks::default()),
            settings,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Receiver that observes every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn offline_queue(&self) -> &OfflineQueue {
        &self.inner.queue
    }

    pub fn has_listener(&self, topic: &str) -> bool {
        self.inner.listeners.has(topic)
    }

    /// Whether a dispatch task is currently attached to `topic`.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.inner.subscriptions.is_running(topic)
    }

    /// Whether `topic` waits for the next connection to be subscribed.
    pub fn is_pending(&self, topic: &str) -> bool {
        self.inner.pending().contains(topic)
    }

    /// Publish `payload` on `topic`.
    ///
    /// Returns `Ok(true)` once the broker acknowledged the message and
    /// `Ok(false)` when it was stored in the offline queue instead, which
    /// happens whenever the client is not connected or the publish fails.
    pub async fn publish(&self, topic: &str, payload: impl Into<Payload>) -> RelayResult<bool> {
        validate(topic, true)?;
        let inner = &self.inner;
        let envelope = Envelope::new(&inner.client_id, topic, payload.into());
        let bytes = codec::encode(&envelope)?;

        if inner.state() == ConnectionState::Connected {
            if let Ok(namespace) = inner.namespace() {
                match inner
                    .transport
                    .publish(&namespace.subject(topic), bytes)
                    .await
                {
                    Ok(ack) => {
                        debug!(topic, id = %envelope.id, sequence = ack.sequence, "published");
                        return Ok(true);
                    }
                    Err(e) => warn!(topic, "Publish failed, queueing offline: {e}"),
                }
            }
        }

        inner.queue.store(topic, envelope)?;
        // a publish that failed on a live connection is retried right away
        if inner.state() == ConnectionState::Connected {
            inner.spawn_resend();
        }
        Ok(false)
    }

    /// Register `listener` for `topic`.
    ///
    /// Returns `Ok(false)` if the topic already has a listener; the existing
    /// one stays in place. User topics are subscribed immediately when
    /// connected and on the next connection otherwise. System topics only
    /// register the listener.
    pub async fn on<F>(&self, topic: &str, listener: F) -> RelayResult<bool>
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        validate(topic, false)?;
        let inner = &self.inner;

        if !inner.listeners.add(topic, Arc::new(listener)) {
            debug!(topic, "listener already registered");
            return Ok(false);
        }
        if SystemTopic::is_reserved(topic) {
            return Ok(true);
        }

        if inner.state() == ConnectionState::Connected {
            if let Err(e) = inner.subscribe_topic(topic).await {
                inner.listeners.remove(topic);
                return Err(e);
            }
        } else {
            inner.pending().insert(topic.to_string());
            debug!(topic, "not connected, subscription deferred");
        }
        Ok(true)
    }

    /// Remove the listener for `topic`, stop its dispatch task and delete its
    /// consumer. Returns `Ok(false)` if nothing was registered.
    pub async fn off(&self, topic: &str) -> RelayResult<bool> {
        validate(topic, false)?;
        let inner = &self.inner;

        if !inner.listeners.remove(topic) {
            return Ok(false);
        }
        if SystemTopic::is_reserved(topic) {
            return Ok(true);
        }

        inner.pending().remove(topic);
        inner.subscriptions.cancel(topic);
        if let Ok(namespace) = inner.namespace() {
            if let Err(e) = inner.consumers.delete(&namespace.stream_name(), topic).await {
                warn!(topic, "Failed to delete consumer: {e}");
            }
        }
        info!(topic, "unsubscribed");
        Ok(true)
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("client_id", &self.inner.client_id)
            .field("state", &self.inner.state())
            .finish()
    }
}
