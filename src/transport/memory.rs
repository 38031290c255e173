//! In-process transport
//!
//! `MemoryTransport` keeps a single message log in memory and implements the
//! whole `Transport` contract against it:
//! - `publish` appends to the log and fans out to subscribers whose subject
//!   matches exactly
//! - consumers are filtered views over the log honoring their deliver policy
//! - request/reply is served by registered `Responder` closures
//!
//! It also exposes hooks to simulate connectivity changes and inject
//! failures, which is what the client tests are built on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::sync::{broadcast, mpsc};

use super::{
    ConsumerConfig, ConsumerInfo, DeliverPolicy, EventStream, MessageStream, PublishAck,
    RawMessage, Transport, TransportError, TransportEvent,
};
use crate::client::namespace::{NamespaceReply, NamespaceRequest};

pub type Responder = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, TransportError> + Send + Sync>;

const MEMORY_STREAM: &str = "memory";
const EVENT_CAPACITY: usize = 64;

type SubscriberTx = mpsc::UnboundedSender<Result<RawMessage, TransportError>>;

struct LoggedMessage {
    sequence: u64,
    subject: String,
    payload: Vec<u8>,
    received_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    log: Vec<LoggedMessage>,
    subscribers: Vec<(String, SubscriberTx)>,
    consumers: HashMap<(String, String), ConsumerConfig>,
    responders: HashMap<String, Responder>,
    acked: Vec<String>,
    fail_next_publishes: usize,
    fail_connect: bool,
    stall_connect: bool,
    fail_deletes: bool,
}

pub struct MemoryTransport {
    state: Mutex<MemoryState>,
    events: broadcast::Sender<TransportEvent>,
    connected: AtomicBool,
    publish_attempts: AtomicUsize,
    delete_calls: AtomicUsize,
    consumer_writes: AtomicUsize,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(MemoryState::default()),
            events,
            connected: AtomicBool::new(false),
            publish_attempts: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            consumer_writes: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }

    /// Serve requests sent to `subject` with `responder`.
    pub fn respond(&self, subject: &str, responder: Responder) {
        self.state().responders.insert(subject.to_string(), responder);
    }

    /// Answer namespace lookups on `subject`: requests carrying `api_key`
    /// resolve to `namespace`/`hash`, anything else is refused.
    pub fn respond_namespace(&self, subject: &str, api_key: &str, namespace: &str, hash: &str) {
        let (api_key, namespace, hash) = (
            api_key.to_string(),
            namespace.to_string(),
            hash.to_string(),
        );
        self.respond(
            subject,
            Arc::new(move |body: &[u8]| {
                let request: NamespaceRequest = serde_json::from_slice(body)
                    .map_err(|e| TransportError::Other(e.to_string()))?;
                let reply = if request.api_key == api_key {
                    NamespaceReply::success(&namespace, &hash)
                } else {
                    NamespaceReply::failure("invalid api key")
                };
                serde_json::to_vec(&reply).map_err(|e| TransportError::Other(e.to_string()))
            }),
        );
    }

    pub fn emit(&self, event: TransportEvent) {
        // no receivers simply means nobody is listening yet
        let _ = self.events.send(event);
    }

    pub fn simulate_disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.emit(TransportEvent::Disconnected);
    }

    pub fn simulate_reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.emit(TransportEvent::Connected);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state().fail_connect = fail;
    }

    /// Make `connect` hang until the caller gives up.
    pub fn set_stall_connect(&self, stall: bool) {
        self.state().stall_connect = stall;
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.state().fail_deletes = fail;
    }

    /// Make the next `count` publishes fail while connected.
    pub fn fail_next_publishes(&self, count: usize) {
        self.state().fail_next_publishes = count;
    }

    /// End every subscription on `subject` without an error.
    pub fn drop_subscriptions(&self, subject: &str) {
        self.state().subscribers.retain(|(s, _)| s != subject);
    }

    /// Terminate every subscription on `subject` with an error.
    pub fn fail_subscriptions(&self, subject: &str, reason: &str) {
        self.state().subscribers.retain(|(s, tx)| {
            if s == subject {
                let _ = tx.send(Err(TransportError::Subscription(reason.to_string())));
                false
            } else {
                true
            }
        });
    }

    /// Remove a consumer behind the client's back.
    pub fn forget_consumer(&self, stream: &str, name: &str) {
        self.state()
            .consumers
            .remove(&(stream.to_string(), name.to_string()));
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.state()
            .subscribers
            .iter()
            .filter(|(s, tx)| s == subject && !tx.is_closed())
            .count()
    }

    /// Payloads successfully published on `subject`, in order.
    pub fn published(&self, subject: &str) -> Vec<Vec<u8>> {
        self.state()
            .log
            .iter()
            .filter(|m| m.subject == subject)
            .map(|m| m.payload.clone())
            .collect()
    }

    pub fn published_count(&self) -> usize {
        self.state().log.len()
    }

    pub fn publish_attempts(&self) -> usize {
        self.publish_attempts.load(Ordering::SeqCst)
    }

    pub fn delete_consumer_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn consumer_writes(&self) -> usize {
        self.consumer_writes.load(Ordering::SeqCst)
    }

    pub fn consumer_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .state()
            .consumers
            .keys()
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn consumer(&self, stream: &str, name: &str) -> Option<ConsumerConfig> {
        self.state()
            .consumers
            .get(&(stream.to_string(), name.to_string()))
            .cloned()
    }

    pub fn acked_count(&self) -> usize {
        self.state().acked.len()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let (fail, stall) = {
            let state = self.state();
            (state.fail_connect, state.stall_connect)
        };
        if fail {
            return Err(TransportError::Connection("connection refused".to_string()));
        }
        if stall {
            std::future::pending::<()>().await;
        }
        self.connected.store(true, Ordering::SeqCst);
        self.emit(TransportEvent::Connected);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        self.state().subscribers.clear();
        self.emit(TransportEvent::Closed);
        Ok(())
    }

    fn events(&self) -> EventStream {
        let rx = self.events.subscribe();
        futures_util::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<PublishAck, TransportError> {
        self.publish_attempts.fetch_add(1, Ordering::SeqCst);
        self.ensure_connected()?;

        let mut state = self.state();
        if state.fail_next_publishes > 0 {
            state.fail_next_publishes -= 1;
            return Err(TransportError::Publish("injected failure".to_string()));
        }

        let sequence = state.log.len() as u64 + 1;
        let raw = RawMessage {
            subject: subject.to_string(),
            payload: payload.clone(),
            reply: Some(format!("$JS.ACK.{MEMORY_STREAM}.push.{sequence}")),
        };
        state.log.push(LoggedMessage {
            sequence,
            subject: subject.to_string(),
            payload,
            received_at: Utc::now(),
        });
        state
            .subscribers
            .retain(|(s, tx)| s != subject || tx.send(Ok(raw.clone())).is_ok());

        Ok(PublishAck {
            stream: MEMORY_STREAM.to_string(),
            sequence,
        })
    }

    async fn subscribe(&self, subject: &str) -> Result<MessageStream, TransportError> {
        self.ensure_connected()?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().subscribers.push((subject.to_string(), tx));

        Ok(
            futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|msg| (msg, rx))
            })
            .boxed(),
        )
    }

    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.ensure_connected()?;
        let responder = self
            .state()
            .responders
            .get(subject)
            .cloned()
            .ok_or_else(|| TransportError::NoResponders(subject.to_string()))?;
        responder(payload.as_slice())
    }

    async fn create_or_update_consumer(
        &self,
        stream: &str,
        config: ConsumerConfig,
    ) -> Result<ConsumerInfo, TransportError> {
        self.ensure_connected()?;
        self.consumer_writes.fetch_add(1, Ordering::SeqCst);
        self.state()
            .consumers
            .insert((stream.to_string(), config.name.clone()), config.clone());
        Ok(ConsumerInfo {
            stream: stream.to_string(),
            name: config.name.clone(),
            config,
        })
    }

    async fn delete_consumer(&self, stream: &str, name: &str) -> Result<(), TransportError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_connected()?;
        let mut state = self.state();
        if state.fail_deletes {
            return Err(TransportError::Other("injected delete failure".to_string()));
        }
        state
            .consumers
            .remove(&(stream.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| TransportError::NotFound(format!("consumer {name}")))
    }

    async fn fetch(
        &self,
        stream: &str,
        consumer: &str,
        batch: usize,
        _expiry: Duration,
    ) -> Result<MessageStream, TransportError> {
        self.ensure_connected()?;
        let state = self.state();
        let config = state
            .consumers
            .get(&(stream.to_string(), consumer.to_string()))
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("consumer {consumer}")))?;

        let messages: Vec<Result<RawMessage, TransportError>> = state
            .log
            .iter()
            .filter(|m| m.subject == config.filter_subject)
            .filter(|m| match config.deliver_policy {
                DeliverPolicy::All => true,
                DeliverPolicy::New => false,
                DeliverPolicy::ByStartTime(start) => m.received_at >= start,
            })
            .take(batch)
            .map(|m| {
                Ok(RawMessage {
                    subject: m.subject.clone(),
                    payload: m.payload.clone(),
                    reply: Some(format!("$JS.ACK.{stream}.{consumer}.{}", m.sequence)),
                })
            })
            .collect();

        Ok(futures_util::stream::iter(messages).boxed())
    }

    async fn ack(&self, message: &RawMessage) -> Result<(), TransportError> {
        if let Some(reply) = &message.reply {
            self.state().acked.push(reply.clone());
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("connected", &self.is_connected())
            .finish()
    }
}
