//! Connection lifecycle
//!
//! `connect()` brings the transport up, resolves the tenant namespace and
//! starts the event loop that follows the transport afterwards:
//! - `disconnected`, `suspended` and `lame duck` events move a live client to
//!   `Reconnecting`
//! - the next `connected` event restores subscriptions and replays the
//!   offline queue
//! - `closed` or a fatal error ends the session in `Disconnected`
//!
//! `close()` is the manual path. It sets the manual flag first so the events
//! produced by the shutdown itself are ignored.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use super::namespace::{Namespace, NamespaceRequest};
use super::{ConnectionState, Inner, RelayClient};
use crate::message::Payload;
use crate::telemetry::{LatencyReport, LatencySample};
use crate::topic::SystemTopic;
use crate::transport::{EventStream, TransportEvent};
use crate::utils::{RelayError, RelayResult};

impl RelayClient {
    /// Connect and resolve the namespace, then subscribe pending topics.
    ///
    /// Calling it while a session is active is a no-op. On failure the client
    /// stays `Disconnected` and no automatic retry happens.
    pub async fn connect(&self) -> RelayResult<()> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;

        let current = inner.state();
        if !current.can_connect() {
            debug!(state = %current, "connect ignored");
            return Ok(());
        }
        if inner.settings.client.api_key.is_empty() {
            return Err(RelayError::InvalidCredentials {
                reason: "api key is empty".to_string(),
            });
        }

        inner.flags.set_manual(false);
        inner.flags.set_unexpected(false);
        inner.set_state(ConnectionState::Connecting);
        // Subscribed before connecting so no event of the new session is missed.
        let events = inner.transport.events();

        let namespace = match inner.establish().await {
            Ok(namespace) => namespace,
            Err(e) => {
                error!("Connect failed: {e}");
                inner.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        info!(namespace = %namespace.namespace, client_id = %inner.client_id, "namespace resolved");
        inner.set_namespace(Some(namespace));

        let handle = tokio::spawn(run_events(Arc::downgrade(inner), events));
        if let Some(previous) = inner.background().events.replace(handle) {
            previous.abort();
        }

        inner.set_state(ConnectionState::Connected);
        inner.subscribe_pending().await;
        inner.spawn_latency_flusher();

        // The event loop may already have seen the connection drop. The
        // following reconnect emits `reconnected` and replays the queue.
        let state = inner.state();
        if state != ConnectionState::Connected {
            warn!(%state, "connection interrupted during connect");
            return Ok(());
        }
        inner.emit(
            SystemTopic::Connected,
            Payload::from(SystemTopic::Connected.as_str()),
        );
        if !inner.queue.is_empty() {
            inner.spawn_resend();
        }
        Ok(())
    }

    /// Close the session on purpose.
    ///
    /// Stops every background task, deletes the consumers this client
    /// created, drops the offline queue and all listeners, and leaves the
    /// client `Closed`. A later `connect()` starts from scratch.
    pub async fn close(&self) -> RelayResult<()> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;

        inner.flags.set_manual(true);
        inner.flags.set_unexpected(false);
        let previous = inner.state();

        inner.background().abort_all();
        inner.subscriptions.cancel_all();
        inner.pending().clear();

        if previous == ConnectionState::Connected {
            inner.flush_latency(inner.latency.drain()).await;
        }

        match inner.namespace() {
            Ok(namespace) => inner.consumers.cleanup_all(&namespace.stream_name()).await,
            Err(_) => inner.consumers.forget_all(),
        }

        let cleared = inner.queue.clear();

        if matches!(
            previous,
            ConnectionState::Connected | ConnectionState::Reconnecting | ConnectionState::Suspended
        ) {
            if let Err(e) = inner.transport.close().await {
                warn!("Transport close failed: {e}");
            }
        }

        inner.set_namespace(None);
        inner.emit(SystemTopic::Disconnected, Payload::from("closed"));
        inner.listeners.remove_all();
        inner.set_state(ConnectionState::Closed);
        info!(client_id = %inner.client_id, "client closed");

        cleared
    }
}

impl Inner {
    /// Transport connect plus namespace lookup. A failed lookup closes the
    /// transport again.
    async fn establish(&self) -> RelayResult<Namespace> {
        let connect_timeout = Duration::from_millis(self.settings.client.connect_timeout_ms);
        tokio::time::timeout(connect_timeout, self.transport.connect())
            .await
            .map_err(|_| RelayError::Timeout)??;

        match self.resolve_namespace().await {
            Ok(namespace) => Ok(namespace),
            Err(e) => {
                if let Err(close_err) = self.transport.close().await {
                    warn!("Transport close after failed handshake: {close_err}");
                }
                Err(e)
            }
        }
    }

    async fn resolve_namespace(&self) -> RelayResult<Namespace> {
        let client = &self.settings.client;
        let body = serde_json::to_vec(&NamespaceRequest {
            api_key: client.api_key.clone(),
        })?;
        let reply = self
            .transport
            .request(
                &client.namespace_subject,
                body,
                Duration::from_millis(client.request_timeout_ms),
            )
            .await?;
        Namespace::parse_reply(&reply)
    }

    /// Returns `false` once the session is over and the loop should stop.
    async fn handle_event(self: &Arc<Self>, event: TransportEvent) -> bool {
        debug!(?event, state = %self.state(), "transport event");
        match event {
            TransportEvent::Connected => {
                if self.state() == ConnectionState::Reconnecting {
                    self.on_reconnected().await;
                }
            }
            TransportEvent::Disconnected => self.on_interrupted("disconnected"),
            TransportEvent::Suspended => self.on_interrupted("suspended"),
            TransportEvent::LameDuckMode => self.on_interrupted("lame duck mode"),
            TransportEvent::Closed => {
                self.on_connection_lost("transport closed");
                return false;
            }
            TransportEvent::Error {
                message,
                fatal: true,
            } => {
                self.on_connection_lost(&message);
                return false;
            }
            TransportEvent::Error { message, .. } => warn!("Transport error: {message}"),
        }
        true
    }

    fn on_interrupted(&self, reason: &str) {
        if self.state() != ConnectionState::Connected {
            return;
        }
        warn!(reason, "connection interrupted");
        self.flags.set_unexpected(true);
        self.set_state(ConnectionState::Reconnecting);
        self.emit(SystemTopic::Reconnecting, Payload::from(reason));
    }

    /// The namespace resolved by `connect()` stays valid for the whole
    /// session, so a reconnect only restores subscriptions and the queue.
    async fn on_reconnected(self: &Arc<Self>) {
        self.set_state(ConnectionState::Connected);
        self.subscribe_pending().await;
        self.emit(
            SystemTopic::Reconnected,
            Payload::from(SystemTopic::Reconnected.as_str()),
        );

        if self.flags.unexpected() {
            self.spawn_resend();
        }
        self.flags.set_unexpected(false);
    }

    /// Unrecoverable transport failure: tear down the dispatch tasks and keep
    /// the listened topics pending for the next `connect()`.
    fn on_connection_lost(&self, reason: &str) {
        error!(reason, "connection lost");
        self.flags.set_unexpected(true);
        self.set_state(ConnectionState::Disconnected);

        let topics = self.subscriptions.cancel_all();
        self.pending()
            .extend(topics.into_iter().filter(|topic| self.listeners.has(topic)));
        self.emit(SystemTopic::Disconnected, Payload::from(reason));
    }

    fn spawn_latency_flusher(self: &Arc<Self>) {
        let period = Duration::from_millis(self.settings.telemetry.flush_interval_ms.max(1));
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.state() == ConnectionState::Connected {
                    inner.flush_latency(inner.latency.drain()).await;
                }
            }
        });
        if let Some(previous) = self.background().latency.replace(handle) {
            previous.abort();
        }
    }

    /// Publish a latency batch. Failures drop the batch.
    pub(crate) async fn flush_latency(&self, samples: Vec<LatencySample>) {
        if samples.is_empty() {
            return;
        }
        let count = samples.len();
        let report = LatencyReport {
            client_id: self.client_id.clone(),
            samples,
        };
        let body = match serde_json::to_vec(&report) {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to encode latency report: {e}");
                return;
            }
        };

        match self
            .transport
            .publish(&self.settings.telemetry.latency_subject, body)
            .await
        {
            Ok(_) => debug!(count, "latency batch flushed"),
            Err(e) => warn!(count, "Failed to flush latency batch: {e}"),
        }
    }
}

async fn run_events(inner: Weak<Inner>, mut events: EventStream) {
    while let Some(event) = events.next().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if inner.flags.manual() {
            debug!(?event, "event ignored after close");
            continue;
        }
        if !inner.handle_event(event).await {
            return;
        }
    }
}
