//! The `transport` module defines what `relaysub` needs from the broker
//! connection: publish with ack, subject subscriptions, request/reply, a
//! JetStream-style consumer API and a stream of connectivity events.
//!
//! Implementations must tolerate concurrent calls from several tasks; the
//! client shares one `Arc<dyn Transport>` between its public API, the event
//! loop and every per-topic dispatch task.
//!
//! `memory` provides an in-process implementation used by tests and the demo
//! binary.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

pub use crate::utils::TransportError;
pub use memory::MemoryTransport;

/// A message as delivered by the broker, before envelope decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub subject: String,
    pub payload: Vec<u8>,
    /// Set for messages that expect an acknowledgement.
    pub reply: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    pub stream: String,
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Closed,
    Suspended,
    LameDuckMode,
    Error { message: String, fatal: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverPolicy {
    All,
    New,
    ByStartTime(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    Explicit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayPolicy {
    Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    pub name: String,
    pub deliver_policy: DeliverPolicy,
    pub ack_policy: AckPolicy,
    pub filter_subject: String,
    pub max_deliver: i64,
    pub replay_policy: ReplayPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerInfo {
    pub stream: String,
    pub name: String,
    pub config: ConsumerConfig,
}

pub type MessageStream = BoxStream<'static, Result<RawMessage, TransportError>>;
pub type EventStream = BoxStream<'static, TransportEvent>;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;

    /// Connectivity events emitted after this call.
    fn events(&self) -> EventStream;

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<PublishAck, TransportError>;

    async fn subscribe(&self, subject: &str) -> Result<MessageStream, TransportError>;

    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;

    async fn create_or_update_consumer(
        &self,
        stream: &str,
        config: ConsumerConfig,
    ) -> Result<ConsumerInfo, TransportError>;

    /// Deleting a consumer that does not exist reports `TransportError::NotFound`.
    async fn delete_consumer(&self, stream: &str, name: &str) -> Result<(), TransportError>;

    /// Pull up to `batch` messages, waiting at most `expiry`.
    async fn fetch(
        &self,
        stream: &str,
        consumer: &str,
        batch: usize,
        expiry: Duration,
    ) -> Result<MessageStream, TransportError>;

    async fn ack(&self, message: &RawMessage) -> Result<(), TransportError>;
}
