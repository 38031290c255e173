//! # RelaySub
//!
//! `relaysub` is a reliable topic publish/subscribe client for a JetStream
//! style broker. It hides disconnects from the application: messages
//! published while offline are queued on disk and replayed after the next
//! reconnect, subscriptions are restored automatically, and history can be
//! replayed for a time window.
//!
//! ## Core Modules
//!
//! - `client`: `RelayClient`, the connection state machine, per-topic dispatch, offline resend and history replay.
//! - `topic`: topic validation and the reserved system topics.
//! - `listener`: the topic -> listener registry.
//! - `message`: the message envelope, the tagged payload and its codec.
//! - `persistence`: the `sled` backed offline queue.
//! - `consumer`: broker consumer lifecycle.
//! - `transport`: the broker transport contract and an in-process implementation.
//! - `telemetry`: delivery latency sampling.
//! - `config`: layered settings from files and environment.
//! - `utils`: shared error types and logging setup.

pub mod client;
pub mod config;
pub mod consumer;
pub mod listener;
pub mod message;
pub mod persistence;
pub mod telemetry;
pub mod topic;
pub mod transport;
pub mod utils;

pub use client::{ConnectionState, RelayClient};
pub use message::{Envelope, Payload};
pub use utils::{RelayError, RelayResult};
