//! Message definitions
//!
//! `Envelope` is the wire representation of every published message. It
//! wraps the application `Payload` with the sender identity, a unique id and
//! the producer wall-clock time in milliseconds.
//!
//! Notes on fields:
//! - `client_id`: identity of the producing client, used to drop self echoes
//! - `id`: UUID, unique per produced message; also the offline queue key
//! - `sent_at`: milliseconds since UNIX epoch, used by history filtering and
//!   latency sampling

pub mod codec;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Application payload. The tag is carried on the wire so decoding never has
/// to guess whether `"42"` was text or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Text(String),
    Number(f64),
    Json(serde_json::Value),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Payload::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<f64> for Payload {
    fn from(n: f64) -> Self {
        Payload::Number(n)
    }
}

impl From<i64> for Payload {
    fn from(n: i64) -> Self {
        Payload::Number(n as f64)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub client_id: String,
    pub id: String,
    pub topic: String,
    pub payload: Payload,
    pub sent_at: i64,
}

impl Envelope {
    /// Build an envelope stamped with a fresh id and the current time.
    pub fn new(client_id: &str, topic: &str, payload: Payload) -> Self {
        Self {
            client_id: client_id.to_string(),
            id: Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            payload,
            sent_at: Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests;
