//! Namespace resolution
//!
//! Right after the transport connects, the client asks the broker which
//! tenant namespace its API key belongs to. The reply carries the namespace,
//! which names the backing stream, and a hash that prefixes every wire
//! subject.

use serde::{Deserialize, Serialize};

use crate::utils::{RelayError, RelayResult};

pub const NAMESPACE_RETRIEVE_SUCCESS: &str = "NAMESPACE_RETRIEVE_SUCCESS";

#[derive(Debug, Serialize, Deserialize)]
pub struct NamespaceRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NamespaceData {
    pub namespace: String,
    pub hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NamespaceReply {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<NamespaceData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NamespaceReply {
    pub fn success(namespace: &str, hash: &str) -> Self {
        Self {
            status: NAMESPACE_RETRIEVE_SUCCESS.to_string(),
            data: Some(NamespaceData {
                namespace: namespace.to_string(),
                hash: hash.to_string(),
            }),
            message: None,
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            status: "AUTH_FAILED".to_string(),
            data: None,
            message: Some(message.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub namespace: String,
    pub hash: String,
}

impl Namespace {
    pub fn stream_name(&self) -> String {
        format!("{}_stream", self.namespace)
    }

    /// Wire subject for a logical topic.
    pub fn subject(&self, topic: &str) -> String {
        format!("{}.{}", self.hash, topic)
    }

    pub fn parse_reply(bytes: &[u8]) -> RelayResult<Self> {
        let reply: NamespaceReply =
            serde_json::from_slice(bytes).map_err(|e| RelayError::InvalidResponse {
                reason: e.to_string(),
            })?;

        if reply.status != NAMESPACE_RETRIEVE_SUCCESS {
            return Err(RelayError::InvalidCredentials {
                reason: reply.message.unwrap_or(reply.status),
            });
        }

        let data = reply.data.ok_or_else(|| RelayError::InvalidResponse {
            reason: "namespace reply has no data".to_string(),
        })?;
        if data.namespace.is_empty() || data.hash.is_empty() {
            return Err(RelayError::InvalidResponse {
                reason: "namespace reply has an empty namespace or hash".to_string(),
            });
        }

        Ok(Self {
            namespace: data.namespace,
            hash: data.hash,
        })
    }
}
