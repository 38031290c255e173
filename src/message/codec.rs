//! Envelope codec
//!
//! JSON via `serde_json`. The rest of the crate only relies on
//! `decode(encode(e)) == e` for every envelope `encode` accepts.

use super::{Envelope, Payload};
use crate::utils::{RelayError, RelayResult};

pub fn encode(envelope: &Envelope) -> RelayResult<Vec<u8>> {
    if let Payload::Number(n) = envelope.payload {
        if !n.is_finite() {
            return Err(RelayError::InvalidPayload {
                reason: format!("number {n} cannot be encoded"),
            });
        }
    }
    serde_json::to_vec(envelope).map_err(|e| RelayError::InvalidPayload {
        reason: e.to_string(),
    })
}

pub fn decode(bytes: &[u8]) -> RelayResult<Envelope> {
    serde_json::from_slice(bytes).map_err(|e| RelayError::InvalidPayload {
        reason: e.to_string(),
    })
}
