//! The `persistence` module stores outbound messages that could not be
//! delivered because the client was offline.
//!
//! It uses `sled` as an embedded key-value store so the queue survives a
//! process restart when a path is configured.

pub mod sled_store;

pub use sled_store::{OfflineQueue, StoredMessage};
