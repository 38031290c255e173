//! The `utils` module provides definitions shared across the crate: the error
//! taxonomy and the logging bootstrap.

pub mod error;
pub mod logging;

pub use error::{RelayError, RelayResult, TopicError, TransportError};
