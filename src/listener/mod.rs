//! The `listener` module holds the topic -> listener map used to dispatch
//! inbound messages and connectivity events to application code.

pub mod registry;

pub use registry::{Listener, ListenerRegistry};

#[cfg(test)]
mod tests;
