//! Durable and ephemeral broker consumers used by subscriptions and history
//! replay.

pub mod manager;

pub use manager::{ConsumerManager, consumer_name, history_consumer};

#[cfg(test)]
mod tests;
