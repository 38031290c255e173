//! Client-side delivery telemetry.

pub mod latency;

pub use latency::{LatencyAggregator, LatencyReport, LatencySample};

#[cfg(test)]
mod tests;
