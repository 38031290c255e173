//! Latency aggregation
//!
//! Every delivered message contributes one sample: the difference between
//! the local clock at delivery and the producer's `sent_at`. Samples are
//! accumulated in arrival order and handed out as a batch once `batch_size`
//! is reached, or whenever the owner drains them.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySample {
    pub latency_ms: i64,
    pub observed_at: i64,
}

/// Body published to the latency subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyReport {
    pub client_id: String,
    pub samples: Vec<LatencySample>,
}

#[derive(Debug)]
pub struct LatencyAggregator {
    samples: Mutex<Vec<LatencySample>>,
    batch_size: usize,
}

impl LatencyAggregator {
    pub fn new(batch_size: usize) -> Self {
        Self {
            samples: Mutex::new(Vec::new()),
            batch_size: batch_size.max(1),
        }
    }

    fn samples(&self) -> MutexGuard<'_, Vec<LatencySample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a sample for a message sent at `sent_at_ms`. Returns the full
    /// batch when this sample completes one.
    pub fn record(&self, sent_at_ms: i64) -> Option<Vec<LatencySample>> {
        let now = Utc::now().timestamp_millis();
        // producer clocks can run ahead of ours
        let sample = LatencySample {
            latency_ms: (now - sent_at_ms).max(0),
            observed_at: now,
        };

        let mut samples = self.samples();
        samples.push(sample);
        if samples.len() >= self.batch_size {
            Some(std::mem::take(&mut *samples))
        } else {
            None
        }
    }

    pub fn drain(&self) -> Vec<LatencySample> {
        std::mem::take(&mut *self.samples())
    }

    pub fn len(&self) -> usize {
        self.samples().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
