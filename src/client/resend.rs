//! Offline queue replay
//!
//! Runs after `connect()` when the queue is not empty, after every
//! reconnect that followed an unexpected disconnect, and after a publish
//! that failed on a live connection. Messages are sent one
//! at a time, oldest first, with `message_gap_ms` between them. Each gets
//! `max_attempts` tries spaced by `retry_delay_ms`; an entry leaves the queue
//! only once the broker acknowledged it. Exhausted entries stay queued for
//! the next cycle unless `max_failed_cycles` evicts them.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::{ConnectionState, Inner};
use crate::message::{Payload, codec};
use crate::persistence::StoredMessage;
use crate::topic::SystemTopic;
use crate::utils::RelayResult;

impl Inner {
    /// Start a resend cycle in the background unless one is still running.
    pub(crate) fn spawn_resend(self: &Arc<Self>) {
        let mut background = self.background();
        if background
            .resend
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            debug!("resend already scheduled");
            return;
        }

        let inner = self.clone();
        background.resend = Some(tokio::spawn(async move {
            inner.resend_offline().await;
        }));
    }

    pub(crate) async fn resend_offline(&self) {
        let Some(_resending) = self.flags.begin_resend() else {
            debug!("resend already in progress");
            return;
        };

        let pending = match self.queue.list_all() {
            Ok(pending) => pending,
            Err(e) => {
                error!("Failed to read offline queue: {e}");
                return;
            }
        };
        if pending.is_empty() {
            return;
        }

        let total = pending.len();
        info!(total, "resending offline messages");
        self.emit(SystemTopic::MessageResend, Payload::Number(total as f64));

        let gap = Duration::from_millis(self.settings.resend.message_gap_ms);
        let mut delivered = 0;
        for (index, stored) in pending.iter().enumerate() {
            if index > 0 {
                sleep(gap).await;
            }
            if self.state() != ConnectionState::Connected {
                warn!(remaining = total - index, "connection lost, resend stopped");
                break;
            }

            if let Err(e) = self.queue.mark_resent(&stored.topic, &stored.envelope.id, true) {
                warn!(id = %stored.envelope.id, "Failed to mark message as resent: {e}");
            }

            if self.send_with_retry(stored).await {
                delivered += 1;
                if let Err(e) = self.queue.remove(&stored.topic, &stored.envelope.id) {
                    error!(id = %stored.envelope.id, "Failed to remove delivered message: {e}");
                }
            } else {
                self.retain_failed(stored);
            }
        }

        info!(delivered, total, "resend cycle finished");
    }

    async fn send_with_retry(&self, stored: &StoredMessage) -> bool {
        let attempts = self.settings.resend.max_attempts.max(1);
        let delay = Duration::from_millis(self.settings.resend.retry_delay_ms);

        for attempt in 1..=attempts {
            match self.send_stored(stored).await {
                Ok(()) => {
                    debug!(topic = %stored.topic, id = %stored.envelope.id, attempt, "resent");
                    return true;
                }
                Err(e) => {
                    warn!(
                        topic = %stored.topic,
                        id = %stored.envelope.id,
                        attempt,
                        "Resend attempt failed: {e}"
                    );
                    if attempt < attempts {
                        sleep(delay).await;
                    }
                }
            }
        }
        false
    }

    /// Publish the stored envelope unchanged, keeping its id and `sent_at`.
    async fn send_stored(&self, stored: &StoredMessage) -> RelayResult<()> {
        let namespace = self.namespace()?;
        let bytes = codec::encode(&stored.envelope)?;
        self.transport
            .publish(&namespace.subject(&stored.topic), bytes)
            .await?;
        Ok(())
    }

    fn retain_failed(&self, stored: &StoredMessage) {
        let (topic, id) = (stored.topic.as_str(), stored.envelope.id.as_str());
        let failed_cycles = match self.queue.record_failure(topic, id) {
            Ok(Some(cycles)) => cycles,
            Ok(None) => return,
            Err(e) => {
                error!(id, "Failed to record resend failure: {e}");
                return;
            }
        };

        match self.settings.resend.max_failed_cycles {
            Some(limit) if failed_cycles >= limit => {
                warn!(topic, id, failed_cycles, "evicting undeliverable message");
                if let Err(e) = self.queue.remove(topic, id) {
                    error!(id, "Failed to evict message: {e}");
                }
            }
            _ => debug!(topic, id, failed_cycles, "message kept for next cycle"),
        }
    }
}
