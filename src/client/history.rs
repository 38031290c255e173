//! History replay through an ephemeral consumer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{debug, warn};

use super::{ConnectionState, RelayClient};
use crate::consumer::history_consumer;
use crate::message::{Envelope, codec};
use crate::topic::validate;
use crate::transport::MessageStream;
use crate::utils::{RelayError, RelayResult};

impl RelayClient {
    /// Messages published on `topic` from `start` on, in stream order.
    ///
    /// Stops at the first message sent after `end` and returns at most
    /// `limit` messages. Messages sent before `start` are skipped without
    /// counting against `limit`. The temporary consumer is deleted whatever
    /// the outcome.
    pub async fn history(
        &self,
        topic: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> RelayResult<Vec<Envelope>> {
        validate(topic, false)?;
        if start > Utc::now() {
            return Err(RelayError::InvalidDateRange {
                reason: "start is in the future".to_string(),
            });
        }
        if end.is_some_and(|end| end < start) {
            return Err(RelayError::InvalidDateRange {
                reason: "end is before start".to_string(),
            });
        }

        let inner = &self.inner;
        if inner.state() != ConnectionState::Connected {
            return Err(RelayError::NotConnected);
        }
        let namespace = inner.namespace()?;
        if limit == Some(0) {
            return Ok(Vec::new());
        }

        let stream = namespace.stream_name();
        let config = history_consumer(topic, &namespace.subject(topic), start);
        let name = config.name.clone();
        inner
            .transport
            .create_or_update_consumer(&stream, config)
            .await?;
        debug!(topic, consumer = %name, "history consumer created");

        let expiry = Duration::from_millis(inner.settings.history.fetch_expiry_ms);
        let fetched = match inner
            .transport
            .fetch(&stream, &name, usize::MAX, expiry)
            .await
        {
            Ok(messages) => {
                self.collect_window(topic, messages, start, end, limit)
                    .await
            }
            Err(e) => Err(e.into()),
        };

        if let Err(e) = inner.transport.delete_consumer(&stream, &name).await {
            warn!(topic, consumer = %name, "Failed to delete history consumer: {e}");
        }

        let messages = fetched?;
        debug!(topic, count = messages.len(), "history fetched");
        Ok(messages)
    }

    async fn collect_window(
        &self,
        topic: &str,
        mut messages: MessageStream,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> RelayResult<Vec<Envelope>> {
        let transport = &self.inner.transport;
        let start_ms = start.timestamp_millis();
        let end_ms = end.map(|end| end.timestamp_millis());
        let mut collected = Vec::new();

        while let Some(raw) = messages.next().await {
            let raw = raw?;
            let envelope = match codec::decode(&raw.payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(topic, "Skipping undecodable history message: {e}");
                    continue;
                }
            };
            if end_ms.is_some_and(|end| envelope.sent_at > end) {
                break;
            }

            if let Err(e) = transport.ack(&raw).await {
                warn!(topic, "History ack failed: {e}");
            }
            if envelope.sent_at >= start_ms {
                collected.push(envelope);
                if limit.is_some_and(|limit| collected.len() >= limit) {
                    break;
                }
            }
        }
        Ok(collected)
    }
}
