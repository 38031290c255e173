use serde::Deserialize;

/// Top-level configuration settings for the client.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub client: ClientSettings,
    pub resend: ResendSettings,
    pub consumer: ConsumerSettings,
    pub history: HistorySettings,
    pub storage: StorageSettings,
    pub telemetry: TelemetrySettings,
    pub log_level: String,
}

/// Identity and broker handshake parameters.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClientSettings {
    pub api_key: String,
    /// Fixed client identity. A random UUID is used when unset.
    pub client_id: Option<String>,
    pub namespace_subject: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

/// Offline queue resend policy.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ResendSettings {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub message_gap_ms: u64,
    /// Evict a queued message after this many failed resend cycles.
    /// `None` keeps it until delivered or cleared.
    pub max_failed_cycles: Option<u32>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ConsumerSettings {
    pub max_deliver: i64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct HistorySettings {
    pub fetch_expiry_ms: u64,
}

/// Offline queue storage. Without a path the queue is kept in a temporary
/// database that lives as long as the client.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StorageSettings {
    pub path: Option<String>,
    pub ttl_secs: Option<i64>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TelemetrySettings {
    pub latency_subject: String,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from
/// `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub client: Option<PartialClientSettings>,
    pub resend: Option<PartialResendSettings>,
    pub consumer: Option<PartialConsumerSettings>,
    pub history: Option<PartialHistorySettings>,
    pub storage: Option<PartialStorageSettings>,
    pub telemetry: Option<PartialTelemetrySettings>,
    pub log_level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialClientSettings {
    pub api_key: Option<String>,
    pub client_id: Option<String>,
    pub namespace_subject: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialResendSettings {
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub message_gap_ms: Option<u64>,
    pub max_failed_cycles: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PartialConsumerSettings {
    pub max_deliver: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialHistorySettings {
    pub fetch_expiry_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialStorageSettings {
    pub path: Option<String>,
    pub ttl_secs: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialTelemetrySettings {
    pub latency_subject: Option<String>,
    pub batch_size: Option<usize>,
    pub flush_interval_ms: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client: ClientSettings {
                api_key: String::new(),
                client_id: None,
                namespace_subject: "accounts.user.get_namespace".to_string(),
                connect_timeout_ms: 5000,
                request_timeout_ms: 5000,
            },
            resend: ResendSettings {
                max_attempts: 3,
                retry_delay_ms: 500,
                message_gap_ms: 100,
                max_failed_cycles: None,
            },
            consumer: ConsumerSettings { max_deliver: 3 },
            history: HistorySettings {
                fetch_expiry_ms: 5000,
            },
            storage: StorageSettings {
                path: None,
                ttl_secs: None,
            },
            telemetry: TelemetrySettings {
                latency_subject: "accounts.user.log_latency".to_string(),
                batch_size: 100,
                flush_interval_ms: 30_000,
            },
            log_level: "info".to_string(),
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let client = self.client;
        let resend = self.resend;
        let consumer = self.consumer;
        let history = self.history;
        let storage = self.storage;
        let telemetry = self.telemetry;

        Settings {
            client: ClientSettings {
                api_key: client
                    .as_ref()
                    .and_then(|c| c.api_key.clone())
                    .unwrap_or(default.client.api_key),
                client_id: client
                    .as_ref()
                    .and_then(|c| c.client_id.clone())
                    .or(default.client.client_id),
                namespace_subject: client
                    .as_ref()
                    .and_then(|c| c.namespace_subject.clone())
                    .unwrap_or(default.client.namespace_subject),
                connect_timeout_ms: client
                    .as_ref()
                    .and_then(|c| c.connect_timeout_ms)
                    .unwrap_or(default.client.connect_timeout_ms),
                request_timeout_ms: client
                    .as_ref()
                    .and_then(|c| c.request_timeout_ms)
                    .unwrap_or(default.client.request_timeout_ms),
            },
            resend: ResendSettings {
                max_attempts: resend
                    .as_ref()
                    .and_then(|r| r.max_attempts)
                    .unwrap_or(default.resend.max_attempts),
                retry_delay_ms: resend
                    .as_ref()
                    .and_then(|r| r.retry_delay_ms)
                    .unwrap_or(default.resend.retry_delay_ms),
                message_gap_ms: resend
                    .as_ref()
                    .and_then(|r| r.message_gap_ms)
                    .unwrap_or(default.resend.message_gap_ms),
                max_failed_cycles: resend
                    .as_ref()
                    .and_then(|r| r.max_failed_cycles)
                    .or(default.resend.max_failed_cycles),
            },
            consumer: ConsumerSettings {
                max_deliver: consumer
                    .as_ref()
                    .and_then(|c| c.max_deliver)
                    .unwrap_or(default.consumer.max_deliver),
            },
            history: HistorySettings {
                fetch_expiry_ms: history
                    .as_ref()
                    .and_then(|h| h.fetch_expiry_ms)
                    .unwrap_or(default.history.fetch_expiry_ms),
            },
            storage: StorageSettings {
                path: storage
                    .as_ref()
                    .and_then(|s| s.path.clone())
                    .or(default.storage.path),
                ttl_secs: storage
                    .as_ref()
                    .and_then(|s| s.ttl_secs)
                    .or(default.storage.ttl_secs),
            },
            telemetry: TelemetrySettings {
                latency_subject: telemetry
                    .as_ref()
                    .and_then(|t| t.latency_subject.clone())
                    .unwrap_or(default.telemetry.latency_subject),
                batch_size: telemetry
                    .as_ref()
                    .and_then(|t| t.batch_size)
                    .unwrap_or(default.telemetry.batch_size),
                flush_interval_ms: telemetry
                    .as_ref()
                    .and_then(|t| t.flush_interval_ms)
                    .unwrap_or(default.telemetry.flush_interval_ms),
            },
            log_level: self.log_level.unwrap_or(default.log_level),
        }
    }
}
