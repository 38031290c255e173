//! Demo for RelaySub
//!
//! Wires configuration, logging and two clients over the in-process
//! transport: one listens on `chat`, the other publishes to it, goes
//! offline, queues a message and replays it after reconnecting.

use std::sync::Arc;
use std::time::Duration;

use relaysub::config::load_config;
use relaysub::transport::MemoryTransport;
use relaysub::utils::logging;
use relaysub::{Payload, RelayClient};
use tracing::{error, info};

const DEMO_API_KEY: &str = "demo-key";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let mut settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return;
        }
    };
    logging::init(&settings.log_level);

    if settings.client.api_key.is_empty() {
        settings.client.api_key = DEMO_API_KEY.to_string();
    }

    if let Err(e) = run_demo(settings).await {
        error!("Demo failed: {}", e);
    }
}

async fn run_demo(
    settings: relaysub::config::Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let transport = Arc::new(MemoryTransport::new());
    transport.respond_namespace(
        &settings.client.namespace_subject,
        &settings.client.api_key,
        "demo",
        "d3m0",
    );

    // the listener keeps an in-memory queue so the demo leaves nothing on disk
    let mut listener_settings = settings.clone();
    listener_settings.storage.path = None;
    let listener = RelayClient::new(listener_settings, transport.clone())?;
    let publisher = RelayClient::new(settings, transport.clone())?;

    listener
        .on("chat", |payload: Payload| match payload {
            Payload::Text(text) => info!("chat: {text}"),
            Payload::Number(n) => info!("chat number: {n}"),
            Payload::Json(value) => info!("chat json: {value}"),
        })
        .await?;
    publisher
        .on("message-resend", |payload: Payload| {
            info!("replaying {} offline message(s)", payload.as_number().unwrap_or(0.0));
        })
        .await?;

    listener.connect().await?;
    publisher.connect().await?;

    publisher.publish("chat", "hello from relaysub").await?;
    publisher
        .publish("chat", serde_json::json!({ "user": "demo", "seq": 1 }))
        .await?;

    transport.simulate_disconnect();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let sent = publisher.publish("chat", "sent while offline").await?;
    info!(sent, queued = publisher.offline_queue().len(), "published during outage");

    transport.simulate_reconnect();
    tokio::time::sleep(Duration::from_secs(1)).await;

    publisher.close().await?;
    listener.close().await?;
    info!("demo finished");
    Ok(())
}
