use super::{ConsumerManager, consumer_name, history_consumer};
use crate::transport::{
    AckPolicy, DeliverPolicy, MemoryTransport, ReplayPolicy, Transport, TransportError,
};
use crate::utils::RelayError;
use chrono::Utc;
use std::sync::Arc;

const STREAM: &str = "tenant_stream";

async fn connected_transport() -> Arc<MemoryTransport> {
    let transport = Arc::new(MemoryTransport::new());
    transport.connect().await.unwrap();
    transport
}

#[test]
fn test_consumer_name_replaces_dots() {
    assert_eq!(consumer_name("chat"), "chat_consumer");
    assert_eq!(consumer_name("a.b.c"), "a_b_c_consumer");
}

#[test]
fn test_history_consumer_is_unique_and_time_bounded() {
    let start = Utc::now();
    let a = history_consumer("chat", "h.chat", start);
    let b = history_consumer("chat", "h.chat", start);

    assert_ne!(a.name, b.name);
    assert!(a.name.starts_with("chat_history_"));
    assert_eq!(a.deliver_policy, DeliverPolicy::ByStartTime(start));
    assert_eq!(a.ack_policy, AckPolicy::Explicit);
    assert_eq!(a.replay_policy, ReplayPolicy::Instant);
    assert_eq!(a.filter_subject, "h.chat");
}

#[tokio::test]
async fn test_create_or_update_is_idempotent() {
    let transport = connected_transport().await;
    let manager = ConsumerManager::new(transport.clone(), 3);

    let info = manager.create_or_update(STREAM, "chat", "h.chat").await.unwrap();
    manager.create_or_update(STREAM, "chat", "h.chat").await.unwrap();

    assert_eq!(info.name, "chat_consumer");
    assert_eq!(transport.consumer_names(), vec!["chat_consumer".to_string()]);
    assert_eq!(transport.consumer_writes(), 2);
    assert_eq!(manager.active_topics(), vec!["chat".to_string()]);

    let config = transport.consumer(STREAM, "chat_consumer").unwrap();
    assert_eq!(config.deliver_policy, DeliverPolicy::All);
    assert_eq!(config.max_deliver, 3);
    assert_eq!(config.filter_subject, "h.chat");
}

#[tokio::test]
async fn test_delete_untracked_topic_skips_rpc() {
    let transport = connected_transport().await;
    let manager = ConsumerManager::new(transport.clone(), 3);

    assert!(!manager.delete(STREAM, "chat").await.unwrap());
    assert_eq!(transport.delete_consumer_calls(), 0);
}

#[tokio::test]
async fn test_delete_twice_issues_one_rpc() {
    let transport = connected_transport().await;
    let manager = ConsumerManager::new(transport.clone(), 3);
    manager.create_or_update(STREAM, "chat", "h.chat").await.unwrap();

    assert!(manager.delete(STREAM, "chat").await.unwrap());
    assert!(!manager.delete(STREAM, "chat").await.unwrap());

    assert_eq!(transport.delete_consumer_calls(), 1);
    assert!(transport.consumer_names().is_empty());
    assert!(!manager.is_active("chat"));
}

#[tokio::test]
async fn test_delete_of_vanished_consumer_succeeds() {
    let transport = connected_transport().await;
    let manager = ConsumerManager::new(transport.clone(), 3);
    manager.create_or_update(STREAM, "chat", "h.chat").await.unwrap();
    transport.forget_consumer(STREAM, "chat_consumer");

    assert!(manager.delete(STREAM, "chat").await.unwrap());
    assert!(!manager.is_active("chat"));
}

#[tokio::test]
async fn test_failed_delete_keeps_topic_tracked() {
    let transport = connected_transport().await;
    let manager = ConsumerManager::new(transport.clone(), 3);
    manager.create_or_update(STREAM, "chat", "h.chat").await.unwrap();
    transport.set_fail_deletes(true);

    let err = manager.delete(STREAM, "chat").await.unwrap_err();
    assert!(matches!(
        err,
        RelayError::Transport(TransportError::Other(_))
    ));
    assert!(manager.is_active("chat"));
}

#[tokio::test]
async fn test_cleanup_all_deletes_every_tracked_consumer() {
    let transport = connected_transport().await;
    let manager = ConsumerManager::new(transport.clone(), 3);
    manager.create_or_update(STREAM, "chat", "h.chat").await.unwrap();
    manager.create_or_update(STREAM, "news", "h.news").await.unwrap();

    manager.cleanup_all(STREAM).await;

    assert_eq!(transport.delete_consumer_calls(), 2);
    assert!(transport.consumer_names().is_empty());
    assert!(manager.active_topics().is_empty());
}

#[tokio::test]
async fn test_cleanup_all_swallows_failures() {
    let transport = connected_transport().await;
    let manager = ConsumerManager::new(transport.clone(), 3);
    manager.create_or_update(STREAM, "chat", "h.chat").await.unwrap();
    transport.set_fail_deletes(true);

    manager.cleanup_all(STREAM).await;

    assert!(manager.active_topics().is_empty());
}
