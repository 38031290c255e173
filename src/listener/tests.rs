use super::{Listener, ListenerRegistry};
use crate::message::Payload;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counting_listener(counter: Arc<AtomicUsize>) -> Listener {
    Arc::new(move |_payload: Payload| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_add_and_get() {
    let registry = ListenerRegistry::new();
    let hits = Arc::new(AtomicUsize::new(0));

    assert!(registry.add("chat", counting_listener(hits.clone())));
    assert!(registry.has("chat"));

    let listener = registry.get("chat").unwrap();
    listener(Payload::Text("hi".to_string()));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_first_registration_wins() {
    let registry = ListenerRegistry::new();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    assert!(registry.add("chat", counting_listener(first.clone())));
    assert!(!registry.add("chat", counting_listener(second.clone())));

    registry.get("chat").unwrap()(Payload::Number(1.0));
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);
}

#[test]
fn test_remove_and_remove_all() {
    let registry = ListenerRegistry::new();
    let hits = Arc::new(AtomicUsize::new(0));
    registry.add("a", counting_listener(hits.clone()));
    registry.add("b", counting_listener(hits.clone()));

    assert!(registry.remove("a"));
    assert!(!registry.remove("a"));
    assert!(registry.get("a").is_none());
    assert_eq!(registry.len(), 1);

    registry.remove_all();
    assert!(registry.is_empty());
}

#[test]
fn test_user_topics_skip_system_topics() {
    let registry = ListenerRegistry::new();
    let hits = Arc::new(AtomicUsize::new(0));
    registry.add("connected", counting_listener(hits.clone()));
    registry.add("message-resend", counting_listener(hits.clone()));
    registry.add("chat", counting_listener(hits.clone()));

    assert_eq!(registry.user_topics(), vec!["chat".to_string()]);
}

#[test]
fn test_concurrent_adds_register_once() {
    let registry = Arc::new(ListenerRegistry::new());
    let accepted = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            let accepted = accepted.clone();
            std::thread::spawn(move || {
                let listener: Listener = Arc::new(|_| {});
                if registry.add("contended", listener) {
                    accepted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(registry.len(), 1);
}
