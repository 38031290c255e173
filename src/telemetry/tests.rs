use super::LatencyAggregator;
use chrono::Utc;

#[test]
fn test_record_accumulates_until_batch_is_full() {
    let aggregator = LatencyAggregator::new(3);
    let now = Utc::now().timestamp_millis();

    assert!(aggregator.record(now - 10).is_none());
    assert!(aggregator.record(now - 20).is_none());
    let batch = aggregator.record(now - 30).unwrap();

    assert_eq!(batch.len(), 3);
    assert!(batch[0].latency_ms >= 10);
    assert!(batch[2].latency_ms >= 30);
    assert!(aggregator.is_empty());
}

#[test]
fn test_future_send_time_clamps_to_zero() {
    let aggregator = LatencyAggregator::new(10);
    aggregator.record(Utc::now().timestamp_millis() + 60_000);

    let samples = aggregator.drain();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].latency_ms, 0);
}

#[test]
fn test_drain_clears_samples() {
    let aggregator = LatencyAggregator::new(10);
    aggregator.record(0);
    aggregator.record(0);

    assert_eq!(aggregator.len(), 2);
    assert_eq!(aggregator.drain().len(), 2);
    assert!(aggregator.drain().is_empty());
}

#[test]
fn test_zero_batch_size_flushes_every_sample() {
    let aggregator = LatencyAggregator::new(0);
    assert_eq!(aggregator.record(0).map(|b| b.len()), Some(1));
}
