// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;
use wb_core::{ChannelState, GlobalStats, LogEvent, LogLevel};

fn log_event(ts: u64) -> MonitorEvent {
    MonitorEvent::Log { event: LogEvent::system(ts, LogLevel::Info, "event") }
}

fn tick(ts: u64) -> MonitorEvent {
    MonitorEvent::MetricsTick { timestamp_ms: ts, global: GlobalStats::default() }
}

#[tokio::test]
async fn published_events_reach_subscriber_in_order() {
    let hub = Arc::new(MonitorHub::new(8));
    let sub = hub.subscribe(None);

    hub.publish(&log_event(1));
    hub.publish(&log_event(2));

    assert!(matches!(sub.recv().await, Some(MonitorEvent::Log { event }) if event.timestamp_ms == 1));
    assert!(matches!(sub.recv().await, Some(MonitorEvent::Log { event }) if event.timestamp_ms == 2));
}

#[tokio::test]
async fn overload_drops_oldest_and_counts() {
    let hub = Arc::new(MonitorHub::new(4));
    let sub = hub.subscribe(None);

    for i in 0..10u64 {
        hub.publish(&log_event(i));
    }

    assert_eq!(sub.queue_len(), 4);
    assert_eq!(sub.dropped_count(), 6);
    // Oldest surviving event is 6
    assert!(matches!(sub.try_recv(), Some(MonitorEvent::Log { event }) if event.timestamp_ms == 6));
}

#[tokio::test]
async fn queue_length_never_exceeds_capacity_under_sustained_load() {
    let hub = Arc::new(MonitorHub::new(4));
    let sub = hub.subscribe(None);
    for i in 0..1000u64 {
        hub.publish(&log_event(i));
        assert!(sub.queue_len() <= 4);
    }
}

#[tokio::test]
async fn category_filter_selects_events() {
    let hub = Arc::new(MonitorHub::new(8));
    let only_ticks =
        hub.subscribe(Some([EventCategory::MetricsTick].into_iter().collect()));

    hub.publish(&log_event(1));
    hub.publish(&tick(2));

    assert!(matches!(only_ticks.try_recv(), Some(MonitorEvent::MetricsTick { .. })));
    assert_eq!(only_ticks.try_recv(), None);
}

#[tokio::test]
async fn slow_subscriber_does_not_block_others() {
    let hub = Arc::new(MonitorHub::new(2));
    let slow = hub.subscribe(None);
    let fast = hub.subscribe(None);

    // Saturate the slow subscriber's queue; the fast one still sees all.
    for i in 0..100u64 {
        hub.publish(&log_event(i));
        let _ = fast.try_recv();
    }
    assert_eq!(slow.queue_len(), 2);
    assert!(slow.dropped_count() >= 98);
}

#[tokio::test]
async fn close_removes_subscriber_and_is_idempotent() {
    let hub = Arc::new(MonitorHub::new(8));
    let sub = hub.subscribe(None);
    assert_eq!(hub.subscriber_count(), 1);

    sub.close();
    sub.close();
    assert_eq!(hub.subscriber_count(), 0);

    hub.publish(&log_event(1));
    assert_eq!(sub.try_recv(), None);
}

#[tokio::test]
async fn drop_releases_the_subscription() {
    let hub = Arc::new(MonitorHub::new(8));
    {
        let _sub = hub.subscribe(None);
        assert_eq!(hub.subscriber_count(), 1);
    }
    assert_eq!(hub.subscriber_count(), 0);
}

#[tokio::test]
async fn recv_returns_none_after_close() {
    let hub = Arc::new(MonitorHub::new(8));
    let sub = Arc::new(hub.subscribe(None));

    let reader = {
        let sub = Arc::clone(&sub);
        tokio::spawn(async move { sub.recv().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    sub.close();

    let received = tokio::time::timeout(Duration::from_secs(1), reader).await.unwrap().unwrap();
    assert_eq!(received, None);
}

#[tokio::test]
async fn recv_drains_queue_after_close() {
    let hub = Arc::new(MonitorHub::new(8));
    let sub = hub.subscribe(None);
    hub.publish(&log_event(1));
    sub.close();

    // Queued event is still delivered, then the stream ends.
    assert!(sub.recv().await.is_some());
    assert_eq!(sub.recv().await, None);
}

#[tokio::test]
async fn close_all_ends_every_subscription() {
    let hub = Arc::new(MonitorHub::new(8));
    let first = hub.subscribe(None);
    let second = hub.subscribe(None);
    hub.publish(&log_event(1));

    hub.close_all();
    assert_eq!(hub.subscriber_count(), 0);

    // Queued events still drain, then the streams end.
    assert!(first.recv().await.is_some());
    assert_eq!(first.recv().await, None);
    assert!(second.recv().await.is_some());
    assert_eq!(second.recv().await, None);
}

#[tokio::test]
async fn subscribers_arriving_late_miss_earlier_events() {
    let hub = Arc::new(MonitorHub::new(8));
    hub.publish(&log_event(1));
    let sub = hub.subscribe(None);
    assert_eq!(sub.try_recv(), None);
}
