// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort event fan-out to streaming subscribers.
//!
//! Each subscriber owns a bounded queue; publishing to a full queue drops
//! the oldest event and counts the drop. A slow subscriber can therefore
//! never block the publisher or any other subscriber. Per-subscriber
//! ordering matches publish order; there is no global order.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use wb_core::{EventCategory, MonitorEvent};

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

struct Subscriber {
    id: u64,
    /// `None` subscribes to every category.
    filter: Option<HashSet<EventCategory>>,
    queue: Mutex<VecDeque<MonitorEvent>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl Subscriber {
    fn wants(&self, category: EventCategory) -> bool {
        self.filter.as_ref().map_or(true, |f| f.contains(&category))
    }

    /// Enqueue, dropping the oldest event when full.
    fn push(&self, event: MonitorEvent) {
        {
            let mut queue = self.queue.lock();
            if queue.len() == self.capacity {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(event);
        }
        self.notify.notify_one();
    }
}

/// The fan-out hub. One per bridge; shared via `Arc`.
pub struct MonitorHub {
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl MonitorHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Publish an event to every subscriber whose filter matches.
    ///
    /// Never blocks beyond the per-subscriber enqueue path.
    pub fn publish(&self, event: &MonitorEvent) {
        let category = event.category();
        let subscribers = self.subscribers.read();
        for sub in subscribers.iter() {
            if !sub.closed.load(Ordering::Acquire) && sub.wants(category) {
                sub.push(event.clone());
            }
        }
    }

    /// Register a subscriber. `categories: None` receives everything.
    pub fn subscribe(self: &Arc<Self>, categories: Option<HashSet<EventCategory>>) -> Subscription {
        let subscriber = Arc::new(Subscriber {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            filter: categories,
            queue: Mutex::new(VecDeque::new()),
            capacity: self.capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        self.subscribers.write().push(Arc::clone(&subscriber));
        Subscription { subscriber, hub: Arc::downgrade(self) }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Close every subscription. Pending `recv` calls drain their queues
    /// and then observe the close. Used at shutdown so streaming
    /// connections end instead of holding the drain window open.
    pub fn close_all(&self) {
        let subscribers = std::mem::take(&mut *self.subscribers.write());
        for sub in subscribers {
            sub.closed.store(true, Ordering::Release);
            sub.notify.notify_one();
        }
    }

    fn remove(&self, id: u64) {
        self.subscribers.write().retain(|s| s.id != id);
    }
}

impl Default for MonitorHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// A live, bounded stream of monitor events held by one reader.
///
/// The hub holds the subscriber entry; the subscription holds only a weak
/// back-reference to the hub, so closing removes the entry and breaks the
/// cycle deterministically. Dropping the subscription closes it.
pub struct Subscription {
    subscriber: Arc<Subscriber>,
    hub: Weak<MonitorHub>,
}

impl Subscription {
    /// Receive the next event, waiting if the queue is empty.
    ///
    /// Returns `None` once the subscription is closed and drained.
    pub async fn recv(&self) -> Option<MonitorEvent> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.subscriber.closed.load(Ordering::Acquire) {
                return None;
            }
            self.subscriber.notify.notified().await;
        }
    }

    /// Pop the next queued event without waiting.
    pub fn try_recv(&self) -> Option<MonitorEvent> {
        self.subscriber.queue.lock().pop_front()
    }

    /// Events dropped on this subscription due to back-pressure.
    pub fn dropped_count(&self) -> u64 {
        self.subscriber.dropped.load(Ordering::Relaxed)
    }

    pub fn queue_len(&self) -> usize {
        self.subscriber.queue.lock().len()
    }

    /// Remove this subscription from the hub. Idempotent.
    pub fn close(&self) {
        if self.subscriber.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.subscriber.id);
        }
        // Wake any pending recv so it can observe the close.
        self.subscriber.notify.notify_one();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
