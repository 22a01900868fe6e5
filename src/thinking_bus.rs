//! Process-wide pub/sub of filtered thinking fragments to `/v1/thinking/stream`
//! subscribers.
//!
//! Any number of SSE subscribers can come and go with their own HTTP
//! connections. Each subscriber gets its own bounded channel; a full channel
//! drops the oldest fragment rather than blocking the publisher.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

/// Per-subscriber queue depth.
const SUBSCRIBER_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
pub struct ThinkingFragment {
    pub content: String,
    pub model: Option<String>,
    pub timestamp: DateTime<Utc>,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<ThinkingFragment>,
}

/// The process-wide singleton: created once in `main` and handed around
/// as an `Arc`.
pub struct ThinkingBus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl Default for ThinkingBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkingBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Register a new subscriber and return its receiver. The subscriber
    /// is unregistered automatically when the returned guard is dropped
    /// (handler falls out of scope on disconnect).
    pub fn subscribe(self: &std::sync::Arc<Self>) -> Subscription {
        use std::sync::atomic::Ordering;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers
            .lock()
            .expect("thinking bus lock poisoned")
            .push(Subscriber { id, tx });
        Subscription {
            id,
            rx,
            bus: self.clone(),
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers
            .lock()
            .expect("thinking bus lock poisoned")
            .retain(|s| s.id != id);
    }

    /// Publish a fragment to every current subscriber. Reads a snapshot of
    /// the subscriber list under the lock, then sends outside of it so
    /// I/O-adjacent backpressure never holds the registration mutex.
    pub fn publish(&self, fragment: ThinkingFragment) {
        let senders: Vec<mpsc::Sender<ThinkingFragment>> = self
            .subscribers
            .lock()
            .expect("thinking bus lock poisoned")
            .iter()
            .map(|s| s.tx.clone())
            .collect();

        for tx in senders {
            // try_send: never suspend the publisher. A full queue means the
            // subscriber is lagging; drop the oldest by making room and
            // retrying once, otherwise drop this fragment for them.
            if let Err(mpsc::error::TrySendError::Full(fragment)) = tx.try_send(fragment.clone()) {
                // best-effort: can't pop the front of a tokio mpsc, so a
                // lagging subscriber simply misses fragments until it
                // drains below capacity again.
                drop(fragment);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("thinking bus lock poisoned").len()
    }
}

pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<ThinkingFragment>,
    bus: std::sync::Arc<ThinkingBus>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<ThinkingFragment> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn fragment(content: &str) -> ThinkingFragment {
        ThinkingFragment {
            content: content.to_string(),
            model: Some("claude-sonnet".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_fragments_in_order() {
        let bus = Arc::new(ThinkingBus::new());
        let mut sub = bus.subscribe();
        bus.publish(fragment("a"));
        bus.publish(fragment("b"));
        assert_eq!(sub.recv().await.unwrap().content, "a");
        assert_eq!(sub.recv().await.unwrap().content, "b");
    }

    #[tokio::test]
    async fn unsubscribe_on_drop_removes_from_count() {
        let bus = Arc::new(ThinkingBus::new());
        assert_eq!(bus.subscriber_count(), 0);
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = Arc::new(ThinkingBus::new());
        bus.publish(fragment("nobody listening"));
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive_every_fragment() {
        let bus = Arc::new(ThinkingBus::new());
        let mut s1 = bus.subscribe();
        let mut s2 = bus.subscribe();
        bus.publish(fragment("broadcast"));
        assert_eq!(s1.recv().await.unwrap().content, "broadcast");
        assert_eq!(s2.recv().await.unwrap().content, "broadcast");
    }
}
