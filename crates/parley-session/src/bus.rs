//! Fan-out of accepted messages to observers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use parley_types::ChatMessage;

/// A subscriber callback.
pub type Handler = dyn Fn(&ChatMessage) + Send + Sync;

/// Delivers each published message to every subscriber, in registration
/// order, exactly once per publish.
///
/// The bus holds no history: a subscriber sees only what is published
/// while it is subscribed.
#[derive(Clone, Default)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

struct Subscriber {
    id: u64,
    handler: Arc<Handler>,
}

impl MessageBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Dropping the returned [`Subscription`] (or
    /// calling [`Subscription::unsubscribe`]) removes it.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push(Subscriber {
            id,
            handler: Arc::new(handler),
        });
        Subscription {
            bus: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Deliver a message to all current subscribers.
    pub fn publish(&self, message: &ChatMessage) {
        // Snapshot before delivering: a handler that unsubscribes someone
        // mid-pass must not change who receives this message.
        let handlers: Vec<Arc<Handler>> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|s| s.handler.clone())
            .collect();

        for handler in handlers {
            handler(message);
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

/// Token for an active subscription. Unsubscribes on drop.
pub struct Subscription {
    bus: Weak<BusInner>,
    id: u64,
}

impl Subscription {
    /// Remove the handler from the bus.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.subscribers.lock().retain(|s| s.id != self.id);
        }
    }
}
