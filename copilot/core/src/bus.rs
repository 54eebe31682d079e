//! Event Bus
//!
//! Synchronous publish/subscribe dispatcher passed explicitly to every
//! component that needs it. Delivery is in registration order, on the
//! publisher's task, before `publish` returns.
//!
//! Listeners may publish from inside a handler: the listener list is
//! snapshotted before dispatch, so no lock is held while handlers run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::events::{CopilotEvent, EventKind};

type Handler = Arc<dyn Fn(&CopilotEvent) + Send + Sync>;

struct Listener {
    id: u64,
    kind: EventKind,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    listeners: RwLock<Vec<Listener>>,
}

/// Shared handle to a bus; clones publish to the same listeners
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&CopilotEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.listeners.write().push(Listener {
            id,
            kind,
            handler: Arc::new(handler),
        });
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to every listener of its kind
    pub fn publish(&self, event: CopilotEvent) {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .inner
            .listeners
            .read()
            .iter()
            .filter(|listener| listener.kind == kind)
            .map(|listener| Arc::clone(&listener.handler))
            .collect();

        tracing::trace!(event = ?event, listeners = handlers.len(), "Publishing event");

        for handler in handlers {
            handler(&event);
        }
    }

    /// Number of registered listeners
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Remove the handler from the bus
    pub fn unsubscribe(self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.listeners.write().retain(|listener| listener.id != self.id);
        }
    }
}
