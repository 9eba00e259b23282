use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use crate::core::ServerEvent;

/// Subscribing under this key receives every event regardless of type.
pub const WILDCARD: &str = "*";

type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<String, Vec<(u64, Handler)>>,
}

/// Type-keyed pub/sub registry between the transport and its observers.
/// Handlers for an event's own type run before wildcard handlers, each
/// group in registration order. A panicking handler is logged and skipped
/// so it cannot block delivery to the rest.
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(
        self: &Arc<Self>,
        event_type: &str,
        handler: impl Fn(&ServerEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let mut registry = self.registry.lock().expect("bus registry poisoned");
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .handlers
            .entry(event_type.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            bus: Arc::downgrade(self),
            event_type: event_type.to_string(),
            id,
        }
    }

    pub fn emit(&self, event: &ServerEvent) {
        // Snapshot the handler lists so callbacks run without the registry
        // lock held; a handler may subscribe or emit in turn.
        let (typed, wildcard) = {
            let registry = self.registry.lock().expect("bus registry poisoned");
            let typed: Vec<Handler> = registry
                .handlers
                .get(event.event_type())
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default();
            let wildcard: Vec<Handler> = registry
                .handlers
                .get(WILDCARD)
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default();
            (typed, wildcard)
        };

        for handler in typed.iter().chain(wildcard.iter()) {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!(
                    "Event handler panicked while handling '{}'",
                    event.event_type()
                );
            }
        }
    }

    fn remove(&self, event_type: &str, id: u64) {
        let mut registry = self.registry.lock().expect("bus registry poisoned");
        if let Some(list) = registry.handlers.get_mut(event_type) {
            list.retain(|(handler_id, _)| *handler_id != id);
            if list.is_empty() {
                registry.handlers.remove(event_type);
            }
        }
    }
}

/// Unsubscribe token returned by [`EventBus::on`]. Calling
/// [`Subscription::unsubscribe`] more than once is a no-op.
pub struct Subscription {
    bus: Weak<EventBus>,
    event_type: String,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(&self.event_type, self.id);
        }
    }
}
