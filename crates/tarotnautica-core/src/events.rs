//! Process-wide session event bus.
//!
//! The API client announces forced session invalidation here; whoever owns
//! navigation subscribes once and routes the user back to the welcome screen.
//! Delivery is synchronous and in registration order. Nothing is buffered, so
//! a listener only sees emissions that happen while it is registered.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

/// Events published on the bus. None of them carry a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// Tokens were cleared; the user must log in again.
    AuthReset,
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::AuthReset => "authReset",
        }
    }
}

type Listener = Arc<dyn Fn(SessionEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, SessionEvent, Listener)>,
}

/// Cheap to clone; clones share the same listener registry.
#[derive(Clone, Default)]
pub struct SessionEventBus {
    registry: Arc<Mutex<Registry>>,
}

impl SessionEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `event`. Keep the returned handle to remove it.
    pub fn add_listener<F>(&self, event: SessionEvent, callback: F) -> Subscription
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, event, Arc::new(callback)));
        debug!(event = event.name(), id, "Session listener added");

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove a listener. Removing an already removed listener is a no-op.
    pub fn remove_listener(&self, subscription: &Subscription) {
        subscription.unsubscribe();
    }

    /// Invoke every listener registered for `event`, in registration order.
    /// Returns how many listeners were called.
    ///
    /// Listeners run outside the registry lock, so they may add or remove
    /// listeners themselves. A panicking listener propagates to the emitter.
    pub fn emit(&self, event: SessionEvent) -> usize {
        let listeners: Vec<Listener> = self
            .lock()
            .listeners
            .iter()
            .filter(|(_, registered, _)| *registered == event)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();

        debug!(event = event.name(), listeners = listeners.len(), "Emitting session event");
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    pub fn listener_count(&self, event: SessionEvent) -> usize {
        self.lock()
            .listeners
            .iter()
            .filter(|(_, registered, _)| *registered == event)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle returned by [`SessionEventBus::add_listener`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.listeners.retain(|(id, _, _)| *id != self.id);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
