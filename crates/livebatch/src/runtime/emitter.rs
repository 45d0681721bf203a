//! Emitter<T>: synchronous fan-out for context stability notifications and
//! observer batch delivery.
//!
//! Each `emit` delivers to the listeners registered when it started, in
//! registration order. Listeners may call `on`/`off` while being notified;
//! a listener removed mid-round still sees that round and one added
//! mid-round waits for the next.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Identifier returned by [`Emitter::on`], accepted by [`Emitter::off`].
pub type ListenerId = u64;

/// Listener callback stored by an [`Emitter`].
pub type ListenerFn<T> = dyn Fn(&T) + Send + Sync;

/// Synchronous fan-out of events to registered listeners.
pub struct Emitter<T> {
    registry: Mutex<Registry<T>>,
}

struct Registry<T> {
    next_id: ListenerId,
    listeners: BTreeMap<ListenerId, Arc<ListenerFn<T>>>,
}

impl<T> Emitter<T> {
    /// Create an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                next_id: 0,
                listeners: BTreeMap::new(),
            }),
        }
    }

    /// Register a listener; returns its id for [`Emitter::off`].
    pub fn on(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let mut reg = self.registry.lock();
        reg.next_id += 1;
        let id = reg.next_id;
        reg.listeners.insert(id, Arc::new(callback));
        id
    }

    /// Returns whether `id` was registered.
    pub fn off(&self, id: ListenerId) -> bool {
        self.registry.lock().listeners.remove(&id).is_some()
    }

    /// Call every listener registered before this call with `event`.
    pub fn emit(&self, event: &T) {
        let round: Vec<Arc<ListenerFn<T>>> =
            self.registry.lock().listeners.values().cloned().collect();
        for listener in round {
            listener(event);
        }
    }

    /// Remove all listeners.
    pub fn clear(&self) {
        self.registry.lock().listeners.clear();
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.registry.lock().listeners.len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.registry.lock().listeners.is_empty()
    }
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}
