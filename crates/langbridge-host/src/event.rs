//! Typed event emitter with synchronous, ordered delivery.
//!
//! ## Learning: Why Not a Broadcast Channel?
//!
//! An async broadcast bus delivers events whenever receivers get polled,
//! which gives no ordering guarantee between two subscribers reacting to the
//! same event. Configuration observers need stronger semantics: each handler
//! runs to completion, in subscription order, before `emit` returns. A plain
//! listener list provides exactly that, at the cost of requiring that
//! handlers never block.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::dispose::Disposable;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A typed event source.
///
/// `emit` calls every current listener synchronously, in the order they
/// subscribed. Listeners subscribed or disposed by a running handler take
/// effect from the next `emit`.
pub struct Emitter<T> {
    listeners: Arc<Mutex<Vec<(u64, Listener<T>)>>>,
    next_id: AtomicU64,
}

impl<T: 'static> Emitter<T> {
    /// Creates an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Subscribes a handler; the returned disposable removes it.
    pub fn subscribe(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> Disposable {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(handler)));

        let listeners = Arc::clone(&self.listeners);
        Disposable::new(move || {
            listeners.lock().retain(|(listener_id, _)| *listener_id != id);
        })
    }

    /// Delivers `value` to every listener, in subscription order.
    pub fn emit(&self, value: &T) {
        // Snapshot so handlers can subscribe/dispose without deadlocking.
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(value);
        }
    }

    /// Returns the number of current listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<T: 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}
