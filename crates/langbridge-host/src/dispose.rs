//! Disposable handles for undoing registrations.
//!
//! ## Learning: Ownership vs. Handles
//!
//! A registration (a provider, an event listener, an extra source) is undone
//! by invoking the handle it returned, not by dropping it. Dropping a
//! `Disposable` without calling `dispose` leaves the registration in place,
//! which matches how editor hosts treat registration handles: the caller
//! decides when the registration ends, not the garbage collector.

use parking_lot::Mutex;

type DisposeFn = Box<dyn FnOnce() + Send>;

/// A handle whose single invocation undoes one registration.
///
/// Calling `dispose` a second time is a no-op.
pub struct Disposable {
    inner: Mutex<Option<DisposeFn>>,
}

impl Disposable {
    /// Wraps a cleanup closure.
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Mutex::new(Some(Box::new(f))),
        }
    }

    /// A handle that does nothing when disposed.
    pub fn noop() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Runs the cleanup closure if it has not run yet.
    pub fn dispose(&self) {
        let f = self.inner.lock().take();
        if let Some(f) = f {
            f();
        }
    }

    /// Returns true once `dispose` has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.lock().is_none()
    }
}

impl std::fmt::Debug for Disposable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// An ordered collection of disposables, drained in reverse order.
///
/// Reverse order mirrors how registrations stack: the last thing registered
/// is the first thing torn down.
#[derive(Default)]
pub struct DisposableStore {
    items: Mutex<Vec<Disposable>>,
}

impl DisposableStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a disposable to the store.
    pub fn push(&self, disposable: Disposable) {
        self.items.lock().push(disposable);
    }

    /// Returns the number of held disposables.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true if the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Disposes everything held, most recent first, leaving the store empty.
    pub fn dispose_all(&self) {
        let mut items = std::mem::take(&mut *self.items.lock());
        while let Some(item) = items.pop() {
            item.dispose();
        }
    }

    /// Collapses the store into a single disposable.
    pub fn into_disposable(self) -> Disposable {
        Disposable::new(move || self.dispose_all())
    }
}
