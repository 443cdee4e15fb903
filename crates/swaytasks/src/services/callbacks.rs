//! Generic callback registry for service snapshot updates.
//!
//! This module provides `Callbacks<T>`, a reusable helper for the
//! snapshot+callback pattern the services use to notify their consumer.
//! Callbacks may be invoked from service worker threads, so they must be
//! `Send + Sync`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! pub struct MyService {
//!     snapshot: Mutex<MySnapshot>,
//!     callbacks: Callbacks<MySnapshot>,
//! }
//!
//! impl MyService {
//!     pub fn connect<F>(&self, callback: F) -> CallbackId
//!     where
//!         F: Fn(&MySnapshot) + Send + Sync + 'static,
//!     {
//!         let id = self.callbacks.register(callback);
//!         self.callbacks.notify_single(id, &self.snapshot.lock());
//!         id
//!     }
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Unique identifier for a registered callback.
///
/// Used to unregister callbacks when they are no longer needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Global counter for generating unique callback IDs.
static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(1);

impl CallbackId {
    fn new() -> Self {
        Self(NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Entry in the callback registry, pairing an ID with a callback.
struct CallbackEntry<T> {
    id: CallbackId,
    callback: Arc<dyn Fn(&T) + Send + Sync>,
}

/// A registry of callbacks that receive snapshot updates.
///
/// Callbacks are stored as `Arc<dyn Fn(&T)>` so they can be cloned out of
/// the registry lock before invocation. This keeps the lock out of callback
/// bodies, which may re-enter the owning service.
pub struct Callbacks<T> {
    inner: Mutex<Vec<CallbackEntry<T>>>,
}

impl<T> Callbacks<T> {
    /// Create a new empty callback registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback to be invoked on snapshot updates.
    ///
    /// Returns a `CallbackId` that can be used to unregister the callback.
    pub fn register<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = CallbackId::new();
        self.inner.lock().push(CallbackEntry {
            id,
            callback: Arc::new(callback),
        });
        id
    }

    /// Unregister a callback by its ID.
    ///
    /// Returns `true` if the callback was found and removed.
    pub fn unregister(&self, id: CallbackId) -> bool {
        let mut inner = self.inner.lock();
        let len_before = inner.len();
        inner.retain(|entry| entry.id != id);
        inner.len() < len_before
    }

    /// Notify all registered callbacks with the given snapshot.
    pub fn notify(&self, snapshot: &T) {
        let callbacks: Vec<_> = self
            .inner
            .lock()
            .iter()
            .map(|entry| entry.callback.clone())
            .collect();
        for cb in callbacks {
            cb(snapshot);
        }
    }

    /// Notify a single callback by its ID with the given snapshot.
    ///
    /// This is how a newly registered callback receives the current state
    /// without re-notifying every other consumer.
    ///
    /// Returns `true` if the callback was found and invoked.
    pub fn notify_single(&self, id: CallbackId, snapshot: &T) -> bool {
        let callback = self
            .inner
            .lock()
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.callback.clone());

        if let Some(cb) = callback {
            cb(snapshot);
            true
        } else {
            false
        }
    }

    /// Returns true if no callbacks are registered.
    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Returns the number of registered callbacks.
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Self::new()
    }
}
