//! Minimal synchronous observable cells.
//!
//! A [`Signal`] notifies its subscribers in registration order, on the
//! thread that wrote it, before `set` returns. Subscribers are invoked
//! with the lock released, so they may write other signals (or the same
//! one); a nested write can make the value passed to a later subscriber
//! stale, which is why derivations read `get()` rather than trusting the
//! argument.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use parking_lot::Mutex;

type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct SignalInner<T> {
    value: Mutex<T>,
    subscribers: Mutex<Vec<(u64, Subscriber<T>)>>,
    next_id: AtomicU64,
}

pub struct Signal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signal").field(&*self.inner.value.lock()).finish()
    }
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                value: Mutex::new(value),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.value.lock().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.lock())
    }

    /// Stores `value` and notifies subscribers if it differs from the
    /// current one. Returns whether anything changed.
    pub fn set(&self, value: T) -> bool {
        {
            let mut guard = self.inner.value.lock();
            if *guard == value {
                return false;
            }
            *guard = value.clone();
        }
        self.notify(&value);
        true
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut next = self.get();
        f(&mut next);
        self.set(next)
    }

    pub fn subscribe(&self, f: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push((id, Arc::new(f)));
        let weak: Weak<SignalInner<T>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers.lock().retain(|(sub_id, _)| *sub_id != id);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    fn notify(&self, value: &T) {
        let subscribers: Vec<Subscriber<T>> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        for subscriber in subscribers {
            subscriber(value);
        }
    }
}

/// Unsubscribes when dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/reactive_tests.rs"]
mod tests;
