use std::{sync::Arc, time::Duration};

use parking_lot::{Mutex, ReentrantMutex};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::debug;

use crate::reactive::{Signal, Subscription};

#[derive(Default)]
struct TimerSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
    disposed: bool,
}

impl TimerSlot {
    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Trails a source signal by a fixed delay. Only the value present when
/// the source has been quiet for `delay` is ever committed; a burst of
/// writes yields one commit.
///
/// At most one timer is pending. Dropping the cell (or calling
/// [`Debounced::dispose`]) aborts it, and no write reaches the output
/// afterwards, even when the timer has already fired on another worker:
/// teardown waits for an in-progress commit to finish.
pub struct Debounced<T> {
    output: Signal<T>,
    slot: Arc<Mutex<TimerSlot>>,
    commit: Arc<ReentrantMutex<()>>,
    source_subscription: Option<Subscription>,
}

impl<T> Debounced<T>
where
    T: Clone + PartialEq + Send + Sync + std::fmt::Debug + 'static,
{
    /// Must be called from within a tokio runtime.
    pub fn new(source: &Signal<T>, delay: Duration) -> Self {
        Self::with_runtime(source, delay, Handle::current())
    }

    pub fn with_runtime(source: &Signal<T>, delay: Duration, runtime: Handle) -> Self {
        let output = Signal::new(source.get());
        let slot = Arc::new(Mutex::new(TimerSlot::default()));
        let commit = Arc::new(ReentrantMutex::new(()));

        let subscription = {
            let slot = Arc::clone(&slot);
            let commit = Arc::clone(&commit);
            let source = source.clone();
            let output = output.clone();
            source.clone().subscribe(move |_| {
                let mut guard = slot.lock();
                if guard.disposed {
                    return;
                }
                guard.cancel();
                guard.generation += 1;
                let generation = guard.generation;

                let slot = Arc::clone(&slot);
                let commit = Arc::clone(&commit);
                let source = source.clone();
                let output = output.clone();
                guard.handle = Some(runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _commit = commit.lock();
                    {
                        let mut guard = slot.lock();
                        if guard.disposed || guard.generation != generation {
                            return;
                        }
                        guard.handle = None;
                    }
                    let value = source.get();
                    debug!(?value, delay_ms = delay.as_millis() as u64, "debounce: commit");
                    output.set(value);
                }));
            })
        };

        Self {
            output,
            slot,
            commit,
            source_subscription: Some(subscription),
        }
    }

    pub fn value(&self) -> Signal<T> {
        self.output.clone()
    }

    pub fn get(&self) -> T {
        self.output.get()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().handle.is_some()
    }

    pub fn dispose(&mut self) {
        {
            let _commit = self.commit.lock();
            let mut guard = self.slot.lock();
            if guard.disposed {
                return;
            }
            guard.disposed = true;
            guard.cancel();
        }
        self.source_subscription.take();
    }
}

impl<T> Drop for Debounced<T> {
    fn drop(&mut self) {
        let _commit = self.commit.lock();
        let mut guard = self.slot.lock();
        guard.disposed = true;
        guard.cancel();
    }
}

#[cfg(test)]
#[path = "tests/debounce_tests.rs"]
mod tests;
