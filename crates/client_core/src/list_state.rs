use std::collections::HashMap;

use parking_lot::Mutex;
use shared::protocol::DEFAULT_PAGE_SIZE;
use tracing::debug;

use crate::reactive::Signal;

/// Search and pagination cells for one list. Clones share the same
/// cells; any holder may write any field and the last write wins.
#[derive(Clone, Debug)]
pub struct ListState {
    pub search: Signal<String>,
    pub page: Signal<u32>,
    pub page_size: Signal<u32>,
}

impl ListState {
    fn with_defaults() -> Self {
        Self {
            search: Signal::new(String::new()),
            page: Signal::new(1),
            page_size: Signal::new(DEFAULT_PAGE_SIZE),
        }
    }

    fn restore_defaults(&self) {
        self.search.set(String::new());
        self.page_size.set(DEFAULT_PAGE_SIZE);
        self.page.set(1);
    }
}

/// Session-scoped map from list key (e.g. `"localities"`) to its shared
/// state. Hand one registry to every consumer that should see the same
/// lists; separate registries never share state.
#[derive(Default)]
pub struct ListStateRegistry {
    states: Mutex<HashMap<String, ListState>>,
}

impl ListStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, key: &str) -> ListState {
        let mut states = self.states.lock();
        states
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(key, "list state: created");
                ListState::with_defaults()
            })
            .clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.states.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.states.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Puts a list back to its defaults in place, so existing observers
    /// keep receiving updates. Returns false for an unknown key.
    pub fn reset(&self, key: &str) -> bool {
        let state = self.states.lock().get(key).cloned();
        match state {
            Some(state) => {
                state.restore_defaults();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "tests/list_state_tests.rs"]
mod tests;
