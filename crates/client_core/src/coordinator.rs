//! The list-query state machine.
//!
//! Inputs are the shared [`ListState`] cells and a debounced view of the
//! search text. Effects are registered so that one write settles
//! completely, in this order, before control returns to the writer:
//!
//! * debounced search or page size changes reset `page` to 1, then params
//!   are derived (so params never see the pre-reset page);
//! * `page` changes are clamped to `1..=total_pages`, then params are
//!   derived (so an out-of-range page is never requested);
//! * a settled page updates `results`/`total`, which may shrink
//!   `total_pages` and clamp `page`.
//!
//! The clamp only applies once this list holds a settled page. `page` is
//! shared by every list on the same key, and a list that has not loaded
//! yet has no page count to correct it against.
//!
//! Params are only written when they differ, so a clamp that changes
//! nothing never causes a request.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use shared::{
    domain::Locality,
    error::FetchError,
    protocol::{total_pages, QueryParams, DEFAULT_PAGE_SIZE, LOCALITIES_KEY},
};
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    config::ClientSettings,
    debounce::Debounced,
    list_state::{ListState, ListStateRegistry},
    reactive::{Signal, Subscription},
    resource::{HttpPageFetcher, ListEvent, PageFetcher, PaginatedResource},
};

pub type LocalityList = ListQuery<Locality>;

type Effect = Arc<dyn Fn() + Send + Sync>;

pub struct ListQuery<T> {
    _effects: Vec<Subscription>,
    state: ListState,
    debounced: Debounced<String>,
    params: Signal<QueryParams>,
    resource: PaginatedResource<T>,
    results: Signal<Vec<T>>,
    total: Signal<u64>,
    total_pages: Signal<u32>,
}

fn on_change<V>(signal: &Signal<V>, effects: &[&Effect]) -> Subscription
where
    V: Clone + PartialEq + Send + 'static,
{
    let effects: Vec<Effect> = effects.iter().map(|e| Arc::clone(e)).collect();
    signal.subscribe(move |_| {
        for effect in &effects {
            effect();
        }
    })
}

impl<T> ListQuery<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Wires the state machine and issues the first request. Must be
    /// called from within a tokio runtime.
    pub fn new(
        state: ListState,
        endpoint: impl Into<String>,
        fetcher: Arc<dyn PageFetcher<T>>,
        search_debounce: Duration,
    ) -> Self {
        let debounced = Debounced::new(&state.search, search_debounce);
        let search = debounced.value();
        let ListState {
            page, page_size, ..
        } = state.clone();

        let params = Signal::new(QueryParams::derive(
            page.get(),
            page_size.get(),
            &search.get(),
        ));
        let resource = PaginatedResource::new(endpoint, params.clone(), fetcher);
        let data = resource.data();

        let results = Signal::new(Vec::new());
        let total = Signal::new(0u64);
        let total_pages_cell = Signal::new(total_pages(0, page_size.get()));

        let derive_params: Effect = {
            let (page, page_size, search, params) = (
                page.clone(),
                page_size.clone(),
                search.clone(),
                params.clone(),
            );
            Arc::new(move || {
                let next = QueryParams::derive(page.get(), page_size.get(), &search.get());
                if params.set(next) {
                    debug!(params = ?params.get(), "list: params changed");
                }
            })
        };

        let reset_page: Effect = {
            let page = page.clone();
            Arc::new(move || {
                if page.set(1) {
                    debug!("list: page reset to 1");
                }
            })
        };

        let clamp_page: Effect = {
            let (page, total_pages, data) =
                (page.clone(), total_pages_cell.clone(), data.clone());
            Arc::new(move || {
                if !data.with(Option::is_some) {
                    return;
                }
                let current = page.get();
                let clamped = current.clamp(1, total_pages.get().max(1));
                if clamped != current {
                    debug!(from = current, to = clamped, "list: page clamped");
                    page.set(clamped);
                }
            })
        };

        let recompute_pages: Effect = {
            let (total, page_size, total_pages_cell) =
                (total.clone(), page_size.clone(), total_pages_cell.clone());
            Arc::new(move || {
                total_pages_cell.set(total_pages(total.get(), page_size.get()));
            })
        };

        let absorb_page: Effect = {
            let (data, results, total) = (data.clone(), results.clone(), total.clone());
            Arc::new(move || {
                let (items, count) = data.with(|page| match page {
                    Some(page) => (page.results.clone(), page.count),
                    None => (Vec::new(), 0),
                });
                results.set(items);
                total.set(count);
            })
        };

        let effects = vec![
            on_change(&search, &[&reset_page, &derive_params]),
            on_change(&page_size, &[&reset_page, &recompute_pages, &derive_params]),
            on_change(&page, &[&clamp_page, &derive_params]),
            on_change(&total_pages_cell, &[&clamp_page]),
            on_change(&total, &[&recompute_pages]),
            on_change(&data, &[&absorb_page, &clamp_page]),
        ];

        Self {
            _effects: effects,
            state,
            debounced,
            params,
            resource,
            results,
            total,
            total_pages: total_pages_cell,
        }
    }

    pub fn results(&self) -> Signal<Vec<T>> {
        self.results.clone()
    }

    pub fn total(&self) -> Signal<u64> {
        self.total.clone()
    }

    pub fn total_pages(&self) -> Signal<u32> {
        self.total_pages.clone()
    }

    pub fn pending(&self) -> Signal<bool> {
        self.resource.pending()
    }

    pub fn error(&self) -> Signal<Option<FetchError>> {
        self.resource.error()
    }

    pub fn page(&self) -> Signal<u32> {
        self.state.page.clone()
    }

    pub fn page_size(&self) -> Signal<u32> {
        self.state.page_size.clone()
    }

    /// The raw, undebounced search text. Bind input fields to this.
    pub fn search(&self) -> Signal<String> {
        self.state.search.clone()
    }

    pub fn debounced_search(&self) -> Signal<String> {
        self.debounced.value()
    }

    pub fn params(&self) -> Signal<QueryParams> {
        self.params.clone()
    }

    pub fn endpoint(&self) -> &str {
        self.resource.endpoint()
    }

    pub fn refresh(&self) -> u64 {
        self.resource.refresh()
    }

    pub fn requests_issued(&self) -> u64 {
        self.resource.requests_issued()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ListEvent> {
        self.resource.subscribe_events()
    }

    pub fn set_search(&self, text: impl Into<String>) {
        self.state.search.set(text.into());
    }

    pub fn set_page(&self, page: u32) {
        self.state.page.set(page);
    }

    pub fn set_page_size(&self, page_size: u32) {
        self.state.page_size.set(page_size);
    }

    pub fn next_page(&self) -> bool {
        let current = self.state.page.get();
        current < self.total_pages.get() && self.state.page.set(current + 1)
    }

    pub fn prev_page(&self) -> bool {
        let current = self.state.page.get();
        current > 1 && self.state.page.set(current - 1)
    }
}

impl ListQuery<Locality> {
    /// Builds the `localities` list over HTTP, sharing its state through
    /// `registry`. A freshly created state takes the configured page size.
    pub fn connect(settings: &ClientSettings, registry: &ListStateRegistry) -> Result<Self> {
        let endpoint = settings.endpoint()?;
        let fetcher: Arc<dyn PageFetcher<Locality>> =
            Arc::new(HttpPageFetcher::new(settings.request_timeout)?);

        let is_new = !registry.contains(LOCALITIES_KEY);
        let state = registry.state(LOCALITIES_KEY);
        if is_new && settings.page_size != DEFAULT_PAGE_SIZE {
            state.page_size.set(settings.page_size);
        }

        Ok(Self::new(
            state,
            endpoint.as_str(),
            fetcher,
            settings.search_debounce,
        ))
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
