use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::{
    error::FetchError,
    protocol::{ApiPage, QueryParams},
};
use tokio::{runtime::Handle, sync::broadcast};
use tracing::{info, warn};

use crate::reactive::{Signal, Subscription};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum ListEvent {
    FetchStarted {
        request_id: u64,
        params: QueryParams,
    },
    FetchSettled {
        request_id: u64,
        total: u64,
        returned: usize,
    },
    FetchFailed {
        request_id: u64,
        error: FetchError,
    },
    StaleDiscarded {
        request_id: u64,
        latest: u64,
    },
}

#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    async fn fetch_page(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> std::result::Result<ApiPage<T>, FetchError>;
}

#[derive(Clone, Default)]
pub struct HttpPageFetcher {
    http: Client,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl<T> PageFetcher<T> for HttpPageFetcher
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch_page(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> std::result::Result<ApiPage<T>, FetchError> {
        let response = self
            .http
            .get(endpoint)
            .query(params)
            .send()
            .await
            .map_err(|err| FetchError::transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::status(status.as_u16(), response.url().as_str()));
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::transport(err.to_string()))?;
        serde_json::from_slice(&body).map_err(|err| FetchError::decode(err.to_string()))
    }
}

#[derive(Clone)]
struct FetchDriver<T> {
    endpoint: Arc<str>,
    fetcher: Arc<dyn PageFetcher<T>>,
    params: Signal<QueryParams>,
    data: Signal<Option<ApiPage<T>>>,
    pending: Signal<bool>,
    error: Signal<Option<FetchError>>,
    latest: Arc<AtomicU64>,
    events: broadcast::Sender<ListEvent>,
    runtime: Handle,
}

impl<T> FetchDriver<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn issue(&self) -> u64 {
        let request_id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let params = self.params.get();
        self.pending.set(true);
        info!(
            request_id,
            endpoint = %self.endpoint,
            limit = params.limit,
            offset = params.offset,
            filter = ?params.name_filter,
            "fetch: start"
        );
        let _ = self.events.send(ListEvent::FetchStarted {
            request_id,
            params: params.clone(),
        });

        let driver = self.clone();
        self.runtime.spawn(async move {
            let outcome = driver
                .fetcher
                .fetch_page(&driver.endpoint, &params)
                .await;
            driver.settle(request_id, outcome);
        });
        request_id
    }

    fn is_latest(&self, request_id: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == request_id
    }

    fn settle(&self, request_id: u64, outcome: std::result::Result<ApiPage<T>, FetchError>) {
        if !self.is_latest(request_id) {
            let latest = self.latest.load(Ordering::SeqCst);
            warn!(request_id, latest, "fetch: discarding superseded response");
            let _ = self
                .events
                .send(ListEvent::StaleDiscarded { request_id, latest });
            return;
        }

        match outcome {
            Ok(page) => {
                let total = page.count;
                let returned = page.results.len();
                info!(request_id, total, returned, "fetch: settled");
                self.error.set(None);
                self.data.set(Some(page));
                let _ = self.events.send(ListEvent::FetchSettled {
                    request_id,
                    total,
                    returned,
                });
            }
            Err(error) => {
                warn!(request_id, %error, "fetch: failed");
                self.error.set(Some(error.clone()));
                self.data.set(None);
                let _ = self
                    .events
                    .send(ListEvent::FetchFailed { request_id, error });
            }
        }

        // Writing `data` may have clamped the page and issued a newer
        // request; that one owns `pending` now.
        if self.is_latest(request_id) {
            self.pending.set(false);
        }
    }
}

/// Reactive view of a paginated endpoint. Every change of `params`
/// issues a request; only the most recently issued request may write
/// `data`, `pending` and `error`, so a slow superseded response can never
/// overwrite a newer one. A failed request sets `error` and clears
/// `data`, so rows from an earlier query are never shown beside it.
pub struct PaginatedResource<T> {
    driver: FetchDriver<T>,
    _params_subscription: Subscription,
}

impl<T> PaginatedResource<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Issues the first request immediately. Must be called from within a
    /// tokio runtime.
    pub fn new(
        endpoint: impl Into<String>,
        params: Signal<QueryParams>,
        fetcher: Arc<dyn PageFetcher<T>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let endpoint: String = endpoint.into();
        let driver = FetchDriver {
            endpoint: Arc::from(endpoint),
            fetcher,
            params: params.clone(),
            data: Signal::new(None),
            pending: Signal::new(false),
            error: Signal::new(None),
            latest: Arc::new(AtomicU64::new(0)),
            events,
            runtime: Handle::current(),
        };

        let subscription = {
            let driver = driver.clone();
            params.subscribe(move |_| {
                driver.issue();
            })
        };
        driver.issue();

        Self {
            driver,
            _params_subscription: subscription,
        }
    }

    pub fn data(&self) -> Signal<Option<ApiPage<T>>> {
        self.driver.data.clone()
    }

    pub fn pending(&self) -> Signal<bool> {
        self.driver.pending.clone()
    }

    pub fn error(&self) -> Signal<Option<FetchError>> {
        self.driver.error.clone()
    }

    pub fn endpoint(&self) -> &str {
        &self.driver.endpoint
    }

    /// Re-issues the request for the current params.
    pub fn refresh(&self) -> u64 {
        self.driver.issue()
    }

    /// Number of requests issued so far, including superseded ones.
    pub fn requests_issued(&self) -> u64 {
        self.driver.latest.load(Ordering::SeqCst)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ListEvent> {
        self.driver.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/resource_tests.rs"]
mod tests;
