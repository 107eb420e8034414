use super::*;
use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use parking_lot::Mutex;
use shared::{
    domain::{CountryRef, Locality},
    error::ErrorCode,
};
use tokio::{net::TcpListener, time::sleep};

type Scripted = (Duration, std::result::Result<ApiPage<u32>, FetchError>);
type Responder = Box<dyn Fn(u64, &QueryParams) -> Scripted + Send + Sync>;

struct ScriptedFetcher {
    calls: Mutex<Vec<QueryParams>>,
    respond: Responder,
}

impl ScriptedFetcher {
    fn new(
        respond: impl Fn(u64, &QueryParams) -> Scripted + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    fn calls(&self) -> Vec<QueryParams> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PageFetcher<u32> for ScriptedFetcher {
    async fn fetch_page(
        &self,
        _endpoint: &str,
        params: &QueryParams,
    ) -> std::result::Result<ApiPage<u32>, FetchError> {
        let call_no = {
            let mut calls = self.calls.lock();
            calls.push(params.clone());
            calls.len() as u64
        };
        let (delay, outcome) = (self.respond)(call_no, params);
        if !delay.is_zero() {
            sleep(delay).await;
        }
        outcome
    }
}

const ENDPOINT: &str = "http://api.test/localities/";

fn start(params: Signal<QueryParams>, fetcher: &Arc<ScriptedFetcher>) -> PaginatedResource<u32> {
    let fetcher: Arc<dyn PageFetcher<u32>> = fetcher.clone();
    PaginatedResource::new(ENDPOINT, params, fetcher)
}

fn page_of(count: u64, offset: u64) -> ApiPage<u32> {
    ApiPage::new(count, vec![offset as u32])
}

fn drain(events: &mut broadcast::Receiver<ListEvent>) -> Vec<ListEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn first_request_is_issued_on_construction() {
    let fetcher =
        ScriptedFetcher::new(|_, p| (Duration::from_millis(20), Ok(page_of(42, p.offset))));
    let params = Signal::new(QueryParams::derive(1, 20, ""));
    let resource = start(params, &fetcher);

    assert!(resource.pending().get());
    assert_eq!(resource.data().get(), None);

    sleep(Duration::from_millis(50)).await;

    assert!(!resource.pending().get());
    assert_eq!(resource.data().get(), Some(page_of(42, 0)));
    assert_eq!(fetcher.calls(), vec![QueryParams::derive(1, 20, "")]);
}

#[tokio::test(start_paused = true)]
async fn only_actual_param_changes_refetch() {
    let fetcher = ScriptedFetcher::new(|_, p| (Duration::ZERO, Ok(page_of(100, p.offset))));
    let params = Signal::new(QueryParams::derive(1, 20, ""));
    let resource = start(params.clone(), &fetcher);
    sleep(Duration::from_millis(1)).await;

    params.set(QueryParams::derive(1, 20, ""));
    params.set(QueryParams::derive(2, 20, ""));
    sleep(Duration::from_millis(1)).await;

    assert_eq!(resource.requests_issued(), 2);
    assert_eq!(fetcher.calls().last().map(|p| p.offset), Some(20));
    assert_eq!(resource.data().get(), Some(page_of(100, 20)));
}

#[tokio::test(start_paused = true)]
async fn superseded_response_is_discarded() {
    let fetcher = ScriptedFetcher::new(|call_no, p| {
        let delay = if call_no == 1 { 300 } else { 10 };
        (Duration::from_millis(delay), Ok(page_of(call_no, p.offset)))
    });
    let params = Signal::new(QueryParams::derive(1, 20, "par"));
    let resource = start(params.clone(), &fetcher);
    let mut events = resource.subscribe_events();

    params.set(QueryParams::derive(1, 20, "paris"));
    sleep(Duration::from_millis(400)).await;

    assert_eq!(resource.data().get(), Some(page_of(2, 0)));
    assert!(!resource.pending().get());
    let seen = drain(&mut events);
    assert!(seen.contains(&ListEvent::StaleDiscarded {
        request_id: 1,
        latest: 2
    }));
    assert!(seen.contains(&ListEvent::FetchSettled {
        request_id: 2,
        total: 2,
        returned: 1
    }));
}

#[tokio::test(start_paused = true)]
async fn pending_stays_true_until_latest_request_settles() {
    let fetcher = ScriptedFetcher::new(|call_no, p| {
        let delay = if call_no == 1 { 10 } else { 100 };
        (Duration::from_millis(delay), Ok(page_of(5, p.offset)))
    });
    let params = Signal::new(QueryParams::derive(1, 20, ""));
    let resource = start(params.clone(), &fetcher);

    params.set(QueryParams::derive(1, 20, "a"));
    sleep(Duration::from_millis(50)).await;
    assert!(resource.pending().get());

    sleep(Duration::from_millis(100)).await;
    assert!(!resource.pending().get());
}

#[tokio::test(start_paused = true)]
async fn failure_clears_data_and_recovers_on_refresh() {
    let fetcher = ScriptedFetcher::new(|call_no, p| match call_no {
        2 => (Duration::ZERO, Err(FetchError::status(503, "http://api.test/"))),
        _ => (Duration::ZERO, Ok(page_of(7, p.offset))),
    });
    let params = Signal::new(QueryParams::derive(1, 20, ""));
    let resource = start(params.clone(), &fetcher);
    sleep(Duration::from_millis(1)).await;

    resource.refresh();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(
        resource.error().get(),
        Some(FetchError::status(503, "http://api.test/"))
    );
    assert_eq!(resource.data().get(), None);
    assert!(!resource.pending().get());

    resource.refresh();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(resource.error().get(), None);
    assert_eq!(resource.data().get(), Some(page_of(7, 0)));
    assert_eq!(fetcher.calls().len(), 3);
}

#[derive(Clone, Default)]
struct QueryLog {
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

async fn list_localities(
    State(log): State<QueryLog>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    log.queries.lock().push(query);
    Json(serde_json::json!({
        "count": 41,
        "next": "http://api.test/localities/?limit=20&offset=20",
        "previous": null,
        "results": [
            {"id": 1, "name": "Pariisi", "name_en": "Paris", "country": {"id": 75, "name_en": "France"}},
            {"id": 2, "name": "Pärnu", "country": 3, "latitude": 58.38, "longitude": 24.5}
        ]
    }))
}

async fn spawn_list_server() -> Result<(String, QueryLog)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let log = QueryLog::default();
    let app = Router::new()
        .route("/localities/", get(list_localities))
        .route("/broken/", get(|| async { "not json" }))
        .route("/missing/", get(|| async { StatusCode::NOT_FOUND }))
        .with_state(log.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), log))
}

#[tokio::test]
async fn http_fetcher_sends_wire_params_and_decodes_page() {
    let (server_url, log) = spawn_list_server().await.expect("spawn server");
    let fetcher = HttpPageFetcher::new(Duration::from_secs(5)).expect("client");

    let page: ApiPage<Locality> = fetcher
        .fetch_page(
            &format!("{server_url}/localities/"),
            &QueryParams::derive(1, 20, " paris "),
        )
        .await
        .expect("page");

    assert_eq!(page.count, 41);
    assert_eq!(page.results.len(), 2);
    assert!(matches!(page.results[0].country, Some(CountryRef::Expanded(_))));
    assert!(matches!(page.results[1].country, Some(CountryRef::Id(_))));

    let queries = log.queries.lock().clone();
    assert_eq!(queries.len(), 1);
    let query = &queries[0];
    assert_eq!(query.get("limit").map(String::as_str), Some("20"));
    assert_eq!(query.get("offset").map(String::as_str), Some("0"));
    assert_eq!(query.get("expand").map(String::as_str), Some("country"));
    assert_eq!(query.get("name__icontains").map(String::as_str), Some("paris"));
}

#[tokio::test]
async fn http_fetcher_omits_filter_for_blank_search() {
    let (server_url, log) = spawn_list_server().await.expect("spawn server");
    let fetcher = HttpPageFetcher::default();

    let _: ApiPage<Locality> = fetcher
        .fetch_page(
            &format!("{server_url}/localities/"),
            &QueryParams::derive(3, 10, "   "),
        )
        .await
        .expect("page");

    let query = log.queries.lock()[0].clone();
    assert_eq!(query.get("offset").map(String::as_str), Some("20"));
    assert!(!query.contains_key("name__icontains"));
}

#[tokio::test]
async fn http_fetcher_maps_status_and_decode_failures() {
    let (server_url, _log) = spawn_list_server().await.expect("spawn server");
    let fetcher = HttpPageFetcher::default();
    let params = QueryParams::derive(1, 20, "");

    let missing_url = format!("{server_url}/missing/");
    let missing = PageFetcher::<Locality>::fetch_page(&fetcher, &missing_url, &params)
        .await
        .expect_err("404");
    assert!(matches!(
        missing,
        FetchError::Status {
            code: ErrorCode::NotFound,
            status: 404,
            ..
        }
    ));

    let broken_url = format!("{server_url}/broken/");
    let broken = PageFetcher::<Locality>::fetch_page(&fetcher, &broken_url, &params)
        .await
        .expect_err("decode");
    assert!(matches!(broken, FetchError::Decode { .. }));
}
