use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use client_core::{load_settings, ListEvent, ListStateRegistry, LocalityList};
use futures::StreamExt;
use shared::{domain::Locality, format, protocol::LOCALITIES_KEY};
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "localities", about = "Browse the public localities list")]
struct Args {
    /// Overrides `api_base` from localities.toml / APP__API_BASE.
    #[arg(long)]
    api_base: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long)]
    page_size: Option<u32>,
    /// Case-insensitive substring match on the locality name.
    #[arg(long)]
    search: Option<String>,
    /// Print the page as JSON instead of a table.
    #[arg(long)]
    json: bool,
    #[arg(long, default_value_t = 30)]
    wait_secs: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(api_base) = args.api_base {
        settings.api_base = api_base;
    }
    if let Some(page_size) = args.page_size {
        settings.page_size = page_size.max(1);
    }

    // Seed the shared state before wiring the list so the first request
    // already carries the requested search and page.
    let registry = ListStateRegistry::new();
    let state = registry.state(LOCALITIES_KEY);
    state.search.set(args.search.unwrap_or_default());
    state.page_size.set(settings.page_size);
    state.page.set(args.page.max(1));

    let list = LocalityList::connect(&settings, &registry)?;
    let events = BroadcastStream::new(list.subscribe_events());

    tokio::time::timeout(
        Duration::from_secs(args.wait_secs),
        wait_for_latest(&list, events),
    )
    .await
    .with_context(|| format!("no response from {} within {}s", list.endpoint(), args.wait_secs))??;

    if args.json {
        print_json(&list)?;
    } else {
        print_table(&list);
    }
    Ok(())
}

/// Resolves once the most recently issued request has settled. A settle
/// can clamp the page and issue another request, so earlier ones are
/// skipped.
async fn wait_for_latest(
    list: &LocalityList,
    mut events: BroadcastStream<ListEvent>,
) -> Result<()> {
    while let Some(event) = events.next().await {
        match event {
            Ok(ListEvent::FetchSettled { request_id, .. })
                if request_id == list.requests_issued() =>
            {
                return Ok(());
            }
            Ok(ListEvent::FetchFailed { request_id, error })
                if request_id == list.requests_issued() =>
            {
                return Err(anyhow::Error::new(error).context("failed to load localities"));
            }
            Ok(_) => {}
            Err(err) => warn!("cli: missed list events: {err}"),
        }
    }
    Err(anyhow!("list event stream closed"))
}

fn print_json(list: &LocalityList) -> Result<()> {
    let body = serde_json::json!({
        "page": list.page().get(),
        "page_size": list.page_size().get(),
        "total": list.total().get(),
        "total_pages": list.total_pages().get(),
        "results": list.results().get(),
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn row(locality: &Locality) -> String {
    format!(
        "{:>7}  {:<32}  {:<18}  {:>10}  {:>10}  {:>9}  {}",
        locality.id.0,
        truncate(&format::locality_name(locality), 32),
        truncate(&format::country_label(locality.country.as_ref()), 18),
        format::coordinate(locality.latitude),
        format::coordinate(locality.longitude),
        format::display_value(locality.elevation),
        format::date_value(locality.date_changed.as_deref()),
    )
}

fn print_table(list: &LocalityList) {
    let results = list.results().get();
    println!(
        "{:>7}  {:<32}  {:<18}  {:>10}  {:>10}  {:>9}  {}",
        "id", "name", "country", "lat", "lng", "elevation", "changed"
    );
    for locality in &results {
        println!("{}", row(locality));
    }
    let search = list.search().get();
    let filter = if search.trim().is_empty() {
        String::new()
    } else {
        format!(" matching \"{}\"", search.trim())
    };
    println!(
        "page {}/{} ({} localities{filter})",
        list.page().get(),
        list.total_pages().get(),
        list.total().get(),
    );
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
