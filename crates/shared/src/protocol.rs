use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const LOCALITIES_KEY: &str = "localities";
pub const LOCALITIES_PATH: &str = "localities/";
pub const EXPAND_COUNTRY: &str = "country";
pub const NAME_FILTER_PARAM: &str = "name__icontains";
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(350);

/// One page of a list endpoint. `count` is the total across all pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiPage<T> {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

impl<T> ApiPage<T> {
    pub fn new(count: u64, results: Vec<T>) -> Self {
        Self {
            count,
            next: None,
            previous: None,
            results,
        }
    }
}

/// Query string sent to the list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryParams {
    pub limit: u32,
    pub offset: u64,
    pub expand: String,
    #[serde(
        rename = "name__icontains",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub name_filter: Option<String>,
}

impl QueryParams {
    /// Pure derivation from list state. `search` must already be the
    /// debounced value; blank searches mean "no filter".
    pub fn derive(page: u32, page_size: u32, search: &str) -> Self {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let search = search.trim();
        Self {
            limit: page_size,
            offset: u64::from(page - 1) * u64::from(page_size),
            expand: EXPAND_COUNTRY.to_string(),
            name_filter: (!search.is_empty()).then(|| search.to_string()),
        }
    }
}

pub fn total_pages(total: u64, page_size: u32) -> u32 {
    let page_size = u64::from(page_size.max(1));
    let pages = total.div_ceil(page_size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
