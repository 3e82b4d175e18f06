//! JSON list-endpoint discovery for notice sources.
//!
//! Many notice sites render their list pages from a JSON API. Before falling
//! back to a headless browser, TenderWatch tries a fixed set of candidate
//! endpoint paths with the common pagination parameter shapes and accepts the
//! first response that carries a list-like field.

mod parser;

use reqwest::Client;
use serde_json::Value;
use tenderwatch_shared::{Result, TenderError};
use tracing::{debug, info, instrument};
use url::Url;

pub use parser::{ListingContext, has_list_field, list_items, parse_api_response};

/// Maximum response size we consider valid (10 MB).
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Endpoint shapes
// ---------------------------------------------------------------------------

/// Pagination parameter naming used by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageParamShape {
    /// `page` + `pageSize`
    PagePageSize,
    /// `pageNo` + `pageSize`
    PageNoPageSize,
    /// `current` + `size`
    CurrentSize,
}

impl PageParamShape {
    /// All shapes, in probing order.
    pub const ALL: [PageParamShape; 3] = [
        PageParamShape::PagePageSize,
        PageParamShape::PageNoPageSize,
        PageParamShape::CurrentSize,
    ];

    fn param_names(&self) -> (&'static str, &'static str) {
        match self {
            Self::PagePageSize => ("page", "pageSize"),
            Self::PageNoPageSize => ("pageNo", "pageSize"),
            Self::CurrentSize => ("current", "size"),
        }
    }
}

/// An accepted JSON list endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    pub url: Url,
    pub shape: PageParamShape,
}

impl ApiEndpoint {
    /// URL for one page (1-based).
    pub fn page_url(&self, page: u32, size: u32) -> Url {
        let (page_key, size_key) = self.shape.param_names();
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair(page_key, &page.to_string())
            .append_pair(size_key, &size.to_string());
        url
    }
}

// ---------------------------------------------------------------------------
// DiscoveryResult
// ---------------------------------------------------------------------------

/// Outcome of endpoint probing.
#[derive(Debug, Clone)]
pub enum DiscoveryResult {
    /// An endpoint answered with list-shaped JSON.
    Found {
        endpoint: ApiEndpoint,
        /// Body of the accepted discovery response.
        first_page: Value,
    },
    /// No candidate answered usefully; caller should render the list page.
    NotFound,
}

/// Configuration for the discovery process.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Candidate paths, relative to the site root.
    pub api_paths: Vec<String>,
    /// Page size used for probing.
    pub discovery_page_size: u32,
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Try candidate endpoints under `base` until one returns list-shaped JSON.
///
/// Individual request failures are logged at debug and skipped; only a bad
/// base URL is an error.
#[instrument(skip_all, fields(base = %base))]
pub async fn discover(client: &Client, base: &Url, opts: &DiscoveryOptions) -> Result<DiscoveryResult> {
    for path in &opts.api_paths {
        let url = base
            .join(path)
            .map_err(|e| TenderError::validation(format!("bad api path {path}: {e}")))?;

        for shape in PageParamShape::ALL {
            let endpoint = ApiEndpoint {
                url: url.clone(),
                shape,
            };
            let page_url = endpoint.page_url(1, opts.discovery_page_size);

            match fetch_json(client, &page_url).await {
                Ok(body) if has_list_field(&body) => {
                    info!(endpoint = %url, ?shape, "api endpoint discovered");
                    return Ok(DiscoveryResult::Found {
                        endpoint,
                        first_page: body,
                    });
                }
                Ok(_) => debug!(url = %page_url, "response has no list field"),
                Err(e) => debug!(url = %page_url, error = %e, "candidate request failed"),
            }
        }
    }

    info!("no api endpoint found");
    Ok(DiscoveryResult::NotFound)
}

/// Fetch one page of an accepted endpoint.
pub async fn fetch_page(client: &Client, endpoint: &ApiEndpoint, page: u32, size: u32) -> Result<Value> {
    fetch_json(client, &endpoint.page_url(page, size)).await
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a URL and parse the body as JSON.
async fn fetch_json(client: &Client, url: &Url) -> Result<Value> {
    let response = client
        .get(url.clone())
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| TenderError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(TenderError::Network(format!("{url}: HTTP {status}")));
    }

    if let Some(len) = response.content_length() {
        if len > MAX_RESPONSE_SIZE {
            return Err(TenderError::validation(format!(
                "{url}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
            )));
        }
    }

    let body = response
        .text()
        .await
        .map_err(|e| TenderError::Network(format!("{url}: failed to read body: {e}")))?;

    serde_json::from_str(&body).map_err(|e| TenderError::parse(format!("{url}: not JSON: {e}")))
}
