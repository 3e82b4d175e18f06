//! Multi-tier fetch cascade.
//!
//! Content is acquired by trying strategies in order (direct HTTP, JSON API
//! discovery, headless render, interactive click) and stopping at the first
//! one that yields usable content. Tier failures are logged and fall through;
//! only an exhausted cascade is reported, and only for the item at hand.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use tenderwatch_discovery::{
    ApiEndpoint, DiscoveryOptions, DiscoveryResult, ListingContext, list_items, parse_api_response,
};
use tenderwatch_shared::{
    AppConfig, FetchConfig, FetchError, FetchFailureKind, NoticeListing, Result, SourceConfig,
    TenderError, TierConfig,
};

use crate::listing::parse_notice_list;
use crate::renderer::{RenderError, Renderer, RowSelector};

/// Maximum redirects followed by direct fetches.
const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One strategy of the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTier {
    Direct,
    Api,
    Render,
    Interactive,
}

impl FetchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Api => "api",
            Self::Render => "render",
            Self::Interactive => "interactive",
        }
    }
}

impl std::fmt::Display for FetchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of fetched content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Json,
}

/// Content produced by a successful tier.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub content: String,
    pub final_url: Url,
    pub tier: FetchTier,
    pub kind: ContentKind,
}

/// What a cascade is fetching, which decides the tiers that apply.
struct FetchRequest<'a> {
    url: Option<&'a Url>,
    /// List page to fall back to for the API and interactive tiers.
    list_url: &'a Url,
    /// Row to click for the interactive tier.
    row: Option<RowTarget<'a>>,
    tiers: &'a [FetchTier],
}

#[derive(Clone, Copy)]
enum RowTarget<'a> {
    Id(&'a str),
    Position(usize),
}

// ---------------------------------------------------------------------------
// FetchOrchestrator
// ---------------------------------------------------------------------------

/// Runs the fetch cascade for list pages and notice details.
pub struct FetchOrchestrator {
    client: Client,
    config: FetchConfig,
    source: SourceConfig,
    base_url: Url,
    list_url: Url,
    renderer: Option<Arc<dyn Renderer>>,
    /// Endpoint discovered on first use, cached for the run. Failed
    /// discoveries are not cached, so a later list fetch discovers again.
    api_endpoint: Mutex<Option<ApiEndpoint>>,
}

impl FetchOrchestrator {
    /// Build from config. Without a renderer the render and interactive tiers are skipped.
    pub fn new(config: &AppConfig, renderer: Option<Arc<dyn Renderer>>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.fetch.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| TenderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: config.fetch.clone(),
            source: config.source.clone(),
            base_url: config.source.base_url()?,
            list_url: config.source.list_url()?,
            renderer,
            api_endpoint: Mutex::new(None),
        })
    }

    pub fn list_url(&self) -> &Url {
        &self.list_url
    }

    /// Fetch an arbitrary page: direct, then rendered.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &Url) -> std::result::Result<Fetched, FetchError> {
        let request = FetchRequest {
            url: Some(url),
            list_url: &self.list_url,
            row: None,
            tiers: &[FetchTier::Direct, FetchTier::Render],
        };
        self.run_cascade(&request, |_| Some(())).await.map(|(_, f)| f)
    }

    /// Fetch the notice list: direct HTML, then API discovery, then rendered HTML.
    ///
    /// A tier only succeeds if its content parses into at least one listing.
    #[instrument(skip_all, fields(list_url = %self.list_url))]
    pub async fn fetch_list(&self) -> std::result::Result<Vec<NoticeListing>, FetchError> {
        let request = FetchRequest {
            url: Some(&self.list_url),
            list_url: &self.list_url,
            row: None,
            tiers: &[FetchTier::Direct, FetchTier::Api, FetchTier::Render],
        };
        let ctx = ListingContext {
            base_url: self.base_url.clone(),
            detail_path: self.source.detail_path.clone(),
        };

        let (listings, fetched) = self
            .run_cascade(&request, |fetched| {
                let listings = match fetched.kind {
                    ContentKind::Html => parse_notice_list(&fetched.content, &fetched.final_url),
                    ContentKind::Json => serde_json::from_str::<Value>(&fetched.content)
                        .map(|body| parse_api_response(&body, &ctx, 0))
                        .unwrap_or_default(),
                };
                (!listings.is_empty()).then_some(listings)
            })
            .await?;

        info!(tier = %fetched.tier, listings = listings.len(), "notice list fetched");
        Ok(listings)
    }

    /// Fetch one notice's detail content: direct, rendered, then interactive click.
    #[instrument(skip_all, fields(title = %listing.title, position = listing.position))]
    pub async fn fetch_detail(&self, listing: &NoticeListing) -> std::result::Result<Fetched, FetchError> {
        let fallback_url = match (&listing.url, &listing.source_item_id) {
            (None, Some(id)) => self.source.detail_url(id).ok(),
            _ => None,
        };
        let url = listing.url.as_ref().or(fallback_url.as_ref());
        let row = match listing.source_item_id.as_deref() {
            Some(id) => RowTarget::Id(id),
            None => RowTarget::Position(listing.position),
        };

        let request = FetchRequest {
            url,
            list_url: &self.list_url,
            row: Some(row),
            tiers: &[FetchTier::Direct, FetchTier::Render, FetchTier::Interactive],
        };
        self.run_cascade(&request, |_| Some(())).await.map(|(_, f)| f)
    }

    // -----------------------------------------------------------------------
    // Cascade
    // -----------------------------------------------------------------------

    /// Try each tier in order until one passes the size threshold and `accept`.
    async fn run_cascade<T>(
        &self,
        request: &FetchRequest<'_>,
        accept: impl Fn(&Fetched) -> Option<T>,
    ) -> std::result::Result<(T, Fetched), FetchError> {
        let mut failures: Vec<FetchError> = Vec::new();

        for &tier in request.tiers {
            debug!(%tier, "attempting fetch tier");
            let fetched = match self.try_tier(tier, request).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    warn!(%tier, kind = ?e.kind, error = %e.message, "fetch tier failed");
                    failures.push(e);
                    continue;
                }
            };

            // API content is accepted on structure, not size.
            let chars = fetched.content.chars().count();
            if fetched.kind == ContentKind::Html && chars < self.config.min_content_len {
                let e = FetchError::permanent(
                    tier.as_str(),
                    format!("content below threshold ({chars} < {} chars)", self.config.min_content_len),
                );
                warn!(%tier, error = %e.message, "fetch tier rejected");
                failures.push(e);
                continue;
            }

            match accept(&fetched) {
                Some(value) => {
                    info!(%tier, bytes = fetched.content.len(), final_url = %fetched.final_url, "fetch tier succeeded");
                    return Ok((value, fetched));
                }
                None => {
                    let e = FetchError::permanent(tier.as_str(), "content did not match expected structure");
                    warn!(%tier, error = %e.message, "fetch tier rejected");
                    failures.push(e);
                }
            }
        }

        let kind = if failures.iter().any(FetchError::is_transient) {
            FetchFailureKind::Transient
        } else {
            FetchFailureKind::Permanent
        };
        let summary = failures
            .iter()
            .map(|e| format!("{}: {}", e.tier, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(FetchError {
            kind,
            tier: "cascade".into(),
            message: if summary.is_empty() {
                "no applicable fetch tier".into()
            } else {
                format!("all tiers failed ({summary})")
            },
        })
    }

    async fn try_tier(&self, tier: FetchTier, request: &FetchRequest<'_>) -> std::result::Result<Fetched, FetchError> {
        match tier {
            FetchTier::Direct => {
                let url = request
                    .url
                    .ok_or_else(|| FetchError::permanent(tier.as_str(), "no url"))?;
                self.with_retries(tier, &self.config.direct, move |timeout| self.direct_fetch(url, timeout))
                    .await
            }
            FetchTier::Api => self.api_fetch().await,
            FetchTier::Render => {
                let renderer = self.renderer(tier)?;
                let url = request
                    .url
                    .ok_or_else(|| FetchError::permanent(tier.as_str(), "no url"))?;
                self.with_retries(tier, &self.config.render, move |timeout| async move {
                    let page = with_timeout(tier, timeout, renderer.render_fetch(url)).await?;
                    Ok(Fetched {
                        content: page.html,
                        final_url: page.final_url,
                        tier,
                        kind: ContentKind::Html,
                    })
                })
                .await
            }
            FetchTier::Interactive => {
                let renderer = self.renderer(tier)?;
                let row = request
                    .row
                    .ok_or_else(|| FetchError::permanent(tier.as_str(), "no row to click"))?;
                let list_url = request.list_url;
                self.with_retries(tier, &self.config.interactive, move |timeout| async move {
                    let content = match row {
                        RowTarget::Id(id) => {
                            with_timeout(tier, timeout, renderer.render_detail_by_id(id, list_url)).await?
                        }
                        RowTarget::Position(position) => {
                            let selector = RowSelector::table_row(position);
                            with_timeout(tier, timeout, renderer.render_and_click(&selector, list_url)).await?
                        }
                    };
                    Ok(Fetched {
                        content,
                        final_url: list_url.clone(),
                        tier,
                        kind: ContentKind::Html,
                    })
                })
                .await
            }
        }
    }

    fn renderer(&self, tier: FetchTier) -> std::result::Result<&Arc<dyn Renderer>, FetchError> {
        self.renderer
            .as_ref()
            .ok_or_else(|| FetchError::permanent(tier.as_str(), "no renderer configured"))
    }

    async fn with_retries<F, Fut>(
        &self,
        tier: FetchTier,
        tier_config: &TierConfig,
        operation: F,
    ) -> std::result::Result<Fetched, FetchError>
    where
        F: Fn(Duration) -> Fut,
        Fut: Future<Output = std::result::Result<Fetched, FetchError>>,
    {
        let timeout = tier_config.timeout();
        tier_config
            .retry_policy()
            .run(tier.as_str(), FetchError::is_transient, |_| operation(timeout))
            .await
    }

    // -----------------------------------------------------------------------
    // Tier 1: direct
    // -----------------------------------------------------------------------

    async fn direct_fetch(&self, url: &Url, timeout: Duration) -> std::result::Result<Fetched, FetchError> {
        let tier = FetchTier::Direct.as_str();
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::transient(tier, format!("{url}: {e}")))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(FetchError::transient(tier, format!("{url}: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(FetchError::permanent(tier, format!("{url}: HTTP {status}")));
        }

        let final_url = response.url().clone();
        let content = response
            .text()
            .await
            .map_err(|e| FetchError::transient(tier, format!("{url}: failed to read body: {e}")))?;

        Ok(Fetched {
            content,
            final_url,
            tier: FetchTier::Direct,
            kind: ContentKind::Html,
        })
    }

    // -----------------------------------------------------------------------
    // Tier 2: API discovery
    // -----------------------------------------------------------------------

    /// The run's API endpoint, probing for it when none is cached yet.
    ///
    /// A fresh discovery also returns the accepted discovery body when it was
    /// requested with the list page size, so page 1 is not fetched twice.
    async fn api_endpoint(&self) -> std::result::Result<(ApiEndpoint, Option<Value>), FetchError> {
        let tier = FetchTier::Api;
        let mut cached = self.api_endpoint.lock().await;
        if let Some(endpoint) = cached.as_ref() {
            return Ok((endpoint.clone(), None));
        }

        let opts = DiscoveryOptions {
            api_paths: self.source.api_paths.clone(),
            discovery_page_size: self.source.discovery_page_size,
        };
        let discovered = with_timeout(
            tier,
            self.config.api.timeout() * (opts.api_paths.len() as u32 * 3).max(1),
            async {
                tenderwatch_discovery::discover(&self.client, &self.base_url, &opts)
                    .await
                    .map_err(|e| FetchError::permanent(tier.as_str(), e.to_string()))
            },
        )
        .await?;

        match discovered {
            DiscoveryResult::Found { endpoint, first_page } => {
                *cached = Some(endpoint.clone());
                let first_page = (opts.discovery_page_size == self.source.page_size).then_some(first_page);
                Ok((endpoint, first_page))
            }
            DiscoveryResult::NotFound => Err(FetchError::permanent(tier.as_str(), "no api endpoint discovered")),
        }
    }

    /// Read up to `max_list_pages` pages from the discovered endpoint and
    /// return their items as one `{"list": [...]}` document.
    async fn api_fetch(&self) -> std::result::Result<Fetched, FetchError> {
        let tier = FetchTier::Api;
        let tier_config = &self.config.api;

        let (endpoint, mut first_page) = self.api_endpoint().await?;
        let endpoint = &endpoint;

        let policy = tier_config.retry_policy();
        let mut items: Vec<Value> = Vec::new();
        for page in 1..=self.source.max_list_pages.max(1) {
            let body = match first_page.take() {
                Some(body) => Ok(body),
                None => {
                    policy
                        .run(tier.as_str(), FetchError::is_transient, move |_| {
                            with_timeout(tier, tier_config.timeout(), async move {
                                tenderwatch_discovery::fetch_page(&self.client, endpoint, page, self.source.page_size)
                                    .await
                                    .map_err(|e| match e {
                                        TenderError::Network(msg) => FetchError::transient(tier.as_str(), msg),
                                        other => FetchError::permanent(tier.as_str(), other.to_string()),
                                    })
                            })
                        })
                        .await
                }
            };

            let body = match body {
                Ok(body) => body,
                Err(e) if page > 1 => {
                    warn!(page, error = %e.message, "api page failed, keeping earlier pages");
                    break;
                }
                Err(e) => return Err(e),
            };

            let page_items = list_items(&body).cloned().unwrap_or_default();
            debug!(page, items = page_items.len(), "api page fetched");
            if page_items.is_empty() {
                break;
            }
            items.extend(page_items);
        }

        let content = serde_json::json!({ "list": items }).to_string();
        Ok(Fetched {
            content,
            final_url: endpoint.url.clone(),
            tier,
            kind: ContentKind::Json,
        })
    }
}

/// Bound a tier attempt; an elapsed timeout is a transient failure.
async fn with_timeout<T, E, Fut>(
    tier: FetchTier,
    timeout: Duration,
    fut: Fut,
) -> std::result::Result<T, FetchError>
where
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<FetchError>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(|e| {
            let mut e: FetchError = e.into();
            e.tier = tier.as_str().into();
            e
        }),
        Err(_) => Err(FetchError::transient(
            tier.as_str(),
            format!("timed out after {}s", timeout.as_secs()),
        )),
    }
}

impl From<RenderError> for FetchError {
    fn from(err: RenderError) -> Self {
        let kind = if err.is_transient() {
            FetchFailureKind::Transient
        } else {
            FetchFailureKind::Permanent
        };
        FetchError {
            kind,
            tier: "render".into(),
            message: err.to_string(),
        }
    }
}
