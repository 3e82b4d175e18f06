//! Headless rendering for JavaScript-driven pages.
//!
//! The fetch cascade only depends on the [`Renderer`] trait; the shipped
//! implementation talks to a Browserless instance over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;

use tenderwatch_shared::{RendererConfig, Result, TenderError};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Rendered page content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub html: String,
    /// URL after redirects, when the renderer reports it.
    pub final_url: Url,
}

/// Identifies one list row to click: the `index`-th element matching `css`
/// that contains a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSelector {
    pub css: String,
    pub index: usize,
}

impl RowSelector {
    /// Row at a list position on a table-based list page.
    pub fn table_row(position: usize) -> Self {
        Self {
            css: "tr".into(),
            index: position,
        }
    }
}

impl std::fmt::Display for RowSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.css, self.index)
    }
}

/// Renderer failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    #[error("renderer network error: {0}")]
    Network(String),

    #[error("renderer API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The requested row or id cannot be targeted.
    #[error("invalid render target: {0}")]
    InvalidTarget(String),
}

impl RenderError {
    /// Network errors and 5xx are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidTarget(_) => false,
        }
    }
}

impl From<reqwest::Error> for RenderError {
    fn from(err: reqwest::Error) -> Self {
        RenderError::Network(err.to_string())
    }
}

/// Headless browser collaborator.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Load a URL with JavaScript enabled and return the resulting document.
    async fn render_fetch(&self, url: &Url) -> std::result::Result<RenderedPage, RenderError>;

    /// Open the list page, click a row, and return the detail content it leads to.
    async fn render_and_click(
        &self,
        row: &RowSelector,
        list_url: &Url,
    ) -> std::result::Result<String, RenderError>;

    /// Open the list page, click the row carrying a source id, and return the detail content.
    async fn render_detail_by_id(
        &self,
        id: &str,
        base_url: &Url,
    ) -> std::result::Result<String, RenderError>;
}

// ---------------------------------------------------------------------------
// Browserless
// ---------------------------------------------------------------------------

/// Puppeteer script run by Browserless `/function`: open `context.url`, take
/// the `context.index`-th clickable match of `context.selector`, click it and
/// return the HTML of the page (or popup) it opens. A match that is itself a
/// link or carries an `onclick` handler is clicked directly; a container row
/// is clicked through its first link or handler.
const CLICK_SCRIPT: &str = r#"export default async function ({ page, context }) {
  await page.goto(context.url, { waitUntil: "networkidle2", timeout: context.timeout });
  const targets = [];
  for (const el of await page.$$(context.selector)) {
    const direct = await el.evaluate((n) => n.tagName === "A" || n.hasAttribute("onclick"));
    const target = direct ? el : await el.$("a, [onclick]");
    if (target) targets.push(target);
  }
  const target = targets[context.index];
  if (!target) throw new Error(`no clickable match ${context.index} for ${context.selector}`);
  const popup = new Promise((resolve) =>
    page.browser().once("targetcreated", async (t) => resolve(await t.page())));
  await target.click();
  const opened = await Promise.race([popup, new Promise((r) => setTimeout(() => r(null), 5000))]);
  const result = opened || page;
  await result.waitForNetworkIdle({ idleTime: 500, timeout: context.timeout }).catch(() => {});
  return { data: await result.content(), type: "text/html" };
}"#;

/// [`Renderer`] backed by a Browserless instance.
pub struct BrowserlessRenderer {
    client: Client,
    base_url: String,
    token: Option<String>,
    headless: bool,
    navigation_timeout: Duration,
}

impl BrowserlessRenderer {
    pub fn new(endpoint: &str, token: Option<String>, config: &RendererConfig) -> Result<Self> {
        let navigation_timeout = Duration::from_secs(config.navigation_timeout_secs);
        let client = Client::builder()
            .timeout(navigation_timeout + Duration::from_secs(15))
            .build()
            .map_err(|e| TenderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            token,
            headless: config.headless,
            navigation_timeout,
        })
    }

    /// Build from config. Returns `None` when no endpoint is configured.
    pub fn from_config(config: &RendererConfig) -> Result<Option<Self>> {
        match &config.endpoint {
            Some(endpoint) => Self::new(endpoint, config.token(), config).map(Some),
            None => Ok(None),
        }
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, RenderError> {
        let mut url = Url::parse(&format!("{}/{path}", self.base_url))
            .map_err(|e| RenderError::InvalidTarget(format!("bad renderer endpoint: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(token) = &self.token {
                query.append_pair("token", token);
            }
            query.append_pair("launch", &json!({ "headless": self.headless }).to_string());
        }
        Ok(url)
    }

    async fn click(&self, selector: &str, index: usize, list_url: &Url) -> std::result::Result<String, RenderError> {
        let body = json!({
            "code": CLICK_SCRIPT,
            "context": {
                "url": list_url.as_str(),
                "selector": selector,
                "index": index,
                "timeout": self.navigation_timeout.as_millis() as u64,
            }
        });

        let resp = self
            .client
            .post(self.endpoint("function")?)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RenderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}

#[async_trait]
impl Renderer for BrowserlessRenderer {
    #[instrument(skip_all, fields(url = %url))]
    async fn render_fetch(&self, url: &Url) -> std::result::Result<RenderedPage, RenderError> {
        let body = json!({
            "url": url.as_str(),
            "gotoOptions": {
                "waitUntil": "networkidle2",
                "timeout": self.navigation_timeout.as_millis() as u64,
            }
        });

        let resp = self
            .client
            .post(self.endpoint("content")?)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RenderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let final_url = resp
            .headers()
            .get("x-response-url")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Url::parse(v).ok())
            .unwrap_or_else(|| url.clone());
        let html = resp.text().await?;
        debug!(bytes = html.len(), "rendered page");

        Ok(RenderedPage { html, final_url })
    }

    #[instrument(skip_all, fields(row = %row, list_url = %list_url))]
    async fn render_and_click(
        &self,
        row: &RowSelector,
        list_url: &Url,
    ) -> std::result::Result<String, RenderError> {
        self.click(&row.css, row.index, list_url).await
    }

    #[instrument(skip_all, fields(id = id))]
    async fn render_detail_by_id(
        &self,
        id: &str,
        base_url: &Url,
    ) -> std::result::Result<String, RenderError> {
        let selector = id_selector(id)?;
        self.click(&selector, 0, base_url).await
    }
}

/// Selector alternatives for elements carrying a source id: data attributes and
/// click handlers match the clickable element itself, the last one matches a
/// row whose link points at the id.
fn id_selector_parts(id: &str) -> std::result::Result<Vec<String>, RenderError> {
    let safe = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !safe {
        return Err(RenderError::InvalidTarget(format!(
            "source id {id:?} cannot be used in a selector"
        )));
    }
    Ok(vec![
        format!("[data-id=\"{id}\"]"),
        format!("[data-notice-id=\"{id}\"]"),
        format!("[onclick*=\"'{id}'\"]"),
        format!("[onclick*=\"({id})\"]"),
        format!("tr:has(a[href*=\"{id}\"])"),
    ])
}

fn id_selector(id: &str) -> std::result::Result<String, RenderError> {
    Ok(id_selector_parts(id)?.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn renderer(server: &MockServer, token: Option<&str>) -> BrowserlessRenderer {
        let config = RendererConfig {
            endpoint: Some(server.uri()),
            ..RendererConfig::default()
        };
        BrowserlessRenderer::new(&server.uri(), token.map(String::from), &config).unwrap()
    }

    #[tokio::test]
    async fn render_fetch_posts_to_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/content"))
            .and(query_param("token", "secret"))
            .and(body_partial_json(json!({ "url": "https://example.com/list" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-response-url", "https://example.com/list?page=1")
                    .set_body_string("<html><body>rendered</body></html>"),
            )
            .mount(&server)
            .await;

        let url = Url::parse("https://example.com/list").unwrap();
        let page = renderer(&server, Some("secret")).render_fetch(&url).await.unwrap();
        assert!(page.html.contains("rendered"));
        assert_eq!(page.final_url.as_str(), "https://example.com/list?page=1");
    }

    #[tokio::test]
    async fn click_sends_selector_and_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/function"))
            .and(body_partial_json(json!({ "context": { "selector": "tr", "index": 4 } })))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>detail</html>"))
            .mount(&server)
            .await;

        let url = Url::parse("https://example.com/list").unwrap();
        let html = renderer(&server, None)
            .render_and_click(&RowSelector::table_row(4), &url)
            .await
            .unwrap();
        assert_eq!(html, "<html>detail</html>");
    }

    #[tokio::test]
    async fn api_errors_carry_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/content"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let url = Url::parse("https://example.com/").unwrap();
        let err = renderer(&server, None).render_fetch(&url).await.unwrap_err();
        assert!(matches!(err, RenderError::Api { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn unsafe_id_rejected_without_request() {
        let server = MockServer::start().await;
        let url = Url::parse("https://example.com/").unwrap();
        let err = renderer(&server, None)
            .render_detail_by_id("1\"] , body", &url)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidTarget(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn id_selector_covers_attributes_and_handlers() {
        let sel = id_selector("A-42").unwrap();
        assert!(sel.contains("[data-id=\"A-42\"]"));
        assert!(sel.contains("[onclick*=\"'A-42'\"]"));
    }

    #[test]
    fn onclick_anchor_is_its_own_click_target() {
        let html = scraper::Html::parse_document(
            r#"<table><tr>
              <td><a href="javascript:void(0)" onclick="showDetail('8812')">重庆 某桥梁钢结构工程</a></td>
              <td>2024-03-02</td>
            </tr></table>"#,
        );

        let matched: Vec<_> = id_selector_parts("8812")
            .unwrap()
            .iter()
            .filter(|part| !part.contains(":has("))
            .flat_map(|part| {
                let sel = scraper::Selector::parse(part).unwrap();
                html.select(&sel).collect::<Vec<_>>()
            })
            .collect();

        assert_eq!(matched.len(), 1);
        let anchor = matched[0].value();
        assert_eq!(anchor.name(), "a");
        assert!(anchor.attr("onclick").is_some());
        // The anchor has no descendant link, so the script must click the match itself.
        assert!(CLICK_SCRIPT.contains(r#"n.tagName === "A" || n.hasAttribute("onclick")"#));
        assert!(CLICK_SCRIPT.contains("direct ? el : await el.$(\"a, [onclick]\")"));
    }

    #[tokio::test]
    async fn detail_by_id_sends_id_selector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/function"))
            .and(body_partial_json(json!({ "context": { "selector": id_selector("8812").unwrap(), "index": 0 } })))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>8812</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse("https://example.com/list").unwrap();
        let html = renderer(&server, None).render_detail_by_id("8812", &url).await.unwrap();
        assert_eq!(html, "<html>8812</html>");
    }
}
