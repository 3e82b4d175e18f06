//! Parser for JSON notice-list payloads.
//!
//! Sites disagree on envelope and field names, so each field is read from the
//! first of several known keys.

use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use tracing::debug;
use url::Url;

use tenderwatch_shared::NoticeListing;

const TITLE_KEYS: &[&str] = &["title", "noticeTitle", "name"];
const URL_KEYS: &[&str] = &["url", "link", "detailUrl"];
const ID_KEYS: &[&str] = &["id", "noticeId", "tenderId"];
const DATE_KEYS: &[&str] = &["publishDate", "createTime", "date", "publishTime"];
const CONTENT_KEYS: &[&str] = &["content", "summary"];

/// Where relative links and id-only items resolve to.
#[derive(Debug, Clone)]
pub struct ListingContext {
    pub base_url: Url,
    /// Detail path template with an `{id}` placeholder.
    pub detail_path: String,
}

impl ListingContext {
    fn detail_url(&self, id: &str) -> Option<Url> {
        self.base_url
            .join(&self.detail_path.replace("{id}", id))
            .ok()
    }
}

/// Whether a response body carries a list-like field.
pub fn has_list_field(body: &Value) -> bool {
    list_items(body).is_some()
}

/// Locate the item array inside a list response.
pub fn list_items(body: &Value) -> Option<&Vec<Value>> {
    if let Some(items) = body.as_array() {
        return Some(items);
    }
    let data = body.get("data");
    data.and_then(Value::as_array)
        .or_else(|| data.and_then(|d| d.get("list")).and_then(Value::as_array))
        .or_else(|| data.and_then(|d| d.get("records")).and_then(Value::as_array))
        .or_else(|| body.get("list").and_then(Value::as_array))
        .or_else(|| body.get("records").and_then(Value::as_array))
}

/// Parse a list response into listings. Items without a title are dropped.
///
/// `position_offset` is the list position of the first item on this page.
pub fn parse_api_response(body: &Value, ctx: &ListingContext, position_offset: usize) -> Vec<NoticeListing> {
    let Some(items) = list_items(body) else {
        return Vec::new();
    };

    let listings: Vec<NoticeListing> = items
        .iter()
        .filter_map(|item| {
            let title = first_string(item, TITLE_KEYS)?;
            let source_item_id = first_string(item, ID_KEYS);
            let url = first_string(item, URL_KEYS)
                .and_then(|href| ctx.base_url.join(&href).ok())
                .or_else(|| source_item_id.as_deref().and_then(|id| ctx.detail_url(id)));
            let published_at = DATE_KEYS
                .iter()
                .filter_map(|key| item.get(*key))
                .find_map(parse_date);
            let inline_content = first_string(item, CONTENT_KEYS);
            Some((title, url, source_item_id, published_at, inline_content))
        })
        .enumerate()
        .map(
            |(i, (title, url, source_item_id, published_at, inline_content))| NoticeListing {
                title,
                url,
                source_item_id,
                published_at,
                inline_content,
                position: position_offset + i,
            },
        )
        .collect();

    debug!(items = items.len(), listings = listings.len(), "parsed api page");
    listings
}

/// First non-empty value among `keys`, with numbers rendered as strings.
fn first_string(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match item.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// `YYYY-MM-DD` / `YYYY/MM/DD` prefixes, or epoch milliseconds.
fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => {
            let prefix: String = s.trim().chars().take(10).collect();
            NaiveDate::parse_from_str(&prefix, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(&prefix, "%Y/%m/%d"))
                .ok()
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| dt.date_naive()),
        _ => None,
    }
}
