//! HTML notice-list parsing and source-id recovery.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use tenderwatch_shared::NoticeListing;

/// Attributes that carry a stable item id on list markup.
const ID_ATTRIBUTES: &[&str] = &[
    "data-id",
    "data-notice-id",
    "data-noticeid",
    "data-tender-id",
    "data-key",
];

/// Query parameters that carry a stable item id in detail links.
const ID_QUERY_KEYS: &[&str] = &["id", "noticeId", "tenderId"];

static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href], a[onclick]").expect("valid selector"));
static HIDDEN_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[type=\"hidden\"]").expect("valid selector"));
static ANY_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("*").expect("valid selector"));

/// Parse table rows with a link into listings.
///
/// Positions count only rows that contain a link, matching
/// [`RowSelector::table_row`](crate::RowSelector::table_row).
pub fn parse_notice_list(html: &str, base_url: &Url) -> Vec<NoticeListing> {
    let doc = Html::parse_document(html);

    let listings: Vec<NoticeListing> = doc
        .select(&ROW_SEL)
        .filter(|row| row.select(&LINK_SEL).next().is_some())
        .enumerate()
        .filter_map(|(position, row)| parse_row(row, position, base_url))
        .collect();

    debug!(listings = listings.len(), "parsed html notice list");
    listings
}

fn parse_row(row: ElementRef, position: usize, base_url: &Url) -> Option<NoticeListing> {
    let link = row.select(&LINK_SEL).next()?;

    let title = link
        .value()
        .attr("title")
        .map(str::to_string)
        .unwrap_or_else(|| link.text().collect::<String>());
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        return None;
    }

    let url = link
        .value()
        .attr("href")
        .filter(|href| !href.trim_start().to_ascii_lowercase().starts_with("javascript:"))
        .filter(|href| !href.trim().is_empty() && *href != "#")
        .and_then(|href| base_url.join(href.trim()).ok());

    let row_text: String = row.text().collect();
    let published_at = parse_list_date(&row_text);

    Some(NoticeListing {
        title,
        source_item_id: source_item_id(row, url.as_ref()),
        url,
        published_at,
        inline_content: None,
        position,
    })
}

/// Recover a stable item id from a list row.
///
/// Checked in order: id data attributes on the row or its descendants,
/// inline event handlers and `javascript:` links, hidden form fields whose
/// name mentions an id, then id query parameters on the detail link.
pub fn source_item_id(row: ElementRef, detail_url: Option<&Url>) -> Option<String> {
    let elements = || std::iter::once(row).chain(row.select(&ANY_SEL));

    let from_attr = elements().find_map(|el| {
        ID_ATTRIBUTES
            .iter()
            .find_map(|attr| el.value().attr(attr))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    });
    if from_attr.is_some() {
        return from_attr;
    }

    let from_handler = elements().find_map(|el| {
        let handler = el
            .value()
            .attr("onclick")
            .or_else(|| el.value().attr("href").filter(|h| h.starts_with("javascript:")))?;
        id_from_handler(handler)
    });
    if from_handler.is_some() {
        return from_handler;
    }

    let from_hidden = row.select(&HIDDEN_SEL).find_map(|input| {
        let name = input.value().attr("name")?.to_ascii_lowercase();
        if !name.contains("id") {
            return None;
        }
        input
            .value()
            .attr("value")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    });
    if from_hidden.is_some() {
        return from_hidden;
    }

    detail_url.and_then(|url| {
        url.query_pairs()
            .find(|(k, v)| ID_QUERY_KEYS.iter().any(|key| **key == **k) && !v.is_empty())
            .map(|(_, v)| v.into_owned())
    })
}

/// First quoted or bare argument of a handler call, e.g. `showDetail('8812')`.
fn id_from_handler(handler: &str) -> Option<String> {
    static CALL_ARG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"\(\s*['"]?([A-Za-z0-9_-]{2,})['"]?\s*[,)]"#).expect("valid regex")
    });
    CALL_ARG_RE
        .captures(handler)
        .map(|caps| caps[1].to_string())
}

/// First `YYYY-MM-DD` or `YYYY/MM/DD` date in a row.
fn parse_list_date(text: &str) -> Option<NaiveDate> {
    static DATE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(\d{4})[-/](\d{1,2})[-/](\d{1,2})").expect("valid regex"));
    let caps = DATE_RE.captures(text)?;
    NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_PAGE: &str = r#"<html><body>
<table class="notice-list">
  <thead><tr><th>标题</th><th>发布日期</th></tr></thead>
  <tbody>
    <tr data-id="NT-1001">
      <td><a href="/consult/notice/detail?x=1" title="成都钢结构厂房 招标公告">成都钢结构厂房...</a></td>
      <td>2025-02-14</td>
    </tr>
    <tr>
      <td><a href="javascript:void(0)" onclick="showDetail('8812')">重庆 某桥梁钢结构工程</a></td>
      <td>2025/2/3</td>
    </tr>
    <tr>
      <td><input type="hidden" name="noticeId" value="H-77"><a href="detail.html">贵阳场馆钢结构</a></td>
      <td>发布于 2025-01-30</td>
    </tr>
    <tr>
      <td><a href="/notice/view?noticeId=555">昆明光伏支架采购</a></td>
      <td>n/a</td>
    </tr>
    <tr>
      <td><a href="/notice/plain">无编号公告</a></td>
      <td></td>
    </tr>
    <tr><td>没有链接的行</td></tr>
  </tbody>
</table>
</body></html>"#;

    fn base() -> Url {
        Url::parse("https://bid.example.cn/consult/notice").unwrap()
    }

    #[test]
    fn parses_rows_with_links() {
        let listings = parse_notice_list(LIST_PAGE, &base());
        assert_eq!(listings.len(), 5);
        assert_eq!(listings[0].title, "成都钢结构厂房 招标公告");
        assert_eq!(
            listings[0].url.as_ref().unwrap().as_str(),
            "https://bid.example.cn/consult/notice/detail?x=1"
        );
        assert_eq!(listings[0].published_at, NaiveDate::from_ymd_opt(2025, 2, 14));
        assert_eq!(listings[1].published_at, NaiveDate::from_ymd_opt(2025, 2, 3));
        assert_eq!(listings[3].published_at, None);
        assert_eq!(
            listings.iter().map(|l| l.position).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn recovers_source_ids_from_markup() {
        let listings = parse_notice_list(LIST_PAGE, &base());
        let ids: Vec<Option<&str>> = listings
            .iter()
            .map(|l| l.source_item_id.as_deref())
            .collect();
        assert_eq!(
            ids,
            vec![Some("NT-1001"), Some("8812"), Some("H-77"), Some("555"), None]
        );
    }

    #[test]
    fn javascript_links_have_no_url() {
        let listings = parse_notice_list(LIST_PAGE, &base());
        assert!(listings[1].url.is_none());
        assert_eq!(listings[1].title, "重庆 某桥梁钢结构工程");
    }

    #[test]
    fn handler_argument_forms() {
        assert_eq!(id_from_handler("openNotice(12345)").as_deref(), Some("12345"));
        assert_eq!(id_from_handler("view(\"ab_9\", 2)").as_deref(), Some("ab_9"));
        assert_eq!(id_from_handler("toggle()"), None);
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(parse_notice_list("<html><body><div id=app></div></body></html>", &base()).is_empty());
    }
}
