//! Notice text extraction.
//!
//! Turns fetched content (an HTML detail page or plain text from an API
//! payload) into normalized text, then pulls candidate structured fields out
//! of that text with ordered patterns.

mod cleanup;
mod fields;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

use tenderwatch_shared::{ExtractedFields, ExtractionError};

pub use fields::extract_fields;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Normalized text and the fields found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Trimmed non-empty lines joined with `\n`.
    pub text: String,
    pub fields: ExtractedFields,
}

/// Elements never considered notice content.
const STRIPPED_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "noscript", "iframe", "svg", "form",
    "button", "select",
];

/// Elements that start a new line when flattened.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "table", "tbody", "thead", "tr", "li", "ul", "ol",
    "h1", "h2", "h3", "h4", "h5", "h6", "dl", "dt", "dd", "blockquote", "pre", "hr",
];

/// Content containers, tried in order before falling back to `<body>`.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "[class*=\"detail\"]",
    "[class*=\"content\"]",
    "[class*=\"article\"]",
    "main",
    "[class*=\"main\"]",
];

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Extract normalized text and structured fields from fetched content.
#[instrument(skip(content), fields(content_len = content.len()))]
pub fn extract(content: &str) -> Result<Extraction, ExtractionError> {
    let flattened = if looks_like_html(content) {
        html_to_text(content)
    } else {
        content.to_string()
    };

    let text = cleanup::run_pipeline(&flattened);
    if text.is_empty() {
        return Err(ExtractionError("no text content after normalization".into()));
    }

    let fields = extract_fields(&text);
    debug!(
        text_chars = text.chars().count(),
        fields_found = fields.values().count(),
        "extraction complete"
    );

    Ok(Extraction { text, fields })
}

fn looks_like_html(content: &str) -> bool {
    static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)<(?:!doctype|html|body|div|p|table|span|br|td|article|section|main)\b")
            .expect("valid regex")
    });
    TAG_RE.is_match(content)
}

/// Flatten the best content container of an HTML document to text.
fn html_to_text(html: &str) -> String {
    let doc = Html::parse_document(html);

    for sel_str in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(sel_str) else {
            continue;
        };
        let best = doc
            .select(&selector)
            .filter(|el| !inside_stripped(el))
            .map(flatten)
            .filter(|text| !text.trim().is_empty())
            .max_by_key(|text| text.trim().len());
        if let Some(text) = best {
            debug!(container = sel_str, "using content container");
            return text;
        }
    }

    match Selector::parse("body") {
        Ok(body_sel) => doc
            .select(&body_sel)
            .next()
            .map(flatten)
            .unwrap_or_else(|| flatten(doc.root_element())),
        Err(_) => flatten(doc.root_element()),
    }
}

fn inside_stripped(el: &ElementRef) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| STRIPPED_TAGS.contains(&a.value().name()))
}

fn flatten(el: ElementRef) -> String {
    let mut out = String::new();
    flatten_into(el, &mut out);
    out
}

fn flatten_into(el: ElementRef, out: &mut String) {
    let name = el.value().name();
    if STRIPPED_TAGS.contains(&name) {
        return;
    }
    if name == "br" {
        out.push('\n');
        return;
    }

    let block = BLOCK_TAGS.contains(&name);
    if block {
        out.push('\n');
    }
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            flatten_into(child_el, out);
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
    if block {
        out.push('\n');
    } else if matches!(name, "td" | "th") {
        out.push(' ');
    }
}
