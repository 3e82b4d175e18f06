//! Core domain types for tender notices.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

use crate::decision::Decision;

// ---------------------------------------------------------------------------
// NoticeId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for stored notice rows (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoticeId(pub Uuid);

impl NoticeId {
    /// Generate a new time-sortable notice identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for NoticeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NoticeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for NoticeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Identity and change detection
// ---------------------------------------------------------------------------

/// Stable identity of a notice across crawls.
///
/// Either `source:{id}` when the site exposes an item id, or
/// `source:index_{position}_hash_{title8}` otherwise. The positional form is
/// not stable when the list order shifts between runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    const PREFIX: &'static str = "source:";

    /// Key from a stable source item id. Title, URL and position are ignored.
    pub fn from_source_id(id: &str) -> Self {
        Self(format!("{}{}", Self::PREFIX, id.trim()))
    }

    /// Positional fallback key for items without a source id.
    pub fn from_position(position: usize, title: &str) -> Self {
        let digest = sha256_hex(title.trim());
        Self(format!("{}index_{position}_hash_{}", Self::PREFIX, &digest[..8]))
    }

    /// Whether this key came from the positional fallback.
    pub fn is_positional(&self) -> bool {
        self.0.starts_with("source:index_")
    }

    /// Rehydrate a key read back from storage.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 digest of normalized notice text. Change detection only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of(normalized_text: &str) -> Self {
        Self(sha256_hex(normalized_text))
    }

    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Listing and candidate
// ---------------------------------------------------------------------------

/// One row of a notice list page or API payload, before identity is assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticeListing {
    pub title: String,
    pub url: Option<Url>,
    /// Stable id exposed by the source, if any.
    pub source_item_id: Option<String>,
    pub published_at: Option<NaiveDate>,
    /// Content delivered with the listing (API payloads), skipping the detail fetch.
    pub inline_content: Option<String>,
    /// Zero-based position in the list.
    pub position: usize,
}

/// A notice with its fetched content and assigned identity.
///
/// Built once per crawl pass and consumed by the pipeline; the canonical key
/// cannot change after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct NoticeCandidate {
    pub title: String,
    pub url: Option<Url>,
    pub source_item_id: Option<String>,
    pub published_at: Option<NaiveDate>,
    pub raw_content: String,
    canonical_key: CanonicalKey,
}

impl NoticeCandidate {
    /// Assign identity to a listing and attach its fetched content.
    pub fn from_listing(listing: NoticeListing, raw_content: String) -> Self {
        let canonical_key = match listing.source_item_id.as_deref() {
            Some(id) if !id.trim().is_empty() => CanonicalKey::from_source_id(id),
            _ => CanonicalKey::from_position(listing.position, &listing.title),
        };
        Self {
            title: listing.title,
            url: listing.url,
            source_item_id: listing.source_item_id,
            published_at: listing.published_at,
            raw_content,
            canonical_key,
        }
    }

    pub fn canonical_key(&self) -> &CanonicalKey {
        &self.canonical_key
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Structured fields pulled from notice text. Empty string means absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub deadline: String,
    #[serde(default)]
    pub tonnage: String,
    #[serde(default)]
    pub qualification: String,
}

impl ExtractedFields {
    /// Non-empty field values in a fixed order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        [
            &self.location,
            &self.scope,
            &self.deadline,
            &self.tonnage,
            &self.qualification,
        ]
        .into_iter()
        .map(String::as_str)
        .filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.values().next().is_none()
    }
}

// ---------------------------------------------------------------------------
// Storage records
// ---------------------------------------------------------------------------

/// Notice fields handed to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticeFields {
    pub canonical_key: CanonicalKey,
    pub title: String,
    pub url: Option<String>,
    pub source_item_id: Option<String>,
    pub published_at: Option<NaiveDate>,
    pub raw_text: String,
    pub content_hash: ContentHash,
    pub extracted: ExtractedFields,
}

/// A persisted notice, as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeRecord {
    pub id: NoticeId,
    pub canonical_key: CanonicalKey,
    pub title: String,
    pub url: Option<String>,
    pub source_item_id: Option<String>,
    pub published_at: Option<NaiveDate>,
    pub raw_text: String,
    pub content_hash: ContentHash,
    pub extracted: ExtractedFields,
    pub decision: Option<Decision>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: Option<&str>, position: usize, title: &str) -> NoticeListing {
        NoticeListing {
            title: title.into(),
            url: None,
            source_item_id: id.map(Into::into),
            published_at: None,
            inline_content: None,
            position,
        }
    }

    #[test]
    fn notice_id_roundtrip() {
        let id = NoticeId::new();
        let parsed: NoticeId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn source_id_key_ignores_title_and_position() {
        let a = NoticeCandidate::from_listing(listing(Some("123"), 0, "钢结构厂房"), String::new());
        let mut other = listing(Some("123"), 7, "completely different");
        other.url = Some(Url::parse("https://example.com/moved").unwrap());
        let b = NoticeCandidate::from_listing(other, String::new());
        assert_eq!(a.canonical_key(), b.canonical_key());
        assert_eq!(a.canonical_key().as_str(), "source:123");
        assert!(!a.canonical_key().is_positional());
    }

    #[test]
    fn positional_key_uses_title_hash_prefix() {
        let key = CanonicalKey::from_position(3, "某厂房钢结构工程招标公告");
        let s = key.as_str();
        assert!(s.starts_with("source:index_3_hash_"));
        assert_eq!(s.len(), "source:index_3_hash_".len() + 8);
        assert!(key.is_positional());
        assert_eq!(key, CanonicalKey::from_position(3, "某厂房钢结构工程招标公告"));
        assert_ne!(key, CanonicalKey::from_position(4, "某厂房钢结构工程招标公告"));
    }

    #[test]
    fn blank_source_id_falls_back_to_position() {
        let c = NoticeCandidate::from_listing(listing(Some("  "), 2, "title"), String::new());
        assert!(c.canonical_key().is_positional());
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = ContentHash::of("招标公告 正文");
        let b = ContentHash::of("招标公告 正文");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_ne!(a, ContentHash::of("招标公告 正文。"));
    }

    #[test]
    fn extracted_fields_values_skip_empty() {
        let fields = ExtractedFields {
            location: "成都".into(),
            tonnage: "1000吨".into(),
            ..Default::default()
        };
        assert_eq!(fields.values().collect::<Vec<_>>(), vec!["成都", "1000吨"]);
        assert!(!fields.is_empty());
        assert!(ExtractedFields::default().is_empty());
    }
}
