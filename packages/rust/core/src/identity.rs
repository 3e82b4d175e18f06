//! Notice identity and change detection.

use tracing::{debug, warn};

use tenderwatch_shared::{ContentHash, NoticeCandidate, NoticeListing};

/// How a freshly fetched notice relates to what is stored under its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    /// No stored record for the key.
    New,
    /// Stored record exists with a different content hash (or the run is forced).
    Changed,
    /// Stored record has the same content hash; nothing to do.
    Unchanged,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Changed => "changed",
            Self::Unchanged => "unchanged",
        }
    }

    /// Whether the notice goes on to scoring and the decision engine.
    pub fn needs_processing(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Compare a fetched hash against the stored one.
pub fn classify(stored: Option<&ContentHash>, fetched: &ContentHash, force: bool) -> ChangeStatus {
    match stored {
        Some(old) if !force && old == fetched => ChangeStatus::Unchanged,
        Some(_) => ChangeStatus::Changed,
        None => ChangeStatus::New,
    }
}

/// Build a candidate and assign its canonical key.
pub fn resolve(listing: NoticeListing, raw_content: String) -> NoticeCandidate {
    let candidate = NoticeCandidate::from_listing(listing, raw_content);
    let key = candidate.canonical_key();
    if key.is_positional() {
        warn!(%key, title = %candidate.title, "no source id, using positional key");
    } else {
        debug!(%key, "identity assigned");
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: Option<&str>, position: usize) -> NoticeListing {
        NoticeListing {
            title: "成都钢结构厂房".into(),
            url: None,
            source_item_id: id.map(String::from),
            published_at: None,
            inline_content: None,
            position,
        }
    }

    #[test]
    fn classify_detects_new_changed_unchanged() {
        let a = ContentHash::of("a");
        let b = ContentHash::of("b");
        assert_eq!(classify(None, &a, false), ChangeStatus::New);
        assert_eq!(classify(Some(&a), &b, false), ChangeStatus::Changed);
        assert_eq!(classify(Some(&a), &a, false), ChangeStatus::Unchanged);
    }

    #[test]
    fn force_marks_unchanged_as_changed() {
        let a = ContentHash::of("a");
        assert_eq!(classify(Some(&a), &a, true), ChangeStatus::Changed);
        assert_eq!(classify(None, &a, true), ChangeStatus::New);
        assert!(classify(Some(&a), &a, true).needs_processing());
        assert!(!classify(Some(&a), &a, false).needs_processing());
    }

    #[test]
    fn resolve_prefers_source_id() {
        let candidate = resolve(listing(Some("881"), 4), "text".into());
        assert_eq!(candidate.canonical_key().as_str(), "source:881");

        let positional = resolve(listing(None, 4), "text".into());
        assert!(positional.canonical_key().is_positional());
        assert!(positional.canonical_key().as_str().starts_with("source:index_4_hash_"));
    }
}
