//! Text normalization pipeline.
//!
//! Each pass is a function `&str -> String` applied in sequence. The result
//! is a list of trimmed, non-empty lines joined with `\n`.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full normalization pipeline on flattened text.
pub(crate) fn run_pipeline(text: &str) -> String {
    let mut result = text.to_string();

    result = normalize_line_endings(&result);
    result = decode_leftover_entities(&result);
    result = collapse_inline_whitespace(&result);
    result = drop_blank_lines(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Line endings
// ---------------------------------------------------------------------------

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

// ---------------------------------------------------------------------------
// Pass 2: Entities left in plain-text payloads
// ---------------------------------------------------------------------------

/// API payloads sometimes carry escaped markup fragments in otherwise plain text.
fn decode_leftover_entities(text: &str) -> String {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("valid regex"));

    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&");
    TAG_RE.replace_all(&text, " ").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Inline whitespace
// ---------------------------------------------------------------------------

/// Collapse tabs, non-breaking and full-width spaces into single spaces.
fn collapse_inline_whitespace(text: &str) -> String {
    static SPACE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t\u{a0}\u{3000}\u{200b}]+").expect("valid regex"));

    SPACE_RE.replace_all(text, " ").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Trim lines, drop blanks
// ---------------------------------------------------------------------------

fn drop_blank_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_becomes_lf() {
        assert_eq!(normalize_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn entities_and_stray_tags_removed() {
        let result = decode_leftover_entities("资质&nbsp;要求&lt;br&gt;<span>甲级</span>");
        assert!(!result.contains("&nbsp;"));
        assert!(!result.contains("<span>"));
        assert!(result.contains("甲级"));
    }

    #[test]
    fn full_width_spaces_collapse() {
        assert_eq!(collapse_inline_whitespace("重庆市\u{3000}\u{3000} 渝北区\t\t"), "重庆市 渝北区 ");
    }

    #[test]
    fn blank_lines_dropped_and_lines_trimmed() {
        assert_eq!(drop_blank_lines("  a \n\n \n b\n"), "a\nb");
    }

    #[test]
    fn full_pipeline() {
        let input = "  标题 \r\n\r\n正文\u{a0}第一段\n\n\n\t第二段  ";
        assert_eq!(run_pipeline(input), "标题\n正文 第一段\n第二段");
    }
}
