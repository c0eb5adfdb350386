//! Rich-text facet detection.
//!
//! Scans plain post text for links and hashtags and returns byte-range
//! annotations so the service renders them as live links and tags.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const MAX_TAG_CHARS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

impl Facet {
    fn new(byte_start: usize, byte_end: usize, feature: FacetFeature) -> Self {
        Self {
            index: ByteSlice {
                byte_start,
                byte_end,
            },
            features: vec![feature],
        }
    }

    pub fn feature(&self) -> Option<&FacetFeature> {
        self.features.first()
    }
}

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"https?://\S+").expect("link pattern is valid"))
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[#＃][^\s#＃]+").expect("tag pattern is valid"))
}

fn is_boundary_before(text: &str, start: usize, allow_paren: bool) -> bool {
    match text[..start].chars().next_back() {
        None => true,
        Some(c) => c.is_whitespace() || (allow_paren && c == '('),
    }
}

fn is_trailing_punctuation(c: char) -> bool {
    matches!(
        c,
        '.' | ',' | ';' | ':' | '!' | '?' | '。' | '、' | '！' | '？' | '」' | '』' | '）'
    )
}

fn trim_link(candidate: &str) -> &str {
    let mut uri = candidate.trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?'));
    if uri.ends_with(')') && !uri.contains('(') {
        uri = &uri[..uri.len() - 1];
    }
    uri
}

fn detect_links(text: &str, facets: &mut Vec<Facet>) {
    for m in link_pattern().find_iter(text) {
        if !is_boundary_before(text, m.start(), true) {
            continue;
        }
        let uri = trim_link(m.as_str());
        // Scheme alone is not a link.
        let has_host = uri
            .split_once("://")
            .map_or(false, |(_, rest)| !rest.is_empty());
        if !has_host {
            continue;
        }
        facets.push(Facet::new(
            m.start(),
            m.start() + uri.len(),
            FacetFeature::Link {
                uri: uri.to_string(),
            },
        ));
    }
}

fn detect_tags(text: &str, facets: &mut Vec<Facet>) {
    for m in tag_pattern().find_iter(text) {
        if !is_boundary_before(text, m.start(), false) {
            continue;
        }
        let marker_len = m.as_str().chars().next().map(char::len_utf8).unwrap_or(1);
        let tag = m.as_str()[marker_len..].trim_end_matches(is_trailing_punctuation);

        if tag.is_empty() || tag.chars().count() > MAX_TAG_CHARS {
            continue;
        }
        if tag.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }

        facets.push(Facet::new(
            m.start(),
            m.start() + marker_len + tag.len(),
            FacetFeature::Tag {
                tag: tag.to_string(),
            },
        ));
    }
}

/// Detect link and hashtag facets in `text`, ordered by byte offset.
pub fn detect_facets(text: &str) -> Vec<Facet> {
    let mut facets = Vec::new();
    detect_links(text, &mut facets);
    detect_tags(text, &mut facets);
    facets.sort_by_key(|f| f.index.byte_start);
    facets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_has_no_facets() {
        assert!(detect_facets("").is_empty());
        assert!(detect_facets("no links or tags here").is_empty());
    }

    #[test]
    fn test_link_byte_range_after_multibyte_text() {
        let text = "昨日は5回\nhttps://github.com/alice";
        let facets = detect_facets(text);
        assert_eq!(facets.len(), 1);

        let facet = &facets[0];
        let start = text.find("https://").unwrap();
        assert_eq!(facet.index.byte_start, start);
        assert_eq!(facet.index.byte_end, text.len());
        assert_eq!(
            &text[facet.index.byte_start..facet.index.byte_end],
            "https://github.com/alice"
        );
    }

    #[test]
    fn test_link_trailing_punctuation_trimmed() {
        let text = "see https://example.com/a. and (https://example.com/b)";
        let facets = detect_facets(text);
        let uris: Vec<_> = facets
            .iter()
            .filter_map(|f| match f.feature() {
                Some(FacetFeature::Link { uri }) => Some(uri.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(uris, vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[test]
    fn test_link_inside_word_is_ignored() {
        assert!(detect_facets("xhttps://example.com").is_empty());
    }

    #[test]
    fn test_hashtags() {
        let text = "#Githubsky done #123 #rust! a#b";
        let facets = detect_facets(text);
        let tags: Vec<_> = facets
            .iter()
            .filter_map(|f| match f.feature() {
                Some(FacetFeature::Tag { tag }) => Some(tag.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(tags, vec!["Githubsky", "rust"]);

        let rust = &facets[1];
        assert_eq!(&text[rust.index.byte_start..rust.index.byte_end], "#rust");
    }

    #[test]
    fn test_tag_keeps_inner_symbols() {
        let text = "#foo- #rust_lang_ #c++ #done。";
        let tags: Vec<_> = detect_facets(text)
            .iter()
            .filter_map(|f| match f.feature() {
                Some(FacetFeature::Tag { tag }) => Some(tag.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(tags, vec!["foo-", "rust_lang_", "c++", "done"]);
    }

    #[test]
    fn test_fullwidth_hash_marker() {
        let text = "今日も＃草";
        let facets = detect_facets(text);
        assert_eq!(facets.len(), 0, "tag must follow whitespace or start of text");

        let text = "今日も ＃草";
        let facets = detect_facets(text);
        assert_eq!(facets.len(), 1);
        assert_eq!(&text[facets[0].index.byte_start..facets[0].index.byte_end], "＃草");
    }

    #[test]
    fn test_facet_wire_shape() {
        let facet = Facet::new(
            0,
            10,
            FacetFeature::Tag {
                tag: "Githubsky".to_string(),
            },
        );
        let json = serde_json::to_value(&facet).unwrap();
        assert_eq!(json["index"]["byteStart"], 0);
        assert_eq!(json["index"]["byteEnd"], 10);
        assert_eq!(json["features"][0]["$type"], "app.bsky.richtext.facet#tag");
        assert_eq!(json["features"][0]["tag"], "Githubsky");
    }
}
