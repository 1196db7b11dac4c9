//! Text helpers shared by the loaders and the HTTP layer

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;

lazy_static! {
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
    static ref XML_TAG_REGEX: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref XML_ENTITY_REGEX: Regex = Regex::new(r"&(#x[0-9A-Fa-f]+|#[0-9]+|[a-z]+);").unwrap();
}

pub struct TextUtils;

impl TextUtils {
    /// Case-insensitive substring test.
    pub fn contains_ignore_case(text: &str, pattern: &str) -> bool {
        if pattern.is_empty() {
            return true;
        }
        text.to_lowercase().contains(&pattern.to_lowercase())
    }

    /// Remove every occurrence of `pattern`, ignoring case.
    pub fn remove_ignore_case<'a>(text: &'a str, pattern: &str) -> Cow<'a, str> {
        if pattern.is_empty() {
            return Cow::Borrowed(text);
        }
        match Regex::new(&format!("(?i){}", regex::escape(pattern))) {
            Ok(re) => re.replace_all(text, ""),
            Err(_) => Cow::Borrowed(text),
        }
    }

    /// Collapse whitespace runs into single spaces and trim.
    pub fn normalize_whitespace(text: &str) -> Cow<'_, str> {
        if WHITESPACE_REGEX.is_match(text) {
            Cow::Owned(WHITESPACE_REGEX.replace_all(text, " ").trim().to_string())
        } else {
            Cow::Borrowed(text)
        }
    }

    /// Cut to at most `max_chars` characters, ending in "..." when shortened.
    pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> Cow<'_, str> {
        if text.chars().count() <= max_chars {
            return Cow::Borrowed(text);
        }
        if max_chars <= 3 {
            return Cow::Borrowed("...");
        }
        let kept: String = text.chars().take(max_chars - 3).collect();
        Cow::Owned(format!("{}...", kept))
    }

    /// Decode the predefined XML entities and numeric character references.
    pub fn unescape_xml(text: &str) -> Cow<'_, str> {
        if !text.contains('&') {
            return Cow::Borrowed(text);
        }
        XML_ENTITY_REGEX.replace_all(text, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ if entity.starts_with("#x") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => entity[1..].parse().ok().and_then(char::from_u32),
                _ => None,
            };
            decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
        })
    }

    /// Text of each `<{paragraph_tag}>` element of an Office Open XML part.
    ///
    /// Runs are concatenated, tabs and line breaks are kept, and empty
    /// paragraphs are dropped.
    pub fn ooxml_paragraphs(xml: &str, paragraph_tag: &str) -> Vec<String> {
        let close = format!("</{}>", paragraph_tag);
        let tab = format!("<{}:tab/>", paragraph_tag.split(':').next().unwrap_or("w"));
        let br = format!("<{}:br/>", paragraph_tag.split(':').next().unwrap_or("w"));

        xml.split(close.as_str())
            .filter_map(|fragment| {
                let fragment = fragment.replace(&tab, "\t").replace(&br, "\n");
                let text = XML_TAG_REGEX.replace_all(&fragment, "");
                let text = Self::unescape_xml(&text).trim().to_string();
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            })
            .collect()
    }

    pub fn count_words(text: &str) -> usize {
        text.split_whitespace().count()
    }
}
