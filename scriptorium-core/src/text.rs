//! Text helpers shared by the editor and the draft list.
//!
//! Slugs, tag stripping, word counts and excerpts all operate on the HTML
//! stored in a post's content.

use regex::Regex;
use std::sync::LazyLock;

static NON_SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static BLOCK_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(p|div|h[1-6]|li|ul|ol|blockquote|pre)\s*>|<br\s*/?>").unwrap()
});

/// Derive a URL slug from a title.
///
/// Lowercases the title, turns every run of characters outside `[a-z0-9]`
/// into a single hyphen and trims hyphens at both ends. A title with nothing
/// left falls back to `untitled-<epoch millis>`.
///
/// # Example
///
/// ```rust
/// use scriptorium_core::text::derive_slug;
///
/// assert_eq!(derive_slug("Hello, World!!"), "hello-world");
/// assert!(derive_slug("!!!").starts_with("untitled-"));
/// ```
pub fn derive_slug(title: &str) -> String {
    let lowered = title.to_lowercase();
    let slug = NON_SLUG.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        format!("untitled-{}", chrono::Utc::now().timestamp_millis())
    } else {
        slug.to_string()
    }
}

/// Remove markup from an HTML fragment and decode the common entities.
///
/// Closing block tags and line breaks become a space so words in adjacent
/// paragraphs stay apart; inline tags vanish without a trace.
///
/// # Example
///
/// ```rust
/// use scriptorium_core::text::strip_tags;
///
/// assert_eq!(strip_tags("<p>Hello <b>wor</b>ld</p>").trim(), "Hello world");
/// assert_eq!(strip_tags("<p>one</p><p>two</p>").split_whitespace().count(), 2);
/// ```
pub fn strip_tags(html: &str) -> String {
    let spaced = BLOCK_BOUNDARY.replace_all(html, " ");
    let bare = TAG.replace_all(&spaced, "");
    decode_entities(&bare)
}

/// Decode the entities the editor's serializer produces.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&nbsp;", "\u{a0}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Escape text for inclusion in HTML content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\u{a0}' => escaped.push_str("&nbsp;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Count whitespace-separated words of the stripped HTML.
///
/// # Example
///
/// ```rust
/// use scriptorium_core::text::word_count;
///
/// assert_eq!(word_count("<p>Hello <b>world</b></p>"), 2);
/// assert_eq!(word_count(""), 0);
/// assert_eq!(word_count("<p>   </p>"), 0);
/// ```
pub fn word_count(html: &str) -> usize {
    strip_tags(html).split_whitespace().count()
}

/// Stripped text with whitespace runs collapsed to single spaces.
pub fn plain_text(html: &str) -> String {
    strip_tags(html).split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `max_chars` characters of the post's plain text.
///
/// # Example
///
/// ```rust
/// use scriptorium_core::text::excerpt;
///
/// assert_eq!(excerpt("<p>In the beginning</p>", 6), "In the");
/// ```
pub fn excerpt(html: &str, max_chars: usize) -> String {
    let text = plain_text(html);
    text.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

/// Whether the HTML holds no visible text at all.
pub fn is_blank(html: &str) -> bool {
    strip_tags(html).trim().is_empty()
}
