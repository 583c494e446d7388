//! # Writing statistics
//!
//! Counts derived from a post's HTML: words, characters, paragraphs,
//! sentences and an estimated reading time. The editor keeps one instance per
//! session so it can also report how many words were written since opening
//! the post.

use crate::html::from_html;
use scriptorium_core::text::plain_text;
use serde::{Deserialize, Serialize};

/// Reading speed used when none is configured.
pub const DEFAULT_WORDS_PER_MINUTE: usize = 200;

/// Statistics for one post body.
///
/// # Example
///
/// ```rust
/// use scriptorium_editor::stats::WritingStats;
///
/// let mut stats = WritingStats::new();
/// stats.update("<p>Hello <b>world</b>! This is a test.</p><p>Second.</p>");
/// assert_eq!(stats.word_count(), 7);
/// assert_eq!(stats.paragraph_count(), 2);
/// assert_eq!(stats.reading_time_minutes(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WritingStats {
    word_count: usize,
    char_count: usize,
    char_count_no_spaces: usize,
    paragraph_count: usize,
    sentence_count: usize,
    reading_time_minutes: usize,
    words_per_minute: usize,
    session_words: usize,
}

impl WritingStats {
    pub fn new() -> Self {
        Self::with_words_per_minute(DEFAULT_WORDS_PER_MINUTE)
    }

    /// Statistics estimating reading time at `words_per_minute`.
    pub fn with_words_per_minute(words_per_minute: usize) -> Self {
        Self {
            word_count: 0,
            char_count: 0,
            char_count_no_spaces: 0,
            paragraph_count: 0,
            sentence_count: 0,
            reading_time_minutes: 0,
            words_per_minute: words_per_minute.max(1),
            session_words: 0,
        }
    }

    /// Recompute everything from `html`, crediting added words to the session.
    pub fn update(&mut self, html: &str) {
        let previous = self.word_count;
        self.recompute(html);
        self.session_words += self.word_count.saturating_sub(previous);
    }

    /// Recompute from `html` without crediting the difference to the session.
    ///
    /// Used when the body is replaced wholesale, by loading a stored post or
    /// taking in an external change.
    pub fn rebase(&mut self, html: &str) {
        self.recompute(html);
    }

    fn recompute(&mut self, html: &str) {
        let text = plain_text(html);

        self.word_count = text.split_whitespace().count();
        self.char_count = text.chars().count();
        self.char_count_no_spaces = text.chars().filter(|c| !c.is_whitespace()).count();
        self.paragraph_count = from_html(html)
            .blocks()
            .iter()
            .filter(|b| !b.text().trim().is_empty())
            .count();
        self.sentence_count = Self::count_sentences(&text);
        self.reading_time_minutes = self.word_count.div_ceil(self.words_per_minute);
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    /// Characters of the collapsed plain text, spaces included.
    pub fn char_count(&self) -> usize {
        self.char_count
    }

    pub fn char_count_no_spaces(&self) -> usize {
        self.char_count_no_spaces
    }

    /// Blocks holding visible text.
    pub fn paragraph_count(&self) -> usize {
        self.paragraph_count
    }

    pub fn sentence_count(&self) -> usize {
        self.sentence_count
    }

    /// Whole minutes, rounded up. Zero for an empty post.
    pub fn reading_time_minutes(&self) -> usize {
        self.reading_time_minutes
    }

    /// Words added by edits since the body was last loaded or rebased.
    pub fn session_words(&self) -> usize {
        self.session_words
    }

    fn count_sentences(text: &str) -> usize {
        let mut count = 0;
        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            if matches!(ch, '.' | '!' | '?') {
                match chars.peek() {
                    Some(next) if next.is_whitespace() => count += 1,
                    None => count += 1,
                    _ => {}
                }
            }
        }
        count.max(if text.trim().is_empty() { 0 } else { 1 })
    }
}

impl Default for WritingStats {
    fn default() -> Self {
        Self::new()
    }
}
