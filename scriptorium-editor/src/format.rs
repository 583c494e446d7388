//! Formatting commands applied as structural edits to a [`RichDocument`].
//!
//! Commands keep the names of the browser editing commands they stand in for,
//! so a toolbar can be wired with `FormatCommand::parse("formatBlock", Some("h2"))`.

use crate::document::{Align, BlockKind, InlineMark, Marks, RichDocument, Selection};
use scriptorium_core::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, warn};

/// Target of a block-format command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFormat {
    Paragraph,
    /// Heading level 1 to 6
    Heading(u8),
}

/// A named formatting command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatCommand {
    Bold,
    Italic,
    Underline,
    FormatBlock(BlockFormat),
    InsertUnorderedList,
    InsertOrderedList,
    CreateLink(String),
    Unlink,
    Justify(Align),
}

impl FormatCommand {
    /// Parse a command from its name and optional value.
    ///
    /// Names are matched case-insensitively. `formatBlock` takes `p`, `div`
    /// or `h1`..`h6`, with or without angle brackets.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_editor::format::{BlockFormat, FormatCommand};
    ///
    /// assert_eq!(FormatCommand::parse("bold", None)?, FormatCommand::Bold);
    /// assert_eq!(
    ///     FormatCommand::parse("formatBlock", Some("<H2>"))?,
    ///     FormatCommand::FormatBlock(BlockFormat::Heading(2))
    /// );
    /// assert!(FormatCommand::parse("insertImage", Some("x.png")).is_err());
    /// # Ok::<(), scriptorium_core::Error>(())
    /// ```
    pub fn parse(name: &str, value: Option<&str>) -> Result<Self> {
        let command = match name.to_ascii_lowercase().as_str() {
            "bold" => Self::Bold,
            "italic" => Self::Italic,
            "underline" => Self::Underline,
            "formatblock" => {
                let value = required(name, value)?;
                let tag = value
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_ascii_lowercase();
                match tag.as_str() {
                    "p" | "div" => Self::FormatBlock(BlockFormat::Paragraph),
                    _ => {
                        let level = tag
                            .strip_prefix('h')
                            .and_then(|n| n.parse::<u8>().ok())
                            .filter(|n| (1..=6).contains(n))
                            .ok_or_else(|| {
                                Error::document(format!("unsupported block format '{}'", value))
                            })?;
                        Self::FormatBlock(BlockFormat::Heading(level))
                    }
                }
            }
            "insertunorderedlist" => Self::InsertUnorderedList,
            "insertorderedlist" => Self::InsertOrderedList,
            "createlink" => Self::CreateLink(required(name, value)?.trim().to_string()),
            "unlink" => Self::Unlink,
            "justifyleft" => Self::Justify(Align::Left),
            "justifycenter" => Self::Justify(Align::Center),
            "justifyright" => Self::Justify(Align::Right),
            "justifyfull" => Self::Justify(Align::Justify),
            _ => {
                return Err(Error::document(format!(
                    "unknown format command '{}'",
                    name
                )))
            }
        };
        Ok(command)
    }

    /// Command name as accepted by [`parse`](Self::parse).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bold => "bold",
            Self::Italic => "italic",
            Self::Underline => "underline",
            Self::FormatBlock(_) => "formatBlock",
            Self::InsertUnorderedList => "insertUnorderedList",
            Self::InsertOrderedList => "insertOrderedList",
            Self::CreateLink(_) => "createLink",
            Self::Unlink => "unlink",
            Self::Justify(Align::Left) => "justifyLeft",
            Self::Justify(Align::Center) => "justifyCenter",
            Self::Justify(Align::Right) => "justifyRight",
            Self::Justify(Align::Justify) => "justifyFull",
        }
    }

    fn inline_mark(&self) -> Option<InlineMark> {
        match self {
            Self::Bold => Some(InlineMark::Bold),
            Self::Italic => Some(InlineMark::Italic),
            Self::Underline => Some(InlineMark::Underline),
            _ => None,
        }
    }
}

impl fmt::Display for FormatCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FormatBlock(BlockFormat::Paragraph) => write!(f, "formatBlock(p)"),
            Self::FormatBlock(BlockFormat::Heading(level)) => write!(f, "formatBlock(h{})", level),
            Self::CreateLink(url) => write!(f, "createLink({})", url),
            other => f.write_str(other.name()),
        }
    }
}

fn required<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::document(format!("command '{}' requires a value", name)))
}

/// Apply `command` to `selection` in `doc`.
///
/// `pending` holds the marks the next typed text will carry; inline toggles on
/// a collapsed caret update it instead of the document. Returns the selection
/// after the command.
pub fn apply(
    doc: &mut RichDocument,
    selection: Selection,
    command: &FormatCommand,
    pending: &mut Option<Marks>,
) -> Result<Selection> {
    doc.check_selection(&selection)?;
    debug!("Applying {}", command);
    let (start, end) = (selection.start(), selection.end());

    if let Some(mark) = command.inline_mark() {
        if selection.is_collapsed() {
            let mut marks = pending.clone().unwrap_or_else(|| caret_marks(doc, &selection));
            let on = !marks.has(mark);
            marks.set(mark, on);
            *pending = Some(marks);
        } else {
            toggle_inline(doc, &selection, mark);
        }
        return Ok(selection);
    }

    match command {
        FormatCommand::FormatBlock(format) => {
            let kind = match format {
                BlockFormat::Paragraph => BlockKind::Paragraph,
                BlockFormat::Heading(level) => BlockKind::Heading(*level),
            };
            for index in start.block..=end.block {
                if let Some(block) = doc.block_mut(index) {
                    block.kind = kind;
                }
            }
        }
        FormatCommand::InsertUnorderedList | FormatCommand::InsertOrderedList => {
            let ordered = *command == FormatCommand::InsertOrderedList;
            let list = BlockKind::ListItem { ordered };
            let all_listed = (start.block..=end.block)
                .all(|index| doc.block(index).is_some_and(|b| b.kind == list));
            let kind = if all_listed { BlockKind::Paragraph } else { list };
            for index in start.block..=end.block {
                if let Some(block) = doc.block_mut(index) {
                    block.kind = kind;
                }
            }
        }
        FormatCommand::Justify(align) => {
            for index in start.block..=end.block {
                if let Some(block) = doc.block_mut(index) {
                    block.align = *align;
                }
            }
        }
        FormatCommand::CreateLink(url) => {
            if selection.is_collapsed() {
                let marks = pending
                    .take()
                    .unwrap_or_else(|| caret_marks(doc, &selection))
                    .with_link(url.clone());
                let after = doc.insert_text(start, url, marks)?;
                return Ok(Selection::range(start, after));
            }
            for (index, from, to) in doc.block_ranges(start, end) {
                if let Some(block) = doc.block_mut(index) {
                    block.update_marks(from, to, |m| m.link = Some(url.clone()));
                }
            }
        }
        FormatCommand::Unlink => {
            if selection.is_collapsed() {
                if let Some(block) = doc.block_mut(start.block) {
                    if let Some((from, to, _)) = block.link_extent(start.offset) {
                        block.update_marks(from, to, |m| m.link = None);
                    }
                }
            } else {
                for (index, from, to) in doc.block_ranges(start, end) {
                    if let Some(block) = doc.block_mut(index) {
                        block.update_marks(from, to, |m| m.link = None);
                    }
                }
            }
        }
        FormatCommand::Bold | FormatCommand::Italic | FormatCommand::Underline => {}
    }

    Ok(selection)
}

fn caret_marks(doc: &RichDocument, selection: &Selection) -> Marks {
    doc.block(selection.head.block)
        .map(|b| b.marks_at(selection.head.offset))
        .unwrap_or_default()
}

fn toggle_inline(doc: &mut RichDocument, selection: &Selection, mark: InlineMark) {
    let ranges: Vec<_> = doc
        .block_ranges(selection.start(), selection.end())
        .into_iter()
        .filter(|(_, from, to)| from < to)
        .collect();
    if ranges.is_empty() {
        return;
    }

    let all_marked = ranges.iter().all(|&(index, from, to)| {
        doc.block(index)
            .is_some_and(|b| b.all_marked(from, to, |m| m.has(mark)))
    });
    for (index, from, to) in ranges {
        if let Some(block) = doc.block_mut(index) {
            block.update_marks(from, to, |m| m.set(mark, !all_marked));
        }
    }
}

/// Names of the formats active at a selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveFormats(BTreeSet<String>);

impl ActiveFormats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, name: S) {
        self.0.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ActiveFormats {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Detect the formats active at `selection`.
///
/// Inline formats count when every selected character carries them, or, on a
/// collapsed caret, when the next typed character would. Block formats come
/// from the block holding the selection head.
pub fn try_active_formats(
    doc: &RichDocument,
    selection: &Selection,
    pending: Option<&Marks>,
) -> Result<ActiveFormats> {
    doc.check_selection(selection)?;
    let mut active = ActiveFormats::new();

    let ranges: Vec<_> = doc
        .block_ranges(selection.start(), selection.end())
        .into_iter()
        .filter(|(_, from, to)| from < to)
        .collect();

    let all = |pred: &dyn Fn(&Marks) -> bool| {
        ranges.iter().all(|&(index, from, to)| {
            doc.block(index).is_some_and(|b| b.all_marked(from, to, pred))
        })
    };

    let caret = if selection.is_collapsed() || ranges.is_empty() {
        Some(
            pending
                .cloned()
                .unwrap_or_else(|| caret_marks(doc, selection)),
        )
    } else {
        None
    };

    let checks: [(&str, &dyn Fn(&Marks) -> bool); 4] = [
        ("bold", &|m: &Marks| m.bold),
        ("italic", &|m: &Marks| m.italic),
        ("underline", &|m: &Marks| m.underline),
        ("link", &|m: &Marks| m.link.is_some()),
    ];
    for (name, pred) in checks {
        let on = match &caret {
            Some(marks) => pred(marks),
            None => all(pred),
        };
        if on {
            active.insert(name);
        }
    }

    let block = doc
        .block(selection.head.block)
        .ok_or_else(|| Error::document("selection head outside the document"))?;
    match block.kind {
        BlockKind::Heading(level) => active.insert(format!("h{}", level)),
        BlockKind::ListItem { ordered: true } => active.insert("ol"),
        BlockKind::ListItem { ordered: false } => active.insert("ul"),
        BlockKind::Paragraph => {}
    }

    Ok(active)
}

/// [`try_active_formats`], with failures logged and treated as no formats.
pub fn active_formats(
    doc: &RichDocument,
    selection: &Selection,
    pending: Option<&Marks>,
) -> ActiveFormats {
    match try_active_formats(doc, selection, pending) {
        Ok(active) => active,
        Err(e) => {
            warn!("Format detection failed: {}", e);
            ActiveFormats::new()
        }
    }
}
