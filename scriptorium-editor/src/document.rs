//! # Structured rich-text document
//!
//! The editor never mutates HTML directly. It keeps a list of blocks
//! (paragraphs, headings, list items), each holding runs of text that share
//! the same inline marks, and serializes to HTML after every change. Positions
//! are a block index plus a character offset, which is also the cursor path
//! used to restore the caret after the document is replaced.

use scriptorium_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Inline marks a toggle command can switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InlineMark {
    Bold,
    Italic,
    Underline,
}

/// Inline formatting carried by a run of text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Marks {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    /// Target of the enclosing link
    pub link: Option<String>,
}

impl Marks {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn is_plain(&self) -> bool {
        *self == Self::default()
    }

    pub fn has(&self, mark: InlineMark) -> bool {
        match mark {
            InlineMark::Bold => self.bold,
            InlineMark::Italic => self.italic,
            InlineMark::Underline => self.underline,
        }
    }

    pub fn set(&mut self, mark: InlineMark, on: bool) {
        match mark {
            InlineMark::Bold => self.bold = on,
            InlineMark::Italic => self.italic = on,
            InlineMark::Underline => self.underline = on,
        }
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, mark: InlineMark) -> Self {
        self.set(mark, true);
        self
    }

    pub fn with_link<S: Into<String>>(mut self, url: S) -> Self {
        self.link = Some(url.into());
        self
    }
}

/// A run of text sharing the same marks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub marks: Marks,
}

impl Span {
    pub fn new<S: Into<String>>(text: S, marks: Marks) -> Self {
        Self {
            text: text.into(),
            marks,
        }
    }

    pub fn plain<S: Into<String>>(text: S) -> Self {
        Self::new(text, Marks::default())
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Structural role of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    #[default]
    Paragraph,
    /// Heading level 1 to 6
    Heading(u8),
    ListItem {
        ordered: bool,
    },
}

impl BlockKind {
    pub fn is_list_item(&self) -> bool {
        matches!(self, Self::ListItem { .. })
    }
}

/// Horizontal alignment of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl Align {
    /// Value of the CSS `text-align` property.
    pub fn css_value(&self) -> &'static str {
        match self {
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
            Align::Justify => "justify",
        }
    }

    pub fn from_css(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" | "start" => Some(Align::Left),
            "center" => Some(Align::Center),
            "right" | "end" => Some(Align::Right),
            "justify" => Some(Align::Justify),
            _ => None,
        }
    }
}

/// A paragraph, heading or list item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub align: Align,
    pub spans: Vec<Span>,
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            align: Align::default(),
            spans: Vec::new(),
        }
    }

    pub fn paragraph<S: Into<String>>(text: S) -> Self {
        Self::with_spans(BlockKind::Paragraph, vec![Span::plain(text)])
    }

    /// A block holding `spans`, normalized.
    pub fn with_spans(kind: BlockKind, spans: Vec<Span>) -> Self {
        let mut block = Self {
            kind,
            align: Align::default(),
            spans,
        };
        block.normalize();
        block
    }

    pub fn aligned(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.spans.iter().map(Span::char_len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.iter().all(|s| s.text.is_empty())
    }

    /// Drop empty runs and merge neighbours with equal marks.
    pub fn normalize(&mut self) {
        let mut merged: Vec<Span> = Vec::with_capacity(self.spans.len());
        for span in self.spans.drain(..) {
            if span.text.is_empty() {
                continue;
            }
            match merged.last_mut() {
                Some(last) if last.marks == span.marks => last.text.push_str(&span.text),
                _ => merged.push(span),
            }
        }
        self.spans = merged;
    }

    /// Marks a character typed at `offset` inherits.
    ///
    /// That is the marks of the character before the offset, or of the first
    /// character when typing at the start.
    pub fn marks_at(&self, offset: usize) -> Marks {
        let probe = offset.saturating_sub(1);
        let mut start = 0;
        for span in &self.spans {
            let end = start + span.char_len();
            if probe < end {
                return span.marks.clone();
            }
            start = end;
        }
        self.spans
            .last()
            .map(|s| s.marks.clone())
            .unwrap_or_default()
    }

    /// Insert `text` carrying `marks` at `offset`.
    pub fn insert_text(&mut self, offset: usize, text: &str, marks: Marks) {
        let index = self.split_span_at(offset);
        self.spans.insert(index, Span::new(text, marks));
        self.normalize();
    }

    /// Remove the characters in `start..end`.
    pub fn delete_range(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let first = self.split_span_at(start);
        let last = self.split_span_at(end);
        self.spans.drain(first..last);
        self.normalize();
    }

    /// Cut the block at `offset`, returning the runs after it.
    pub fn split_off(&mut self, offset: usize) -> Vec<Span> {
        let index = self.split_span_at(offset);
        let mut tail = Block::with_spans(self.kind, self.spans.split_off(index));
        self.normalize();
        std::mem::take(&mut tail.spans)
    }

    /// Append runs at the end of the block.
    pub fn append(&mut self, spans: Vec<Span>) {
        self.spans.extend(spans);
        self.normalize();
    }

    /// Apply `f` to the marks of the characters in `start..end`.
    pub fn update_marks<F: Fn(&mut Marks)>(&mut self, start: usize, end: usize, f: F) {
        if start >= end {
            return;
        }
        let first = self.split_span_at(start);
        let last = self.split_span_at(end);
        for span in &mut self.spans[first..last] {
            f(&mut span.marks);
        }
        self.normalize();
    }

    /// Whether every character in `start..end` satisfies `pred`.
    ///
    /// Vacuously true for an empty range.
    pub fn all_marked<F: Fn(&Marks) -> bool>(&self, start: usize, end: usize, pred: F) -> bool {
        let mut span_start = 0;
        for span in &self.spans {
            let span_end = span_start + span.char_len();
            let overlaps = span_start < end && start < span_end;
            if overlaps && !pred(&span.marks) {
                return false;
            }
            span_start = span_end;
        }
        true
    }

    /// Extent and target of the link around `offset`.
    pub fn link_extent(&self, offset: usize) -> Option<(usize, usize, String)> {
        let mut ranges = Vec::with_capacity(self.spans.len());
        let mut start = 0;
        for span in &self.spans {
            let end = start + span.char_len();
            ranges.push((start, end));
            start = end;
        }

        let probe = offset.saturating_sub(1);
        let index = ranges.iter().position(|&(s, e)| probe >= s && probe < e)?;
        let url = self.spans[index].marks.link.clone()?;

        let same_link = |i: usize| self.spans[i].marks.link.as_deref() == Some(url.as_str());
        let mut first = index;
        while first > 0 && same_link(first - 1) {
            first -= 1;
        }
        let mut last = index;
        while last + 1 < self.spans.len() && same_link(last + 1) {
            last += 1;
        }
        Some((ranges[first].0, ranges[last].1, url))
    }

    /// Ensure a run boundary at `offset`; returns the index of the first run
    /// starting at or after it.
    fn split_span_at(&mut self, offset: usize) -> usize {
        let mut start = 0;
        for index in 0..self.spans.len() {
            if offset == start {
                return index;
            }
            let len = self.spans[index].char_len();
            if offset < start + len {
                let byte = self.spans[index]
                    .text
                    .char_indices()
                    .nth(offset - start)
                    .map_or(self.spans[index].text.len(), |(b, _)| b);
                let tail_text = self.spans[index].text.split_off(byte);
                let tail = Span::new(tail_text, self.spans[index].marks.clone());
                self.spans.insert(index + 1, tail);
                return index + 1;
            }
            start += len;
        }
        self.spans.len()
    }
}

/// A position inside a document: block index and character offset.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DocPosition {
    pub block: usize,
    pub offset: usize,
}

impl DocPosition {
    pub fn new(block: usize, offset: usize) -> Self {
        Self { block, offset }
    }
}

/// A selection between an anchor and the moving head.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: DocPosition,
    pub head: DocPosition,
}

impl Selection {
    /// A collapsed selection.
    pub fn caret(position: DocPosition) -> Self {
        Self {
            anchor: position,
            head: position,
        }
    }

    pub fn range(anchor: DocPosition, head: DocPosition) -> Self {
        Self { anchor, head }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.head
    }

    pub fn start(&self) -> DocPosition {
        self.anchor.min(self.head)
    }

    pub fn end(&self) -> DocPosition {
        self.anchor.max(self.head)
    }
}

/// The rich-text document. Always holds at least one block.
///
/// # Example
///
/// ```rust
/// use scriptorium_editor::document::{DocPosition, Marks, RichDocument};
///
/// let mut doc = RichDocument::new();
/// let caret = doc.insert_text(DocPosition::default(), "Hello\nworld", Marks::plain())?;
/// assert_eq!(doc.block_count(), 2);
/// assert_eq!(caret, DocPosition::new(1, 5));
/// assert_eq!(doc.plain_text(), "Hello\nworld");
/// # Ok::<(), scriptorium_core::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichDocument {
    blocks: Vec<Block>,
}

impl RichDocument {
    /// A document with one empty paragraph.
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::new(BlockKind::Paragraph)],
        }
    }

    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        if blocks.is_empty() {
            return Self::new();
        }
        let mut doc = Self { blocks };
        for block in &mut doc.blocks {
            block.normalize();
        }
        doc
    }

    /// One paragraph per line of `text`.
    pub fn from_plain_text(text: &str) -> Self {
        Self::from_blocks(text.lines().map(Block::paragraph).collect())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub(crate) fn block_mut(&mut self, index: usize) -> Option<&mut Block> {
        self.blocks.get_mut(index)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Whether no block holds any text.
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(Block::is_empty)
    }

    /// Whether this is exactly the document [`new`](Self::new) creates.
    pub fn is_pristine(&self) -> bool {
        *self == Self::new()
    }

    /// Text of all blocks joined by newlines.
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(Block::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn end_position(&self) -> DocPosition {
        let last = self.blocks.len() - 1;
        DocPosition::new(last, self.blocks[last].len())
    }

    pub fn contains(&self, position: DocPosition) -> bool {
        self.blocks
            .get(position.block)
            .is_some_and(|b| position.offset <= b.len())
    }

    /// Move `position` to the nearest valid position.
    pub fn clamp(&self, position: DocPosition) -> DocPosition {
        let block = position.block.min(self.blocks.len() - 1);
        let offset = position.offset.min(self.blocks[block].len());
        DocPosition::new(block, offset)
    }

    /// Fail unless `position` lies inside the document.
    pub fn check(&self, position: DocPosition) -> Result<()> {
        if self.contains(position) {
            Ok(())
        } else {
            Err(Error::document(format!(
                "position {}:{} is outside the document",
                position.block, position.offset
            )))
        }
    }

    pub fn check_selection(&self, selection: &Selection) -> Result<()> {
        self.check(selection.anchor)?;
        self.check(selection.head)
    }

    /// Insert text at `position`; newlines start new blocks.
    ///
    /// Returns the position right after the inserted text.
    pub fn insert_text(
        &mut self,
        position: DocPosition,
        text: &str,
        marks: Marks,
    ) -> Result<DocPosition> {
        self.check(position)?;
        let mut caret = position;
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                caret = self.split_block(caret)?;
            }
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            let block = &mut self.blocks[caret.block];
            block.insert_text(caret.offset, line, marks.clone());
            caret.offset += line.chars().count();
        }
        Ok(caret)
    }

    /// Break the block at `position`, as the Enter key does.
    ///
    /// Enter in an empty list item leaves the list instead of adding an
    /// item, and the block after a heading is a paragraph.
    pub fn split_block(&mut self, position: DocPosition) -> Result<DocPosition> {
        self.check(position)?;
        let block = &mut self.blocks[position.block];

        if block.kind.is_list_item() && block.is_empty() {
            block.kind = BlockKind::Paragraph;
            return Ok(position);
        }

        let tail = block.split_off(position.offset);
        let kind = match block.kind {
            BlockKind::Heading(_) if tail.is_empty() => BlockKind::Paragraph,
            kind => kind,
        };
        let next = Block {
            kind,
            align: block.align,
            spans: tail,
        };
        self.blocks.insert(position.block + 1, next);
        Ok(DocPosition::new(position.block + 1, 0))
    }

    /// Remove everything between two positions. Returns the collapsed caret.
    pub fn delete_range(&mut self, a: DocPosition, b: DocPosition) -> Result<DocPosition> {
        self.check(a)?;
        self.check(b)?;
        let (start, end) = (a.min(b), a.max(b));

        if start.block == end.block {
            self.blocks[start.block].delete_range(start.offset, end.offset);
            return Ok(start);
        }

        let tail = self.blocks[end.block].split_off(end.offset);
        let first = &mut self.blocks[start.block];
        let first_len = first.len();
        first.delete_range(start.offset, first_len);
        first.append(tail);
        self.blocks.drain(start.block + 1..=end.block);
        Ok(start)
    }

    /// Delete the character before `position`, as Backspace does.
    ///
    /// At the start of a heading or list item the block turns into a
    /// paragraph; at the start of a paragraph it merges into the previous
    /// block.
    pub fn delete_backward(&mut self, position: DocPosition) -> Result<DocPosition> {
        self.check(position)?;
        if position.offset > 0 {
            let caret = DocPosition::new(position.block, position.offset - 1);
            return self.delete_range(caret, position);
        }

        let block = &mut self.blocks[position.block];
        if block.kind != BlockKind::Paragraph {
            block.kind = BlockKind::Paragraph;
            return Ok(position);
        }
        if position.block == 0 {
            return Ok(position);
        }

        let removed = self.blocks.remove(position.block);
        let previous = &mut self.blocks[position.block - 1];
        let caret = DocPosition::new(position.block - 1, previous.len());
        previous.append(removed.spans);
        Ok(caret)
    }

    /// Per-block character ranges covered by `start..end`.
    pub fn block_ranges(&self, start: DocPosition, end: DocPosition) -> Vec<(usize, usize, usize)> {
        (start.block..=end.block.min(self.blocks.len() - 1))
            .map(|index| {
                let from = if index == start.block { start.offset } else { 0 };
                let to = if index == end.block {
                    end.offset
                } else {
                    self.blocks[index].len()
                };
                (index, from, to)
            })
            .collect()
    }

    /// Text between two positions, blocks joined by newlines.
    pub fn text_between(&self, a: DocPosition, b: DocPosition) -> String {
        let (start, end) = (a.min(b), a.max(b));
        self.block_ranges(start, end)
            .into_iter()
            .map(|(index, from, to)| {
                self.blocks[index]
                    .text()
                    .chars()
                    .skip(from)
                    .take(to.saturating_sub(from))
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for RichDocument {
    fn default() -> Self {
        Self::new()
    }
}
