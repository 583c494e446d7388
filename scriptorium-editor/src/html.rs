//! HTML serialization of [`RichDocument`].
//!
//! The serializer writes the small tag vocabulary the editor produces:
//! `p`, `h1`..`h6`, `ul`/`ol` with `li`, and `a > strong > em > u` for inline
//! marks. The parser is tolerant: it accepts the same vocabulary plus `div`,
//! `b`, `i` and `br`, ignores every other tag, and never fails.

use crate::document::{Align, Block, BlockKind, Marks, RichDocument, Span};
use regex::Regex;
use scriptorium_core::text::{decode_entities, escape_html};
use std::sync::LazyLock;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<(/?)\s*([A-Za-z][A-Za-z0-9]*)([^>]*)>").unwrap()
});
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .unwrap()
});
static TEXT_ALIGN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)text-align\s*:\s*([a-z-]+)").unwrap());

/// Serialize a document to HTML.
///
/// An untouched document serializes to the empty string; any other empty
/// block is written as `<br>` so it keeps its height.
///
/// # Example
///
/// ```rust
/// use scriptorium_editor::document::RichDocument;
/// use scriptorium_editor::html::to_html;
///
/// assert_eq!(to_html(&RichDocument::new()), "");
/// assert_eq!(to_html(&RichDocument::from_plain_text("a < b")), "<p>a &lt; b</p>");
/// ```
pub fn to_html(doc: &RichDocument) -> String {
    if doc.is_pristine() {
        return String::new();
    }

    let mut out = String::new();
    let mut open_list: Option<bool> = None;

    for block in doc.blocks() {
        match block.kind {
            BlockKind::ListItem { ordered } => {
                if open_list != Some(ordered) {
                    close_list(&mut out, open_list);
                    out.push_str(if ordered { "<ol>" } else { "<ul>" });
                    open_list = Some(ordered);
                }
            }
            _ => {
                close_list(&mut out, open_list);
                open_list = None;
            }
        }

        let tag = block_tag(block.kind);
        out.push('<');
        out.push_str(&tag);
        if block.align != Align::Left {
            out.push_str(&format!(" style=\"text-align: {};\"", block.align.css_value()));
        }
        out.push('>');

        if block.is_empty() {
            out.push_str("<br>");
        } else {
            for span in &block.spans {
                write_span(&mut out, span);
            }
        }

        out.push_str("</");
        out.push_str(&tag);
        out.push('>');
    }

    close_list(&mut out, open_list);
    out
}

fn block_tag(kind: BlockKind) -> String {
    match kind {
        BlockKind::Paragraph => "p".to_string(),
        BlockKind::Heading(level) => format!("h{}", level.clamp(1, 6)),
        BlockKind::ListItem { .. } => "li".to_string(),
    }
}

fn close_list(out: &mut String, list: Option<bool>) {
    match list {
        Some(true) => out.push_str("</ol>"),
        Some(false) => out.push_str("</ul>"),
        None => {}
    }
}

fn write_span(out: &mut String, span: &Span) {
    let marks = &span.marks;
    if let Some(url) = &marks.link {
        out.push_str(&format!("<a href=\"{}\">", escape_html(url)));
    }
    if marks.bold {
        out.push_str("<strong>");
    }
    if marks.italic {
        out.push_str("<em>");
    }
    if marks.underline {
        out.push_str("<u>");
    }

    out.push_str(&escape_html(&span.text));

    if marks.underline {
        out.push_str("</u>");
    }
    if marks.italic {
        out.push_str("</em>");
    }
    if marks.bold {
        out.push_str("</strong>");
    }
    if marks.link.is_some() {
        out.push_str("</a>");
    }
}

/// Parse HTML into a document.
///
/// Loose text outside any block lands in an implicit paragraph, a `br`
/// splits the enclosing block, and unknown tags are skipped with their text
/// kept.
///
/// # Example
///
/// ```rust
/// use scriptorium_editor::html::from_html;
///
/// let doc = from_html("<h2>Title</h2><p>Some <b>bold</b> text</p>");
/// assert_eq!(doc.block_count(), 2);
/// assert_eq!(doc.plain_text(), "Title\nSome bold text");
/// assert!(from_html("").is_pristine());
/// ```
pub fn from_html(html: &str) -> RichDocument {
    let mut parser = Parser::default();
    let mut cursor = 0;

    for caps in TOKEN.captures_iter(html) {
        let Some(whole) = caps.get(0) else { continue };
        parser.text(&html[cursor..whole.start()]);
        cursor = whole.end();

        let Some(name) = caps.get(2) else { continue };
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let name = name.as_str().to_ascii_lowercase();
        let attrs = caps.get(3).map_or("", |m| m.as_str());

        if closing {
            parser.close(&name);
        } else {
            parser.open(&name, attrs);
        }
    }
    parser.text(&html[cursor..]);

    RichDocument::from_blocks(parser.finish())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkTag {
    Bold,
    Italic,
    Underline,
    Link,
}

impl MarkTag {
    fn from_tag(name: &str) -> Option<Self> {
        match name {
            "strong" | "b" => Some(Self::Bold),
            "em" | "i" => Some(Self::Italic),
            "u" => Some(Self::Underline),
            "a" => Some(Self::Link),
            _ => None,
        }
    }
}

struct OpenBlock {
    block: Block,
    /// Created by a `br` rather than a tag
    from_break: bool,
}

#[derive(Default)]
struct Parser {
    blocks: Vec<Block>,
    current: Option<OpenBlock>,
    marks: Vec<(MarkTag, Option<String>)>,
    lists: Vec<bool>,
}

impl Parser {
    fn open(&mut self, name: &str, attrs: &str) {
        if let Some(kind) = self.block_kind(name) {
            let align = parse_align(attrs);
            // A block opened inside an empty one refines it instead of nesting.
            if let Some(open) = self.current.as_mut().filter(|open| open.block.is_empty()) {
                if kind != BlockKind::Paragraph {
                    open.block.kind = kind;
                }
                if let Some(align) = align {
                    open.block.align = align;
                }
                open.from_break = false;
                return;
            }

            self.finish_block();
            let mut block = Block::new(kind);
            block.align = align.unwrap_or_default();
            self.current = Some(OpenBlock {
                block,
                from_break: false,
            });
            return;
        }

        match name {
            "ul" | "ol" => {
                self.finish_block();
                self.lists.push(name == "ol");
            }
            "br" => self.line_break(),
            _ => {
                if let Some(tag) = MarkTag::from_tag(name) {
                    let href = (tag == MarkTag::Link)
                        .then(|| attribute(attrs, "href"))
                        .flatten();
                    self.marks.push((tag, href));
                }
            }
        }
    }

    fn close(&mut self, name: &str) {
        if self.block_kind(name).is_some() {
            self.finish_block();
            return;
        }
        match name {
            "ul" | "ol" => {
                self.finish_block();
                self.lists.pop();
            }
            _ => {
                if let Some(tag) = MarkTag::from_tag(name) {
                    if let Some(index) = self.marks.iter().rposition(|(t, _)| *t == tag) {
                        self.marks.remove(index);
                    }
                }
            }
        }
    }

    fn text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let text = decode_entities(raw).replace(['\n', '\r', '\t'], " ");
        if self.current.is_none() {
            if text.trim().is_empty() {
                return;
            }
            self.current = Some(OpenBlock {
                block: Block::new(BlockKind::Paragraph),
                from_break: false,
            });
        }

        let marks = self.current_marks();
        if let Some(open) = &mut self.current {
            let offset = open.block.len();
            open.block.insert_text(offset, &text, marks);
        }
    }

    fn line_break(&mut self) {
        let (kind, align) = match self.current.take() {
            Some(open) => {
                let kind = open.block.kind;
                let align = open.block.align;
                self.blocks.push(open.block);
                (kind, align)
            }
            None => {
                self.blocks.push(Block::new(BlockKind::Paragraph));
                (BlockKind::Paragraph, Align::Left)
            }
        };
        let mut block = Block::new(kind);
        block.align = align;
        self.current = Some(OpenBlock {
            block,
            from_break: true,
        });
    }

    fn finish_block(&mut self) {
        if let Some(open) = self.current.take() {
            if !(open.from_break && open.block.is_empty()) {
                self.blocks.push(open.block);
            }
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.finish_block();
        self.blocks
    }

    fn block_kind(&self, name: &str) -> Option<BlockKind> {
        match name {
            "p" | "div" => Some(BlockKind::Paragraph),
            "li" => Some(BlockKind::ListItem {
                ordered: self.lists.last().copied().unwrap_or(false),
            }),
            _ => {
                let level = name.strip_prefix('h')?.parse::<u8>().ok()?;
                (1..=6).contains(&level).then_some(BlockKind::Heading(level))
            }
        }
    }

    fn current_marks(&self) -> Marks {
        let mut marks = Marks::default();
        for (tag, href) in &self.marks {
            match tag {
                MarkTag::Bold => marks.bold = true,
                MarkTag::Italic => marks.italic = true,
                MarkTag::Underline => marks.underline = true,
                MarkTag::Link => {
                    if href.is_some() {
                        marks.link = href.clone();
                    }
                }
            }
        }
        marks
    }
}

fn attribute(attrs: &str, name: &str) -> Option<String> {
    ATTRIBUTE.captures_iter(attrs).find_map(|caps| {
        if !caps[1].eq_ignore_ascii_case(name) {
            return None;
        }
        let value = caps.get(2).or(caps.get(3)).or(caps.get(4))?;
        Some(decode_entities(value.as_str()))
    })
}

fn parse_align(attrs: &str) -> Option<Align> {
    if let Some(style) = attribute(attrs, "style") {
        if let Some(caps) = TEXT_ALIGN.captures(&style) {
            return Align::from_css(&caps[1]);
        }
    }
    attribute(attrs, "align").and_then(|a| Align::from_css(&a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::InlineMark;

    fn sample() -> RichDocument {
        let link = Marks::plain().with_link("https://example.com/?a=1&b=2");
        RichDocument::from_blocks(vec![
            Block::with_spans(BlockKind::Heading(2), vec![Span::plain("Chapter One")]),
            Block::with_spans(
                BlockKind::Paragraph,
                vec![
                    Span::plain("It was "),
                    Span::new("dark", Marks::plain().with(InlineMark::Bold)),
                    Span::plain(" & "),
                    Span::new(
                        "stormy",
                        Marks::plain().with(InlineMark::Italic).with(InlineMark::Underline),
                    ),
                    Span::plain(", see "),
                    Span::new("here", link.clone()),
                    Span::new("!", link.with(InlineMark::Bold)),
                ],
            ),
            Block::new(BlockKind::Paragraph),
            Block::with_spans(BlockKind::ListItem { ordered: false }, vec![Span::plain("one")]),
            Block::with_spans(BlockKind::ListItem { ordered: false }, vec![Span::plain("two")]),
            Block::with_spans(BlockKind::ListItem { ordered: true }, vec![Span::plain("first")]),
            Block::paragraph("fin\u{a0}<end>").aligned(Align::Center),
        ])
    }

    #[test]
    fn test_serialize() {
        let html = to_html(&RichDocument::from_blocks(vec![
            Block::with_spans(BlockKind::Heading(1), vec![Span::plain("T")]),
            Block::with_spans(BlockKind::ListItem { ordered: false }, vec![Span::plain("a")]),
            Block::with_spans(BlockKind::ListItem { ordered: true }, vec![Span::plain("b")]),
            Block::new(BlockKind::Paragraph).aligned(Align::Right),
        ]));
        assert_eq!(
            html,
            "<h1>T</h1><ul><li>a</li></ul><ol><li>b</li></ol><p style=\"text-align: right;\"><br></p>"
        );
    }

    #[test]
    fn test_inline_nesting() {
        let doc = RichDocument::from_blocks(vec![Block::with_spans(
            BlockKind::Paragraph,
            vec![Span::new(
                "x",
                Marks::plain()
                    .with(InlineMark::Bold)
                    .with(InlineMark::Underline)
                    .with_link("/p"),
            )],
        )]);
        assert_eq!(to_html(&doc), "<p><a href=\"/p\"><strong><u>x</u></strong></a></p>");
    }

    #[test]
    fn test_roundtrip() {
        let doc = sample();
        let html = to_html(&doc);
        assert_eq!(from_html(&html), doc);
        assert_eq!(to_html(&from_html(&html)), html);
    }

    #[test]
    fn test_parse_empty() {
        let doc = from_html("");
        assert!(doc.is_pristine());
        assert!(from_html("<p><br></p>").is_pristine());
    }

    #[test]
    fn test_parse_loose_text_and_breaks() {
        let doc = from_html("hello<br>world");
        assert_eq!(doc.block_count(), 2);
        assert_eq!(doc.plain_text(), "hello\nworld");

        let doc = from_html("\n  <p>one</p>\n  <p>two</p>\n");
        assert_eq!(doc.plain_text(), "one\ntwo");
    }

    #[test]
    fn test_parse_nested_blocks() {
        let doc = from_html("<ol><li><p>step</p></li></ol><div><h3>Sub</h3></div>");
        assert_eq!(doc.block_count(), 2);
        assert_eq!(doc.blocks()[0].kind, BlockKind::ListItem { ordered: true });
        assert_eq!(doc.blocks()[1].kind, BlockKind::Heading(3));
    }

    #[test]
    fn test_parse_tolerates_unknown_markup() {
        let doc = from_html(
            "<!-- note --><p class=\"x\"><span style=\"color:red\">red</span> <B>loud</B></p><img src=\"a.png\">",
        );
        assert_eq!(doc.block_count(), 1);
        assert_eq!(doc.plain_text(), "red loud");
        assert!(doc.blocks()[0].spans.iter().any(|s| s.marks.bold && s.text == "loud"));
    }

    #[test]
    fn test_parse_alignment() {
        let doc = from_html("<p style='TEXT-ALIGN:justify'>a</p><p align=\"center\">b</p>");
        assert_eq!(doc.blocks()[0].align, Align::Justify);
        assert_eq!(doc.blocks()[1].align, Align::Center);
    }

    #[test]
    fn test_unclosed_marks_do_not_leak_past_close() {
        let doc = from_html("<p><b>bold <i>both</b> italic</i> plain</p>");
        let spans = &doc.blocks()[0].spans;
        let plain = spans.iter().find(|s| s.text.contains("plain")).unwrap();
        assert!(!plain.marks.bold && !plain.marks.italic);
    }
}
